use crate::bit_pack;
use itertools::izip;
use num_traits::ToPrimitive;
use rand::Rng;
use std::ops::Range;
use thiserror::Error;

/// Classification tasks with up to this many classes get their own compiled specialization. Tasks with more classes use the dynamic one.
pub const MAX_COMPILER_CLASSES: usize = 8;

/// A const parameter with this value means the kernel reads the quantity at runtime instead of having it fixed at compile time.
pub const DYNAMIC: usize = 0;

/// When true, binary classification produces one score per class instead of a single logit.
pub const EXPAND_BINARY_LOGITS: bool = cfg!(feature = "expand_binary_logits");

/// Returns the number of scores a classification model with `n_classes` classes produces.
pub const fn n_scores_for_classes(n_classes: usize) -> usize {
	if n_classes == 2 && !EXPAND_BINARY_LOGITS {
		1
	} else {
		n_classes
	}
}

#[derive(Debug, Error, PartialEq)]
pub enum BinSumsError {
	#[error("classification requires at least 2 classes, got {0}")]
	TooFewClasses(usize),
	#[error("every dimension of a term must have at least one bin")]
	EmptyDimension,
	#[error("the number of tensor bins overflows")]
	TensorTooLarge,
	#[error("{0} items per word is not a valid bit pack")]
	InvalidBitPack(usize),
	#[error("{n_bins} tensor bins do not fit in fields of {bits_per_item} bits")]
	BitPackTooNarrow { n_bins: usize, bits_per_item: usize },
	#[error("index {index} does not fit in {bits_per_item} bits")]
	IndexTooWide { index: usize, bits_per_item: usize },
	#[error("expected {expected} values but got {actual}")]
	LengthMismatch { expected: usize, actual: usize },
	#[error("the training set must contain at least one sample")]
	NoSamples,
	#[error("weight {0} is not a finite, non-negative number")]
	InvalidWeight(f64),
	#[error("sample {sample} of term {term} maps to tensor bin {index} but the term only has {n_tensor_bins} bins")]
	TensorIndexOutOfRange {
		term: usize,
		sample: usize,
		index: usize,
		n_tensor_bins: usize,
	},
	#[error("term {0} does not match the packed data in the training set")]
	TermMismatch(usize),
}

/// The kind of model being boosted. The task determines how many scores each sample has and whether hessians are stored next to the gradients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
	Regression,
	Classification { n_classes: usize },
}

impl Task {
	pub fn classification(n_classes: usize) -> Result<Task, BinSumsError> {
		if n_classes < 2 {
			return Err(BinSumsError::TooFewClasses(n_classes));
		}
		Ok(Task::Classification { n_classes })
	}

	pub fn is_classification(&self) -> bool {
		matches!(self, Task::Classification { .. })
	}

	pub fn n_scores(&self) -> usize {
		match self {
			Task::Regression => 1,
			Task::Classification { n_classes } => n_scores_for_classes(*n_classes),
		}
	}

	/// Classification stores a hessian right after each gradient. Regression stores only the gradient.
	pub fn values_per_score(&self) -> usize {
		if self.is_classification() {
			2
		} else {
			1
		}
	}

	pub fn values_per_sample(&self) -> usize {
		self.n_scores() * self.values_per_score()
	}
}

/// A feature or an interaction of features. Each sample is assigned one bin in the term's tensor, and the flattened tensor indices are bit packed `bit_pack` to a word.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
	bin_counts: Vec<usize>,
	n_tensor_bins: usize,
	bit_pack: usize,
}

impl Term {
	/// Create a term with the densest packing that can represent every tensor bin.
	pub fn new(bin_counts: Vec<usize>) -> Result<Term, BinSumsError> {
		let n_tensor_bins = compute_n_tensor_bins(&bin_counts)?;
		let bit_pack = bit_pack::items_per_word_for_bins(n_tensor_bins);
		Ok(Term {
			bin_counts,
			n_tensor_bins,
			bit_pack,
		})
	}

	/// Create a term that packs `items_per_word` tensor indices into each word.
	pub fn with_bit_pack(bin_counts: Vec<usize>, items_per_word: usize) -> Result<Term, BinSumsError> {
		let n_tensor_bins = compute_n_tensor_bins(&bin_counts)?;
		bit_pack::validate_items_per_word(items_per_word)?;
		let bits_per_item = bit_pack::bits_per_item(items_per_word);
		if (n_tensor_bins - 1).to_u64().unwrap_or(u64::MAX) > bit_pack::mask(bits_per_item) {
			return Err(BinSumsError::BitPackTooNarrow {
				n_bins: n_tensor_bins,
				bits_per_item,
			});
		}
		Ok(Term {
			bin_counts,
			n_tensor_bins,
			bit_pack: items_per_word,
		})
	}

	pub fn bin_counts(&self) -> &[usize] {
		&self.bin_counts
	}

	pub fn n_dimensions(&self) -> usize {
		self.bin_counts.len()
	}

	/// Dimensions with a single bin cannot split anything, so they are not counted.
	pub fn n_real_dimensions(&self) -> usize {
		self.bin_counts.iter().filter(|n_bins| **n_bins > 1).count()
	}

	pub fn n_tensor_bins(&self) -> usize {
		self.n_tensor_bins
	}

	/// The number of tensor indices packed into each word.
	pub fn bit_pack(&self) -> usize {
		self.bit_pack
	}

	/// Flatten a bin index per dimension into a tensor index. The first dimension is the least significant.
	pub fn tensor_index(&self, bin_indices: &[usize]) -> usize {
		debug_assert_eq!(bin_indices.len(), self.bin_counts.len());
		let mut tensor_index = 0;
		let mut multiple = 1;
		for (bin_index, n_bins) in bin_indices.iter().zip(self.bin_counts.iter()) {
			debug_assert!(bin_index < n_bins);
			tensor_index += bin_index * multiple;
			multiple *= n_bins;
		}
		tensor_index
	}
}

fn compute_n_tensor_bins(bin_counts: &[usize]) -> Result<usize, BinSumsError> {
	bin_counts.iter().try_fold(1usize, |n_tensor_bins, n_bins| {
		if *n_bins == 0 {
			return Err(BinSumsError::EmptyDimension);
		}
		n_tensor_bins
			.checked_mul(*n_bins)
			.ok_or(BinSumsError::TensorTooLarge)
	})
}

/// A weighted bootstrap resample of the training set. `count_occurrences[i]` is the number of times sample `i` was drawn and `weights[i]` is the total weight it carries in this bag.
#[derive(Clone, Debug, PartialEq)]
pub struct InnerBag {
	count_occurrences: Vec<usize>,
	weights: Vec<f64>,
	weight_total: f64,
}

impl InnerBag {
	pub fn new(count_occurrences: Vec<usize>, weights: Vec<f64>) -> Result<InnerBag, BinSumsError> {
		if count_occurrences.len() != weights.len() {
			return Err(BinSumsError::LengthMismatch {
				expected: count_occurrences.len(),
				actual: weights.len(),
			});
		}
		if let Some(weight) = weights.iter().find(|weight| !is_valid_weight(**weight)) {
			return Err(BinSumsError::InvalidWeight(*weight));
		}
		let weight_total: f64 = weights.iter().sum();
		Ok(InnerBag {
			count_occurrences,
			weights,
			weight_total,
		})
	}

	/// Every sample appears exactly once. Without `sample_weights`, every sample has weight 1.
	pub fn flat(n_samples: usize, sample_weights: Option<&[f64]>) -> Result<InnerBag, BinSumsError> {
		let weights = match sample_weights {
			Some(sample_weights) => {
				check_sample_weights(n_samples, sample_weights)?;
				sample_weights.to_owned()
			}
			None => vec![1.0; n_samples],
		};
		InnerBag::new(vec![1; n_samples], weights)
	}

	/// Draw `n_samples` samples with replacement. Each sample's weight is its sample weight times the number of times it was drawn.
	pub fn bootstrap<R>(
		n_samples: usize,
		sample_weights: Option<&[f64]>,
		rng: &mut R,
	) -> Result<InnerBag, BinSumsError>
	where
		R: Rng,
	{
		if let Some(sample_weights) = sample_weights {
			check_sample_weights(n_samples, sample_weights)?;
		}
		let mut count_occurrences = vec![0; n_samples];
		for _ in 0..n_samples {
			count_occurrences[rng.gen_range(0, n_samples)] += 1;
		}
		let weights = count_occurrences
			.iter()
			.enumerate()
			.map(|(sample_index, count)| {
				let sample_weight = sample_weights.map(|w| w[sample_index]).unwrap_or(1.0);
				*count as f64 * sample_weight
			})
			.collect();
		InnerBag::new(count_occurrences, weights)
	}

	pub fn n_samples(&self) -> usize {
		self.count_occurrences.len()
	}

	pub fn count_occurrences(&self) -> &[usize] {
		&self.count_occurrences
	}

	pub fn weights(&self) -> &[f64] {
		&self.weights
	}

	pub fn weight_total(&self) -> f64 {
		self.weight_total
	}
}

fn is_valid_weight(weight: f64) -> bool {
	weight.is_finite() && weight >= 0.0
}

fn check_sample_weights(n_samples: usize, sample_weights: &[f64]) -> Result<(), BinSumsError> {
	if sample_weights.len() != n_samples {
		return Err(BinSumsError::LengthMismatch {
			expected: n_samples,
			actual: sample_weights.len(),
		});
	}
	match sample_weights.iter().find(|weight| !is_valid_weight(**weight)) {
		Some(weight) => Err(BinSumsError::InvalidWeight(*weight)),
		None => Ok(()),
	}
}

/// The packed tensor indices for one term, along with the shape they were validated against.
#[derive(Clone, Debug)]
struct TermData {
	bit_pack: usize,
	n_tensor_bins: usize,
	packed: Vec<u64>,
}

/// The training data the kernel reads: the interleaved gradients and hessians for every sample and score, and the packed tensor indices for every term.
#[derive(Clone, Debug)]
pub struct TrainingSet {
	task: Task,
	n_samples: usize,
	/// (n_samples, n_scores, values_per_score)
	gradients_and_hessians: Vec<f64>,
	input_data: Vec<TermData>,
}

impl TrainingSet {
	/// Pack `tensor_bin_indices[t][i]`, the tensor bin of sample `i` in term `t`, with each term's bit pack.
	pub fn new(
		task: Task,
		terms: &[Term],
		n_samples: usize,
		tensor_bin_indices: &[Vec<usize>],
	) -> Result<TrainingSet, BinSumsError> {
		check_task(task)?;
		if n_samples == 0 {
			return Err(BinSumsError::NoSamples);
		}
		if tensor_bin_indices.len() != terms.len() {
			return Err(BinSumsError::LengthMismatch {
				expected: terms.len(),
				actual: tensor_bin_indices.len(),
			});
		}
		let input_data = terms
			.iter()
			.zip(tensor_bin_indices.iter())
			.enumerate()
			.map(|(term_index, (term, indices))| {
				if indices.len() != n_samples {
					return Err(BinSumsError::LengthMismatch {
						expected: n_samples,
						actual: indices.len(),
					});
				}
				check_tensor_indices(term_index, term.n_tensor_bins(), indices.iter().copied())?;
				Ok(TermData {
					bit_pack: term.bit_pack(),
					n_tensor_bins: term.n_tensor_bins(),
					packed: bit_pack::pack(indices, term.bit_pack())?,
				})
			})
			.collect::<Result<Vec<_>, _>>()?;
		Ok(TrainingSet::with_input_data(task, n_samples, input_data))
	}

	/// Use words that were already packed with each term's bit pack. Every decoded index is checked against the term's tensor.
	pub fn from_packed(
		task: Task,
		terms: &[Term],
		n_samples: usize,
		packed: Vec<Vec<u64>>,
	) -> Result<TrainingSet, BinSumsError> {
		check_task(task)?;
		if n_samples == 0 {
			return Err(BinSumsError::NoSamples);
		}
		if packed.len() != terms.len() {
			return Err(BinSumsError::LengthMismatch {
				expected: terms.len(),
				actual: packed.len(),
			});
		}
		let input_data = terms
			.iter()
			.zip(packed.into_iter())
			.enumerate()
			.map(|(term_index, (term, packed))| {
				let n_words = bit_pack::n_words(n_samples, term.bit_pack());
				if packed.len() != n_words {
					return Err(BinSumsError::LengthMismatch {
						expected: n_words,
						actual: packed.len(),
					});
				}
				let indices = bit_pack::unpack(&packed, term.bit_pack(), n_samples)?;
				check_tensor_indices(term_index, term.n_tensor_bins(), indices.into_iter())?;
				Ok(TermData {
					bit_pack: term.bit_pack(),
					n_tensor_bins: term.n_tensor_bins(),
					packed,
				})
			})
			.collect::<Result<Vec<_>, _>>()?;
		Ok(TrainingSet::with_input_data(task, n_samples, input_data))
	}

	fn with_input_data(task: Task, n_samples: usize, input_data: Vec<TermData>) -> TrainingSet {
		TrainingSet {
			task,
			n_samples,
			gradients_and_hessians: vec![0.0; n_samples * task.values_per_sample()],
			input_data,
		}
	}

	pub fn task(&self) -> Task {
		self.task
	}

	pub fn n_samples(&self) -> usize {
		self.n_samples
	}

	pub fn n_scores(&self) -> usize {
		self.task.n_scores()
	}

	pub fn n_terms(&self) -> usize {
		self.input_data.len()
	}

	/// Laid out as gradient then hessian, per score, per sample. Regression omits the hessians.
	pub fn gradients_and_hessians(&self) -> &[f64] {
		&self.gradients_and_hessians
	}

	pub fn gradients_and_hessians_mut(&mut self) -> &mut [f64] {
		&mut self.gradients_and_hessians
	}

	pub fn set_gradients_and_hessians(&mut self, values: Vec<f64>) -> Result<(), BinSumsError> {
		if values.len() != self.gradients_and_hessians.len() {
			return Err(BinSumsError::LengthMismatch {
				expected: self.gradients_and_hessians.len(),
				actual: values.len(),
			});
		}
		self.gradients_and_hessians = values;
		Ok(())
	}

	pub fn packed(&self, term_index: usize) -> &[u64] {
		&self.input_data[term_index].packed
	}

	pub(crate) fn samples<'a>(&'a self, inner_bag: &'a InnerBag) -> Samples<'a> {
		assert_eq!(
			inner_bag.n_samples(),
			self.n_samples,
			"the inner bag must cover every sample in the training set",
		);
		Samples {
			n_samples: self.n_samples,
			n_scores: self.n_scores(),
			values_per_sample: self.task.values_per_sample(),
			gradients_and_hessians: &self.gradients_and_hessians,
			count_occurrences: inner_bag.count_occurrences(),
			weights: inner_bag.weights(),
		}
	}
}

fn check_task(task: Task) -> Result<(), BinSumsError> {
	match task {
		Task::Classification { n_classes } if n_classes < 2 => {
			Err(BinSumsError::TooFewClasses(n_classes))
		}
		_ => Ok(()),
	}
}

fn check_tensor_indices(
	term_index: usize,
	n_tensor_bins: usize,
	indices: impl Iterator<Item = usize>,
) -> Result<(), BinSumsError> {
	for (sample, index) in indices.enumerate() {
		if index >= n_tensor_bins {
			return Err(BinSumsError::TensorIndexOutOfRange {
				term: term_index,
				sample,
				index,
				n_tensor_bins,
			});
		}
	}
	Ok(())
}

/// The terms and training data that `bin_sums` reads from.
#[derive(Clone, Debug)]
pub struct BoostingContext {
	terms: Vec<Term>,
	training_set: TrainingSet,
	options: crate::BinSumsOptions,
}

impl BoostingContext {
	pub fn new(
		terms: Vec<Term>,
		training_set: TrainingSet,
		options: crate::BinSumsOptions,
	) -> Result<BoostingContext, BinSumsError> {
		if terms.len() != training_set.n_terms() {
			return Err(BinSumsError::LengthMismatch {
				expected: terms.len(),
				actual: training_set.n_terms(),
			});
		}
		for (term_index, (term, data)) in terms.iter().zip(training_set.input_data.iter()).enumerate() {
			if term.bit_pack() != data.bit_pack || term.n_tensor_bins() != data.n_tensor_bins {
				return Err(BinSumsError::TermMismatch(term_index));
			}
		}
		Ok(BoostingContext {
			terms,
			training_set,
			options,
		})
	}

	pub fn task(&self) -> Task {
		self.training_set.task()
	}

	pub fn terms(&self) -> &[Term] {
		&self.terms
	}

	pub fn training_set(&self) -> &TrainingSet {
		&self.training_set
	}

	/// The gradients change every round. The packed indices and the shape of the training set never do, so only the gradients and hessians are mutable through the context.
	pub fn gradients_and_hessians_mut(&mut self) -> &mut [f64] {
		self.training_set.gradients_and_hessians_mut()
	}

	pub fn set_gradients_and_hessians(&mut self, values: Vec<f64>) -> Result<(), BinSumsError> {
		self.training_set.set_gradients_and_hessians(values)
	}

	pub fn options(&self) -> &crate::BinSumsOptions {
		&self.options
	}

	/// Allocate a zeroed buffer sized for `term_index`, or a single bin when there is no term.
	pub fn new_bin_buffer(&self, term_index: Option<usize>) -> BinBuffer {
		let n_bins = term_index
			.map(|term_index| self.terms[term_index].n_tensor_bins())
			.unwrap_or(1);
		BinBuffer::new(n_bins, self.task().n_scores())
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GradientPair {
	pub sum_gradients: f64,
	/// Only meaningful for classification.
	pub sum_hessians: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct BinTotals {
	pub count_samples: usize,
	pub weight: f64,
}

/// A view of one bin in a `BinBuffer`.
#[derive(Debug, PartialEq)]
pub struct Bin<'a> {
	pub count_samples: usize,
	pub weight: f64,
	pub gradient_pairs: &'a [GradientPair],
}

/// The caller-owned accumulator for one term. Bin `i` owns `gradient_pairs[i * n_scores..(i + 1) * n_scores]`.
#[derive(Clone, Debug, PartialEq)]
pub struct BinBuffer {
	n_scores: usize,
	totals: Vec<BinTotals>,
	gradient_pairs: Vec<GradientPair>,
}

impl BinBuffer {
	pub fn new(n_bins: usize, n_scores: usize) -> BinBuffer {
		assert!(n_scores > 0, "a bin needs at least one score");
		BinBuffer {
			n_scores,
			totals: vec![BinTotals::default(); n_bins],
			gradient_pairs: vec![GradientPair::default(); n_bins * n_scores],
		}
	}

	pub fn n_bins(&self) -> usize {
		self.totals.len()
	}

	pub fn n_scores(&self) -> usize {
		self.n_scores
	}

	pub fn reset(&mut self) {
		for totals in self.totals.iter_mut() {
			*totals = BinTotals::default();
		}
		for gradient_pair in self.gradient_pairs.iter_mut() {
			*gradient_pair = GradientPair::default();
		}
	}

	pub fn bin(&self, bin_index: usize) -> Bin<'_> {
		let totals = &self.totals[bin_index];
		Bin {
			count_samples: totals.count_samples,
			weight: totals.weight,
			gradient_pairs: &self.gradient_pairs
				[bin_index * self.n_scores..(bin_index + 1) * self.n_scores],
		}
	}

	pub fn bins(&self) -> impl Iterator<Item = Bin<'_>> + '_ {
		(0..self.n_bins()).map(move |bin_index| self.bin(bin_index))
	}

	/// Add every bin of `other` into the matching bin of `self`.
	pub fn merge(&mut self, other: &BinBuffer) {
		assert_eq!(self.n_scores, other.n_scores);
		assert_eq!(self.n_bins(), other.n_bins());
		for (totals, other_totals) in izip!(self.totals.iter_mut(), other.totals.iter()) {
			totals.count_samples += other_totals.count_samples;
			totals.weight += other_totals.weight;
		}
		for (gradient_pair, other_gradient_pair) in
			izip!(self.gradient_pairs.iter_mut(), other.gradient_pairs.iter())
		{
			gradient_pair.sum_gradients += other_gradient_pair.sum_gradients;
			gradient_pair.sum_hessians += other_gradient_pair.sum_hessians;
		}
	}

	pub fn total_count_samples(&self) -> usize {
		self.totals.iter().map(|totals| totals.count_samples).sum()
	}

	pub fn total_weight(&self) -> f64 {
		self.totals.iter().map(|totals| totals.weight).sum()
	}

	/// The sum over all bins for each score.
	pub fn total_gradient_pairs(&self) -> Vec<GradientPair> {
		let mut totals = vec![GradientPair::default(); self.n_scores];
		for bin_gradient_pairs in self.gradient_pairs.chunks(self.n_scores) {
			for (total, gradient_pair) in totals.iter_mut().zip(bin_gradient_pairs.iter()) {
				total.sum_gradients += gradient_pair.sum_gradients;
				total.sum_hessians += gradient_pair.sum_hessians;
			}
		}
		totals
	}

	pub(crate) fn parts_mut(&mut self) -> (&mut [BinTotals], &mut [GradientPair]) {
		(&mut self.totals, &mut self.gradient_pairs)
	}
}

/// The per-sample inputs to one accumulation pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Samples<'a> {
	pub n_samples: usize,
	pub n_scores: usize,
	pub values_per_sample: usize,
	/// (n_samples, values_per_sample)
	pub gradients_and_hessians: &'a [f64],
	/// (n_samples)
	pub count_occurrences: &'a [usize],
	/// (n_samples)
	pub weights: &'a [f64],
}

impl<'a> Samples<'a> {
	pub fn slice(&self, range: Range<usize>) -> Samples<'a> {
		Samples {
			n_samples: range.len(),
			n_scores: self.n_scores,
			values_per_sample: self.values_per_sample,
			gradients_and_hessians: &self.gradients_and_hessians
				[range.start * self.values_per_sample..range.end * self.values_per_sample],
			count_occurrences: &self.count_occurrences[range.clone()],
			weights: &self.weights[range],
		}
	}
}

#[test]
fn test_n_scores() {
	assert_eq!(Task::Regression.n_scores(), 1);
	assert_eq!(Task::Classification { n_classes: 3 }.n_scores(), 3);
	assert_eq!(Task::Classification { n_classes: 12 }.n_scores(), 12);
	let binary = Task::Classification { n_classes: 2 }.n_scores();
	assert_eq!(binary, if EXPAND_BINARY_LOGITS { 2 } else { 1 });
	assert_eq!(Task::classification(1), Err(BinSumsError::TooFewClasses(1)));
	assert_eq!(Task::Classification { n_classes: 3 }.values_per_sample(), 6);
	assert_eq!(Task::Regression.values_per_sample(), 1);
}

#[test]
fn test_term() {
	let term = Term::new(vec![3, 1, 4]).unwrap();
	assert_eq!(term.n_tensor_bins(), 12);
	assert_eq!(term.n_dimensions(), 3);
	assert_eq!(term.n_real_dimensions(), 2);
	assert_eq!(term.bit_pack(), 16);
	assert_eq!(term.tensor_index(&[0, 0, 0]), 0);
	assert_eq!(term.tensor_index(&[2, 0, 0]), 2);
	assert_eq!(term.tensor_index(&[1, 0, 3]), 10);
	assert_eq!(Term::new(vec![3, 0]), Err(BinSumsError::EmptyDimension));
	assert_eq!(
		Term::new(vec![usize::MAX, 2]),
		Err(BinSumsError::TensorTooLarge)
	);
	assert_eq!(
		Term::with_bit_pack(vec![5], 32),
		Err(BinSumsError::BitPackTooNarrow {
			n_bins: 5,
			bits_per_item: 2
		})
	);
	assert_eq!(
		Term::with_bit_pack(vec![5], 0),
		Err(BinSumsError::InvalidBitPack(0))
	);
	assert_eq!(Term::with_bit_pack(vec![5], 11).unwrap().bit_pack(), 11);
}

#[test]
fn test_inner_bag() {
	let inner_bag = InnerBag::new(vec![2, 0, 1], vec![1.5, 0.0, 0.5]).unwrap();
	assert_eq!(inner_bag.weight_total(), 2.0);
	assert_eq!(
		InnerBag::new(vec![1, 1], vec![1.0]),
		Err(BinSumsError::LengthMismatch {
			expected: 2,
			actual: 1
		})
	);
	assert_eq!(
		InnerBag::new(vec![1], vec![-1.0]),
		Err(BinSumsError::InvalidWeight(-1.0))
	);
	let flat = InnerBag::flat(4, Some(&[1.0, 2.0, 3.0, 4.0])).unwrap();
	assert_eq!(flat.count_occurrences(), &[1, 1, 1, 1]);
	assert_eq!(flat.weight_total(), 10.0);
}

#[test]
fn test_bootstrap() {
	use rand::SeedableRng;
	let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(0);
	let sample_weights = vec![2.0; 100];
	let inner_bag = InnerBag::bootstrap(100, Some(&sample_weights), &mut rng).unwrap();
	assert_eq!(inner_bag.count_occurrences().iter().sum::<usize>(), 100);
	assert_eq!(inner_bag.weight_total(), 200.0);
	for (count, weight) in inner_bag.count_occurrences().iter().zip(inner_bag.weights()) {
		assert_eq!(*count as f64 * 2.0, *weight);
	}
}

#[test]
fn test_training_set_validation() {
	let terms = vec![Term::new(vec![4]).unwrap()];
	assert_eq!(
		TrainingSet::new(Task::Regression, &terms, 3, &[vec![0, 4, 1]]).unwrap_err(),
		BinSumsError::TensorIndexOutOfRange {
			term: 0,
			sample: 1,
			index: 4,
			n_tensor_bins: 4
		}
	);
	assert_eq!(
		TrainingSet::new(Task::Regression, &terms, 0, &[vec![]]).unwrap_err(),
		BinSumsError::NoSamples
	);
	let words = bit_pack::pack(&[3, 2, 1], terms[0].bit_pack()).unwrap();
	let training_set = TrainingSet::from_packed(Task::Regression, &terms, 3, vec![words]).unwrap();
	assert_eq!(training_set.gradients_and_hessians().len(), 3);
	let mut training_set = training_set;
	assert!(training_set.set_gradients_and_hessians(vec![0.0; 2]).is_err());
	let other_terms = vec![Term::with_bit_pack(vec![4], 8).unwrap()];
	assert_eq!(
		BoostingContext::new(other_terms, training_set, Default::default()).unwrap_err(),
		BinSumsError::TermMismatch(0)
	);
}

#[test]
fn test_context_only_updates_gradients() {
	let terms = vec![Term::with_bit_pack(vec![4], 8).unwrap()];
	let training_set = TrainingSet::new(Task::Regression, &terms, 8, &[vec![3; 8]]).unwrap();
	let mut context = BoostingContext::new(terms, training_set, Default::default()).unwrap();
	let packed = context.training_set().packed(0).to_owned();
	context.set_gradients_and_hessians(vec![0.5; 8]).unwrap();
	context.gradients_and_hessians_mut()[7] = -1.0;
	assert_eq!(context.training_set().gradients_and_hessians()[7], -1.0);
	assert_eq!(
		context.set_gradients_and_hessians(vec![0.5; 9]),
		Err(BinSumsError::LengthMismatch {
			expected: 8,
			actual: 9
		})
	);
	assert_eq!(context.training_set().packed(0), packed.as_slice());
	// A training set packed for a wider tensor can only be paired with the terms it was built for.
	let wide_terms = vec![Term::with_bit_pack(vec![256], 8).unwrap()];
	let wide_training_set =
		TrainingSet::new(Task::Regression, &wide_terms, 8, &[vec![255; 8]]).unwrap();
	assert_eq!(
		BoostingContext::new(context.terms().to_owned(), wide_training_set, Default::default())
			.unwrap_err(),
		BinSumsError::TermMismatch(0)
	);
}

#[test]
fn test_merge() {
	let mut a = BinBuffer::new(2, 2);
	let mut b = BinBuffer::new(2, 2);
	{
		let (totals, gradient_pairs) = a.parts_mut();
		totals[1].count_samples = 2;
		totals[1].weight = 1.5;
		gradient_pairs[3].sum_gradients = 0.25;
	}
	{
		let (totals, gradient_pairs) = b.parts_mut();
		totals[1].count_samples = 1;
		totals[1].weight = 0.5;
		gradient_pairs[3].sum_gradients = 0.5;
		gradient_pairs[3].sum_hessians = 1.0;
	}
	a.merge(&b);
	let bin = a.bin(1);
	assert_eq!(bin.count_samples, 3);
	assert_eq!(bin.weight, 2.0);
	assert_eq!(
		bin.gradient_pairs[1],
		GradientPair {
			sum_gradients: 0.75,
			sum_hessians: 1.0
		}
	);
	a.reset();
	assert_eq!(a, BinBuffer::new(2, 2));
}
