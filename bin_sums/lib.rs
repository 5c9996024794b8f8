/*!
This crate computes the bin sums that split finding in gradient boosting consumes. For one term and one inner bag, `bin_sums` visits every sample in the training set, decodes the tensor bin the sample falls into from the term's bit packed indices, and adds the sample's count, weight, and weighted gradients and hessians to that bin.

This is the hottest loop in training. It runs once per sample, per term, per inner bag, per round. The kernels are therefore compiled for a bounded set of score counts and bit packs, and `bin_sums` chooses an instance once per call. See the `dispatch` module.

```
use tangram_bin_sums::{bin_sums, BinSumsOptions, BoostingContext, InnerBag, Task, Term, TrainingSet};

let terms = vec![Term::new(vec![4]).unwrap()];
let mut training_set =
	TrainingSet::new(Task::Regression, &terms, 5, &[vec![0, 1, 3, 1, 2]]).unwrap();
training_set
	.set_gradients_and_hessians(vec![0.1, -0.2, 0.3, -0.1, 0.05])
	.unwrap();
let context = BoostingContext::new(terms, training_set, BinSumsOptions::default()).unwrap();
let inner_bag = InnerBag::flat(5, None).unwrap();
let mut bins = context.new_bin_buffer(Some(0));
bin_sums(&context, &mut bins, Some(0), &inner_bag);
assert_eq!(bins.bin(1).count_samples, 2);
```
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod bit_pack;
mod bit_packed;
pub mod diagnostics;
pub mod dispatch;
mod options;
mod parallel;
#[cfg(test)]
mod testing;
#[cfg(feature = "timing")]
pub mod timing;
mod types;
mod zero_dimensions;

pub use options::{BinSumsOptions, VECTOR_INSTRUCTIONS_AVAILABLE};
pub use parallel::bin_sums_parallel;
pub use types::{
	n_scores_for_classes, Bin, BinBuffer, BinSumsError, BoostingContext, GradientPair, InnerBag,
	Task, Term, TrainingSet, DYNAMIC, EXPAND_BINARY_LOGITS, MAX_COMPILER_CLASSES,
};

/// Add every sample in `inner_bag` to `bins`. With `term_index` set to `None`, every sample goes to bin 0. Otherwise each sample goes to the tensor bin the term's packed indices assign it.
///
/// `bins` is not cleared first, so several calls can accumulate into the same buffer. It must have the task's number of scores and at least as many bins as the term's tensor.
pub fn bin_sums(
	context: &BoostingContext,
	bins: &mut BinBuffer,
	term_index: Option<usize>,
	inner_bag: &InnerBag,
) {
	log::trace!("entered bin_sums");
	let training_set = context.training_set();
	let task = context.task();
	let samples = training_set.samples(inner_bag);
	assert_eq!(
		bins.n_scores(),
		task.n_scores(),
		"the bin buffer must have one gradient pair per score",
	);
	#[cfg(debug_assertions)]
	diagnostics::check_inputs(
		training_set,
		inner_bag,
		context.options().centered_gradient_epsilon,
	);
	#[cfg(debug_assertions)]
	let weight_before = bins.total_weight();
	match term_index {
		None => {
			assert!(bins.n_bins() >= 1);
			let specialization = dispatch::select_zero_dimensions(task);
			#[cfg(feature = "timing")]
			let start = std::time::Instant::now();
			// This is safe because the training set and the inner bag both hold n_samples samples and the buffer has at least one bin with the task's scores.
			unsafe { (specialization.f)(bins, samples) };
			#[cfg(feature = "timing")]
			timing::TIMING.bin_sums_zero_dimensions.inc(start.elapsed());
		}
		Some(term_index) => {
			let term = &context.terms()[term_index];
			assert!(
				bins.n_bins() >= term.n_tensor_bins(),
				"the bin buffer is smaller than the term's tensor",
			);
			let specialization = dispatch::select_bit_packed(
				task,
				term.bit_pack(),
				context.options().use_bit_pack_specializations,
			);
			#[cfg(feature = "timing")]
			let start = std::time::Instant::now();
			// This is safe because the training set checked every packed index against this term's tensor when it was built.
			unsafe {
				(specialization.f)(
					bins,
					training_set.packed(term_index),
					samples,
					term.bit_pack(),
				)
			};
			#[cfg(feature = "timing")]
			timing::TIMING.bin_sums_bit_packed.inc(start.elapsed());
		}
	}
	#[cfg(debug_assertions)]
	diagnostics::check_accumulated_weight(bins, weight_before, inner_bag);
	log::trace!("exited bin_sums");
}

#[cfg(test)]
use testing::{assert_bins_close, assert_close};

#[test]
fn test_sums_match_inner_bag() {
	for task in testing::tasks() {
		for use_bit_pack_specializations in &[false, true] {
			let (context, inner_bag) = testing::random_context(
				task,
				777,
				vec![vec![2], vec![16], vec![5, 7], vec![1000]],
				*use_bit_pack_specializations,
				3,
			);
			let training_set = context.training_set();
			let values_per_score = task.values_per_score();
			let values_per_sample = task.values_per_sample();
			let term_indices = std::iter::once(None).chain((0..context.terms().len()).map(Some));
			for term_index in term_indices {
				let mut bins = context.new_bin_buffer(term_index);
				bin_sums(&context, &mut bins, term_index, &inner_bag);
				assert_eq!(
					bins.total_count_samples(),
					inner_bag.count_occurrences().iter().sum::<usize>()
				);
				assert_close(bins.total_weight(), inner_bag.weight_total());
				for (score_index, total) in bins.total_gradient_pairs().iter().enumerate() {
					let mut sum_gradients = 0.0;
					let mut sum_hessians = 0.0;
					for (values, weight) in training_set
						.gradients_and_hessians()
						.chunks(values_per_sample)
						.zip(inner_bag.weights())
					{
						sum_gradients += values[score_index * values_per_score] * weight;
						if task.is_classification() {
							sum_hessians += values[score_index * values_per_score + 1] * weight;
						}
					}
					assert_close(total.sum_gradients, sum_gradients);
					assert_close(total.sum_hessians, sum_hessians);
				}
			}
		}
	}
}

#[test]
fn test_zero_dimensions_matches_single_cell_term() {
	for task in testing::tasks() {
		let (context, inner_bag) =
			testing::random_context(task, 333, vec![vec![1], vec![1, 1]], true, 5);
		let mut zero_dimensions = context.new_bin_buffer(None);
		bin_sums(&context, &mut zero_dimensions, None, &inner_bag);
		for term_index in 0..2 {
			let mut single_cell = context.new_bin_buffer(Some(term_index));
			bin_sums(&context, &mut single_cell, Some(term_index), &inner_bag);
			assert_eq!(zero_dimensions, single_cell);
		}
	}
}

#[test]
fn test_every_bit_pack_matches_dynamic() {
	let items_per_word = bit_pack::ITEMS_PER_WORD.iter().copied().chain(vec![11, 17]);
	for items_per_word in items_per_word {
		let bits_per_item = bit_pack::bits_per_item(items_per_word);
		let n_bins = if bits_per_item >= 6 { 50 } else { 1 << bits_per_item };
		for task in testing::tasks() {
			let contexts: Vec<_> = [false, true]
				.iter()
				.map(|use_bit_pack_specializations| {
					let terms = vec![Term::with_bit_pack(vec![n_bins], items_per_word).unwrap()];
					testing::random_context_with_terms(
						task,
						250,
						terms,
						*use_bit_pack_specializations,
						items_per_word as u64,
					)
				})
				.collect();
			let buffers: Vec<_> = contexts
				.iter()
				.map(|(context, inner_bag)| {
					let mut bins = context.new_bin_buffer(Some(0));
					bin_sums(context, &mut bins, Some(0), inner_bag);
					bins
				})
				.collect();
			assert_eq!(buffers[0], buffers[1]);
			assert_eq!(
				buffers[0].total_count_samples(),
				contexts[0].1.count_occurrences().iter().sum::<usize>()
			);
		}
	}
}

#[test]
fn test_five_samples_four_per_word() {
	for use_bit_pack_specializations in &[false, true] {
		let terms = vec![Term::with_bit_pack(vec![4], 4).unwrap()];
		let mut training_set =
			TrainingSet::new(Task::Regression, &terms, 5, &[vec![0, 1, 3, 1, 2]]).unwrap();
		training_set
			.set_gradients_and_hessians(vec![0.1, -0.2, 0.3, -0.1, 0.05])
			.unwrap();
		let options = BinSumsOptions {
			use_bit_pack_specializations: *use_bit_pack_specializations,
			..Default::default()
		};
		let context = BoostingContext::new(terms, training_set, options).unwrap();
		let inner_bag = InnerBag::flat(5, None).unwrap();
		let mut bins = context.new_bin_buffer(Some(0));
		bin_sums(&context, &mut bins, Some(0), &inner_bag);
		let expected = [(1, 0.1), (2, -0.3), (1, 0.05), (1, 0.3)];
		for (bin, (count_samples, sum_gradients)) in bins.bins().zip(expected.iter()) {
			assert_eq!(bin.count_samples, *count_samples);
			assert_eq!(bin.weight, *count_samples as f64);
			assert_close(bin.gradient_pairs[0].sum_gradients, *sum_gradients);
		}
	}
}

#[test]
fn test_three_classes_same_bin() {
	let task = Task::Classification { n_classes: 3 };
	let terms = vec![Term::new(vec![3]).unwrap()];
	let mut training_set = TrainingSet::new(task, &terms, 2, &[vec![2, 2]]).unwrap();
	training_set
		.set_gradients_and_hessians(vec![
			0.5, 0.25, -0.25, 0.1875, -0.25, 0.1875, //
			-0.5, 0.25, 0.75, 0.1875, -0.25, 0.1875,
		])
		.unwrap();
	let context = BoostingContext::new(terms, training_set, BinSumsOptions::default()).unwrap();
	let inner_bag = InnerBag::new(vec![1, 2], vec![1.0, 2.0]).unwrap();
	let mut bins = context.new_bin_buffer(Some(0));
	bin_sums(&context, &mut bins, Some(0), &inner_bag);
	insta::assert_debug_snapshot!(bins.bin(2), @r###"
 Bin {
     count_samples: 3,
     weight: 3.0,
     gradient_pairs: [
         GradientPair {
             sum_gradients: -0.5,
             sum_hessians: 0.75,
         },
         GradientPair {
             sum_gradients: 1.25,
             sum_hessians: 0.5625,
         },
         GradientPair {
             sum_gradients: -0.75,
             sum_hessians: 0.5625,
         },
     ],
 }
 "###);
	assert_eq!(bins.bin(0).count_samples, 0);
}

#[test]
fn test_accumulates_until_reset() {
	let (context, inner_bag) =
		testing::random_context(Task::Classification { n_classes: 4 }, 100, vec![vec![10]], true, 9);
	let mut once = context.new_bin_buffer(Some(0));
	bin_sums(&context, &mut once, Some(0), &inner_bag);
	let mut twice = context.new_bin_buffer(Some(0));
	bin_sums(&context, &mut twice, Some(0), &inner_bag);
	bin_sums(&context, &mut twice, Some(0), &inner_bag);
	assert_eq!(twice.total_count_samples(), 2 * once.total_count_samples());
	let mut doubled = once.clone();
	doubled.merge(&once);
	assert_bins_close(&twice, &doubled);
	twice.reset();
	bin_sums(&context, &mut twice, Some(0), &inner_bag);
	assert_eq!(twice, once);
}
