use crate::{BinBuffer, BinSumsOptions, BoostingContext, InnerBag, Task, Term, TrainingSet};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Tasks that cover regression, binary classification, a fixed multiclass instance, the largest fixed instance, and the dynamic one.
pub fn tasks() -> Vec<Task> {
	vec![
		Task::Regression,
		Task::Classification { n_classes: 2 },
		Task::Classification { n_classes: 3 },
		Task::Classification { n_classes: 8 },
		Task::Classification { n_classes: 9 },
		Task::Classification { n_classes: 12 },
	]
}

pub fn random_context(
	task: Task,
	n_samples: usize,
	term_bin_counts: Vec<Vec<usize>>,
	use_bit_pack_specializations: bool,
	seed: u64,
) -> (BoostingContext, InnerBag) {
	let terms = term_bin_counts
		.into_iter()
		.map(|bin_counts| Term::new(bin_counts).unwrap())
		.collect();
	random_context_with_terms(task, n_samples, terms, use_bit_pack_specializations, seed)
}

/// Build a context with uniformly random tensor indices, gradients in [-1, 1), hessians in [0, 1), and a bootstrapped inner bag. The same seed always produces the same data.
pub fn random_context_with_terms(
	task: Task,
	n_samples: usize,
	terms: Vec<Term>,
	use_bit_pack_specializations: bool,
	seed: u64,
) -> (BoostingContext, InnerBag) {
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let tensor_bin_indices: Vec<Vec<usize>> = terms
		.iter()
		.map(|term| {
			(0..n_samples)
				.map(|_| rng.gen_range(0, term.n_tensor_bins()))
				.collect()
		})
		.collect();
	let mut training_set = TrainingSet::new(task, &terms, n_samples, &tensor_bin_indices).unwrap();
	let values_per_score = task.values_per_score();
	let gradients_and_hessians = (0..training_set.gradients_and_hessians().len())
		.map(|index| {
			let value: f64 = if index % values_per_score == 1 {
				rng.gen_range(0.0, 1.0)
			} else {
				rng.gen_range(-1.0, 1.0)
			};
			value
		})
		.collect();
	training_set
		.set_gradients_and_hessians(gradients_and_hessians)
		.unwrap();
	let sample_weights: Vec<f64> = (0..n_samples).map(|_| rng.gen_range(0.5, 2.0)).collect();
	let inner_bag = InnerBag::bootstrap(n_samples, Some(&sample_weights), &mut rng).unwrap();
	let options = BinSumsOptions {
		use_bit_pack_specializations,
		centered_gradient_epsilon: None,
	};
	let context = BoostingContext::new(terms, training_set, options).unwrap();
	(context, inner_bag)
}

pub fn assert_close(a: f64, b: f64) {
	let tolerance = 1e-9 * (1.0 + a.abs().max(b.abs()));
	assert!((a - b).abs() <= tolerance, "{} != {}", a, b);
}

pub fn assert_bins_close(a: &BinBuffer, b: &BinBuffer) {
	assert_eq!(a.n_bins(), b.n_bins());
	assert_eq!(a.n_scores(), b.n_scores());
	for (a, b) in a.bins().zip(b.bins()) {
		assert_eq!(a.count_samples, b.count_samples);
		assert_close(a.weight, b.weight);
		for (a, b) in a.gradient_pairs.iter().zip(b.gradient_pairs.iter()) {
			assert_close(a.sum_gradients, b.sum_gradients);
			assert_close(a.sum_hessians, b.sum_hessians);
		}
	}
}
