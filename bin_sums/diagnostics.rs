/*!
Cross checks that catch a broken caller in debug builds. None of them run in release builds, and none of them change what `bin_sums` computes.
*/

#[cfg(debug_assertions)]
use crate::types::BinBuffer;
use crate::types::{InnerBag, Task, TrainingSet, EXPAND_BINARY_LOGITS};

/// The weight one pass accumulates into the bins may differ from the inner bag's `weight_total` by this fraction, since the two are summed in different orders.
pub const WEIGHT_TOTAL_TOLERANCE: f64 = 0.001;

/// Check that `accumulated_weight`, the weight one complete pass added to the bins, agrees with the inner bag's `weight_total`.
pub fn weight_total_agrees(accumulated_weight: f64, weight_total: f64) -> bool {
	accumulated_weight * (1.0 - WEIGHT_TOTAL_TOLERANCE) <= weight_total
		&& weight_total <= accumulated_weight * (1.0 + WEIGHT_TOTAL_TOLERANCE)
}

/// Losses with one score per class produce gradients that sum to zero across the scores of each sample. Binary classification with a single logit and regression do not.
pub fn has_centered_gradients(task: Task) -> bool {
	match task {
		Task::Regression => false,
		Task::Classification { n_classes } => n_classes != 2 || EXPAND_BINARY_LOGITS,
	}
}

/// Return the samples whose gradients, summed across scores, are further than `epsilon` from zero. Samples whose sum is NaN are skipped, for passes with and without a term alike.
pub fn centered_gradient_violations(training_set: &TrainingSet, epsilon: f64) -> Vec<usize> {
	if !has_centered_gradients(training_set.task()) {
		return Vec::new();
	}
	let task = training_set.task();
	let values_per_score = task.values_per_score();
	training_set
		.gradients_and_hessians()
		.chunks(task.values_per_sample())
		.enumerate()
		.filter_map(|(sample_index, values)| {
			let sum_gradients: f64 = values.iter().step_by(values_per_score).sum();
			if sum_gradients.is_nan() || sum_gradients.abs() < epsilon {
				None
			} else {
				Some(sample_index)
			}
		})
		.collect()
}

/// Run the checks on the inputs of a pass. The centered gradient check depends on the loss, so a mismatch is only logged.
#[cfg(debug_assertions)]
pub(crate) fn check_inputs(
	training_set: &TrainingSet,
	inner_bag: &InnerBag,
	centered_gradient_epsilon: Option<f64>,
) {
	debug_assert!(
		0.0 < inner_bag.weight_total(),
		"the inner bag must carry some weight",
	);
	if let Some(epsilon) = centered_gradient_epsilon {
		let violations = centered_gradient_violations(training_set, epsilon);
		if !violations.is_empty() {
			log::warn!(
				"{} samples have gradients that do not sum to zero, the first is sample {}",
				violations.len(),
				violations[0],
			);
		}
	}
}

/// Check the weight a complete pass added to `bins`, given the total weight the bins held before it. The weight total is a contract of the inner bag, so a mismatch halts.
#[cfg(debug_assertions)]
pub(crate) fn check_accumulated_weight(
	bins: &BinBuffer,
	weight_before: f64,
	inner_bag: &InnerBag,
) {
	let accumulated_weight = bins.total_weight() - weight_before;
	debug_assert!(
		weight_total_agrees(accumulated_weight, inner_bag.weight_total()),
		"the pass accumulated weight {} but the inner bag's weight total is {}",
		accumulated_weight,
		inner_bag.weight_total(),
	);
}

#[cfg(test)]
use crate::types::Term;

#[test]
fn test_weight_total_agrees() {
	assert!(weight_total_agrees(1000.0, 1000.0));
	assert!(weight_total_agrees(1000.0, 1000.9));
	assert!(weight_total_agrees(1000.0, 999.1));
	assert!(!weight_total_agrees(1000.0, 1001.5));
	assert!(!weight_total_agrees(1000.0, 998.5));
	assert!(!weight_total_agrees(0.0, 3.0));
	assert!(!weight_total_agrees(2.0, 4.0));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "the pass accumulated weight")]
fn test_check_accumulated_weight_halts_on_mismatch() {
	let inner_bag = InnerBag::new(vec![1, 1], vec![1.0, 2.0]).unwrap();
	// A buffer that was never filled accumulated none of the bag's weight.
	let bins = BinBuffer::new(4, 1);
	check_accumulated_weight(&bins, 0.0, &inner_bag);
}

#[test]
fn test_has_centered_gradients() {
	assert!(!has_centered_gradients(Task::Regression));
	assert!(has_centered_gradients(Task::Classification { n_classes: 3 }));
	assert_eq!(
		has_centered_gradients(Task::Classification { n_classes: 2 }),
		EXPAND_BINARY_LOGITS
	);
}

#[test]
fn test_centered_gradient_violations() {
	let task = Task::Classification { n_classes: 3 };
	let terms = vec![Term::new(vec![2]).unwrap()];
	let mut training_set = TrainingSet::new(task, &terms, 3, &[vec![0, 1, 0]]).unwrap();
	training_set
		.set_gradients_and_hessians(vec![
			// Centered, the hessians are ignored.
			0.5, 9.0, -0.25, 9.0, -0.25, 9.0, //
			// Not centered.
			0.5, 0.1, 0.5, 0.1, 0.5, 0.1, //
			// NaN is skipped.
			f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0,
		])
		.unwrap();
	assert_eq!(centered_gradient_violations(&training_set, 1e-6), vec![1]);
	let regression = TrainingSet::new(Task::Regression, &terms, 3, &[vec![0, 1, 0]]).unwrap();
	assert!(centered_gradient_violations(&regression, 1e-6).is_empty());
}
