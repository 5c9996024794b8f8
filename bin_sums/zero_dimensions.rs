use crate::types::{BinBuffer, BinTotals, GradientPair, Samples, DYNAMIC};

/// Accumulate every sample into bin 0. This is the pass used when there is no term to split on.
///
/// `N_SCORES` is either the score count fixed at compile time or `DYNAMIC`, in which case it is read from `samples`.
///
/// # Safety
///
/// `samples` must hold `n_samples > 0` samples with `values_per_sample` values each, and `bins` must hold at least one bin with `samples.n_scores` scores.
pub unsafe fn bin_sums_zero_dimensions<const CLASSIFICATION: bool, const N_SCORES: usize>(
	bins: &mut BinBuffer,
	samples: Samples<'_>,
) {
	log::trace!("entered bin_sums_zero_dimensions");
	let n_scores = if N_SCORES == DYNAMIC {
		samples.n_scores
	} else {
		N_SCORES
	};
	debug_assert_eq!(n_scores, samples.n_scores);
	debug_assert_eq!(n_scores, bins.n_scores());
	debug_assert!(samples.n_samples > 0);
	debug_assert!(bins.n_bins() > 0);
	let values_per_sample = if CLASSIFICATION { 2 * n_scores } else { n_scores };
	debug_assert_eq!(values_per_sample, samples.values_per_sample);
	debug_assert_eq!(
		samples.gradients_and_hessians.len(),
		samples.n_samples * values_per_sample
	);
	let (totals, gradient_pairs) = bins.parts_mut();
	let totals = totals.get_unchecked_mut(0);
	let gradient_pairs = gradient_pairs.get_unchecked_mut(..n_scores);
	for sample_index in 0..samples.n_samples {
		let offset = sample_index * values_per_sample;
		accumulate_sample::<CLASSIFICATION>(
			totals,
			gradient_pairs,
			samples
				.gradients_and_hessians
				.get_unchecked(offset..offset + values_per_sample),
			*samples.count_occurrences.get_unchecked(sample_index),
			*samples.weights.get_unchecked(sample_index),
			n_scores,
		);
	}
	log::trace!("exited bin_sums_zero_dimensions");
}

/// Add one sample to one bin. When `n_scores` is a constant at the call site, the score loop is unrolled completely.
///
/// # Safety
///
/// `gradient_pairs` must hold `n_scores` pairs and `gradients_and_hessians` must hold the sample's `n_scores` gradients, each followed by its hessian if `CLASSIFICATION`.
#[inline(always)]
pub(crate) unsafe fn accumulate_sample<const CLASSIFICATION: bool>(
	totals: &mut BinTotals,
	gradient_pairs: &mut [GradientPair],
	gradients_and_hessians: &[f64],
	count_occurrences: usize,
	weight: f64,
	n_scores: usize,
) {
	totals.count_samples += count_occurrences;
	totals.weight += weight;
	// Samples that were not drawn still run through here with zero weight.
	for score_index in 0..n_scores {
		let gradient_pair = gradient_pairs.get_unchecked_mut(score_index);
		if CLASSIFICATION {
			let gradient = *gradients_and_hessians.get_unchecked(2 * score_index);
			let hessian = *gradients_and_hessians.get_unchecked(2 * score_index + 1);
			gradient_pair.sum_gradients += gradient * weight;
			gradient_pair.sum_hessians += hessian * weight;
		} else {
			let gradient = *gradients_and_hessians.get_unchecked(score_index);
			gradient_pair.sum_gradients += gradient * weight;
		}
	}
}

#[cfg(test)]
fn samples_for_test<'a>(
	n_scores: usize,
	values_per_sample: usize,
	gradients_and_hessians: &'a [f64],
	count_occurrences: &'a [usize],
	weights: &'a [f64],
) -> Samples<'a> {
	Samples {
		n_samples: weights.len(),
		n_scores,
		values_per_sample,
		gradients_and_hessians,
		count_occurrences,
		weights,
	}
}

#[test]
fn test_regression() {
	let gradients = [0.5, -0.25, 1.0];
	let samples = samples_for_test(1, 1, &gradients, &[1, 2, 0], &[1.0, 2.0, 0.0]);
	let mut bins = BinBuffer::new(1, 1);
	unsafe { bin_sums_zero_dimensions::<false, 1>(&mut bins, samples) };
	insta::assert_debug_snapshot!(bins.bin(0), @r###"
 Bin {
     count_samples: 3,
     weight: 3.0,
     gradient_pairs: [
         GradientPair {
             sum_gradients: 0.0,
             sum_hessians: 0.0,
         },
     ],
 }
 "###);
}

#[test]
fn test_classification_reads_interleaved_hessians() {
	// Three scores per sample, each gradient immediately followed by its hessian.
	let gradients_and_hessians = [
		0.25, 1.0, -0.5, 2.0, 0.25, 4.0, //
		0.5, 8.0, 0.0, 16.0, -0.5, 32.0,
	];
	let samples = samples_for_test(3, 6, &gradients_and_hessians, &[1, 1], &[1.0, 0.5]);
	let mut fixed = BinBuffer::new(1, 3);
	unsafe { bin_sums_zero_dimensions::<true, 3>(&mut fixed, samples) };
	let mut dynamic = BinBuffer::new(1, 3);
	unsafe { bin_sums_zero_dimensions::<true, { DYNAMIC }>(&mut dynamic, samples) };
	assert_eq!(fixed, dynamic);
	let bin = fixed.bin(0);
	assert_eq!(bin.count_samples, 2);
	assert_eq!(bin.weight, 1.5);
	assert_eq!(
		bin.gradient_pairs,
		&[
			GradientPair {
				sum_gradients: 0.5,
				sum_hessians: 5.0,
			},
			GradientPair {
				sum_gradients: -0.5,
				sum_hessians: 10.0,
			},
			GradientPair {
				sum_gradients: 0.0,
				sum_hessians: 20.0,
			},
		]
	);
}

#[test]
fn test_accumulates_on_top_of_previous_calls() {
	let gradients = [1.0, 2.0];
	let samples = samples_for_test(1, 1, &gradients, &[1, 1], &[1.0, 1.0]);
	let mut bins = BinBuffer::new(1, 1);
	unsafe {
		bin_sums_zero_dimensions::<false, 1>(&mut bins, samples);
		bin_sums_zero_dimensions::<false, 1>(&mut bins, samples);
	}
	assert_eq!(bins.total_count_samples(), 4);
	assert_eq!(bins.total_gradient_pairs()[0].sum_gradients, 6.0);
}
