use crate::{
	bit_pack,
	types::{BinBuffer, Samples, DYNAMIC},
	zero_dimensions::accumulate_sample,
};

/// Accumulate every sample into the bin its packed tensor index points to.
///
/// `N_SCORES` and `ITEMS_PER_WORD` are either fixed at compile time or `DYNAMIC`, in which case they are read from `samples.n_scores` and `items_per_word`. With a fixed `ITEMS_PER_WORD`, the loop over the fields of a full word is unrolled.
///
/// # Safety
///
/// `samples` must hold `n_samples > 0` samples with `values_per_sample` values each. `packed` must hold at least `n_words(n_samples, items_per_word)` words, and the first `n_samples` fields must each be less than `bins.n_bins()`. `bins` must have `samples.n_scores` scores.
pub unsafe fn bin_sums_bit_packed<
	const CLASSIFICATION: bool,
	const N_SCORES: usize,
	const ITEMS_PER_WORD: usize,
>(
	bins: &mut BinBuffer,
	packed: &[u64],
	samples: Samples<'_>,
	items_per_word: usize,
) {
	log::trace!("entered bin_sums_bit_packed");
	let n_scores = if N_SCORES == DYNAMIC {
		samples.n_scores
	} else {
		N_SCORES
	};
	let items_per_word = if ITEMS_PER_WORD == DYNAMIC {
		items_per_word
	} else {
		ITEMS_PER_WORD
	};
	debug_assert_eq!(n_scores, samples.n_scores);
	debug_assert_eq!(n_scores, bins.n_scores());
	debug_assert!(1 <= items_per_word && items_per_word <= bit_pack::BITS_PER_WORD);
	debug_assert!(samples.n_samples > 0);
	debug_assert!(packed.len() >= bit_pack::n_words(samples.n_samples, items_per_word));
	let bits_per_item = bit_pack::bits_per_item(items_per_word);
	let mask = bit_pack::mask(bits_per_item);
	let values_per_sample = if CLASSIFICATION { 2 * n_scores } else { n_scores };
	debug_assert_eq!(values_per_sample, samples.values_per_sample);
	debug_assert_eq!(
		samples.gradients_and_hessians.len(),
		samples.n_samples * values_per_sample
	);
	let n_bins = bins.n_bins();
	let (totals, gradient_pairs) = bins.parts_mut();
	let mut accumulate = |word: u64, field: usize, sample_index: usize| {
		let tensor_bin = bit_pack::unpack_field(word, field, bits_per_item, mask);
		debug_assert!(tensor_bin < n_bins);
		let offset = sample_index * values_per_sample;
		accumulate_sample::<CLASSIFICATION>(
			totals.get_unchecked_mut(tensor_bin),
			gradient_pairs
				.get_unchecked_mut(tensor_bin * n_scores..(tensor_bin + 1) * n_scores),
			samples
				.gradients_and_hessians
				.get_unchecked(offset..offset + values_per_sample),
			*samples.count_occurrences.get_unchecked(sample_index),
			*samples.weights.get_unchecked(sample_index),
			n_scores,
		);
	};

	// Every word but the last is full. The last word's loop is bounded by the samples that remain, so nothing past the end of the gradients is read.
	let n_samples = samples.n_samples;
	let n_items_in_last_word = (n_samples - 1) % items_per_word + 1;
	let n_full_words = (n_samples - n_items_in_last_word) / items_per_word;
	let mut sample_index = 0;
	for word_index in 0..n_full_words {
		let word = *packed.get_unchecked(word_index);
		for field in 0..items_per_word {
			accumulate(word, field, sample_index + field);
		}
		sample_index += items_per_word;
	}
	log::trace!(
		"handling the last word of bin_sums_bit_packed with {} items",
		n_items_in_last_word
	);
	let word = *packed.get_unchecked(n_full_words);
	for field in 0..n_items_in_last_word {
		accumulate(word, field, sample_index + field);
	}
	debug_assert_eq!(sample_index + n_items_in_last_word, n_samples);
	log::trace!("exited bin_sums_bit_packed");
}

#[cfg(test)]
use crate::types::GradientPair;

#[cfg(test)]
fn regression_samples<'a>(
	gradients: &'a [f64],
	count_occurrences: &'a [usize],
	weights: &'a [f64],
) -> Samples<'a> {
	Samples {
		n_samples: gradients.len(),
		n_scores: 1,
		values_per_sample: 1,
		gradients_and_hessians: gradients,
		count_occurrences,
		weights,
	}
}

#[test]
fn test_five_samples_four_per_word() {
	let packed = bit_pack::pack(&[0, 1, 3, 1, 2], 4).unwrap();
	let gradients = [0.1, -0.2, 0.3, -0.1, 0.05];
	let samples = regression_samples(&gradients, &[1; 5], &[1.0; 5]);
	let mut bins = BinBuffer::new(4, 1);
	unsafe { bin_sums_bit_packed::<false, 1, 4>(&mut bins, &packed, samples, 4) };
	insta::assert_debug_snapshot!(bins.bins().collect::<Vec<_>>(), @r###"
 [
     Bin {
         count_samples: 1,
         weight: 1.0,
         gradient_pairs: [
             GradientPair {
                 sum_gradients: 0.1,
                 sum_hessians: 0.0,
             },
         ],
     },
     Bin {
         count_samples: 2,
         weight: 2.0,
         gradient_pairs: [
             GradientPair {
                 sum_gradients: -0.30000000000000004,
                 sum_hessians: 0.0,
             },
         ],
     },
     Bin {
         count_samples: 1,
         weight: 1.0,
         gradient_pairs: [
             GradientPair {
                 sum_gradients: 0.05,
                 sum_hessians: 0.0,
             },
         ],
     },
     Bin {
         count_samples: 1,
         weight: 1.0,
         gradient_pairs: [
             GradientPair {
                 sum_gradients: 0.3,
                 sum_hessians: 0.0,
             },
         ],
     },
 ]
 "###);
}

#[test]
fn test_unused_fields_in_last_word_are_not_read() {
	// Fill the unused fields of the last word with indices that are out of range for the buffer. Only the first field of the second word belongs to a sample.
	let mut packed = bit_pack::pack(&[0, 1, 1, 0, 1], 4).unwrap();
	packed[1] |= 0xffff_ffff_ffff_0000;
	let gradients = [1.0, 2.0, 4.0, 8.0, 16.0];
	let samples = regression_samples(&gradients, &[1; 5], &[1.0; 5]);
	let mut fixed = BinBuffer::new(2, 1);
	unsafe { bin_sums_bit_packed::<false, 1, 4>(&mut fixed, &packed, samples, 4) };
	let mut dynamic = BinBuffer::new(2, 1);
	unsafe { bin_sums_bit_packed::<false, 1, { DYNAMIC }>(&mut dynamic, &packed, samples, 4) };
	assert_eq!(fixed, dynamic);
	assert_eq!(fixed.bin(0).count_samples, 2);
	assert_eq!(fixed.bin(0).gradient_pairs[0].sum_gradients, 9.0);
	assert_eq!(fixed.bin(1).count_samples, 3);
	assert_eq!(fixed.bin(1).gradient_pairs[0].sum_gradients, 22.0);
}

#[test]
fn test_fewer_samples_than_items_per_word() {
	let packed = bit_pack::pack(&[2, 0, 2], 32).unwrap();
	let gradients = [0.5, 0.25, 0.125];
	let samples = regression_samples(&gradients, &[1, 3, 1], &[1.0, 3.0, 1.0]);
	let mut bins = BinBuffer::new(3, 1);
	unsafe { bin_sums_bit_packed::<false, 1, 32>(&mut bins, &packed, samples, 32) };
	assert_eq!(bins.bin(0).count_samples, 3);
	assert_eq!(bins.bin(0).weight, 3.0);
	assert_eq!(bins.bin(0).gradient_pairs[0].sum_gradients, 0.75);
	assert_eq!(bins.bin(1).count_samples, 0);
	assert_eq!(bins.bin(2).gradient_pairs[0].sum_gradients, 0.625);
}

#[test]
fn test_classification_hessians_follow_gradients() {
	// Three classes, two samples in bin 1. If the hessians were read from the gradient stream, sum_hessians would repeat the gradients.
	let packed = bit_pack::pack(&[1, 1], 8).unwrap();
	let gradients_and_hessians = [
		0.1, 0.5, 0.2, 0.25, -0.3, 0.125, //
		-0.1, 1.0, 0.4, 2.0, -0.3, 4.0,
	];
	let samples = Samples {
		n_samples: 2,
		n_scores: 3,
		values_per_sample: 6,
		gradients_and_hessians: &gradients_and_hessians,
		count_occurrences: &[1, 1],
		weights: &[1.0, 1.0],
	};
	let mut bins = BinBuffer::new(2, 3);
	unsafe { bin_sums_bit_packed::<true, 3, 8>(&mut bins, &packed, samples, 8) };
	let bin = bins.bin(1);
	assert_eq!(bin.count_samples, 2);
	let sum_hessians: Vec<f64> = bin.gradient_pairs.iter().map(|p| p.sum_hessians).collect();
	assert_eq!(sum_hessians, vec![1.5, 2.25, 4.125]);
	assert_eq!(bin.gradient_pairs[2].sum_gradients, -0.6);
	assert_eq!(bins.bin(0).gradient_pairs, &[GradientPair::default(); 3]);
}
