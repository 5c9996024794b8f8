use crate::{
	bit_pack, dispatch,
	types::{BinBuffer, BoostingContext, InnerBag},
};
use rayon::prelude::*;
use std::ops::Range;

/// Run the same pass as `bin_sums`, but split the samples into `n_chunks` chunks that are accumulated concurrently on the rayon thread pool. Each chunk accumulates into its own buffer and the buffers are summed into `bins` once every chunk is done. Chunks of a term's samples start on word boundaries so each chunk decodes whole words. The result matches `bin_sums` up to the order of floating point additions.
pub fn bin_sums_parallel(
	context: &BoostingContext,
	bins: &mut BinBuffer,
	term_index: Option<usize>,
	inner_bag: &InnerBag,
	n_chunks: usize,
) {
	log::trace!("entered bin_sums_parallel");
	#[cfg(feature = "timing")]
	let start = std::time::Instant::now();
	let training_set = context.training_set();
	let task = context.task();
	let samples = training_set.samples(inner_bag);
	assert_eq!(bins.n_scores(), task.n_scores());
	#[cfg(debug_assertions)]
	crate::diagnostics::check_inputs(
		training_set,
		inner_bag,
		context.options().centered_gradient_epsilon,
	);
	#[cfg(debug_assertions)]
	let weight_before = bins.total_weight();
	let n_samples = samples.n_samples;
	let n_chunks = n_chunks.max(1);
	let n_bins = bins.n_bins();
	let n_scores = bins.n_scores();
	let merged = match term_index {
		None => {
			assert!(n_bins >= 1);
			let specialization = dispatch::select_zero_dimensions(task);
			chunk_ranges(n_samples, n_chunks, 1)
				.into_par_iter()
				.map(|range| {
					let mut private_bins = BinBuffer::new(n_bins, n_scores);
					unsafe { (specialization.f)(&mut private_bins, samples.slice(range)) };
					private_bins
				})
				.reduce_with(merge)
		}
		Some(term_index) => {
			let term = &context.terms()[term_index];
			assert!(n_bins >= term.n_tensor_bins());
			let items_per_word = term.bit_pack();
			let packed = training_set.packed(term_index);
			let specialization = dispatch::select_bit_packed(
				task,
				items_per_word,
				context.options().use_bit_pack_specializations,
			);
			chunk_ranges(n_samples, n_chunks, items_per_word)
				.into_par_iter()
				.map(|range| {
					let mut private_bins = BinBuffer::new(n_bins, n_scores);
					let first_word = range.start / items_per_word;
					unsafe {
						(specialization.f)(
							&mut private_bins,
							&packed[first_word..],
							samples.slice(range),
							items_per_word,
						)
					};
					private_bins
				})
				.reduce_with(merge)
		}
	};
	if let Some(merged) = merged {
		bins.merge(&merged);
	}
	#[cfg(debug_assertions)]
	crate::diagnostics::check_accumulated_weight(bins, weight_before, inner_bag);
	#[cfg(feature = "timing")]
	crate::timing::TIMING.bin_sums_parallel.inc(start.elapsed());
	log::trace!("exited bin_sums_parallel");
}

fn merge(mut a: BinBuffer, b: BinBuffer) -> BinBuffer {
	#[cfg(feature = "timing")]
	let start = std::time::Instant::now();
	a.merge(&b);
	#[cfg(feature = "timing")]
	crate::timing::TIMING.merge.inc(start.elapsed());
	a
}

/// Split `0..n_samples` into at most `n_chunks` non-empty ranges that each start on a multiple of `items_per_word`.
fn chunk_ranges(n_samples: usize, n_chunks: usize, items_per_word: usize) -> Vec<Range<usize>> {
	let n_words = bit_pack::n_words(n_samples, items_per_word);
	let words_per_chunk = (n_words + n_chunks - 1) / n_chunks;
	(0..n_words)
		.step_by(words_per_chunk.max(1))
		.map(|first_word| {
			let start = first_word * items_per_word;
			let end = ((first_word + words_per_chunk) * items_per_word).min(n_samples);
			start..end
		})
		.collect()
}

#[cfg(test)]
use crate::{bin_sums, testing};

#[test]
fn test_chunk_ranges() {
	assert_eq!(chunk_ranges(10, 3, 1), vec![0..4, 4..8, 8..10]);
	assert_eq!(chunk_ranges(10, 2, 4), vec![0..8, 8..10]);
	assert_eq!(chunk_ranges(10, 8, 4), vec![0..4, 4..8, 8..10]);
	assert_eq!(chunk_ranges(3, 4, 64), vec![0..3]);
}

#[test]
fn test_parallel_matches_sequential() {
	for task in testing::tasks() {
		for use_bit_pack_specializations in &[false, true] {
			let (context, inner_bag) = testing::random_context(
				task,
				1001,
				vec![vec![7], vec![3, 5], vec![300]],
				*use_bit_pack_specializations,
				11,
			);
			let term_indices = std::iter::once(None).chain((0..3).map(Some));
			for term_index in term_indices {
				let mut sequential = context.new_bin_buffer(term_index);
				bin_sums(&context, &mut sequential, term_index, &inner_bag);
				let mut parallel = context.new_bin_buffer(term_index);
				bin_sums_parallel(&context, &mut parallel, term_index, &inner_bag, 4);
				testing::assert_bins_close(&sequential, &parallel);
			}
		}
	}
}
