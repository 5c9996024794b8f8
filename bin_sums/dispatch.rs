/*!
The kernels are generic over the number of scores and the bit pack so the compiler can unroll the loops over them. This module holds the bounded set of instances that are compiled and chooses one for each call. Class counts from 2 through `MAX_COMPILER_CLASSES` and every bit pack in `ITEMS_PER_WORD` get a fixed instance. Everything else falls back to an instance that reads the value at runtime.
*/

use crate::{
	bit_pack::ITEMS_PER_WORD,
	bit_packed::bin_sums_bit_packed,
	types::{n_scores_for_classes, BinBuffer, Samples, Task, DYNAMIC, MAX_COMPILER_CLASSES},
	zero_dimensions::bin_sums_zero_dimensions,
};

pub(crate) type ZeroDimensionsFn = unsafe fn(&mut BinBuffer, Samples<'_>);

pub(crate) type BitPackedFn = unsafe fn(&mut BinBuffer, &[u64], Samples<'_>, usize);

/// Which instance of the class count axis was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoresSpecialization {
	Regression,
	Classes(usize),
	DynamicClasses,
}

/// Which instance of the bit pack axis was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitPackSpecialization {
	ItemsPerWord(usize),
	Dynamic,
}

#[derive(Clone, Copy)]
pub struct ZeroDimensionsSpecialization {
	pub scores: ScoresSpecialization,
	pub(crate) f: ZeroDimensionsFn,
}

#[derive(Clone, Copy)]
pub struct BitPackedSpecialization {
	pub scores: ScoresSpecialization,
	pub bit_pack: BitPackSpecialization,
	pub(crate) f: BitPackedFn,
}

const ZERO_DIMENSIONS_CLASSIFICATION: [(usize, ZeroDimensionsFn); MAX_COMPILER_CLASSES - 1] = [
	(2, bin_sums_zero_dimensions::<true, { n_scores_for_classes(2) }>),
	(3, bin_sums_zero_dimensions::<true, { n_scores_for_classes(3) }>),
	(4, bin_sums_zero_dimensions::<true, { n_scores_for_classes(4) }>),
	(5, bin_sums_zero_dimensions::<true, { n_scores_for_classes(5) }>),
	(6, bin_sums_zero_dimensions::<true, { n_scores_for_classes(6) }>),
	(7, bin_sums_zero_dimensions::<true, { n_scores_for_classes(7) }>),
	(8, bin_sums_zero_dimensions::<true, { n_scores_for_classes(8) }>),
];

/// Chooses the bit pack instance for one fixed point on the class count axis.
type BitPackSelector = fn(usize, bool) -> (BitPackSpecialization, BitPackedFn);

const BIT_PACKED_CLASSIFICATION: [(usize, BitPackSelector); MAX_COMPILER_CLASSES - 1] = [
	(2, select_bit_pack::<true, { n_scores_for_classes(2) }>),
	(3, select_bit_pack::<true, { n_scores_for_classes(3) }>),
	(4, select_bit_pack::<true, { n_scores_for_classes(4) }>),
	(5, select_bit_pack::<true, { n_scores_for_classes(5) }>),
	(6, select_bit_pack::<true, { n_scores_for_classes(6) }>),
	(7, select_bit_pack::<true, { n_scores_for_classes(7) }>),
	(8, select_bit_pack::<true, { n_scores_for_classes(8) }>),
];

/// The bit pack table for one point on the class count axis, in the same order as `ITEMS_PER_WORD`.
fn bit_pack_table<const CLASSIFICATION: bool, const N_SCORES: usize>(
) -> [(usize, BitPackedFn); ITEMS_PER_WORD.len()] {
	[
		(64, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 64>),
		(32, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 32>),
		(21, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 21>),
		(16, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 16>),
		(12, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 12>),
		(10, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 10>),
		(9, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 9>),
		(8, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 8>),
		(7, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 7>),
		(6, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 6>),
		(5, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 5>),
		(4, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 4>),
		(3, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 3>),
		(2, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 2>),
		(1, bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, 1>),
	]
}

fn select_bit_pack<const CLASSIFICATION: bool, const N_SCORES: usize>(
	items_per_word: usize,
	specialize_bit_pack: bool,
) -> (BitPackSpecialization, BitPackedFn) {
	if specialize_bit_pack {
		let table = bit_pack_table::<CLASSIFICATION, N_SCORES>();
		if let Some((items_per_word, f)) = table
			.iter()
			.find(|(table_items_per_word, _)| *table_items_per_word == items_per_word)
		{
			return (BitPackSpecialization::ItemsPerWord(*items_per_word), *f);
		}
	}
	(
		BitPackSpecialization::Dynamic,
		bin_sums_bit_packed::<CLASSIFICATION, N_SCORES, { DYNAMIC }>,
	)
}

/// Choose the kernel for a pass with no term.
pub fn select_zero_dimensions(task: Task) -> ZeroDimensionsSpecialization {
	match task {
		Task::Regression => ZeroDimensionsSpecialization {
			scores: ScoresSpecialization::Regression,
			f: bin_sums_zero_dimensions::<false, 1>,
		},
		Task::Classification { n_classes } => ZERO_DIMENSIONS_CLASSIFICATION
			.iter()
			.find(|(table_n_classes, _)| *table_n_classes == n_classes)
			.map(|(n_classes, f)| ZeroDimensionsSpecialization {
				scores: ScoresSpecialization::Classes(*n_classes),
				f: *f,
			})
			.unwrap_or_else(|| {
				debug_assert!(n_classes > MAX_COMPILER_CLASSES);
				ZeroDimensionsSpecialization {
					scores: ScoresSpecialization::DynamicClasses,
					f: bin_sums_zero_dimensions::<true, { DYNAMIC }>,
				}
			}),
	}
}

/// Choose the kernel for a pass over a term packed with `items_per_word` items per word. If `specialize_bit_pack` is false, the dynamic bit pack instance is used regardless of `items_per_word`.
pub fn select_bit_packed(
	task: Task,
	items_per_word: usize,
	specialize_bit_pack: bool,
) -> BitPackedSpecialization {
	let (scores, selector): (ScoresSpecialization, BitPackSelector) = match task {
		Task::Regression => (
			ScoresSpecialization::Regression,
			select_bit_pack::<false, 1>,
		),
		Task::Classification { n_classes } => BIT_PACKED_CLASSIFICATION
			.iter()
			.find(|(table_n_classes, _)| *table_n_classes == n_classes)
			.map(|(n_classes, selector)| (ScoresSpecialization::Classes(*n_classes), *selector))
			.unwrap_or((
				ScoresSpecialization::DynamicClasses,
				select_bit_pack::<true, { DYNAMIC }>,
			)),
	};
	let (bit_pack, f) = selector(items_per_word, specialize_bit_pack);
	BitPackedSpecialization {
		scores,
		bit_pack,
		f,
	}
}

#[test]
fn test_select_zero_dimensions() {
	assert_eq!(
		select_zero_dimensions(Task::Regression).scores,
		ScoresSpecialization::Regression
	);
	for n_classes in 2..=MAX_COMPILER_CLASSES {
		assert_eq!(
			select_zero_dimensions(Task::Classification { n_classes }).scores,
			ScoresSpecialization::Classes(n_classes)
		);
	}
	for n_classes in &[MAX_COMPILER_CLASSES + 1, 100] {
		assert_eq!(
			select_zero_dimensions(Task::Classification {
				n_classes: *n_classes
			})
			.scores,
			ScoresSpecialization::DynamicClasses
		);
	}
}

#[test]
fn test_select_bit_packed() {
	let tasks = (2..=MAX_COMPILER_CLASSES + 2)
		.map(|n_classes| Task::Classification { n_classes })
		.chain(std::iter::once(Task::Regression));
	for task in tasks {
		let expected_scores = select_zero_dimensions(task).scores;
		for items_per_word in ITEMS_PER_WORD.iter() {
			let specialization = select_bit_packed(task, *items_per_word, true);
			assert_eq!(specialization.scores, expected_scores);
			assert_eq!(
				specialization.bit_pack,
				BitPackSpecialization::ItemsPerWord(*items_per_word)
			);
			let specialization = select_bit_packed(task, *items_per_word, false);
			assert_eq!(specialization.scores, expected_scores);
			assert_eq!(specialization.bit_pack, BitPackSpecialization::Dynamic);
		}
		// 11 items of 5 bits fit in a word, but 11 is not one of the compiled bit packs.
		let specialization = select_bit_packed(task, 11, true);
		assert_eq!(specialization.bit_pack, BitPackSpecialization::Dynamic);
	}
}
