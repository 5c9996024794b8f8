/*!
Tensor bin indices are stored packed into `u64` words. A word with `items_per_word` items divides its bits evenly, so each item gets `64 / items_per_word` bits. Items are stored least significant first.
*/

use crate::types::BinSumsError;
use num_traits::ToPrimitive;

pub const BITS_PER_WORD: usize = 64;

/// These are the bit packs with their own compiled specialization, from densest to sparsest. Each one is the most items that fit in a word when every item gets one more bit than the previous entry allowed.
pub const ITEMS_PER_WORD: [usize; 15] = [64, 32, 21, 16, 12, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1];

pub fn validate_items_per_word(items_per_word: usize) -> Result<(), BinSumsError> {
	if items_per_word == 0 || items_per_word > BITS_PER_WORD {
		Err(BinSumsError::InvalidBitPack(items_per_word))
	} else {
		Ok(())
	}
}

#[inline(always)]
pub const fn bits_per_item(items_per_word: usize) -> usize {
	BITS_PER_WORD / items_per_word
}

/// A mask of `bits_per_item` one bits.
#[inline(always)]
pub const fn mask(bits_per_item: usize) -> u64 {
	u64::MAX >> (BITS_PER_WORD - bits_per_item)
}

/// The next entry in `ITEMS_PER_WORD`, or 0 after the last one.
pub const fn next_items_per_word(items_per_word: usize) -> usize {
	BITS_PER_WORD / (bits_per_item(items_per_word) + 1)
}

/// Choose the densest bit pack whose fields can represent every index below `n_bins`.
pub fn items_per_word_for_bins(n_bins: usize) -> usize {
	let max_index = n_bins.saturating_sub(1);
	let bits_required = (usize::BITS - max_index.leading_zeros()).max(1) as usize;
	BITS_PER_WORD / bits_required
}

/// The number of words `n_items` items occupy. `items_per_word` must be a valid bit pack.
pub fn n_words(n_items: usize, items_per_word: usize) -> usize {
	debug_assert!(validate_items_per_word(items_per_word).is_ok());
	(n_items + items_per_word - 1) / items_per_word
}

/// Extract field `field` of `word`.
#[inline(always)]
pub fn unpack_field(word: u64, field: usize, bits_per_item: usize, mask: u64) -> usize {
	// field * bits_per_item is always less than 64 because field < items_per_word.
	((word >> (field * bits_per_item)) & mask) as usize
}

pub fn pack(indices: &[usize], items_per_word: usize) -> Result<Vec<u64>, BinSumsError> {
	validate_items_per_word(items_per_word)?;
	let bits_per_item = bits_per_item(items_per_word);
	let mask = mask(bits_per_item);
	indices
		.chunks(items_per_word)
		.map(|chunk| {
			let mut word = 0u64;
			for (field, index) in chunk.iter().enumerate() {
				let value = index
					.to_u64()
					.filter(|value| *value <= mask)
					.ok_or(BinSumsError::IndexTooWide {
						index: *index,
						bits_per_item,
					})?;
				word |= value << (field * bits_per_item);
			}
			Ok(word)
		})
		.collect()
}

/// Decode the first `n_items` indices from `words`. Fields past `n_items` in the last word are ignored.
pub fn unpack(
	words: &[u64],
	items_per_word: usize,
	n_items: usize,
) -> Result<Vec<usize>, BinSumsError> {
	validate_items_per_word(items_per_word)?;
	let bits_per_item = bits_per_item(items_per_word);
	let mask = mask(bits_per_item);
	let indices = words
		.iter()
		.flat_map(|word| {
			(0..items_per_word).map(move |field| unpack_field(*word, field, bits_per_item, mask))
		})
		.take(n_items)
		.collect();
	Ok(indices)
}

#[cfg(test)]
use rand::{Rng, SeedableRng};

#[test]
fn test_items_per_word_sequence() {
	let mut items_per_word = ITEMS_PER_WORD[0];
	let mut sequence = Vec::new();
	while items_per_word != 0 {
		sequence.push(items_per_word);
		items_per_word = next_items_per_word(items_per_word);
	}
	assert_eq!(sequence, ITEMS_PER_WORD.to_vec());
	for items_per_word in ITEMS_PER_WORD.iter() {
		assert!(items_per_word * bits_per_item(*items_per_word) <= BITS_PER_WORD);
	}
}

#[test]
fn test_items_per_word_for_bins() {
	assert_eq!(items_per_word_for_bins(1), 64);
	assert_eq!(items_per_word_for_bins(2), 64);
	assert_eq!(items_per_word_for_bins(3), 32);
	assert_eq!(items_per_word_for_bins(4), 32);
	assert_eq!(items_per_word_for_bins(5), 21);
	assert_eq!(items_per_word_for_bins(256), 8);
	assert_eq!(items_per_word_for_bins(257), 7);
	assert_eq!(items_per_word_for_bins(4097), 4);
	assert_eq!(items_per_word_for_bins(usize::MAX), 1);
	for n_bins in 1..5000 {
		assert!(ITEMS_PER_WORD.contains(&items_per_word_for_bins(n_bins)));
	}
}

#[test]
fn test_mask() {
	assert_eq!(mask(1), 1);
	assert_eq!(mask(3), 0b111);
	assert_eq!(mask(64), u64::MAX);
}

#[test]
fn test_pack_layout() {
	// Least significant field first.
	let words = pack(&[1, 2, 3, 0, 1], 4).unwrap();
	assert_eq!(words, vec![0x0000_0003_0002_0001, 0x0000_0000_0000_0001]);
	assert_eq!(unpack(&words, 4, 5).unwrap(), vec![1, 2, 3, 0, 1]);
	assert_eq!(n_words(5, 4), 2);
	assert_eq!(n_words(8, 4), 2);
	assert_eq!(n_words(1, 64), 1);
}

#[test]
fn test_pack_rejects_wide_indices() {
	assert_eq!(
		pack(&[0, 4], 32),
		Err(BinSumsError::IndexTooWide {
			index: 4,
			bits_per_item: 2
		})
	);
	assert_eq!(pack(&[0], 65), Err(BinSumsError::InvalidBitPack(65)));
}

#[test]
fn test_unpack_rejects_invalid_bit_pack() {
	let words = pack(&[1, 0, 1], 64).unwrap();
	assert_eq!(unpack(&words, 0, 3), Err(BinSumsError::InvalidBitPack(0)));
	assert_eq!(unpack(&words, 65, 3), Err(BinSumsError::InvalidBitPack(65)));
	assert_eq!(unpack(&words, 64, 3), Ok(vec![1, 0, 1]));
}

#[test]
fn test_round_trip_every_bit_pack() {
	let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(42);
	for items_per_word in ITEMS_PER_WORD.iter().copied().chain(vec![11, 13, 33, 50]) {
		let bits_per_item = bits_per_item(items_per_word);
		let max_index = mask(bits_per_item).to_usize().unwrap_or(usize::MAX);
		// Every representable value when there are few of them, otherwise the edges and a random sample.
		let indices: Vec<usize> = if bits_per_item <= 8 {
			(0..=max_index).collect()
		} else {
			let mut indices = vec![0, 1, max_index - 1, max_index];
			indices.extend((0..1000).map(|_| rng.gen_range(0, max_index)));
			indices
		};
		// An odd length leaves the last word partially filled.
		for n_items in &[indices.len(), indices.len() - 1, 1] {
			let indices = &indices[..*n_items];
			let words = pack(indices, items_per_word).unwrap();
			assert_eq!(words.len(), n_words(indices.len(), items_per_word));
			assert_eq!(unpack(&words, items_per_word, indices.len()).unwrap(), indices);
		}
	}
}
