// SPDX-License-Identifier: AGPL-3.0-only

//! 128-bit transport words.
//!
//! The overlay moves data between host memory and the heads in 128-bit
//! words. Each word carries eight Q15 samples:
//!
//! ```text
//! bit  127        112 111         96         ...  31         16 15          0
//!      ┌─────────────┬─────────────┬───────────────┬─────────────┬─────────────┐
//!      │  sample 7   │  sample 6   │      ...      │  sample 1   │  sample 0   │
//!      └─────────────┴─────────────┴───────────────┴─────────────┴─────────────┘
//! ```
//!
//! Packing is little-endian, so `word.to_le_bytes()` of a packed run is
//! byte-identical to the flat little-endian `i16` file the host loads. The
//! unused tail of the last word in a run is zero.

/// One transport word.
pub type Word = u128;

/// Word width in bits.
pub const WORD_BITS: u32 = 128;

/// Word width in bytes.
pub const WORD_BYTES: usize = 16;

/// Q15 samples carried by one word.
pub const SAMPLES_PER_WORD: usize = 8;

/// Number of words needed to carry `samples` samples.
#[must_use]
pub const fn words_for(samples: usize) -> usize {
    samples.div_ceil(SAMPLES_PER_WORD)
}

/// Place `sample` into lane `lane` (0..8) of `word`.
#[must_use]
#[inline]
pub const fn with_lane(word: Word, lane: usize, sample: i16) -> Word {
    let shift = 16 * lane as u32;
    let cleared = word & !(0xFFFF_u128 << shift);
    #[allow(clippy::cast_sign_loss)]
    let bits = (sample as u16) as u128;
    cleared | (bits << shift)
}

/// Read lane `lane` (0..8) of `word`.
#[must_use]
#[inline]
pub const fn lane(word: Word, lane: usize) -> i16 {
    let shift = 16 * lane as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let v = ((word >> shift) & 0xFFFF) as u16 as i16;
    v
}

/// Pack up to eight samples into one word (missing lanes are zero).
#[must_use]
pub fn pack_word(samples: &[i16]) -> Word {
    debug_assert!(samples.len() <= SAMPLES_PER_WORD);
    samples
        .iter()
        .enumerate()
        .fold(0, |w, (i, &s)| with_lane(w, i, s))
}

/// Unpack all eight lanes of a word.
#[must_use]
pub fn unpack_word(word: Word) -> [i16; SAMPLES_PER_WORD] {
    let mut out = [0i16; SAMPLES_PER_WORD];
    for (i, s) in out.iter_mut().enumerate() {
        *s = lane(word, i);
    }
    out
}

/// Pack a sample run into `words_for(samples.len())` words.
#[must_use]
pub fn pack_samples(samples: &[i16]) -> Vec<Word> {
    samples.chunks(SAMPLES_PER_WORD).map(pack_word).collect()
}

/// Unpack the first `count` samples of a word run.
///
/// Returns fewer than `count` samples if `words` is too short.
#[must_use]
pub fn unpack_samples(words: &[Word], count: usize) -> Vec<i16> {
    words
        .iter()
        .flat_map(|&w| unpack_word(w))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_geometry() {
        assert_eq!(WORD_BITS as usize, WORD_BYTES * 8);
        assert_eq!(SAMPLES_PER_WORD * 16, WORD_BITS as usize);
        assert_eq!(words_for(0), 0);
        assert_eq!(words_for(1), 1);
        assert_eq!(words_for(8), 1);
        assert_eq!(words_for(9), 2);
        assert_eq!(words_for(1152), 144);
    }

    #[test]
    fn lanes_are_little_endian() {
        let w = pack_word(&[1, -1, 0, 0, 0, 0, 0, 0x7FFF]);
        let bytes = w.to_le_bytes();
        assert_eq!(&bytes[0..2], &1i16.to_le_bytes());
        assert_eq!(&bytes[2..4], &(-1i16).to_le_bytes());
        assert_eq!(&bytes[14..16], &0x7FFFi16.to_le_bytes());
    }

    #[test]
    fn negative_samples_survive_packing() {
        let w = with_lane(0, 3, i16::MIN);
        assert_eq!(lane(w, 3), i16::MIN);
        assert_eq!(lane(w, 2), 0);
        assert_eq!(lane(w, 4), 0);
    }

    #[test]
    fn partial_tail_is_zero_filled() {
        let words = pack_samples(&[5; 10]);
        assert_eq!(words.len(), 2);
        assert_eq!(unpack_word(words[1]), [5, 5, 0, 0, 0, 0, 0, 0]);
        assert_eq!(unpack_samples(&words, 10), vec![5; 10]);
    }

    #[test]
    fn overwriting_a_lane_clears_old_bits() {
        let w = with_lane(Word::MAX, 0, 0);
        assert_eq!(lane(w, 0), 0);
        assert_eq!(lane(w, 1), -1);
    }
}
