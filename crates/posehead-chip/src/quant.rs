// SPDX-License-Identifier: AGPL-3.0-only

//! Q15 fixed-point primitives.
//!
//! Every head computes `saturate((bias + Σ f·w) >> shift)`:
//!
//! ```text
//! i16 bias ─┐
//!           ├─► i64 accumulator ─► arithmetic >> shift ─► clamp [-32768, 32767] ─► i16
//! i16 f·w  ─┘   (widened multiply, no intermediate overflow)
//! ```
//!
//! The shift truncates toward negative infinity; there is no rounding step.

/// Largest representable Q15 sample.
pub const Q15_MAX: i16 = i16::MAX;

/// Smallest representable Q15 sample.
pub const Q15_MIN: i16 = i16::MIN;

/// Clamp a wide accumulator value into the Q15 range.
///
/// Values above `32767` saturate to `32767`, values below `-32768` saturate
/// to `-32768`, everything else passes through unchanged.
#[must_use]
#[inline]
pub fn saturate_q15(acc: i64) -> i16 {
    // Lossless after the clamp.
    #[allow(clippy::cast_possible_truncation)]
    let v = acc.clamp(i64::from(Q15_MIN), i64::from(Q15_MAX)) as i16;
    v
}

/// Arithmetic-right-shift `acc` by `shift` bits, then saturate.
///
/// `shift` must be below 64; [`HeadConfig::validate`](crate::HeadConfig::validate)
/// rejects larger values before a kernel is ever built.
#[must_use]
#[inline]
pub fn requantize(acc: i64, shift: u32) -> i16 {
    saturate_q15(acc >> shift)
}

/// Widened multiply-accumulate of one feature sample and one weight sample.
#[must_use]
#[inline]
pub fn mac(acc: i64, feature: i16, weight: i16) -> i64 {
    acc + i64::from(feature) * i64::from(weight)
}

/// Worst-case accumulator magnitude for a row of `input_channels` products plus bias.
///
/// Used to check at configuration time that the `i64` accumulator cannot
/// overflow before the shift.
#[must_use]
pub const fn worst_case_accumulator(input_channels: usize) -> u128 {
    // |i16::MIN|² per product, |i16::MIN| for the bias.
    let product = 32_768u128 * 32_768u128;
    (input_channels as u128) * product + 32_768
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_boundaries() {
        assert_eq!(saturate_q15(32_767), 32_767);
        assert_eq!(saturate_q15(32_768), 32_767);
        assert_eq!(saturate_q15(-32_768), -32_768);
        assert_eq!(saturate_q15(-32_769), -32_768);
        assert_eq!(saturate_q15(0), 0);
        assert_eq!(saturate_q15(i64::MAX), Q15_MAX);
        assert_eq!(saturate_q15(i64::MIN), Q15_MIN);
    }

    #[test]
    fn saturation_boundaries_after_shift() {
        // Pre-shift values chosen so that >> 15 lands exactly on each boundary.
        let shift = 15;
        assert_eq!(requantize(32_767 << shift, shift), 32_767);
        assert_eq!(requantize(32_768 << shift, shift), 32_767);
        assert_eq!(requantize(-32_768 << shift, shift), -32_768);
        assert_eq!(requantize(-32_769 << shift, shift), -32_768);
    }

    #[test]
    fn shift_truncates_toward_negative_infinity() {
        assert_eq!(requantize(7, 1), 3);
        assert_eq!(requantize(-7, 1), -4);
        assert_eq!(requantize(-1, 15), -1);
        assert_eq!(requantize(1, 15), 0);
    }

    #[test]
    fn mac_is_widened() {
        let acc = mac(0, i16::MIN, i16::MIN);
        assert_eq!(acc, 1 << 30);
        let acc = mac(acc, i16::MIN, i16::MIN);
        assert_eq!(acc, 1 << 31); // would overflow an i32
    }

    #[test]
    fn reference_rows_fit_the_accumulator() {
        // 1152 × 2³⁰ + 2¹⁵ ≈ 2⁴⁰·²
        assert!(worst_case_accumulator(1152) < i64::MAX as u128);
    }
}
