// SPDX-License-Identifier: AGPL-3.0-only

//! Comparison of overlay outputs against golden Q15 streams

use std::fmt;

/// Element-wise comparison of two Q15 streams.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareReport {
    /// Samples in the stream under test
    pub actual_len: usize,
    /// Samples in the golden stream
    pub golden_len: usize,
    /// Largest accepted absolute difference
    pub tolerance: u16,
    /// Samples (over the common prefix) differing by more than `tolerance`
    pub mismatches: usize,
    /// First mismatching index
    pub first_mismatch: Option<usize>,
    /// Largest absolute difference
    pub max_abs_err: u32,
    /// Mean absolute difference
    pub mean_abs_err: f64,
    /// Root-mean-square difference
    pub rms_err: f64,
}

impl CompareReport {
    /// True if lengths agree and every sample is within tolerance.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.actual_len == self.golden_len && self.mismatches == 0
    }
}

impl fmt::Display for CompareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actual_len != self.golden_len {
            writeln!(
                f,
                "length mismatch: actual {} vs golden {}",
                self.actual_len, self.golden_len
            )?;
        }
        write!(
            f,
            "{} mismatches (tol {}), max_abs_err {}, mean_abs_err {:.3}, rms {:.3}",
            self.mismatches, self.tolerance, self.max_abs_err, self.mean_abs_err, self.rms_err
        )?;
        if let Some(i) = self.first_mismatch {
            write!(f, ", first at index {i}")?;
        }
        Ok(())
    }
}

/// Compare `actual` against `golden` over their common prefix.
#[must_use]
pub fn compare_q15(actual: &[i16], golden: &[i16], tolerance: u16) -> CompareReport {
    let mut mismatches = 0;
    let mut first_mismatch = None;
    let mut max_abs_err = 0u32;
    let mut sum_abs = 0u64;
    let mut sum_sq = 0u64;

    for (i, (&a, &g)) in actual.iter().zip(golden).enumerate() {
        let err = (i32::from(a) - i32::from(g)).unsigned_abs();
        if err > u32::from(tolerance) {
            mismatches += 1;
            first_mismatch.get_or_insert(i);
        }
        max_abs_err = max_abs_err.max(err);
        sum_abs += u64::from(err);
        sum_sq += u64::from(err) * u64::from(err);
    }

    let n = actual.len().min(golden.len());
    #[allow(clippy::cast_precision_loss)]
    let (mean_abs_err, rms_err) = if n == 0 {
        (0.0, 0.0)
    } else {
        (sum_abs as f64 / n as f64, (sum_sq as f64 / n as f64).sqrt())
    };

    CompareReport {
        actual_len: actual.len(),
        golden_len: golden.len(),
        tolerance,
        mismatches,
        first_mismatch,
        max_abs_err,
        mean_abs_err,
        rms_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_streams_pass() {
        let r = compare_q15(&[1, 2, 3], &[1, 2, 3], 0);
        assert!(r.passed());
        assert_eq!(r.max_abs_err, 0);
        assert_eq!(r.first_mismatch, None);
    }

    #[test]
    fn tolerance_absorbs_small_errors() {
        let r = compare_q15(&[10, 20, 30], &[11, 20, 27], 1);
        assert!(!r.passed());
        assert_eq!(r.mismatches, 1);
        assert_eq!(r.first_mismatch, Some(2));
        assert_eq!(r.max_abs_err, 3);
        assert!((r.mean_abs_err - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let r = compare_q15(&[i16::MAX], &[i16::MIN], 0);
        assert_eq!(r.max_abs_err, 65_535);
    }

    #[test]
    fn length_mismatch_fails() {
        let r = compare_q15(&[1, 2], &[1, 2, 3], 0);
        assert_eq!(r.mismatches, 0);
        assert!(!r.passed());
        assert!(r.to_string().starts_with("length mismatch"));
    }
}
