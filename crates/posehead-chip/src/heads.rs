// SPDX-License-Identifier: AGPL-3.0-only

//! Fully-connected head configurations.
//!
//! ## Reference overlay
//!
//! All three heads read the same 2×2×288 = 1152-sample backbone feature.
//!
//! | Head | In | Out | Pad | Frame | Shift | Weight samples |
//! |------|----|-----|-----|-------|-------|----------------|
//! | pose3d | 1152 | 195 (65 keypoints × 3) | 5 | 200 | 15 | 224,835 |
//! | world | 1152 | 117 | 3 | 120 | 15 | 134,901 |
//! | flag | 1152 | 1 | 7 | 8 | 15 | 1,153 |
//!
//! The pad brings every reference frame to a whole number of 128-bit words,
//! so the output channel always carries complete words.

use std::fmt;

use crate::quant::worst_case_accumulator;
use crate::word::{words_for, WORD_BYTES};

/// Shape and rescale of one fully-connected head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadConfig {
    /// Head name, used for channel names and artifact files.
    pub name: &'static str,
    /// Feature samples consumed per pass.
    pub input_channels: usize,
    /// Computed outputs per pass.
    pub output_channels: usize,
    /// Zero samples appended after the computed outputs.
    pub pad: usize,
    /// Arithmetic right shift applied to the accumulator.
    pub shift: u32,
}

/// Shared backbone feature width (2×2×288).
pub const FEATURE_CHANNELS: usize = 1152;

/// pose3d head: 65 keypoints × 3 coordinates.
pub const POSE3D: HeadConfig = HeadConfig {
    name: "pose3d",
    input_channels: FEATURE_CHANNELS,
    output_channels: 195,
    pad: 5,
    shift: 15,
};

/// world head: world-space landmarks.
pub const WORLD: HeadConfig = HeadConfig {
    name: "world",
    input_channels: FEATURE_CHANNELS,
    output_channels: 117,
    pad: 3,
    shift: 15,
};

/// flag head: single presence score.
pub const FLAG: HeadConfig = HeadConfig {
    name: "flag",
    input_channels: FEATURE_CHANNELS,
    output_channels: 1,
    pad: 7,
    shift: 15,
};

/// Rejected head configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadConfigError {
    /// Offending head.
    pub head: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl fmt::Display for HeadConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid head config '{}': {}", self.head, self.reason)
    }
}

impl std::error::Error for HeadConfigError {}

impl HeadConfig {
    /// Build a custom head configuration.
    #[must_use]
    pub const fn new(
        name: &'static str,
        input_channels: usize,
        output_channels: usize,
        pad: usize,
        shift: u32,
    ) -> Self {
        Self { name, input_channels, output_channels, pad, shift }
    }

    /// Samples per weight row: bias + one weight per input channel.
    #[must_use]
    pub const fn row_stride(&self) -> usize {
        1 + self.input_channels
    }

    /// Weight-stream samples consumed per pass.
    #[must_use]
    pub const fn weight_len(&self) -> usize {
        self.output_channels * self.row_stride()
    }

    /// Output samples emitted per pass (computed + pad).
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.output_channels + self.pad
    }

    /// Words carrying the feature vector.
    #[must_use]
    pub const fn feature_words(&self) -> usize {
        words_for(self.input_channels)
    }

    /// Words carrying the weight matrix.
    #[must_use]
    pub const fn weight_words(&self) -> usize {
        words_for(self.weight_len())
    }

    /// Words carrying one output frame.
    #[must_use]
    pub const fn frame_words(&self) -> usize {
        words_for(self.frame_len())
    }

    /// True if the frame fills whole words with no zero-filled tail lanes.
    #[must_use]
    pub const fn is_word_aligned(&self) -> bool {
        self.frame_words() * WORD_BYTES == self.frame_len() * 2
    }

    /// Check the configuration can be instantiated as a kernel.
    ///
    /// # Errors
    ///
    /// Returns error if a channel count is zero, the shift is 64 or more, or
    /// a row could overflow the `i64` accumulator, or a buffer length does
    /// not fit in `usize`.
    pub fn validate(&self) -> Result<(), HeadConfigError> {
        let fail = |reason: String| Err(HeadConfigError { head: self.name, reason });
        if self.input_channels == 0 {
            return fail("input_channels must be non-zero".to_string());
        }
        if self.output_channels == 0 {
            return fail("output_channels must be non-zero".to_string());
        }
        if self.shift >= 64 {
            return fail(format!("shift {} exceeds accumulator width", self.shift));
        }
        if worst_case_accumulator(self.input_channels) > i64::MAX.unsigned_abs().into() {
            return fail(format!(
                "{} input channels can overflow the accumulator",
                self.input_channels
            ));
        }
        if self.output_channels.checked_mul(self.row_stride()).is_none() {
            return fail(format!("{} rows of weight matrix overflow", self.output_channels));
        }
        if self.output_channels.checked_add(self.pad).is_none() {
            return fail(format!("frame of {} + {} pad overflows", self.output_channels, self.pad));
        }
        Ok(())
    }
}

impl fmt::Display for HeadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}→{} (+{} pad) >>{}",
            self.name, self.input_channels, self.output_channels, self.pad, self.shift
        )
    }
}

/// The three heads of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeadId {
    /// 3D pose landmarks.
    Pose3d,
    /// World-space landmarks.
    World,
    /// Presence flag.
    Flag,
}

impl HeadId {
    /// All heads in overlay order.
    pub const ALL: [Self; 3] = [Self::Pose3d, Self::World, Self::Flag];

    /// Reference configuration for this head.
    #[must_use]
    pub const fn config(self) -> HeadConfig {
        match self {
            Self::Pose3d => POSE3D,
            Self::World => WORLD,
            Self::Flag => FLAG,
        }
    }

    /// Lower-case head name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.config().name
    }

    /// Index in [`HeadId::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Packed FC weight blob (`[bias, w…]` rows, flat little-endian i16).
    #[must_use]
    pub fn weights_file(self) -> String {
        format!("{}_fc_q15.bin", self.name())
    }

    /// Result text file (one decimal per line).
    #[must_use]
    pub fn output_file(self) -> String {
        format!("{}_out_hw.txt", self.name())
    }

    /// PLIO-style weight text stream.
    #[must_use]
    pub fn weights_text_file(self) -> String {
        format!("{}_w.txt", self.name())
    }

    /// PLIO-style feature text stream.
    #[must_use]
    pub fn feature_text_file(self) -> String {
        format!("{}_feat.txt", self.name())
    }
}

impl fmt::Display for HeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for HeadId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pose3d" => Ok(Self::Pose3d),
            "world" => Ok(Self::World),
            "flag" => Ok(Self::Flag),
            other => Err(format!("unknown head '{other}' (expected pose3d, world or flag)")),
        }
    }
}

/// Shared feature blob written by the host, identical for every head.
pub const FEATURE_FILE: &str = "posehead_input_q15.bin";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_frames_are_word_aligned() {
        for head in HeadId::ALL {
            let c = head.config();
            assert!(c.is_word_aligned(), "{c} frame not word aligned");
            assert!(c.validate().is_ok());
        }
        assert_eq!(POSE3D.frame_words(), 25);
        assert_eq!(WORLD.frame_words(), 15);
        assert_eq!(FLAG.frame_words(), 1);
    }

    #[test]
    fn weight_geometry() {
        assert_eq!(POSE3D.row_stride(), 1153);
        assert_eq!(POSE3D.weight_len(), 195 * 1153);
        assert_eq!(WORLD.weight_len(), 134_901);
        assert_eq!(FLAG.weight_len(), 1153);
        assert_eq!(FLAG.weight_words(), 145);
        assert_eq!(POSE3D.feature_words(), 144);
    }

    #[test]
    fn validation_rejects_degenerate_shapes() {
        assert!(HeadConfig::new("x", 0, 1, 0, 0).validate().is_err());
        assert!(HeadConfig::new("x", 4, 0, 0, 0).validate().is_err());
        assert!(HeadConfig::new("x", 4, 1, 0, 64).validate().is_err());
        assert!(HeadConfig::new("x", 4, 1, 0, 63).validate().is_ok());
    }

    #[test]
    fn validation_rejects_unaddressable_lengths() {
        let big = HeadConfig::new("big", 4, usize::MAX / 2, 0, 0);
        let err = big.validate().unwrap_err();
        assert!(err.reason.contains("weight matrix"), "{err}");

        let padded = HeadConfig::new("padded", 1, 1, usize::MAX, 0);
        let err = padded.validate().unwrap_err();
        assert!(err.reason.contains("pad overflows"), "{err}");
    }

    #[test]
    fn head_names_and_files() {
        assert_eq!("POSE3D".parse::<HeadId>().unwrap(), HeadId::Pose3d);
        assert!("arm".parse::<HeadId>().is_err());
        assert_eq!(HeadId::World.weights_file(), "world_fc_q15.bin");
        assert_eq!(HeadId::Flag.output_file(), "flag_out_hw.txt");
        assert_eq!(HeadId::Flag.index(), 2);
    }
}
