// SPDX-License-Identifier: AGPL-3.0-only

//! Accelerator model for the pose-head overlay.
//!
//! This crate has **no dependencies** and **no runtime state**. It is a
//! pure model of the overlay: the three fully-connected head
//! configurations, the Q15 fixed-point primitives their kernels use, and
//! the 128-bit word format that carries samples across the channel
//! boundary.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`heads`] | `HeadConfig`, `HeadId`, reference pose3d / world / flag shapes |
//! | [`quant`] | Saturation, arithmetic-shift requantization, widened MAC |
//! | [`word`] | 128-bit word packing (8 × Q15 samples, little-endian) |
//!
//! # Reference overlay
//!
//! ```text
//! feature (1152 × i16) ──┬──► pose3d  1152 → 195 (+5 pad)  = 200 samples / 25 words
//!                        ├──► world   1152 → 117 (+3 pad)  = 120 samples / 15 words
//!                        └──► flag    1152 →   1 (+7 pad)  =   8 samples /  1 word
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod heads;
pub mod quant;
pub mod word;

pub use heads::{HeadConfig, HeadConfigError, HeadId, FLAG, POSE3D, WORLD};
pub use quant::{requantize, saturate_q15, Q15_MAX, Q15_MIN};
pub use word::{Word, SAMPLES_PER_WORD, WORD_BITS, WORD_BYTES};
