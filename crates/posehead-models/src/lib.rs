// SPDX-License-Identifier: AGPL-3.0-only

#![deny(unsafe_code)]

//! Host-side artifacts for the pose-head overlay
//!
//! Everything the host touches outside the overlay itself: Q15 blobs on
//! disk, packed FC weight layouts, plain-text streams and golden
//! comparisons.
//!
//! # Formats
//!
//! | Artifact | Layout |
//! |----------|--------|
//! | `*_q15.bin` | flat little-endian `i16`, no header |
//! | `<head>_fc_q15.bin` | `out` rows of `[bias, w0 … w(in-1)]` |
//! | `*_stream.txt` | whitespace-separated integers |
//! | `<head>_w.txt`, `<head>_feat.txt` | PLIO text, 8 samples per line |
//! | `<head>_out_hw.txt` | one decimal per line, real outputs only |
//!
//! # Example
//!
//! ```no_run
//! use posehead_driver::{PassConfig, PoseHeadGraph};
//! use posehead_models::ModelArtifacts;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = PoseHeadGraph::reference()?;
//! let artifacts = ModelArtifacts::from_dir("data")?;
//! let outputs = artifacts.run(&graph, &PassConfig::default())?;
//! outputs.save("data")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod artifacts;
mod error;
pub mod golden;
pub mod loading;
pub mod streams;
mod weights;

pub use artifacts::{pack_input, HeadArtifact, HeadOutput, HeadOutputs, ModelArtifacts};
pub use error::{ModelError, Result};
pub use golden::{compare_q15, CompareReport};
pub use loading::{load_q15_bin, save_q15_txt, write_q15_bin};
pub use streams::{read_q15_text, write_plio_txt};
pub use weights::{pack_fc, FcWeights, PackedFiles};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        compare_q15, load_q15_bin, pack_fc, CompareReport, FcWeights, HeadOutputs, ModelArtifacts,
        ModelError, Result,
    };
}
