// SPDX-License-Identifier: AGPL-3.0-only

//! Streaming runtime for the pose-head overlay.
//!
//! Executes the three fully-connected heads described by
//! [`posehead_chip`] as a graph of concurrent tasks joined by bounded
//! word channels. Every pass is bit-exact against [`reference_forward`].
//!
//! # Pipeline
//!
//! ```text
//! PassBuffers                         PoseHeadGraph                          PassBuffers
//!  feature ─┬─► feat_mover ─► [ch] ─► LinearHead(pose3d) ─► [ch] ─► output_mover ─► pose3d out
//!           ├─► feat_mover ─► [ch] ─► LinearHead(world)  ─► [ch] ─► output_mover ─► world out
//!           └─► feat_mover ─► [ch] ─► LinearHead(flag)   ─► [ch] ─► output_mover ─► flag out
//!  weights ───► weight_mover ─► [ch] ──┘ (one per head)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use posehead_driver::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let graph = PoseHeadGraph::reference()?;
//! let feature = vec![0i16; 1152];
//! let weights: Vec<Vec<i16>> = graph
//!     .heads()
//!     .iter()
//!     .map(|h| vec![0; h.config().weight_len()])
//!     .collect();
//! let refs: Vec<&[i16]> = weights.iter().map(Vec::as_slice).collect();
//! let mut buffers = graph.allocate(&feature, &refs);
//!
//! let report = graph.run_pass(&mut buffers, &PassConfig::default())?;
//! println!("{:.1} µs", report.latency_us());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod error;
pub mod graph;
pub mod kernel;
pub mod movers;
mod pass;
pub mod stream;

pub use error::{PoseHeadError, Result, StreamFault};
pub use graph::{HeadPipeline, PoseHeadGraph};
pub use kernel::{reference_forward, HeadReport, LinearHead, SampleSink, SampleSource, SliceSource};
pub use movers::{feat_mover, output_mover, weight_mover};
pub use pass::{HeadBuffers, HostBuffer, PassBuffers, PassConfig, PassReport, DEFAULT_TIMEOUT};
pub use stream::{ChannelSpec, Deadline, SampleReader, SampleWriter, StreamReader, StreamWriter};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        reference_forward, HostBuffer, LinearHead, PassBuffers, PassConfig, PassReport,
        PoseHeadError, PoseHeadGraph, Result,
    };
}
