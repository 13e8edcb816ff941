// SPDX-License-Identifier: AGPL-3.0-only

//! Overlay graph and pass orchestration
//!
//! A [`PoseHeadGraph`] owns one [`LinearHead`] per head and wires each to
//! three transducers for the duration of a pass:
//!
//! ```text
//!            ┌────────────┐  feature ch  ┌────────────┐  output ch  ┌──────────────┐
//! feature ──►│ feat_mover │─────────────►│            │────────────►│ output_mover │──► output
//!            └────────────┘              │ LinearHead │             └──────────────┘
//!            ┌──────────────┐ weight ch  │            │
//! weights ──►│ weight_mover │───────────►│            │
//!            └──────────────┘            └────────────┘
//! ```
//!
//! Every box is a scoped thread, so the reference graph runs twelve tasks
//! concurrently. The pass ends when all of them have finished.
//!
//! ## Failure handling
//!
//! A failing task drops its channel ends, which closes the streams of its
//! peers. Errors are collected from every task and the root cause is
//! returned: closed-stream errors are only reported when nothing else
//! failed. Output buffers of a failed pass are incomplete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use posehead_chip::{HeadConfig, FLAG, POSE3D, WORLD};
use tracing::{debug, info, warn};

use crate::error::{PoseHeadError, Result};
use crate::kernel::{HeadReport, LinearHead};
use crate::movers::{feat_mover, output_mover, weight_mover};
use crate::pass::{HeadBuffers, HostBuffer, PassBuffers, PassConfig, PassReport};
use crate::stream::{ChannelSpec, Deadline, SampleReader, SampleWriter};

/// One head's kernel and its configuration.
#[derive(Debug)]
pub struct HeadPipeline {
    config: HeadConfig,
    kernel: Mutex<LinearHead>,
}

impl HeadPipeline {
    fn new(config: HeadConfig) -> Result<Self> {
        Ok(Self {
            config,
            kernel: Mutex::new(LinearHead::new(config)?),
        })
    }

    /// Head configuration.
    pub const fn config(&self) -> &HeadConfig {
        &self.config
    }

    fn bind(&self, feature: &HostBuffer, buffers: &HeadBuffers) -> Result<()> {
        let c = &self.config;
        for (channel, expected, actual) in [
            ("feature", c.input_channels, feature.samples()),
            ("weights", c.weight_len(), buffers.weights.samples()),
            ("output", c.frame_len(), buffers.output.samples()),
        ] {
            if expected != actual {
                return Err(PoseHeadError::config_mismatch(c.name, channel, expected, actual));
            }
        }
        Ok(())
    }
}

/// Releases the busy flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(busy))
            .map_err(|_| PoseHeadError::PassInProgress)
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type TaskResult = Result<Option<HeadReport>>;

/// The three-head overlay (or any custom set of heads).
#[derive(Debug)]
pub struct PoseHeadGraph {
    pipelines: Vec<HeadPipeline>,
    busy: AtomicBool,
}

impl PoseHeadGraph {
    /// Graph with the reference pose3d, world and flag heads.
    ///
    /// # Errors
    ///
    /// Never fails for the reference configurations; kept fallible to share
    /// the construction path with [`with_configs`](Self::with_configs).
    pub fn reference() -> Result<Self> {
        Self::with_configs(&[POSE3D, WORLD, FLAG])
    }

    /// Graph with custom heads.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration is degenerate.
    pub fn with_configs(configs: &[HeadConfig]) -> Result<Self> {
        let pipelines = configs
            .iter()
            .map(|&c| HeadPipeline::new(c))
            .collect::<Result<Vec<_>>>()?;
        info!("Overlay graph: {} heads", pipelines.len());
        Ok(Self {
            pipelines,
            busy: AtomicBool::new(false),
        })
    }

    /// Head pipelines in graph order.
    pub fn heads(&self) -> &[HeadPipeline] {
        &self.pipelines
    }

    /// True while a pass is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Pack host data into buffers sized for this graph, with zeroed outputs.
    ///
    /// One head buffer is built per weight slice, including slices with no
    /// matching head. Lengths and counts are not checked here;
    /// [`run_pass`](Self::run_pass) does that.
    pub fn allocate(&self, feature: &[i16], weights: &[&[i16]]) -> PassBuffers {
        PassBuffers {
            feature: HostBuffer::from_samples(feature),
            heads: weights
                .iter()
                .enumerate()
                .map(|(i, w)| HeadBuffers {
                    weights: HostBuffer::from_samples(w),
                    output: HostBuffer::zeroed(
                        self.pipelines.get(i).map_or(0, |p| p.config.frame_len()),
                    ),
                })
                .collect(),
        }
    }

    fn bind(&self, buffers: &PassBuffers) -> Result<()> {
        if buffers.heads.len() != self.pipelines.len() {
            return Err(PoseHeadError::config_mismatch(
                "graph",
                "heads",
                self.pipelines.len(),
                buffers.heads.len(),
            ));
        }
        for (pipeline, head) in self.pipelines.iter().zip(&buffers.heads) {
            pipeline.bind(&buffers.feature, head)?;
        }
        Ok(())
    }

    /// Run one inference pass over every head.
    ///
    /// On success each head's output buffer holds its padded frame.
    ///
    /// # Errors
    ///
    /// - [`PoseHeadError::PassInProgress`] if another pass is running
    /// - [`PoseHeadError::ConfigMismatch`] if a buffer does not match its head
    /// - the root-cause transport error if any task fails
    pub fn run_pass(&self, buffers: &mut PassBuffers, config: &PassConfig) -> Result<PassReport> {
        let _guard = PassGuard::acquire(&self.busy)?;
        let start = Instant::now();
        self.bind(buffers)?;
        let bind_duration = start.elapsed();
        debug!(
            "Bound {} heads in {:?} (depth {}, timeout {:?})",
            self.pipelines.len(),
            bind_duration,
            config.depth,
            config.timeout
        );

        let deadline = Deadline::after(config.timeout);
        let feature = &buffers.feature;
        let outcomes: Vec<(String, TaskResult)> = thread::scope(|s| {
            let mut tasks = Vec::with_capacity(4 * self.pipelines.len());
            for (pipeline, head) in self.pipelines.iter().zip(buffers.heads.iter_mut()) {
                let c = pipeline.config;
                let open = |port: &str| {
                    ChannelSpec::new(format!("{}.{port}", c.name))
                        .with_depth(config.depth)
                        .open(deadline)
                };
                let (mut feat_tx, feat_rx) = open("feature");
                let (mut weight_tx, weight_rx) = open("weights");
                let (out_tx, mut out_rx) = open("output");
                let weights = head.weights.words();
                let output = head.output.words_mut();

                tasks.push((
                    format!("{}.feat_mover", c.name),
                    s.spawn(move || -> TaskResult {
                        feat_mover(feature.words(), &mut feat_tx, c.feature_words(), 0)?;
                        Ok(None)
                    }),
                ));
                tasks.push((
                    format!("{}.weight_mover", c.name),
                    s.spawn(move || -> TaskResult {
                        weight_mover(weights, &mut weight_tx, c.weight_words(), 0)?;
                        Ok(None)
                    }),
                ));
                tasks.push((
                    format!("{}.kernel", c.name),
                    s.spawn(move || -> TaskResult {
                        let mut kernel =
                            pipeline.kernel.lock().unwrap_or_else(PoisonError::into_inner);
                        let report = kernel.run(
                            &mut SampleReader::new(feat_rx),
                            &mut SampleReader::new(weight_rx),
                            &mut SampleWriter::new(out_tx),
                        )?;
                        Ok(Some(report))
                    }),
                ));
                tasks.push((
                    format!("{}.output_mover", c.name),
                    s.spawn(move || -> TaskResult {
                        output_mover(&mut out_rx, output, c.frame_words(), 0)?;
                        Ok(None)
                    }),
                ));
            }

            tasks
                .into_iter()
                .map(|(task, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(PoseHeadError::TaskPanicked { task: task.clone() })
                    });
                    (task, result)
                })
                .collect()
        });

        let mut reports = Vec::with_capacity(self.pipelines.len());
        let mut root_cause = None;
        let mut secondary = None;
        for (task, outcome) in outcomes {
            match outcome {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => {
                    warn!("Task {task} failed: {e}");
                    let slot = if e.is_secondary() { &mut secondary } else { &mut root_cause };
                    slot.get_or_insert(e);
                }
            }
        }
        if let Some(e) = root_cause.or(secondary) {
            return Err(e);
        }

        let report = PassReport {
            heads: reports,
            bind_duration,
            total_duration: start.elapsed(),
        };
        info!(
            "✅ Pass complete in {:?} ({} words moved)",
            report.total_duration,
            report.words_moved()
        );
        Ok(report)
    }
}
