// SPDX-License-Identifier: AGPL-3.0-only

//! Host-side artifact set: load blobs, run one pass, persist results
//!
//! A data directory holds the shared feature blob and one packed FC blob
//! per head:
//!
//! ```text
//! <dir>/posehead_input_q15.bin     feature   (in × i16)
//! <dir>/pose3d_fc_q15.bin          weights   (out × (1 + in) × i16)
//! <dir>/world_fc_q15.bin
//! <dir>/flag_fc_q15.bin
//! ```
//!
//! After a successful pass, `<head>_out_hw.txt` is written per head with
//! the head's real output channels, one value per line.

use std::path::{Path, PathBuf};

use posehead_chip::heads::{FEATURE_CHANNELS, FEATURE_FILE};
use posehead_chip::{HeadConfig, HeadId, FLAG, POSE3D, WORLD};
use posehead_driver::{PassConfig, PassReport, PoseHeadGraph};
use tracing::{debug, info, warn};

use crate::error::{ModelError, Result};
use crate::loading::{load_q15_bin, save_q15_txt, write_q15_bin};
use crate::streams::write_plio_txt;

/// Write the shared feature blob and a PLIO feature stream per head.
///
/// Returns the paths written, blob first.
///
/// # Errors
///
/// Returns error if a file cannot be written.
pub fn pack_input(feature: &[i16], dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if feature.len() != FEATURE_CHANNELS {
        warn!(
            "Feature stream has {} samples, heads expect {FEATURE_CHANNELS}",
            feature.len()
        );
    }
    let blob = dir.join(FEATURE_FILE);
    write_q15_bin(&blob, feature)?;
    let mut written = vec![blob];
    for head in HeadId::ALL {
        let path = dir.join(head.feature_text_file());
        write_plio_txt(&path, feature)?;
        written.push(path);
    }
    info!("Packed {} feature samples into {}", feature.len(), dir.display());
    Ok(written)
}

/// One head's packed weights.
#[derive(Debug, Clone)]
pub struct HeadArtifact {
    /// Head configuration the blob was loaded for
    pub config: HeadConfig,
    /// Packed `[bias, w…]` rows
    pub fc: Vec<i16>,
}

/// Feature vector and weight blobs for a set of heads.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    /// Shared feature vector
    pub feature: Vec<i16>,
    /// Per-head weights, in graph order
    pub heads: Vec<HeadArtifact>,
}

impl ModelArtifacts {
    /// Load the reference three-head artifact set from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::FileNotFound`] or [`ModelError::FileTooSmall`]
    /// naming the offending file.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_dir_with(dir, &[POSE3D, WORLD, FLAG])
    }

    /// Load artifacts for custom heads from `dir`.
    ///
    /// The feature blob is sized by the first head; every head of an overlay
    /// reads the same feature vector.
    ///
    /// # Errors
    ///
    /// Same as [`from_dir`](Self::from_dir).
    pub fn from_dir_with(dir: impl AsRef<Path>, configs: &[HeadConfig]) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading overlay artifacts from {}", dir.display());
        let feature_len = configs.first().map_or(0, |c| c.input_channels);
        let feature = load_q15_bin(dir.join(FEATURE_FILE), feature_len)?;
        let heads = configs
            .iter()
            .map(|&config| {
                let path = dir.join(format!("{}_fc_q15.bin", config.name));
                let fc = load_q15_bin(&path, config.weight_len())?;
                debug!("{}: {} weight samples", config.name, fc.len());
                Ok(HeadArtifact { config, fc })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { feature, heads })
    }

    /// Run one pass on `graph` and collect every head's real outputs.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidShape`] if the loaded heads are not the
    /// graph's heads, [`ModelError::Runtime`] if the pass fails, or
    /// [`ModelError::DirtyPadding`] if a padding sample is not zero.
    pub fn run(&self, graph: &PoseHeadGraph, config: &PassConfig) -> Result<HeadOutputs> {
        if self.heads.len() != graph.heads().len() {
            return Err(ModelError::invalid_shape(
                "graph",
                format!(
                    "{} heads loaded for a {}-head graph",
                    self.heads.len(),
                    graph.heads().len()
                ),
            ));
        }
        for (artifact, pipeline) in self.heads.iter().zip(graph.heads()) {
            if artifact.config != *pipeline.config() {
                return Err(ModelError::invalid_shape(
                    artifact.config.name,
                    format!("loaded as {} but graph runs {}", artifact.config, pipeline.config()),
                ));
            }
        }

        let weights: Vec<&[i16]> = self.heads.iter().map(|h| h.fc.as_slice()).collect();
        let mut buffers = graph.allocate(&self.feature, &weights);
        let report = graph.run_pass(&mut buffers, config)?;

        let heads = graph
            .heads()
            .iter()
            .zip(&buffers.heads)
            .map(|(pipeline, buffer)| {
                let c = *pipeline.config();
                let mut frame = buffer.output.to_samples();
                if let Some((i, &value)) = frame
                    .iter()
                    .enumerate()
                    .skip(c.output_channels)
                    .find(|&(_, &s)| s != 0)
                {
                    return Err(ModelError::DirtyPadding {
                        head: c.name,
                        index: i,
                        value,
                    });
                }
                frame.truncate(c.output_channels);
                Ok(HeadOutput {
                    name: c.name,
                    values: frame,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(HeadOutputs { heads, report })
    }
}

/// Real output channels of one head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadOutput {
    /// Head name
    pub name: &'static str,
    /// `output_channels` values, padding removed
    pub values: Vec<i16>,
}

impl HeadOutput {
    /// Result file name for this head.
    pub fn file_name(&self) -> String {
        format!("{}_out_hw.txt", self.name)
    }
}

/// Outputs of one completed pass.
#[derive(Debug, Clone)]
pub struct HeadOutputs {
    /// Per-head outputs, in graph order
    pub heads: Vec<HeadOutput>,
    /// Pass metrics
    pub report: PassReport,
}

impl HeadOutputs {
    /// Output of the head called `name`.
    pub fn get(&self, name: &str) -> Option<&HeadOutput> {
        self.heads.iter().find(|h| h.name == name)
    }

    /// Write `<head>_out_hw.txt` for every head into `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be written.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        self.heads
            .iter()
            .map(|h| {
                let path = dir.join(h.file_name());
                save_q15_txt(&path, &h.values)?;
                info!("Saved {} ({} values)", path.display(), h.values.len());
                Ok(path)
            })
            .collect()
    }
}
