// SPDX-License-Identifier: AGPL-3.0-only

//! Fully-connected weight packing
//!
//! Exported heads ship weights (`out × in`, row-major) and biases (`out`)
//! separately. The overlay streams them interleaved, one row per output
//! channel:
//!
//! ```text
//! row oc:  [ bias[oc], w[oc][0], w[oc][1], …, w[oc][in-1] ]     stride = 1 + in
//! ```

use std::path::{Path, PathBuf};

use posehead_chip::HeadConfig;
use tracing::info;

use crate::error::{ModelError, Result};
use crate::loading::write_q15_bin;
use crate::streams::write_plio_txt;

/// Validated weights and biases of one head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FcWeights {
    config: HeadConfig,
    weights: Vec<i16>,
    bias: Vec<i16>,
}

/// Files written by [`FcWeights::write_artifacts`].
#[derive(Debug, Clone)]
pub struct PackedFiles {
    /// Packed rows (`<head>_fc_q15.bin`), the file the host loads
    pub fc: PathBuf,
    /// Plain weight matrix (`<head>_weights_q15.bin`)
    pub weights: PathBuf,
    /// Plain bias vector (`<head>_bias_q15.bin`)
    pub bias: PathBuf,
    /// PLIO text of the packed rows (`<head>_w.txt`)
    pub plio: PathBuf,
}

impl FcWeights {
    /// Validate weight and bias arrays against `config`.
    ///
    /// The output channel count is inferred from the weight length and must
    /// match the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidShape`] if the weight length is not a
    /// multiple of `input_channels`, the inferred output count differs from
    /// `output_channels`, or the bias length differs from it.
    pub fn new(config: HeadConfig, weights: Vec<i16>, bias: Vec<i16>) -> Result<Self> {
        let in_ch = config.input_channels;
        if in_ch == 0 || weights.len() % in_ch != 0 {
            return Err(ModelError::invalid_shape(
                config.name,
                format!("weights length {} not divisible by IN_CH={in_ch}", weights.len()),
            ));
        }
        let out_ch = weights.len() / in_ch;
        if out_ch != config.output_channels {
            return Err(ModelError::invalid_shape(
                config.name,
                format!("expected OUT_CH={}, got {out_ch}", config.output_channels),
            ));
        }
        if bias.len() != out_ch {
            return Err(ModelError::invalid_shape(
                config.name,
                format!("bias length {} does not match OUT_CH={out_ch}", bias.len()),
            ));
        }
        Ok(Self { config, weights, bias })
    }

    /// Split a packed row blob back into weights and biases.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidShape`] if `config` is degenerate or `fc`
    /// is not exactly one packed matrix for it.
    pub fn from_packed(config: HeadConfig, fc: &[i16]) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ModelError::invalid_shape(config.name, e.reason))?;
        if fc.len() != config.weight_len() {
            return Err(ModelError::invalid_shape(
                config.name,
                format!("packed length {} != {}", fc.len(), config.weight_len()),
            ));
        }
        let mut weights = Vec::with_capacity(config.output_channels * config.input_channels);
        let mut bias = Vec::with_capacity(config.output_channels);
        for row in fc.chunks_exact(config.row_stride()) {
            bias.push(row[0]);
            weights.extend_from_slice(&row[1..]);
        }
        Ok(Self { config, weights, bias })
    }

    /// Head configuration.
    pub const fn config(&self) -> &HeadConfig {
        &self.config
    }

    /// Weight matrix, row-major `out × in`.
    pub fn weights(&self) -> &[i16] {
        &self.weights
    }

    /// Bias vector.
    pub fn bias(&self) -> &[i16] {
        &self.bias
    }

    /// Interleave into `[bias, w…]` rows.
    pub fn packed(&self) -> Vec<i16> {
        let mut fc = Vec::with_capacity(self.config.weight_len());
        let rows = self.weights.chunks_exact(self.config.input_channels);
        for (b, row) in self.bias.iter().zip(rows) {
            fc.push(*b);
            fc.extend_from_slice(row);
        }
        fc
    }

    /// Write the packed blob and its companions into `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if any file cannot be written.
    pub fn write_artifacts(&self, dir: impl AsRef<Path>) -> Result<PackedFiles> {
        let dir = dir.as_ref();
        let name = self.config.name;
        let files = PackedFiles {
            fc: dir.join(format!("{name}_fc_q15.bin")),
            weights: dir.join(format!("{name}_weights_q15.bin")),
            bias: dir.join(format!("{name}_bias_q15.bin")),
            plio: dir.join(format!("{name}_w.txt")),
        };
        let fc = self.packed();
        write_q15_bin(&files.weights, &self.weights)?;
        write_q15_bin(&files.bias, &self.bias)?;
        write_q15_bin(&files.fc, &fc)?;
        write_plio_txt(&files.plio, &fc)?;
        info!(
            "Packed {name}: {}×{} + bias → {} samples",
            self.config.output_channels,
            self.config.input_channels,
            fc.len()
        );
        Ok(files)
    }
}

/// Build the packed `[bias, w…]` row layout for one head.
///
/// # Errors
///
/// See [`FcWeights::new`].
pub fn pack_fc(config: &HeadConfig, weights: &[i16], bias: &[i16]) -> Result<Vec<i16>> {
    Ok(FcWeights::new(*config, weights.to_vec(), bias.to_vec())?.packed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::load_q15_bin;
    use posehead_chip::FLAG;

    fn small() -> HeadConfig {
        HeadConfig::new("small", 3, 2, 6, 0)
    }

    #[test]
    fn rows_interleave_bias_first() {
        let fc = pack_fc(&small(), &[1, 2, 3, 4, 5, 6], &[-1, -2]).unwrap();
        assert_eq!(fc, vec![-1, 1, 2, 3, -2, 4, 5, 6]);
    }

    #[test]
    fn packing_inverts() {
        let w = FcWeights::new(small(), vec![1, 2, 3, 4, 5, 6], vec![9, 8]).unwrap();
        assert_eq!(FcWeights::from_packed(small(), &w.packed()).unwrap(), w);
        assert!(FcWeights::from_packed(small(), &[0; 7]).is_err());
    }

    #[test]
    fn packed_blob_without_inputs_is_rejected() {
        // Two bias-only rows match the length check of a zero-input head.
        let empty = HeadConfig::new("empty", 0, 2, 0, 0);
        let err = FcWeights::from_packed(empty, &[5, 6]).unwrap_err();
        assert!(
            matches!(err, ModelError::InvalidShape { ref head, .. } if head == "empty"),
            "{err}"
        );
    }

    #[test]
    fn shape_errors() {
        let err = pack_fc(&small(), &[1, 2, 3, 4], &[0]).unwrap_err();
        assert!(err.to_string().contains("not divisible"), "{err}");
        let err = pack_fc(&small(), &[0; 9], &[0; 3]).unwrap_err();
        assert!(err.to_string().contains("expected OUT_CH=2"), "{err}");
        let err = pack_fc(&small(), &[0; 6], &[0; 3]).unwrap_err();
        assert!(err.to_string().contains("bias length 3"), "{err}");
    }

    #[test]
    fn writes_flag_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let weights: Vec<i16> = (0..1152).map(|i| (i % 7) as i16 - 3).collect();
        let fc = FcWeights::new(FLAG, weights.clone(), vec![42]).unwrap();
        let files = fc.write_artifacts(dir.path()).unwrap();

        assert_eq!(files.fc.file_name().unwrap(), "flag_fc_q15.bin");
        let packed = load_q15_bin(&files.fc, FLAG.weight_len()).unwrap();
        assert_eq!(packed[0], 42);
        assert_eq!(&packed[1..], weights.as_slice());
        assert_eq!(load_q15_bin(&files.bias, 1).unwrap(), vec![42]);
        let plio = std::fs::read_to_string(&files.plio).unwrap();
        assert_eq!(plio.lines().count(), 145);
    }
}
