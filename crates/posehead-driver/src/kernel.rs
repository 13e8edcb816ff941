// SPDX-License-Identifier: AGPL-3.0-only

//! Per-head quantized linear kernel
//!
//! One [`LinearHead`] per head configuration. Each invocation runs three
//! phases over its sample streams:
//!
//! ```text
//! load     feature[0..in]           ← feature stream     (local buffer overwritten)
//! compute  for oc in 0..out:
//!            acc  = bias             ← weight stream
//!            acc += f[ic] × w[ic]    ← weight stream, ic = 0..in
//!            y[oc] = saturate(acc >> shift)
//! pad      y[out..out+pad] = 0       (weight stream untouched)
//! ```
//!
//! The weight matrix is never buffered: it is consumed exactly once,
//! row-major, in lock-step with output production. Exactly
//! `output_channels × (1 + input_channels)` weight samples are read per
//! invocation; anything left in the stream belongs to the next pass.

use posehead_chip::quant::{mac, requantize};
use posehead_chip::HeadConfig;
use tracing::debug;

use crate::error::{PoseHeadError, Result, StreamFault};
use crate::stream::{SampleReader, SampleWriter};

/// Sequential source of Q15 samples.
pub trait SampleSource {
    /// Read the next sample.
    ///
    /// # Errors
    ///
    /// Returns error if the source is exhausted or its transport fails.
    fn read_sample(&mut self) -> Result<i16>;
}

/// Sequential sink of Q15 samples.
pub trait SampleSink {
    /// Append one sample.
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails.
    fn write_sample(&mut self, sample: i16) -> Result<()>;

    /// Push any buffered partial word. Called once at the end of a frame.
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl SampleSource for SampleReader {
    fn read_sample(&mut self) -> Result<i16> {
        self.read()
    }
}

impl SampleSink for SampleWriter {
    fn write_sample(&mut self, sample: i16) -> Result<()> {
        self.write(sample)
    }

    fn flush(&mut self) -> Result<()> {
        self.finish()
    }
}

impl SampleSink for Vec<i16> {
    fn write_sample(&mut self, sample: i16) -> Result<()> {
        self.push(sample);
        Ok(())
    }
}

/// In-memory sample source with a visible cursor.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    name: &'static str,
    samples: &'a [i16],
    cursor: usize,
}

impl<'a> SliceSource<'a> {
    /// Source over `samples`; `name` labels underflow errors.
    pub const fn new(name: &'static str, samples: &'a [i16]) -> Self {
        Self {
            name,
            samples,
            cursor: 0,
        }
    }

    /// Samples consumed so far.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Samples not yet consumed.
    pub fn remaining(&self) -> &'a [i16] {
        &self.samples[self.cursor..]
    }
}

impl SampleSource for SliceSource<'_> {
    fn read_sample(&mut self) -> Result<i16> {
        let sample = self.samples.get(self.cursor).copied().ok_or_else(|| {
            PoseHeadError::stream_closed(self.name, StreamFault::Underflow, self.cursor)
        })?;
        self.cursor += 1;
        Ok(sample)
    }
}

/// Samples moved by one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadReport {
    /// Head name
    pub head: &'static str,
    /// Feature samples loaded
    pub feature_samples: usize,
    /// Weight samples consumed
    pub weight_samples: usize,
    /// Output samples emitted (computed + pad)
    pub output_samples: usize,
}

/// Fully-connected Q15 kernel for one head.
#[derive(Debug)]
pub struct LinearHead {
    config: HeadConfig,
    features: Vec<i16>,
    invocations: u64,
}

impl LinearHead {
    /// Instantiate a kernel for `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is degenerate.
    pub fn new(config: HeadConfig) -> Result<Self> {
        config.validate()?;
        debug!("LinearHead {config}");
        Ok(Self {
            config,
            features: vec![0; config.input_channels],
            invocations: 0,
        })
    }

    /// Head configuration.
    pub const fn config(&self) -> &HeadConfig {
        &self.config
    }

    /// Completed invocations since construction.
    pub const fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Run one load / compute / pad cycle.
    ///
    /// # Errors
    ///
    /// Returns the first transport error; output emitted before it is
    /// incomplete and must be discarded.
    pub fn run<F, W, O>(
        &mut self,
        features: &mut F,
        weights: &mut W,
        out: &mut O,
    ) -> Result<HeadReport>
    where
        F: SampleSource + ?Sized,
        W: SampleSource + ?Sized,
        O: SampleSink + ?Sized,
    {
        for slot in &mut self.features {
            *slot = features.read_sample()?;
        }

        let mut weight_samples = 0;
        for _ in 0..self.config.output_channels {
            let mut acc = i64::from(weights.read_sample()?);
            for &f in &self.features {
                acc = mac(acc, f, weights.read_sample()?);
            }
            weight_samples += self.config.row_stride();
            out.write_sample(requantize(acc, self.config.shift))?;
        }

        for _ in 0..self.config.pad {
            out.write_sample(0)?;
        }
        out.flush()?;

        self.invocations += 1;
        Ok(HeadReport {
            head: self.config.name,
            feature_samples: self.config.input_channels,
            weight_samples,
            output_samples: self.config.frame_len(),
        })
    }
}

/// Compute one head's padded output frame directly from in-memory slices.
///
/// # Errors
///
/// Returns error if the configuration is degenerate or a slice length does
/// not match it.
pub fn reference_forward(
    config: &HeadConfig,
    features: &[i16],
    weights: &[i16],
) -> Result<Vec<i16>> {
    if features.len() != config.input_channels {
        return Err(PoseHeadError::config_mismatch(
            config.name,
            "feature",
            config.input_channels,
            features.len(),
        ));
    }
    if weights.len() != config.weight_len() {
        return Err(PoseHeadError::config_mismatch(
            config.name,
            "weights",
            config.weight_len(),
            weights.len(),
        ));
    }
    let mut kernel = LinearHead::new(*config)?;
    let mut out = Vec::with_capacity(config.frame_len());
    kernel.run(
        &mut SliceSource::new("feature", features),
        &mut SliceSource::new("weights", weights),
        &mut out,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use posehead_chip::quant::saturate_q15;

    fn tiny(out: usize, pad: usize, shift: u32) -> HeadConfig {
        HeadConfig::new("tiny", 4, out, pad, shift)
    }

    /// Deterministic pseudo-random samples covering the full i16 range.
    fn samples(seed: u64, n: usize) -> Vec<i16> {
        let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                #[allow(clippy::cast_possible_truncation)]
                let s = (x >> 48) as u16 as i16;
                s
            })
            .collect()
    }

    #[test]
    fn single_row_scenario() {
        let y = reference_forward(&tiny(1, 7, 0), &[1, 2, 3, 4], &[10, 1, 1, 1, 1]).unwrap();
        assert_eq!(y, vec![20, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn matches_exact_formula() {
        let config = HeadConfig::new("rand", 37, 9, 3, 15);
        for seed in 1..6 {
            let f = samples(seed, config.input_channels);
            let w = samples(seed + 100, config.weight_len());
            let y = reference_forward(&config, &f, &w).unwrap();
            assert_eq!(y.len(), config.frame_len());
            for (oc, row) in w.chunks(config.row_stride()).enumerate() {
                let exact: i64 = i64::from(row[0])
                    + f.iter()
                        .zip(&row[1..])
                        .map(|(&a, &b)| i64::from(a) * i64::from(b))
                        .sum::<i64>();
                assert_eq!(y[oc], saturate_q15(exact >> config.shift), "seed {seed} oc {oc}");
            }
            assert!(y[config.output_channels..].iter().all(|&p| p == 0));
        }
    }

    #[test]
    fn saturates_both_ends() {
        // Two rows driving the accumulator far past either rail.
        let f = [i16::MAX; 4];
        let w = [
            0,
            i16::MAX,
            i16::MAX,
            i16::MAX,
            i16::MAX,
            0,
            i16::MIN,
            i16::MIN,
            i16::MIN,
            i16::MIN,
        ];
        let y = reference_forward(&tiny(2, 0, 0), &f, &w).unwrap();
        assert_eq!(y, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn zero_in_zero_out() {
        let config = HeadConfig::new("zero", 16, 5, 3, 15);
        let y = reference_forward(&config, &[0; 16], &vec![0; config.weight_len()]).unwrap();
        assert_eq!(y, vec![0; 8]);
    }

    #[test]
    fn consumes_exactly_one_matrix() {
        let config = tiny(2, 2, 0);
        let mut stream: Vec<i16> = vec![1; config.weight_len()];
        stream.extend([0x7EAD, 0x7EEF]);
        let mut weights = SliceSource::new("weights", &stream);
        let mut out = Vec::new();
        let report = LinearHead::new(config)
            .unwrap()
            .run(&mut SliceSource::new("feature", &[1, 1, 1, 1]), &mut weights, &mut out)
            .unwrap();
        assert_eq!(weights.cursor(), config.weight_len());
        assert_eq!(weights.remaining(), &[0x7EAD, 0x7EEF]);
        assert_eq!(report.weight_samples, 10);
        assert_eq!(report.output_samples, 4);
        assert_eq!(out, vec![5, 5, 0, 0]);
    }

    #[test]
    fn feature_buffer_is_overwritten_each_pass() {
        let config = tiny(1, 0, 0);
        let mut kernel = LinearHead::new(config).unwrap();
        let w = [0, 1, 1, 1, 1];
        for (f, expected) in [([1, 1, 1, 1], 4), ([2, 0, 0, 0], 2)] {
            let mut out = Vec::new();
            let mut features = SliceSource::new("feature", &f);
            kernel.run(&mut features, &mut SliceSource::new("weights", &w), &mut out).unwrap();
            assert_eq!(out, vec![expected]);
        }
        assert_eq!(kernel.invocations(), 2);
    }

    #[test]
    fn short_weight_stream_is_an_underflow() {
        let mut kernel = LinearHead::new(tiny(2, 0, 0)).unwrap();
        let mut out = Vec::new();
        let err = kernel
            .run(
                &mut SliceSource::new("feature", &[1, 2, 3, 4]),
                &mut SliceSource::new("weights", &[0; 7]),
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, PoseHeadError::StreamClosed { moved: 7, .. }));
        assert_eq!(out.len(), 1);
        assert_eq!(kernel.invocations(), 0);
    }

    #[test]
    fn reference_forward_checks_lengths() {
        let err = reference_forward(&tiny(1, 0, 0), &[1, 2, 3], &[0; 5]).unwrap_err();
        assert!(matches!(
            err,
            PoseHeadError::ConfigMismatch { channel: "feature", expected: 4, actual: 3, .. }
        ));
        let err = reference_forward(&tiny(1, 0, 0), &[1, 2, 3, 4], &[0; 6]).unwrap_err();
        assert!(matches!(err, PoseHeadError::ConfigMismatch { channel: "weights", .. }));
    }
}
