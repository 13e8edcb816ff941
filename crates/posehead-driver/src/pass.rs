// SPDX-License-Identifier: AGPL-3.0-only

//! Pass configuration, host buffers and pass metrics

use std::time::Duration;

use posehead_chip::word::{pack_samples, unpack_samples, words_for};
use posehead_chip::Word;

use crate::kernel::HeadReport;
use crate::stream::DEFAULT_DEPTH;

/// Default pass deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-pass runtime knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassConfig {
    /// Deadline for the whole pass; every blocking channel operation gives
    /// up when it expires
    pub timeout: Duration,

    /// Channel capacity in words
    pub depth: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            depth: DEFAULT_DEPTH,
        }
    }
}

impl PassConfig {
    /// Override the pass deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the channel depth.
    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }
}

/// Word-addressed host memory region holding a run of Q15 samples.
///
/// `words.len()` is always `words_for(samples)`; the tail lanes of the
/// last word are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBuffer {
    words: Vec<Word>,
    samples: usize,
}

impl HostBuffer {
    /// Pack `samples` into a new region.
    #[must_use]
    pub fn from_samples(samples: &[i16]) -> Self {
        Self {
            words: pack_samples(samples),
            samples: samples.len(),
        }
    }

    /// Zero-filled region large enough for `samples` samples.
    #[must_use]
    pub fn zeroed(samples: usize) -> Self {
        Self {
            words: vec![0; words_for(samples)],
            samples,
        }
    }

    /// Sample count.
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Backing words.
    #[must_use]
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Mutable backing words.
    pub fn words_mut(&mut self) -> &mut [Word] {
        &mut self.words
    }

    /// Unpack the region into samples.
    #[must_use]
    pub fn to_samples(&self) -> Vec<i16> {
        unpack_samples(&self.words, self.samples)
    }
}

/// Host memory bound to one head.
#[derive(Debug, Clone)]
pub struct HeadBuffers {
    /// Packed FC matrix (`[bias, w…]` rows)
    pub weights: HostBuffer,
    /// Padded output frame, written by the pass
    pub output: HostBuffer,
}

/// Host memory bound to a whole graph for one pass.
#[derive(Debug, Clone)]
pub struct PassBuffers {
    /// Feature vector shared by every head
    pub feature: HostBuffer,
    /// Per-head buffers, in graph order
    pub heads: Vec<HeadBuffers>,
}

/// Outcome of a successful pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Per-head kernel reports, in graph order
    pub heads: Vec<HeadReport>,
    /// Time spent validating buffer bindings
    pub bind_duration: Duration,
    /// Wall time of the whole pass
    pub total_duration: Duration,
}

impl PassReport {
    /// Words moved across all channels.
    #[must_use]
    pub fn words_moved(&self) -> usize {
        self.heads
            .iter()
            .map(|h| {
                words_for(h.feature_samples)
                    + words_for(h.weight_samples)
                    + words_for(h.output_samples)
            })
            .sum()
    }

    /// Passes per second at this latency.
    #[must_use]
    pub fn throughput_ips(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        1.0 / secs
    }

    /// Pass latency in microseconds.
    #[must_use]
    pub fn latency_us(&self) -> f64 {
        self.total_duration.as_secs_f64() * 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pass_config() {
        let c = PassConfig::default();
        assert_eq!(c.timeout, Duration::from_secs(5));
        assert_eq!(c.depth, 1000);
        let c = c.with_depth(2).with_timeout(Duration::from_millis(7));
        assert_eq!((c.depth, c.timeout.as_millis()), (2, 7));
    }

    #[test]
    fn host_buffer_geometry() {
        let b = HostBuffer::from_samples(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(b.samples(), 9);
        assert_eq!(b.words().len(), 2);
        assert_eq!(b.to_samples(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);

        let z = HostBuffer::zeroed(200);
        assert_eq!(z.words().len(), 25);
        assert!(z.to_samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn report_metrics() {
        let report = PassReport {
            heads: vec![HeadReport {
                head: "flag",
                feature_samples: 1152,
                weight_samples: 1153,
                output_samples: 8,
            }],
            bind_duration: Duration::ZERO,
            total_duration: Duration::from_millis(2),
        };
        assert_eq!(report.words_moved(), 144 + 145 + 1);
        assert!((report.latency_us() - 2000.0).abs() < 1e-6);
        assert!((report.throughput_ips() - 500.0).abs() < 1e-6);
    }
}
