// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for pose-head runtime operations

use posehead_chip::HeadConfigError;
use thiserror::Error;

/// Result type alias for pose-head runtime operations
pub type Result<T> = std::result::Result<T, PoseHeadError>;

/// Direction of a transfer that hit a closed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFault {
    /// Reader found the stream empty and its writer gone
    Underflow,
    /// Writer found the stream's reader gone
    Overflow,
}

impl std::fmt::Display for StreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Underflow => write!(f, "underflow"),
            Self::Overflow => write!(f, "overflow"),
        }
    }
}

/// Errors that can occur while binding or running an inference pass
#[derive(Debug, Error)]
pub enum PoseHeadError {
    /// Head configuration cannot be instantiated
    #[error(transparent)]
    InvalidHead(#[from] HeadConfigError),

    /// Declared channel length does not match the bound backing buffer
    #[error("Config mismatch on {head}.{channel}: buffer holds {actual} samples, head expects {expected}")]
    ConfigMismatch {
        /// Head name
        head: String,
        /// Channel name (feature, weights, output)
        channel: &'static str,
        /// Samples the head configuration requires
        expected: usize,
        /// Samples the buffer actually holds
        actual: usize,
    },

    /// Transducer asked to touch words outside its memory region
    #[error("Bounds violation in {op}: words [{start}, {start}+{count}) outside region of {len} words")]
    BoundsViolation {
        /// Transducer name
        op: &'static str,
        /// First word address
        start: usize,
        /// Words requested
        count: usize,
        /// Region length in words
        len: usize,
    },

    /// Peer end of a stream went away mid-transfer
    #[error("Stream {fault} on '{channel}' after {moved} words")]
    StreamClosed {
        /// Channel name
        channel: String,
        /// Underflow or overflow
        fault: StreamFault,
        /// Words moved on this end before the fault
        moved: usize,
    },

    /// Blocking channel operation exceeded the pass deadline
    #[error("Timeout on '{channel}' after {waited_ms}ms")]
    Timeout {
        /// Channel name
        channel: String,
        /// Time spent in the pass when the deadline hit
        waited_ms: u64,
    },

    /// A pass is already running on this graph
    #[error("Inference pass already in progress")]
    PassInProgress,

    /// A pipeline task panicked
    #[error("Task '{task}' panicked")]
    TaskPanicked {
        /// Task name
        task: String,
    },
}

impl PoseHeadError {
    /// Create a config mismatch error
    pub fn config_mismatch(
        head: impl Into<String>,
        channel: &'static str,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::ConfigMismatch {
            head: head.into(),
            channel,
            expected,
            actual,
        }
    }

    /// Create a stream closed error
    pub fn stream_closed(channel: impl Into<String>, fault: StreamFault, moved: usize) -> Self {
        Self::StreamClosed {
            channel: channel.into(),
            fault,
            moved,
        }
    }

    /// Create a timeout error
    pub fn timeout(channel: impl Into<String>, waited_ms: u64) -> Self {
        Self::Timeout {
            channel: channel.into(),
            waited_ms,
        }
    }

    /// True if this error is a consequence of another task failing first.
    ///
    /// A task that dies drops its channel ends, so its peers observe a
    /// closed stream. Those are reported only when nothing else failed.
    pub const fn is_secondary(&self) -> bool {
        matches!(self, Self::StreamClosed { .. })
    }
}
