// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for pose-head model artifacts

use std::path::PathBuf;

use posehead_driver::PoseHeadError;
use thiserror::Error;

/// Result type alias for model artifact operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while loading, packing or checking artifacts
#[derive(Debug, Error)]
pub enum ModelError {
    /// Artifact file does not exist
    #[error("Artifact not found: {}", path.display())]
    FileNotFound {
        /// Path that was attempted
        path: PathBuf,
    },

    /// Artifact file holds fewer bytes than the head requires
    #[error("Artifact too small: {} has {have} bytes, need {need}", path.display())]
    FileTooSmall {
        /// Path of the short file
        path: PathBuf,
        /// Bytes present
        have: usize,
        /// Bytes required
        need: usize,
    },

    /// Text stream could not be parsed
    #[error("Failed to parse {}: {reason}", path.display())]
    ParseError {
        /// Stream path (or `<memory>`)
        path: PathBuf,
        /// Reason for failure
        reason: String,
    },

    /// Array lengths do not form a valid head
    #[error("Invalid shape for {head}: {reason}")]
    InvalidShape {
        /// Head name
        head: String,
        /// Reason for failure
        reason: String,
    },

    /// A padding sample of a completed pass was not zero
    #[error("Padding sample {index} of {head} is {value}, expected 0")]
    DirtyPadding {
        /// Head name
        head: &'static str,
        /// Sample index within the frame
        index: usize,
        /// Offending value
        value: i16,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Overlay pass failed
    #[error("Overlay pass failed: {0}")]
    Runtime(#[from] PoseHeadError),
}

impl ModelError {
    /// Create a parse error
    pub fn parse_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid shape error
    pub fn invalid_shape(head: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            head: head.into(),
            reason: reason.into(),
        }
    }
}
