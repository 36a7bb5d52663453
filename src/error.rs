//! Batch-level error types.
//!
//! [`SetupError`] aborts a batch before any task is submitted. [`TaskError`]
//! is isolated to one file and surfaces as a Failure
//! [`ProcessingResult`](crate::models::ProcessingResult).

use crate::services::{ConversionError, DocumentError, MergeError};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Fatal errors raised while preparing a batch
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot access {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot list {folder}: {reason}")]
    Discovery { folder: Utf8PathBuf, reason: String },

    #[error("Required service unavailable: {0}")]
    ServiceUnavailable(#[source] ConversionError),
}

/// Per-file errors
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Filesystem error on {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ambiguous invoice match for {generated}: {}", .candidates.join(", "))]
    AmbiguousMatch {
        generated: String,
        candidates: Vec<String>,
    },

    #[error("Output name {output_name} is already produced by {claimed_by}")]
    OutputCollision {
        output_name: String,
        claimed_by: String,
    },

    #[error("Replacement rules produce an unusable file name: {0:?}")]
    InvalidOutputName(String),

    #[error("Batch cancelled before {0} completed")]
    Cancelled(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}
