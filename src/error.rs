//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = TbpeError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during configuration, IO, segmentation or training.
#[derive(Debug, Error)]
pub enum TbpeError {
    /// Training or pre-tokenization configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Word pattern failed to compile or to match.
    #[error("segmentation error: {0}")]
    Segmentation(String),
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Merge bookkeeping diverged from the word table; training cannot continue.
    #[error("merge invariant violated: {0}")]
    InvariantViolation(String),
    /// Catch-all variant for states that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<fancy_regex::Error> for TbpeError {
    fn from(err: fancy_regex::Error) -> Self {
        Self::Segmentation(err.to_string())
    }
}

impl From<serde_json::Error> for TbpeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl TbpeError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }
}
