//! Error types for docweave.
//!
//! Library crates use [`DocweaveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// One chunk whose analysis failed after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Index of the chunk in the plan.
    pub chunk: usize,
    /// Number of attempts made (first call plus retries).
    pub attempts: u32,
    /// The last error reported by the backend.
    pub message: String,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} after {} attempt(s): {}",
            self.chunk, self.attempts, self.message
        )
    }
}

/// Top-level error type for all docweave operations.
#[derive(Debug, thiserror::Error)]
pub enum DocweaveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transport-level failure talking to the analysis backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// One or more chunks could not be analyzed; the run must not be merged.
    #[error("analysis failed for {} chunk(s): {}", failed.len(), format_failures(failed))]
    ChunkAnalysis { failed: Vec<ChunkFailure> },

    /// Merge was invoked without any partial results.
    #[error("merge requires at least one partial result")]
    EmptyMerge,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocweaveError>;

fn format_failures(failed: &[ChunkFailure]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DocweaveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Chunk indices that failed analysis, if this is a [`DocweaveError::ChunkAnalysis`].
    pub fn failed_chunks(&self) -> Vec<usize> {
        match self {
            Self::ChunkAnalysis { failed } => failed.iter().map(|f| f.chunk).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocweaveError::config("budget must be positive");
        assert_eq!(err.to_string(), "config error: budget must be positive");

        let err = DocweaveError::validation("schema_version 99 not supported");
        assert!(err.to_string().contains("schema_version 99"));
    }

    #[test]
    fn chunk_analysis_names_every_failed_chunk() {
        let err = DocweaveError::ChunkAnalysis {
            failed: vec![
                ChunkFailure {
                    chunk: 1,
                    attempts: 3,
                    message: "timeout".into(),
                },
                ChunkFailure {
                    chunk: 4,
                    attempts: 3,
                    message: "HTTP 500".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("analysis failed for 2 chunk(s)"));
        assert!(text.contains("chunk 1 after 3 attempt(s): timeout"));
        assert!(text.contains("chunk 4"));
        assert_eq!(err.failed_chunks(), vec![1, 4]);
    }
}
