//! Error taxonomy.
//!
//! Per-task failures ([`TaskError`]) are recorded in the report and never stop
//! a batch. Only [`ProcessError`] aborts an invocation.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} backend unreachable at {endpoint}: {detail}")]
    Unreachable {
        backend: String,
        endpoint: String,
        detail: String,
    },

    #[error("{backend} backend returned HTTP {status}: {detail}")]
    Api {
        backend: String,
        status: u16,
        detail: String,
    },

    #[error("{backend} backend sent an unexpected response: {detail}")]
    MalformedResponse { backend: String, detail: String },
}

/// Why a single task did not produce a splice.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("directive #{ordinal} ({method}) has no generated start/end region")]
    MalformedAnnotation { ordinal: usize, method: String },

    #[error("directive #{ordinal} ({method}) has an empty prompt")]
    EmptyPrompt { ordinal: usize, method: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("backend returned no code for {method}")]
    EmptyGeneration { method: String },

    #[error("markers for {method} (directive #{ordinal}) not found after re-reading the file")]
    MarkerVanished { ordinal: usize, method: String },

    #[error("failed to update {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    /// Skips are directives that never reached the backend.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            TaskError::MalformedAnnotation { .. } | TaskError::EmptyPrompt { .. }
        )
    }
}

/// Failures that end the whole invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to gather context from {path}: {source}")]
    ContextRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no .{extension} files found in {folder}")]
    NoSourceFiles { folder: PathBuf, extension: String },
}
