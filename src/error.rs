//! Error types for pipeline execution.

use thiserror::Error;

use crate::pool::Backend;

/// Errors that can occur while building or running a filter pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown filter step '{0}'")]
    InvalidStep(String),

    #[error("Filter step '{step}' requires parameter '{param}'")]
    MissingParameter { step: String, param: &'static str },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid convolution kernel: {0}")]
    InvalidKernel(String),

    #[error("Worker failed{}: {message}", fmt_index(.index))]
    WorkerFailure {
        index: Option<usize>,
        message: String,
    },

    #[error("Failed to build {backend} pool with {workers} workers: {reason}")]
    PoolRebuild {
        backend: Backend,
        workers: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" on chunk {}", i),
        None => String::new(),
    }
}

impl PipelineError {
    pub(crate) fn worker(index: usize, message: impl Into<String>) -> Self {
        PipelineError::WorkerFailure {
            index: Some(index),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
