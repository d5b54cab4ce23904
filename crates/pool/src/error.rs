//! Error types for pool operations.

use thiserror::Error;

/// Errors returned by pool lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Submission attempted after shutdown (or abort) was initiated.
    #[error("Pool '{pool}' is closed to new submissions")]
    Closed { pool: String },

    /// Invalid pool configuration.
    #[error("Invalid pool configuration: {message}")]
    InvalidConfig { message: String },

    /// The pool was created outside of a Tokio runtime.
    #[error("Worker pool requires a running Tokio runtime")]
    NoRuntime,
}

/// Failed outcome of a single task, delivered through its handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task body panicked; the worker survived.
    #[error("Task panicked: {message}")]
    Panicked { message: String },

    /// The task was dropped before producing an outcome (pool aborted).
    #[error("Task was aborted before completion")]
    Aborted,
}
