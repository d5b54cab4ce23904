//! Pool configuration.

use dicom_transfer_common::DEFAULT_MAX_QUEUE_DEPTH;

use crate::error::PoolError;

/// Configuration for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Name used in logs and errors.
    pub name: String,
    /// Number of workers; at most this many tasks run at once.
    pub workers: usize,
    /// Maximum number of queued (not yet running) tasks.
    /// `None` leaves the queue effectively unbounded.
    pub max_queue_depth: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".into(),
            workers: default_workers(),
            max_queue_depth: Some(DEFAULT_MAX_QUEUE_DEPTH),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the default queue bound.
    ///
    /// # Arguments
    /// * `name` - Pool name for logs
    /// * `workers` - Worker count
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers,
            ..Default::default()
        }
    }

    /// Set the maximum queue depth.
    pub fn with_max_queue_depth(mut self, max_queue_depth: Option<usize>) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Check the configuration invariants.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for zero workers or a zero queue bound.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig {
                message: format!("pool '{}' needs at least one worker", self.name),
            });
        }
        if self.max_queue_depth == Some(0) {
            return Err(PoolError::InvalidConfig {
                message: format!("pool '{}' queue depth must be at least 1", self.name),
            });
        }
        Ok(())
    }
}

/// Number of workers used when none is configured: the available parallelism.
pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
