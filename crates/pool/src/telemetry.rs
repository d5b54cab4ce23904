//! Hooks for observing task execution inside a pool.

use std::time::Duration;

/// Observer notified as workers pick up and finish tasks.
///
/// All methods default to no-ops so implementors override only what they need.
pub trait PoolTelemetry: Send + Sync {
    /// A worker dequeued a task and is about to run it.
    fn on_task_started(&self, _pool: &str, _worker_id: usize) {}

    /// A task ran to completion.
    fn on_task_finished(&self, _pool: &str, _worker_id: usize, _elapsed: Duration) {}

    /// A task panicked.
    fn on_task_failed(&self, _pool: &str, _worker_id: usize, _elapsed: Duration, _message: &str) {}
}

/// Telemetry that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTelemetry;

impl PoolTelemetry for NoOpTelemetry {}

/// Telemetry that emits `tracing` events. Used by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl PoolTelemetry for TracingTelemetry {
    fn on_task_started(&self, pool: &str, worker_id: usize) {
        tracing::trace!(pool, worker_id, "task started");
    }

    fn on_task_finished(&self, pool: &str, worker_id: usize, elapsed: Duration) {
        tracing::trace!(pool, worker_id, elapsed_ms = elapsed.as_millis() as u64, "task finished");
    }

    fn on_task_failed(&self, pool: &str, worker_id: usize, elapsed: Duration, message: &str) {
        tracing::error!(
            pool,
            worker_id,
            elapsed_ms = elapsed.as_millis() as u64,
            panic = message,
            "task panicked"
        );
    }
}
