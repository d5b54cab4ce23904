//! Bounded-concurrency task execution for dicom-transfer.
//!
//! This crate provides the concurrency primitives the transfer orchestrators are
//! built on:
//!
//! - **WorkerPool** - a fixed number of workers draining a FIFO queue, with an
//!   optional queue bound that applies backpressure to submitters
//! - **TaskHandle** - a write-once, read-many slot for one task's outcome
//! - **Aggregation** - helpers that wait for every handle and reduce outcomes
//!   without short-circuiting
//!
//! # Example
//!
//! ```ignore
//! use dicom_transfer_pool::{PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::new("uploads", 4))?;
//! let handle = pool.submit(async { 2 + 2 }).await?;
//! pool.shutdown().await;
//! assert_eq!(handle.wait().await?, 4);
//! ```

mod aggregate;
mod config;
mod error;
mod handle;
mod pool;
mod telemetry;

pub use aggregate::{all_succeeded, join_all, Aggregate};
pub use config::PoolConfig;
pub use error::{PoolError, TaskError};
pub use handle::TaskHandle;
pub use pool::WorkerPool;
pub use telemetry::{NoOpTelemetry, PoolTelemetry, TracingTelemetry};
