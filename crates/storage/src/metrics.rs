//! Per-run transfer metrics.
//!
//! A `TransferMetrics` is created for each run and shared by `Arc` with every
//! task of that run. Operation counts, failures and bytes are Prometheus
//! counters in a registry owned by the instance, labelled by operation name.
//! The active span of each operation (first start to last end) is tracked
//! alongside for throughput.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const TOTAL_EXECUTION: &str = "Total Execution";
pub const OBJECT_UPLOAD: &str = "S3 Upload";
pub const OBJECT_DOWNLOAD: &str = "S3 Download";
pub const METADATA_WRITE: &str = "Metadata Write";

const OPERATION_LABEL: &str = "operation";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Accumulated figures for one named operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMetrics {
    pub count: u64,
    pub failures: u64,
    pub bytes: u64,
    first_start: Instant,
    last_end: Instant,
}

impl OperationMetrics {
    /// Wall-clock time from the first start to the last completion.
    pub fn span(&self) -> Duration {
        self.last_end.saturating_duration_since(self.first_start)
    }

    /// Throughput over the span, in MB/s. `None` without bytes or time.
    pub fn megabytes_per_second(&self) -> Option<f64> {
        let seconds: f64 = self.span().as_secs_f64();
        if self.bytes == 0 || seconds <= 0.0 {
            return None;
        }
        Some(self.bytes as f64 / BYTES_PER_MB / seconds)
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    first_start: Instant,
    last_end: Instant,
}

/// Explicit observability context for one run.
pub struct TransferMetrics {
    registry: Registry,
    operations_total: IntCounterVec,
    failures_total: IntCounterVec,
    bytes_total: IntCounterVec,
    spans: Mutex<BTreeMap<String, Span>>,
}

impl fmt::Debug for TransferMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferMetrics")
            .field("operations", &self.operation_names())
            .finish_non_exhaustive()
    }
}

impl TransferMetrics {
    /// Create a metrics context with its own registry.
    ///
    /// # Errors
    /// Returns an error if a collector cannot be created or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry: Registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "dicom_transfer_operations_total",
                "Completed operations by name",
            ),
            &[OPERATION_LABEL],
        )?;
        let failures_total = IntCounterVec::new(
            Opts::new(
                "dicom_transfer_operation_failures_total",
                "Failed operations by name",
            ),
            &[OPERATION_LABEL],
        )?;
        let bytes_total = IntCounterVec::new(
            Opts::new(
                "dicom_transfer_bytes_total",
                "Bytes moved by operation name",
            ),
            &[OPERATION_LABEL],
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(bytes_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            failures_total,
            bytes_total,
            spans: Mutex::new(BTreeMap::new()),
        })
    }

    /// Record one completed operation.
    ///
    /// # Arguments
    /// * `name` - Operation name, e.g. [`OBJECT_UPLOAD`]
    /// * `started` - When the operation began
    /// * `bytes` - Bytes moved by the operation
    /// * `succeeded` - Whether it succeeded
    pub fn record(&self, name: &str, started: Instant, bytes: u64, succeeded: bool) {
        let ended: Instant = Instant::now();
        self.operations_total.with_label_values(&[name]).inc();
        self.bytes_total.with_label_values(&[name]).inc_by(bytes);
        if !succeeded {
            self.failures_total.with_label_values(&[name]).inc();
        }

        let mut spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        let span: &mut Span = spans.entry(name.to_string()).or_insert(Span {
            first_start: started,
            last_end: ended,
        });
        span.first_start = span.first_start.min(started);
        span.last_end = span.last_end.max(ended);
    }

    /// Metrics of one operation, if it ran.
    pub fn get(&self, name: &str) -> Option<OperationMetrics> {
        let span: Span = self
            .spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()?;
        Some(self.operation(name, span))
    }

    /// Copy of every operation's metrics, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, OperationMetrics> {
        let spans: BTreeMap<String, Span> = self
            .spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        spans
            .into_iter()
            .map(|(name, span)| {
                let metrics: OperationMetrics = self.operation(&name, span);
                (name, metrics)
            })
            .collect()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer: Vec<u8> = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Human-readable performance report.
    pub fn report(&self) -> String {
        let mut out: String = String::from("=== PERFORMANCE REPORT ===\n");
        for (name, metrics) in self.snapshot() {
            let _ = writeln!(out, "Operation: {name}");
            let _ = writeln!(out, "  Count: {}", metrics.count);
            if metrics.failures > 0 {
                let _ = writeln!(out, "  Failures: {}", metrics.failures);
            }
            let _ = writeln!(out, "  Duration: {} ms", metrics.span().as_millis());
            if let Some(rate) = metrics.megabytes_per_second() {
                let _ = writeln!(
                    out,
                    "  Data transferred: {:.2} MB",
                    metrics.bytes as f64 / BYTES_PER_MB
                );
                let _ = writeln!(out, "  Transfer rate: {rate:.2} MB/s");
            }
            out.push('\n');
        }
        out
    }

    fn operation(&self, name: &str, span: Span) -> OperationMetrics {
        OperationMetrics {
            count: self.operations_total.with_label_values(&[name]).get(),
            failures: self.failures_total.with_label_values(&[name]).get(),
            bytes: self.bytes_total.with_label_values(&[name]).get(),
            first_start: span.first_start,
            last_end: span.last_end,
        }
    }

    fn operation_names(&self) -> Vec<String> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
