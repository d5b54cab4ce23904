//! Outcome aggregation over many task handles.

use crate::error::TaskError;
use crate::handle::TaskHandle;

/// Logical AND over every outcome.
///
/// Consumes the whole iterator even after a `false`, so side effects of the
/// iterator (such as waiting on handles) are never skipped.
pub fn all_succeeded<I>(outcomes: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    outcomes.into_iter().fold(true, |acc: bool, ok: bool| acc & ok)
}

/// Wait for every handle and collect the outcomes in submission order.
///
/// A failed handle does not stop the remaining handles from being awaited.
pub async fn join_all<T: Clone>(handles: Vec<TaskHandle<T>>) -> Vec<Result<T, TaskError>> {
    let mut outcomes: Vec<Result<T, TaskError>> = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.wait().await);
    }
    outcomes
}

/// Tally of keyed outcomes.
///
/// The result is independent of the order outcomes are recorded in, apart from
/// the order of [`failed`](Self::failed) keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate<K> {
    succeeded: usize,
    failed: Vec<K>,
}

impl<K> Default for Aggregate<K> {
    fn default() -> Self {
        Self {
            succeeded: 0,
            failed: Vec::new(),
        }
    }
}

impl<K> Aggregate<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome.
    pub fn record(&mut self, key: K, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed.push(key);
        }
    }

    /// True when nothing failed (vacuously true when empty).
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Keys of the failed outcomes, in recording order.
    pub fn failed(&self) -> &[K] {
        &self.failed
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub fn into_failed(self) -> Vec<K> {
        self.failed
    }
}

impl<K> Extend<(K, bool)> for Aggregate<K> {
    fn extend<I: IntoIterator<Item = (K, bool)>>(&mut self, iter: I) {
        for (key, ok) in iter {
            self.record(key, ok);
        }
    }
}

impl<K> FromIterator<(K, bool)> for Aggregate<K> {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        let mut aggregate: Aggregate<K> = Aggregate::new();
        aggregate.extend(iter);
        aggregate
    }
}
