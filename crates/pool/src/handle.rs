//! Write-once, read-many task outcome slots.

use tokio::sync::watch;

use crate::error::TaskError;

type Slot<T> = Option<Result<T, TaskError>>;

/// Completion handle for a submitted task.
///
/// The outcome is written exactly once by the worker that ran the task. Any
/// number of clones may read it, either by blocking with [`wait`](Self::wait)
/// or by polling with [`peek`](Self::peek). A task that is dropped without
/// running (pool aborted) resolves to [`TaskError::Aborted`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// Writer half of a handle, owned by the queued job.
pub(crate) struct OutcomeWriter<T> {
    tx: watch::Sender<Slot<T>>,
}

impl<T> OutcomeWriter<T> {
    /// Publish the outcome. Consumes the writer so it can only happen once.
    pub(crate) fn complete(self, outcome: Result<T, TaskError>) {
        // send_replace stores the value even when every reader is gone.
        self.tx.send_replace(Some(outcome));
    }
}

/// Create a connected writer/handle pair.
pub(crate) fn outcome_slot<T>() -> (OutcomeWriter<T>, TaskHandle<T>) {
    let (tx, rx) = watch::channel(None);
    (OutcomeWriter { tx }, TaskHandle { rx })
}

impl<T: Clone> TaskHandle<T> {
    /// Block until the task outcome is available.
    ///
    /// # Returns
    /// The task's value, or the captured failure.
    pub async fn wait(&self) -> Result<T, TaskError> {
        let mut rx: watch::Receiver<Slot<T>> = self.rx.clone();
        let outcome: Slot<T> = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(TaskError::Aborted))
    }

    /// Return the outcome if the task has finished, without blocking.
    pub fn peek(&self) -> Option<Result<T, TaskError>> {
        if let Some(outcome) = self.rx.borrow().as_ref() {
            return Some(outcome.clone());
        }
        // Writer dropped without publishing.
        if self.rx.has_changed().is_err() {
            return Some(Err(TaskError::Aborted));
        }
        None
    }

    /// Whether an outcome (including an abort) is available.
    pub fn is_finished(&self) -> bool {
        self.peek().is_some()
    }
}
