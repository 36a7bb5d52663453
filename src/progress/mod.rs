//! Progress reporting between workers and the presenter.
//!
//! Workers only ever push [`BatchEvent`]s; the single consumer on the
//! presentation side owns every state update. The queue is unbounded so a
//! slow presenter never blocks a worker and no event is lost while the
//! receiver is alive. Events sent by one task arrive in the order they were
//! sent; there is no ordering across tasks.

use crate::metrics::Metrics;
use crate::models::{BatchSummary, JobKind, ProcessingResult, ProgressEvent, ProgressKey, TaskId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the presenter hears about a running batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    BatchStarted { kind: JobKind, total: usize },
    Progress(ProgressEvent),
    TaskFinished(ProcessingResult),
    BatchFinished(BatchSummary),
}

/// Create a connected reporter/receiver pair
pub fn progress_channel() -> (ProgressReporter, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressReporter { tx, metrics: None },
        ProgressReceiver { rx },
    )
}

/// Producer side, cloned into every task
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<BatchEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl ProgressReporter {
    /// Count published and dropped events in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn send(&self, event: BatchEvent) {
        let sent = self.tx.send(event).is_ok();
        if let Some(metrics) = &self.metrics {
            if sent {
                metrics.record_progress_event();
            } else {
                metrics.record_progress_dropped();
            }
        }
        if !sent {
            // Presenter went away; the batch result is still returned
            tracing::trace!("Progress receiver closed, event dropped");
        }
    }

    pub fn progress(&self, key: ProgressKey, value: u8) {
        self.send(BatchEvent::Progress(ProgressEvent::new(key, value)));
    }

    /// Handle bound to one task
    pub fn for_task(&self, task_id: TaskId) -> TaskProgress {
        TaskProgress {
            reporter: self.clone(),
            task_id,
        }
    }
}

/// Per-task progress handle
#[derive(Debug, Clone)]
pub struct TaskProgress {
    reporter: ProgressReporter,
    task_id: TaskId,
}

impl TaskProgress {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn report(&self, value: u8) {
        self.reporter.progress(ProgressKey::Task(self.task_id), value);
    }
}

/// Consumer side, owned by the presenter
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<BatchEvent>,
}

impl ProgressReceiver {
    /// Every event queued so far, without waiting
    pub fn drain(&mut self) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Next event; `None` once every reporter is dropped and the queue is empty
    pub async fn recv(&mut self) -> Option<BatchEvent> {
        self.rx.recv().await
    }
}
