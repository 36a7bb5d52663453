// Batch metrics
//
// Lock-free counters updated by workers and logged once the run is over

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every task of a run.
///
/// Workers only ever add to these, so relaxed atomics are enough; the
/// summary is read after all tasks have joined.
#[derive(Debug)]
pub struct Metrics {
    /// Tasks that produced their output
    pub tasks_succeeded: AtomicUsize,

    /// Tasks that ended with a Failure result (including planning rejections)
    pub tasks_failed: AtomicUsize,

    /// Tasks stopped by a cancellation request
    pub tasks_cancelled: AtomicUsize,

    /// Sum of per-task wall-clock time in milliseconds
    pub total_processing_time_ms: AtomicU64,

    /// Progress events published to the presenter
    pub progress_events: AtomicU64,

    /// Progress events dropped because the presenter was gone
    pub progress_events_dropped: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_succeeded: AtomicUsize::new(0),
            tasks_failed: AtomicUsize::new(0),
            tasks_cancelled: AtomicUsize::new(0),
            total_processing_time_ms: AtomicU64::new(0),
            progress_events: AtomicU64::new(0),
            progress_events_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_succeeded(&self, duration: Duration) {
        self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn record_task_failed(&self, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn record_task_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        self.total_processing_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_progress_event(&self) {
        self.progress_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_dropped(&self) {
        self.progress_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wall-clock time per finished task in milliseconds
    pub fn avg_task_time_ms(&self) -> f64 {
        let total = self.total_processing_time_ms.load(Ordering::Relaxed);
        let count = self.tasks_succeeded.load(Ordering::Relaxed)
            + self.tasks_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Batch Metrics Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} succeeded, {} failed ({} cancelled)",
            self.tasks_succeeded.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.tasks_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Processing time: {:.2}s (avg: {:.2}ms per task)",
            self.total_processing_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_task_time_ms()
        );
        tracing::info!(
            "Progress events: {}, dropped: {}",
            self.progress_events.load(Ordering::Relaxed),
            self.progress_events_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
