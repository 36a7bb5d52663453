use super::executor::{TaskContext, TaskExecutor};
use super::plan::BatchPlan;
use crate::error::{SetupError, TaskError};
use crate::metrics::Metrics;
use crate::models::{BatchReport, BatchSummary, FileTask, JobKind, ProcessingResult, ProgressKey};
use crate::progress::{BatchEvent, ProgressReporter};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};

/// Fans planned tasks out over a bounded worker pool.
///
/// Every task is spawned up front and waits for a semaphore permit, so a
/// cancellation request reaches queued tasks immediately instead of after
/// the running ones finish. Each planned entry yields exactly one
/// [`ProcessingResult`]; a task error or panic only fails that task.
pub struct BatchOrchestrator {
    executor: TaskExecutor,
    pool_size: usize,
    reporter: ProgressReporter,
    metrics: Arc<Metrics>,
    cancel_rx: watch::Receiver<bool>,
}

impl BatchOrchestrator {
    pub fn new(
        executor: TaskExecutor,
        pool_size: usize,
        reporter: ProgressReporter,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            executor,
            pool_size: pool_size.max(1),
            reporter,
            metrics: Arc::new(Metrics::new()),
            cancel_rx,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run every task of `plan` and collect the results.
    ///
    /// Fails before submitting anything when a combine batch cannot reach
    /// its converter.
    pub async fn run(&self, plan: BatchPlan) -> Result<BatchReport, SetupError> {
        if plan.kind == JobKind::InvoiceMerge && !plan.tasks.is_empty() {
            self.executor
                .converter()
                .ensure_available()
                .await
                .map_err(SetupError::ServiceUnavailable)?;
        }

        let total = plan.total();
        tracing::info!(
            "Starting {} batch: {} tasks, {} rejected, pool size {}",
            plan.kind,
            plan.tasks.len(),
            plan.rejected.len(),
            self.pool_size
        );
        self.reporter.send(BatchEvent::BatchStarted {
            kind: plan.kind,
            total,
        });

        let finisher = Arc::new(Finisher {
            reporter: self.reporter.clone(),
            metrics: Arc::clone(&self.metrics),
            completed: AtomicUsize::new(0),
            total,
        });

        let mut results = Vec::with_capacity(total);
        for rejected in plan.rejected {
            tracing::warn!(
                "{} rejected: {}",
                rejected.source_path,
                rejected.error.as_deref().unwrap_or("unknown error")
            );
            finisher.finish(&rejected);
            results.push(rejected);
        }

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut handles = Vec::with_capacity(plan.tasks.len());

        for task in plan.tasks {
            let ctx = TaskContext::new(self.reporter.for_task(task.id), self.cancel_rx.clone());
            let worker = Worker {
                executor: self.executor.clone(),
                semaphore: Arc::clone(&semaphore),
                cancel_rx: self.cancel_rx.clone(),
                finisher: Arc::clone(&finisher),
            };
            let spawned = task.clone();
            let handle = tokio::spawn(async move { worker.run(spawned, ctx).await });
            handles.push((task, handle));
        }

        for (task, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Task {} ({}) panicked: {}", task.id, task.source_name(), e);
                    let result = ProcessingResult::failure(
                        &task,
                        TaskError::Worker(e.to_string()),
                        Duration::ZERO,
                    );
                    self.reporter.progress(ProgressKey::Task(task.id), 100);
                    finisher.finish(&result);
                    result
                }
            };
            results.push(result);
        }

        let summary = BatchSummary::from_results(&results);
        tracing::info!("{} batch finished: {}", plan.kind, summary);
        self.reporter.send(BatchEvent::BatchFinished(summary));

        Ok(BatchReport {
            kind: plan.kind,
            results,
            unmatched_generated: plan.unmatched_generated,
            unmatched_invoices: plan.unmatched_invoices,
        })
    }
}

/// Publishes a finished entry and the batch progress it implies
struct Finisher {
    reporter: ProgressReporter,
    metrics: Arc<Metrics>,
    completed: AtomicUsize,
    total: usize,
}

impl Finisher {
    fn finish(&self, result: &ProcessingResult) {
        if result.is_success() {
            self.metrics.record_task_succeeded(result.duration);
        } else {
            self.metrics.record_task_failed(result.duration);
        }

        self.reporter.send(BatchEvent::TaskFinished(result.clone()));

        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let percent = (completed * 100 / self.total.max(1)).min(100) as u8;
        self.reporter.progress(ProgressKey::Batch, percent);
    }
}

/// Everything one spawned task owns
struct Worker {
    executor: TaskExecutor,
    semaphore: Arc<Semaphore>,
    cancel_rx: watch::Receiver<bool>,
    finisher: Arc<Finisher>,
}

impl Worker {
    async fn run(mut self, task: FileTask, ctx: TaskContext) -> ProcessingResult {
        let start = Instant::now();
        let outcome = self.process(&task, &ctx).await;
        let duration = start.elapsed();

        let result = match outcome {
            Ok(()) => {
                tracing::info!(
                    "Task {} done: {} -> {} in {:.2}s",
                    task.id,
                    task.source_name(),
                    task.output_name,
                    duration.as_secs_f32()
                );
                ProcessingResult::success(&task, duration)
            }
            Err(e @ TaskError::Cancelled(_)) => {
                tracing::warn!("Task {} cancelled: {}", task.id, task.source_name());
                self.finisher.metrics.record_task_cancelled();
                ProcessingResult::failure(&task, e, duration)
            }
            Err(e) => {
                tracing::error!("Task {} failed: {}: {}", task.id, task.source_name(), e);
                ProcessingResult::failure(&task, e, duration)
            }
        };

        ctx.report(100);
        self.finisher.finish(&result);
        result
    }

    async fn process(&mut self, task: &FileTask, ctx: &TaskContext) -> Result<(), TaskError> {
        let name = task.source_name();
        ctx.check_cancelled(name)?;

        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => {
                permit.map_err(|e| TaskError::Worker(e.to_string()))?
            }
            _ = cancelled(&mut self.cancel_rx) => {
                return Err(TaskError::Cancelled(name.to_string()));
            }
        };
        ctx.check_cancelled(name)?;

        tracing::debug!("Task {} started: {}", task.id, name);
        ctx.report(0);
        self.executor.execute(task, ctx).await
    }
}

/// Resolves once cancellation is requested; never resolves if the sender is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
