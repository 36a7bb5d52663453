// State management module
//
// Presentation-side model of the running batch. Only the presenter mutates
// it, by applying the events it drains from the progress queue.

use crate::models::{BatchSummary, JobKind, ProcessingResult, ProgressKey, TaskId};
use crate::progress::BatchEvent;
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Snapshot of a batch as the presenter sees it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchState {
    pub job: Option<JobKind>,
    pub is_running: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Batch completion percentage; never decreases within a batch
    pub batch_progress: u8,
    /// Completion of tasks that have reported progress but not finished yet
    pub task_progress: IndexMap<TaskId, u8>,
    /// Finished entries in arrival order
    pub outcomes: Vec<ProcessingResult>,
    pub summary: Option<BatchSummary>,
}

impl BatchState {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    BatchStarted { kind: JobKind, total: usize },
    TaskProgressed { task_id: TaskId, value: u8 },
    BatchProgressed { value: u8 },
    TaskFinished { task_id: TaskId, success: bool },
    BatchFinished { summary: BatchSummary },
    StateReset,
}

/// Thread-safe state manager with change events.
///
/// [`apply`](Self::apply) folds one [`BatchEvent`] into the state and returns
/// the [`StateChange`]s it caused; the same changes go to every
/// [`subscribe`](Self::subscribe)r. Progress values only move forward, so a
/// late or repeated event never rolls the display back.
pub struct StateManager {
    state: Arc<RwLock<BatchState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 changes
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(BatchState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> BatchState {
        self.read(BatchState::clone)
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&BatchState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Fold one event into the state
    pub fn apply(&self, event: &BatchEvent) -> Vec<StateChange> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut changes = Vec::new();

        match event {
            BatchEvent::BatchStarted { kind, total } => {
                *state = BatchState {
                    job: Some(*kind),
                    is_running: true,
                    total: *total,
                    ..BatchState::default()
                };
                changes.push(StateChange::BatchStarted {
                    kind: *kind,
                    total: *total,
                });
            }
            BatchEvent::Progress(progress) => match progress.key {
                ProgressKey::Batch => {
                    if progress.value > state.batch_progress {
                        state.batch_progress = progress.value;
                        changes.push(StateChange::BatchProgressed {
                            value: progress.value,
                        });
                    }
                }
                ProgressKey::Task(task_id) => {
                    let current = state.task_progress.get(&task_id).copied();
                    if current.is_none_or(|value| progress.value > value) {
                        state.task_progress.insert(task_id, progress.value);
                        changes.push(StateChange::TaskProgressed {
                            task_id,
                            value: progress.value,
                        });
                    }
                }
            },
            BatchEvent::TaskFinished(result) => {
                state.task_progress.shift_remove(&result.task_id);
                if result.is_success() {
                    state.succeeded += 1;
                } else {
                    state.failed += 1;
                }
                state.outcomes.push(result.clone());
                changes.push(StateChange::TaskFinished {
                    task_id: result.task_id,
                    success: result.is_success(),
                });
            }
            BatchEvent::BatchFinished(summary) => {
                state.is_running = false;
                state.summary = Some(*summary);
                state.task_progress.clear();
                if state.batch_progress < 100 {
                    state.batch_progress = 100;
                    changes.push(StateChange::BatchProgressed { value: 100 });
                }
                changes.push(StateChange::BatchFinished { summary: *summary });
            }
        }

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Forget the previous batch
    pub fn reset(&self) -> Vec<StateChange> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            *state = BatchState::default();
        }
        let _ = self.state_tx.send(StateChange::StateReset);
        vec![StateChange::StateReset]
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgressEvent;
    use camino::{Utf8Path, Utf8PathBuf};

    fn failed(id: usize) -> ProcessingResult {
        ProcessingResult::rejected(
            TaskId(id),
            Utf8Path::new("in/a.docx"),
            Utf8PathBuf::from("out/a.docx"),
            "boom",
        )
    }

    fn started(total: usize) -> BatchEvent {
        BatchEvent::BatchStarted {
            kind: JobKind::TextReplacement,
            total,
        }
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = StateManager::new().snapshot();
        assert!(!state.is_running);
        assert_eq!(state.job, None);
        assert_eq!(state.batch_progress, 0);
    }

    #[test]
    fn test_batch_started_resets_previous_outcomes() {
        let manager = StateManager::new();
        manager.apply(&started(1));
        manager.apply(&BatchEvent::TaskFinished(failed(0)));

        let changes = manager.apply(&started(3));

        assert_eq!(
            changes,
            vec![StateChange::BatchStarted {
                kind: JobKind::TextReplacement,
                total: 3
            }]
        );
        let state = manager.snapshot();
        assert!(state.is_running);
        assert_eq!(state.total, 3);
        assert!(state.outcomes.is_empty());
    }

    #[test]
    fn test_batch_progress_is_monotonic() {
        let manager = StateManager::new();
        manager.apply(&started(2));

        manager.apply(&BatchEvent::Progress(ProgressEvent::new(ProgressKey::Batch, 50)));
        let changes =
            manager.apply(&BatchEvent::Progress(ProgressEvent::new(ProgressKey::Batch, 40)));

        assert!(changes.is_empty());
        assert_eq!(manager.snapshot().batch_progress, 50);
    }

    #[test]
    fn test_task_progress_and_finish() {
        let manager = StateManager::new();
        manager.apply(&started(1));

        let key = ProgressKey::Task(TaskId(0));
        let changes = manager.apply(&BatchEvent::Progress(ProgressEvent::new(key, 0)));
        assert_eq!(
            changes,
            vec![StateChange::TaskProgressed {
                task_id: TaskId(0),
                value: 0
            }]
        );
        assert_eq!(manager.snapshot().task_progress.get(&TaskId(0)), Some(&0));

        manager.apply(&BatchEvent::TaskFinished(failed(0)));
        let state = manager.snapshot();
        assert!(state.task_progress.is_empty());
        assert_eq!(state.failed, 1);
        assert_eq!(state.completed(), 1);
    }

    #[test]
    fn test_batch_finished() {
        let manager = StateManager::new();
        manager.apply(&started(1));
        manager.apply(&BatchEvent::TaskFinished(failed(0)));

        let summary = BatchSummary {
            total: 1,
            succeeded: 0,
            failed: 1,
        };
        let changes = manager.apply(&BatchEvent::BatchFinished(summary));

        assert!(changes.contains(&StateChange::BatchFinished { summary }));
        let state = manager.snapshot();
        assert!(!state.is_running);
        assert_eq!(state.batch_progress, 100);
        assert_eq!(state.summary, Some(summary));
    }

    #[test]
    fn test_reset() {
        let manager = StateManager::new();
        manager.apply(&started(5));

        let changes = manager.reset();

        assert_eq!(changes, vec![StateChange::StateReset]);
        assert_eq!(manager.snapshot(), BatchState::default());
    }

    #[test]
    fn test_subscribers_receive_changes() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.clone().subscribe();

        manager.apply(&started(2));

        assert!(matches!(rx1.try_recv(), Ok(StateChange::BatchStarted { total: 2, .. })));
        assert!(matches!(rx2.try_recv(), Ok(StateChange::BatchStarted { total: 2, .. })));
    }
}
