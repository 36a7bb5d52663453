use crate::models::{FontSettings, RuleSet};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier of one task within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The three batch jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    TextReplacement,
    InvoiceMerge,
    FontNormalization,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::TextReplacement => "Text replacement",
            JobKind::InvoiceMerge => "PDF combine",
            JobKind::FontNormalization => "Font change",
        };
        f.write_str(name)
    }
}

/// What a task does with its source file
#[derive(Debug, Clone)]
pub enum TaskOperation {
    /// Rewrite document text with the rules; the output name was already
    /// computed from the same rules
    ReplaceText { rules: Arc<RuleSet> },

    /// Convert the source document to PDF and append the invoice pages
    CombineWithInvoice { invoice: Utf8PathBuf },

    /// Set every run to the configured font family and size
    NormalizeFonts { font: Arc<FontSettings> },
}

impl TaskOperation {
    pub fn kind(&self) -> JobKind {
        match self {
            TaskOperation::ReplaceText { .. } => JobKind::TextReplacement,
            TaskOperation::CombineWithInvoice { .. } => JobKind::InvoiceMerge,
            TaskOperation::NormalizeFonts { .. } => JobKind::FontNormalization,
        }
    }
}

/// Unit of work for one input file. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub id: TaskId,
    pub source_path: Utf8PathBuf,
    pub destination_folder: Utf8PathBuf,
    pub output_name: String,
    pub operation: TaskOperation,
}

impl FileTask {
    pub fn output_path(&self) -> Utf8PathBuf {
        self.destination_folder.join(&self.output_name)
    }

    /// File name of the source, or the whole path when it has none
    pub fn source_name(&self) -> &str {
        self.source_path
            .file_name()
            .unwrap_or(self.source_path.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Failure,
}

/// Outcome of one task (or of an entry rejected during planning)
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub task_id: TaskId,
    pub source_path: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ProcessingResult {
    pub fn success(task: &FileTask, duration: Duration) -> Self {
        Self {
            task_id: task.id,
            source_path: task.source_path.clone(),
            output_path: task.output_path(),
            status: TaskStatus::Success,
            error: None,
            duration,
        }
    }

    pub fn failure(task: &FileTask, error: impl fmt::Display, duration: Duration) -> Self {
        Self::rejected(task.id, &task.source_path, task.output_path(), error)
            .with_duration(duration)
    }

    /// Failure for an entry that never became a running task
    pub fn rejected(
        task_id: TaskId,
        source_path: &Utf8Path,
        output_path: Utf8PathBuf,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            task_id,
            source_path: source_path.to_path_buf(),
            output_path,
            status: TaskStatus::Failure,
            error: Some(error.to_string()),
            duration: Duration::ZERO,
        }
    }

    fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Target of a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKey {
    Batch,
    Task(TaskId),
}

/// Fractional completion (0..=100) of a task or of the whole batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub key: ProgressKey,
    pub value: u8,
}

impl ProgressEvent {
    pub fn new(key: ProgressKey, value: u8) -> Self {
        Self {
            key,
            value: value.min(100),
        }
    }
}

/// Aggregate counts for a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ProcessingResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

/// Everything a batch produced
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: JobKind,
    pub results: Vec<ProcessingResult>,
    pub unmatched_generated: Vec<Utf8PathBuf>,
    pub unmatched_invoices: Vec<Utf8PathBuf>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(&self.results)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> FileTask {
        FileTask {
            id: TaskId(3),
            source_path: Utf8PathBuf::from("in/Report.docx"),
            destination_folder: Utf8PathBuf::from("out"),
            output_name: "Final.docx".to_string(),
            operation: TaskOperation::ReplaceText {
                rules: Arc::new(RuleSet::new()),
            },
        }
    }

    #[test]
    fn test_output_path() {
        assert_eq!(task().output_path(), Utf8PathBuf::from("out/Final.docx"));
        assert_eq!(task().source_name(), "Report.docx");
        assert_eq!(task().operation.kind(), JobKind::TextReplacement);
    }

    #[test]
    fn test_progress_value_clamped() {
        let event = ProgressEvent::new(ProgressKey::Batch, 250);
        assert_eq!(event.value, 100);
    }

    #[test]
    fn test_summary_counts() {
        let t = task();
        let results = vec![
            ProcessingResult::success(&t, Duration::from_millis(5)),
            ProcessingResult::failure(&t, "boom", Duration::from_millis(1)),
            ProcessingResult::success(&t, Duration::ZERO),
        ];

        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.to_string(), "2 succeeded, 1 failed");
    }

    #[test]
    fn test_failure_carries_message() {
        let result = ProcessingResult::failure(&task(), "disk full", Duration::ZERO);
        assert_eq!(result.status, TaskStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("disk full"));
        assert_eq!(result.output_path, Utf8PathBuf::from("out/Final.docx"));
    }
}
