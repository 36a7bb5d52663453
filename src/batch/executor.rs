use crate::error::TaskError;
use crate::models::{FileTask, FontSettings, RuleSet, TaskOperation};
use crate::progress::TaskProgress;
use crate::services::{DocumentConverter, DocxEditor, PdfMerger};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

/// What a running task may see of its batch
#[derive(Debug, Clone)]
pub struct TaskContext {
    progress: TaskProgress,
    cancel_rx: watch::Receiver<bool>,
}

impl TaskContext {
    pub fn new(progress: TaskProgress, cancel_rx: watch::Receiver<bool>) -> Self {
        Self {
            progress,
            cancel_rx,
        }
    }

    pub fn report(&self, value: u8) {
        self.progress.report(value);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// `Err(Cancelled)` once cancellation has been requested
    pub fn check_cancelled(&self, file_name: &str) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled(file_name.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Runs the work of one [`FileTask`].
///
/// Document rewriting and PDF merging are synchronous and run on the
/// blocking pool; conversion is an async child process. Combine tasks get a
/// private temporary folder that is removed however the task ends.
#[derive(Clone)]
pub struct TaskExecutor {
    converter: Arc<dyn DocumentConverter>,
    merger: Arc<dyn PdfMerger>,
    editor: Arc<DocxEditor>,
    temp_root: Option<Utf8PathBuf>,
}

impl TaskExecutor {
    pub fn new(converter: Arc<dyn DocumentConverter>, merger: Arc<dyn PdfMerger>) -> Self {
        Self {
            converter,
            merger,
            editor: Arc::new(DocxEditor::new()),
            temp_root: None,
        }
    }

    /// Create per-task temporary folders under `root` instead of the system temp dir
    pub fn with_temp_root(mut self, root: Option<Utf8PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    pub fn converter(&self) -> &Arc<dyn DocumentConverter> {
        &self.converter
    }

    pub async fn execute(&self, task: &FileTask, ctx: &TaskContext) -> Result<(), TaskError> {
        match &task.operation {
            TaskOperation::ReplaceText { rules } => self.replace_text(task, Arc::clone(rules)).await,
            TaskOperation::NormalizeFonts { font } => {
                self.normalize_fonts(task, Arc::clone(font)).await
            }
            TaskOperation::CombineWithInvoice { invoice } => {
                self.combine(task, invoice, ctx).await
            }
        }
    }

    async fn replace_text(&self, task: &FileTask, rules: Arc<RuleSet>) -> Result<(), TaskError> {
        let editor = Arc::clone(&self.editor);
        let source = task.source_path.clone();
        let output = task.output_path();
        run_blocking(move || editor.replace_text(&source, &output, &rules)).await
    }

    async fn normalize_fonts(
        &self,
        task: &FileTask,
        font: Arc<FontSettings>,
    ) -> Result<(), TaskError> {
        let editor = Arc::clone(&self.editor);
        let source = task.source_path.clone();
        let output = task.output_path();
        run_blocking(move || editor.normalize_fonts(&source, &output, &font)).await
    }

    async fn combine(
        &self,
        task: &FileTask,
        invoice: &Utf8Path,
        ctx: &TaskContext,
    ) -> Result<(), TaskError> {
        let workdir = self.create_workdir()?;

        let result = match Utf8Path::from_path(workdir.path()) {
            Some(work_path) => self.convert_and_merge(task, invoice, work_path, ctx).await,
            None => Err(TaskError::Filesystem {
                path: task.source_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("temporary folder is not UTF-8: {}", workdir.path().display()),
                ),
            }),
        };

        let workdir_path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            tracing::warn!(
                "Failed to remove temporary folder {}: {}",
                workdir_path.display(),
                e
            );
        }

        result
    }

    async fn convert_and_merge(
        &self,
        task: &FileTask,
        invoice: &Utf8Path,
        work_path: &Utf8Path,
        ctx: &TaskContext,
    ) -> Result<(), TaskError> {
        let pdf = self.converter.convert(&task.source_path, work_path).await?;
        ctx.report(50);
        ctx.check_cancelled(task.source_name())?;

        let merger = Arc::clone(&self.merger);
        let inputs = vec![pdf, invoice.to_path_buf()];
        let output = task.output_path();
        run_blocking(move || merger.merge(&inputs, &output)).await
    }

    fn create_workdir(&self) -> Result<TempDir, TaskError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docflow-");

        match &self.temp_root {
            Some(root) => builder.tempdir_in(root).map_err(|source| TaskError::Filesystem {
                path: root.clone(),
                source,
            }),
            None => builder.tempdir().map_err(|source| TaskError::Filesystem {
                path: Utf8PathBuf::from(std::env::temp_dir().to_string_lossy().as_ref()),
                source,
            }),
        }
    }
}

/// Run synchronous document work on the blocking pool.
///
/// A panic in `work` becomes a [`TaskError::Worker`] for this task only.
async fn run_blocking<F, E>(work: F) -> Result<(), TaskError>
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<TaskError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TaskError::Worker(e.to_string()))?
        .map_err(Into::into)
}
