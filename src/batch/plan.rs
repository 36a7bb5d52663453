//! Batch planning: discovery, naming and pairing, before anything runs.
//!
//! A plan holds one [`FileTask`] per runnable input plus a Failure result for
//! every input rejected up front (name collision, ambiguous invoice). Setup
//! problems that make the whole batch pointless are returned as
//! [`SetupError`] and nothing is submitted.

use crate::error::{SetupError, TaskError};
use crate::models::{FileTask, FontSettings, JobKind, ProcessingResult, RuleSet, TaskId, TaskOperation};
use crate::services::{ConflictReason, InvoiceMatcher, list_files, plan_renames};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;

/// Everything the orchestrator needs to run one batch
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub kind: JobKind,
    pub tasks: Vec<FileTask>,
    /// Entries that already failed during planning
    pub rejected: Vec<ProcessingResult>,
    pub unmatched_generated: Vec<Utf8PathBuf>,
    pub unmatched_invoices: Vec<Utf8PathBuf>,
}

impl BatchPlan {
    fn new(kind: JobKind) -> Self {
        Self {
            kind,
            tasks: Vec::new(),
            rejected: Vec::new(),
            unmatched_generated: Vec::new(),
            unmatched_invoices: Vec::new(),
        }
    }

    /// Number of results the batch will produce
    pub fn total(&self) -> usize {
        self.tasks.len() + self.rejected.len()
    }

    fn next_id(&self) -> TaskId {
        TaskId(self.total())
    }
}

/// Plan a text replacement run over every DOCX in `origin`
pub fn plan_text_replacement(
    origin: &Utf8Path,
    destination: &Utf8Path,
    rules: &RuleSet,
    name_filter: Option<&str>,
) -> Result<BatchPlan, SetupError> {
    if rules.is_empty() {
        return Err(SetupError::Configuration(
            "no replacement rules configured".to_string(),
        ));
    }
    prepare_folders(&[origin], destination)?;

    for (producer, consumer) in rules.cascade_conflicts() {
        tracing::warn!(
            "Rule {} produces text matched by rule {}; results depend on rule order",
            producer + 1,
            consumer + 1
        );
    }

    let sources = discover(origin, "docx", name_filter)?;
    let renames = plan_renames(&sources, rules);
    let rules = Arc::new(rules.clone());

    let mut plan = BatchPlan::new(JobKind::TextReplacement);
    for rename in renames.renames {
        let task = FileTask {
            id: plan.next_id(),
            source_path: rename.source,
            destination_folder: destination.to_path_buf(),
            output_name: rename.output_name,
            operation: TaskOperation::ReplaceText {
                rules: Arc::clone(&rules),
            },
        };
        plan.tasks.push(task);
    }

    for conflict in renames.conflicts {
        let (output_path, error) = match conflict.reason {
            ConflictReason::Collision { claimed_by } => (
                destination.join(&conflict.output_name),
                TaskError::OutputCollision {
                    output_name: conflict.output_name,
                    claimed_by,
                },
            ),
            ConflictReason::InvalidName => (
                destination.to_path_buf(),
                TaskError::InvalidOutputName(conflict.output_name),
            ),
        };
        let rejected =
            ProcessingResult::rejected(plan.next_id(), &conflict.source, output_path, error);
        plan.rejected.push(rejected);
    }

    log_plan(&plan);
    Ok(plan)
}

/// Plan a PDF combine run: each DOCX in `generated_dir` is paired with an
/// invoice PDF from `invoice_dir`
pub fn plan_invoice_merge(
    generated_dir: &Utf8Path,
    invoice_dir: &Utf8Path,
    destination: &Utf8Path,
    matcher: &InvoiceMatcher,
    name_filter: Option<&str>,
) -> Result<BatchPlan, SetupError> {
    prepare_folders(&[generated_dir, invoice_dir], destination)?;

    let generated = discover(generated_dir, "docx", name_filter)?;
    let invoices = discover(invoice_dir, "pdf", None)?;
    let outcome = matcher.pair(&generated, &invoices);

    let mut plan = BatchPlan::new(JobKind::InvoiceMerge);
    for pair in outcome.pairs {
        let task = FileTask {
            id: plan.next_id(),
            destination_folder: destination.to_path_buf(),
            output_name: pair.output_name().to_string(),
            source_path: pair.generated,
            operation: TaskOperation::CombineWithInvoice {
                invoice: pair.invoice,
            },
        };
        plan.tasks.push(task);
    }

    for ambiguous in outcome.ambiguous {
        let candidates: Vec<String> = ambiguous
            .candidates
            .iter()
            .map(|path| file_name(path).to_string())
            .collect();
        let output_path = match candidates.as_slice() {
            [only] => destination.join(only),
            _ => destination.to_path_buf(),
        };
        let error = TaskError::AmbiguousMatch {
            generated: file_name(&ambiguous.generated).to_string(),
            candidates,
        };
        let rejected =
            ProcessingResult::rejected(plan.next_id(), &ambiguous.generated, output_path, error);
        plan.rejected.push(rejected);
    }

    plan.unmatched_generated = outcome.unmatched_generated;
    plan.unmatched_invoices = outcome.unmatched_invoices;

    log_plan(&plan);
    Ok(plan)
}

/// Plan a font normalization run; outputs keep their source names
pub fn plan_font_normalization(
    origin: &Utf8Path,
    destination: &Utf8Path,
    font: &FontSettings,
    name_filter: Option<&str>,
) -> Result<BatchPlan, SetupError> {
    if font.family.trim().is_empty() {
        return Err(SetupError::Configuration("font family is empty".to_string()));
    }
    if !(font.body_size_pt > 0.0 && font.footer_size_pt > 0.0) {
        return Err(SetupError::Configuration(format!(
            "font sizes must be positive (body {}pt, footer {}pt)",
            font.body_size_pt, font.footer_size_pt
        )));
    }
    prepare_folders(&[origin], destination)?;

    let sources = discover(origin, "docx", name_filter)?;
    let font = Arc::new(font.clone());

    let mut plan = BatchPlan::new(JobKind::FontNormalization);
    for source in sources {
        let task = FileTask {
            id: plan.next_id(),
            output_name: file_name(&source).to_string(),
            source_path: source,
            destination_folder: destination.to_path_buf(),
            operation: TaskOperation::NormalizeFonts {
                font: Arc::clone(&font),
            },
        };
        plan.tasks.push(task);
    }

    log_plan(&plan);
    Ok(plan)
}

/// Check the input folders and create the destination.
///
/// The destination must differ from every input folder; writing outputs
/// next to their inputs would overwrite sources.
fn prepare_folders(origins: &[&Utf8Path], destination: &Utf8Path) -> Result<(), SetupError> {
    for origin in origins {
        if !origin.is_dir() {
            return Err(SetupError::Configuration(format!(
                "origin folder does not exist: {}",
                origin
            )));
        }
    }

    fs::create_dir_all(destination).map_err(|source| SetupError::Filesystem {
        path: destination.to_path_buf(),
        source,
    })?;

    let destination_real = canonical(destination)?;
    for origin in origins {
        if canonical(origin)? == destination_real {
            return Err(SetupError::Configuration(format!(
                "destination folder must differ from origin folder {}",
                origin
            )));
        }
    }

    Ok(())
}

fn canonical(path: &Utf8Path) -> Result<std::path::PathBuf, SetupError> {
    path.as_std_path()
        .canonicalize()
        .map_err(|source| SetupError::Filesystem {
            path: path.to_path_buf(),
            source,
        })
}

fn discover(
    folder: &Utf8Path,
    extension: &str,
    name_filter: Option<&str>,
) -> Result<Vec<Utf8PathBuf>, SetupError> {
    let files = list_files(folder, extension, name_filter).map_err(|e| SetupError::Discovery {
        folder: folder.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    tracing::debug!("Found {} .{} files in {}", files.len(), extension, folder);
    Ok(files)
}

fn log_plan(plan: &BatchPlan) {
    tracing::info!(
        "{} plan: {} tasks, {} rejected, {} unmatched documents, {} unmatched invoices",
        plan.kind,
        plan.tasks.len(),
        plan.rejected.len(),
        plan.unmatched_generated.len(),
        plan.unmatched_invoices.len()
    );
}

fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReplacementRule, TaskStatus};
    use tempfile::TempDir;

    struct Folders {
        _guard: TempDir,
        root: Utf8PathBuf,
    }

    impl Folders {
        fn new() -> Self {
            let guard = TempDir::new().unwrap();
            let root = Utf8PathBuf::try_from(guard.path().to_path_buf()).unwrap();
            Self { _guard: guard, root }
        }

        fn dir(&self, name: &str) -> Utf8PathBuf {
            let dir = self.root.join(name);
            fs::create_dir_all(&dir).unwrap();
            dir
        }
    }

    fn touch(dir: &Utf8Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"x").unwrap();
        }
    }

    fn rules(pairs: &[(&str, &str)]) -> RuleSet {
        let mut set = RuleSet::new();
        for (old, new) in pairs {
            set.add(ReplacementRule::new(*old, *new).unwrap()).unwrap();
        }
        set
    }

    #[test]
    fn test_text_plan_names_and_collisions() {
        let folders = Folders::new();
        let origin = folders.dir("in");
        touch(&origin, &["Draft Jan.docx", "Final Jan.docx", "Other.docx", "notes.txt"]);
        let destination = folders.root.join("out");

        let plan = plan_text_replacement(
            &origin,
            &destination,
            &rules(&[("Draft ", ""), ("Final ", ""), ("Jan", "Feb")]),
            None,
        )
        .unwrap();

        assert!(destination.is_dir());
        assert_eq!(plan.total(), 3);
        let names: Vec<&str> = plan.tasks.iter().map(|t| t.output_name.as_str()).collect();
        assert_eq!(names, vec!["Feb.docx", "Other.docx"]);

        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].status, TaskStatus::Failure);
        assert!(plan.rejected[0].error.as_deref().unwrap().contains("Draft Jan.docx"));

        let mut ids: Vec<usize> = plan.tasks.iter().map(|t| t.id.0).collect();
        ids.extend(plan.rejected.iter().map(|r| r.task_id.0));
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_text_plan_requires_rules() {
        let folders = Folders::new();
        let origin = folders.dir("in");
        let err = plan_text_replacement(&origin, &folders.root.join("out"), &RuleSet::new(), None)
            .unwrap_err();
        assert!(matches!(err, SetupError::Configuration(_)));
    }

    #[test]
    fn test_missing_origin_is_setup_error() {
        let folders = Folders::new();
        let err = plan_font_normalization(
            &folders.root.join("missing"),
            &folders.root.join("out"),
            &FontSettings::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::Configuration(_)));
    }

    #[test]
    fn test_destination_equal_to_origin_is_rejected() {
        let folders = Folders::new();
        let origin = folders.dir("in");
        let same = origin.join(".");

        let err = plan_font_normalization(&origin, &same, &FontSettings::default(), None).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_invoice_plan() {
        let folders = Folders::new();
        let generated = folders.dir("generated");
        let invoices = folders.dir("invoices");
        touch(&generated, &["Acme - Jan.docx", "Beta - Jan.docx", "Zeta - Jan.docx"]);
        touch(&invoices, &["acme 001.pdf", "beta 1.pdf", "beta 2.pdf", "gamma.pdf"]);

        let plan = plan_invoice_merge(
            &generated,
            &invoices,
            &folders.root.join("out"),
            &InvoiceMatcher::default(),
            None,
        )
        .unwrap();

        assert_eq!(plan.kind, JobKind::InvoiceMerge);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].output_name, "acme 001.pdf");
        assert!(matches!(
            &plan.tasks[0].operation,
            TaskOperation::CombineWithInvoice { invoice } if invoice.ends_with("acme 001.pdf")
        ));

        assert_eq!(plan.rejected.len(), 1);
        assert!(plan.rejected[0].error.as_deref().unwrap().contains("beta 1.pdf, beta 2.pdf"));

        assert_eq!(plan.unmatched_generated.len(), 1);
        assert_eq!(plan.unmatched_invoices.len(), 1);
        assert!(plan.unmatched_invoices[0].ends_with("gamma.pdf"));
    }

    #[test]
    fn test_font_plan_keeps_names_and_filter() {
        let folders = Folders::new();
        let origin = folders.dir("in");
        touch(&origin, &["a 2025.docx", "b 2024.docx"]);

        let plan = plan_font_normalization(
            &origin,
            &folders.root.join("out"),
            &FontSettings::default(),
            Some("2025"),
        )
        .unwrap();

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].output_name, "a 2025.docx");
    }

    #[test]
    fn test_font_plan_rejects_zero_size() {
        let folders = Folders::new();
        let origin = folders.dir("in");
        let font = FontSettings {
            body_size_pt: 0.0,
            ..FontSettings::default()
        };
        assert!(plan_font_normalization(&origin, &folders.root.join("out"), &font, None).is_err());
    }
}
