use crate::models::{BatchReport, ProcessingResult, ProgressKey};
use crate::progress::{BatchEvent, ProgressReceiver};
use crate::state::{BatchState, StateChange, StateManager};
use std::io::{self, Write};

/// Terminal presenter for a running batch.
///
/// Owns the consumer end of the progress queue and is the only code that
/// updates the [`StateManager`] while a batch runs. Lines go to stdout;
/// batch progress lines are suppressed in quiet mode.
pub struct ConsolePresenter {
    state: StateManager,
    quiet: bool,
}

impl ConsolePresenter {
    pub fn new(state: StateManager, quiet: bool) -> Self {
        Self { state, quiet }
    }

    /// Drain events until every reporter is gone, then return the final state
    pub async fn run(self, mut receiver: ProgressReceiver) -> BatchState {
        tracing::debug!("Console presenter started");

        while let Some(event) = receiver.recv().await {
            let changes = self.state.apply(&event);
            tracing::trace!("Applied {:?} -> {:?}", event, changes);

            let state = self.state.snapshot();
            for line in render(&event, &changes, &state, self.quiet) {
                let mut stdout = io::stdout().lock();
                // stdout closed (e.g. broken pipe); keep draining so workers are unaffected
                let _ = writeln!(stdout, "{}", line);
            }
        }

        tracing::debug!("Console presenter finished");
        self.state.snapshot()
    }
}

/// Lines to print for one applied event
pub fn render(
    event: &BatchEvent,
    changes: &[StateChange],
    state: &BatchState,
    quiet: bool,
) -> Vec<String> {
    match event {
        BatchEvent::BatchStarted { kind, total } => {
            vec![format!("{}: {} file(s)", kind, total)]
        }
        BatchEvent::Progress(progress) => {
            let advanced = changes
                .iter()
                .any(|change| matches!(change, StateChange::BatchProgressed { .. }));
            if quiet || progress.key != ProgressKey::Batch || !advanced {
                return Vec::new();
            }
            vec![format!(
                "[{:>3}%] {}/{}",
                state.batch_progress,
                state.completed(),
                state.total
            )]
        }
        BatchEvent::TaskFinished(result) => vec![outcome_line(result)],
        BatchEvent::BatchFinished(summary) => {
            let kind = state
                .job
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "Batch".to_string());
            vec![format!("{} finished: {}", kind, summary)]
        }
    }
}

/// One line describing a finished entry
pub fn outcome_line(result: &ProcessingResult) -> String {
    let source = result
        .source_path
        .file_name()
        .unwrap_or(result.source_path.as_str());

    if result.is_success() {
        let output = result
            .output_path
            .file_name()
            .unwrap_or(result.output_path.as_str());
        format!("✅ {} → {}", source, output)
    } else {
        format!(
            "❌ {}: {}",
            source,
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}

/// Final report: failures and files left without a partner
pub fn write_report<W: Write>(out: &mut W, report: &BatchReport) -> io::Result<()> {
    let summary = report.summary();
    writeln!(out)?;
    writeln!(out, "{}: {} of {} succeeded", report.kind, summary.succeeded, summary.total)?;

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        writeln!(out, "Failed ({}):", failures.len())?;
        for failure in failures {
            writeln!(out, "  {}", outcome_line(failure))?;
        }
    }

    if !report.unmatched_generated.is_empty() {
        writeln!(out, "Documents without an invoice ({}):", report.unmatched_generated.len())?;
        for path in &report.unmatched_generated {
            writeln!(out, "  {}", path)?;
        }
    }

    if !report.unmatched_invoices.is_empty() {
        writeln!(out, "Invoices without a document ({}):", report.unmatched_invoices.len())?;
        for path in &report.unmatched_invoices {
            writeln!(out, "  {}", path)?;
        }
    }

    Ok(())
}
