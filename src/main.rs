//! DocFlow - batch document processing from the command line.
//!
//! # Overview
//!
//! Three batch jobs, each run over a whole folder:
//! - `replace`: apply the replacement rules to document text and file names
//! - `combine`: convert generated documents to PDF and append their invoices
//! - `font`: set every run to one font family and size
//!
//! plus `rules` to edit the stored replacement rule table.
//!
//! # Execution Flow
//!
//! 1. Load `DocFlow Config.yaml` (plus `DOCFLOW_` environment overrides)
//! 2. Initialize logging → `<log_dir>/docflow.<date>`
//! 3. Plan the batch synchronously; setup errors stop here with exit code 2
//! 4. Run the plan on a multi-threaded tokio runtime while the console
//!    presenter drains the progress queue
//! 5. Print the report; exit code 1 if any file failed
//!
//! Ctrl-C cancels tasks that have not finished yet; each still reports a
//! result.

use anyhow::{Context, Result, anyhow};
use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, Subcommand};
use docflow::batch::{
    BatchOrchestrator, BatchPlan, TaskExecutor, plan_font_normalization, plan_invoice_merge,
    plan_text_replacement,
};
use docflow::metrics::Metrics;
use docflow::models::{BatchReport, DocFlowSettings, ReplacementRule, RuleSet};
use docflow::progress::progress_channel;
use docflow::services::{InvoiceMatcher, LopdfMerger, SofficeConverter};
use docflow::ui::{ConsolePresenter, write_report};
use docflow::{APP_NAME, ConfigManager, SetupError, StateManager, VERSION};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "docflow", version, about)]
struct Cli {
    /// Folder holding DocFlow Config.yaml and DocFlow Rules.yaml
    #[arg(long, global = true, default_value = "DocFlow Data")]
    config_dir: Utf8PathBuf,

    /// Worker pool size (overrides the config file)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Verbose logging on stderr and in the log file
    #[arg(long, global = true)]
    debug: bool,

    /// Only print finished files and the final report
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace text in every DOCX of a folder and rename the outputs
    Replace {
        origin: Utf8PathBuf,
        destination: Utf8PathBuf,

        /// Use this rule instead of the stored table (repeatable)
        #[arg(long = "rule", num_args = 2, value_names = ["OLD", "NEW"], action = ArgAction::Append)]
        rules: Vec<String>,

        /// Only process files whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Combine generated documents with their invoice PDFs
    Combine {
        generated: Utf8PathBuf,
        invoices: Utf8PathBuf,
        destination: Utf8PathBuf,

        /// Separator between the invoice key and the rest of a document name
        #[arg(long)]
        separator: Option<String>,

        #[arg(long)]
        filter: Option<String>,
    },

    /// Set the font of every DOCX of a folder
    Font {
        origin: Utf8PathBuf,
        destination: Utf8PathBuf,

        #[arg(long)]
        family: Option<String>,

        /// Body text size in points
        #[arg(long)]
        body_size: Option<f32>,

        /// Footer text size in points
        #[arg(long)]
        footer_size: Option<f32>,

        #[arg(long)]
        filter: Option<String>,
    },

    /// Show or edit the stored replacement rules
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Print the rules in application order
    List,
    /// Append a rule
    Add { old: String, new: String },
    /// Remove a rule by its number in `rules list`
    Remove { number: usize },
    /// Remove every rule
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = config_manager.load_user_config()?.settings;
    if let Some(workers) = cli.workers {
        settings.max_workers = workers;
    }
    settings.debug_mode |= cli.debug;

    let log_dir = config_manager.config_dir().join(&settings.log_dir);
    let _guard = docflow::logging::setup_logging(&log_dir, "docflow", settings.debug_mode, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let plan = match cli.command {
        Command::Rules { action } => {
            edit_rules(&config_manager, action)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Replace {
            origin,
            destination,
            rules,
            filter,
        } => {
            apply_filter(&mut settings, filter);
            let rules = if rules.is_empty() {
                config_manager.load_rules()?
            } else {
                rules_from_args(&rules)?
            };
            plan_text_replacement(&origin, &destination, &rules, settings.name_filter())?
        }
        Command::Combine {
            generated,
            invoices,
            destination,
            separator,
            filter,
        } => {
            apply_filter(&mut settings, filter);
            if let Some(separator) = separator {
                settings.key_separator = separator;
            }
            let matcher = InvoiceMatcher::new(settings.key_separator.clone());
            plan_invoice_merge(
                &generated,
                &invoices,
                &destination,
                &matcher,
                settings.name_filter(),
            )?
        }
        Command::Font {
            origin,
            destination,
            family,
            body_size,
            footer_size,
            filter,
        } => {
            apply_filter(&mut settings, filter);
            if let Some(family) = family {
                settings.font.family = family;
            }
            if let Some(size) = body_size {
                settings.font.body_size_pt = size;
            }
            if let Some(size) = footer_size {
                settings.font.footer_size_pt = size;
            }
            plan_font_normalization(&origin, &destination, &settings.font, settings.name_filter())?
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("docflow-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let report = runtime.block_on(execute(plan, &settings, cli.quiet))?;

    write_report(&mut std::io::stdout().lock(), &report)?;

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    if report.failures().next().is_some() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Run a planned batch with the console presenter attached
async fn execute(
    plan: BatchPlan,
    settings: &DocFlowSettings,
    quiet: bool,
) -> Result<BatchReport, SetupError> {
    let metrics = Arc::new(Metrics::new());
    let (reporter, receiver) = progress_channel();
    let reporter = reporter.with_metrics(Arc::clone(&metrics));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let state = StateManager::new();

    let converter = SofficeConverter::new(
        settings.soffice_path.clone(),
        Duration::from_secs(settings.conversion_timeout_secs),
    );
    let temp_root = Some(settings.temp_dir.trim())
        .filter(|dir| !dir.is_empty())
        .map(Utf8PathBuf::from);
    let executor =
        TaskExecutor::new(Arc::new(converter), Arc::new(LopdfMerger)).with_temp_root(temp_root);
    let orchestrator = BatchOrchestrator::new(executor, settings.pool_size(), reporter, cancel_rx)
        .with_metrics(Arc::clone(&metrics));

    let interrupt = tokio::spawn(watch_interrupts(
        tokio::signal::ctrl_c,
        state.clone(),
        cancel_tx,
    ));

    let presenter = ConsolePresenter::new(state, quiet);
    let batch = async move {
        let result = orchestrator.run(plan).await;
        // Drops the last reporter so the presenter sees the end of the queue
        drop(orchestrator);
        result
    };

    let (result, _final_state) = tokio::join!(batch, presenter.run(receiver));
    interrupt.abort();
    metrics.log_summary();

    result
}

/// Exit code after a second Ctrl-C, as a shell reports SIGINT
const FORCED_EXIT_CODE: i32 = 130;

/// First interrupt cancels the batch; a second one quits at once, leaving
/// any hung conversion behind
async fn watch_interrupts<F, Fut>(
    mut next_signal: F,
    state: StateManager,
    cancel_tx: watch::Sender<bool>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if forced_quit(&mut next_signal, &state, &cancel_tx).await {
        eprintln!("Interrupted again, exiting without waiting for running tasks");
        std::process::exit(FORCED_EXIT_CODE);
    }
}

/// `true` once the second interrupt arrives
async fn forced_quit<F, Fut>(
    next_signal: &mut F,
    state: &StateManager,
    cancel_tx: &watch::Sender<bool>,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    let (completed, total) = state.read(|s| (s.completed(), s.total));
    tracing::warn!(
        "Interrupted after {}/{} files - cancelling remaining tasks (Ctrl-C again to quit)",
        completed,
        total
    );
    let _ = cancel_tx.send(true);

    if next_signal().await.is_err() {
        return false;
    }
    tracing::error!("Second interrupt, exiting with code {}", FORCED_EXIT_CODE);
    true
}

fn apply_filter(settings: &mut DocFlowSettings, filter: Option<String>) {
    if let Some(filter) = filter {
        settings.name_filter = filter;
    }
}

/// Rule set from `--rule OLD NEW` pairs, in command-line order
fn rules_from_args(args: &[String]) -> Result<RuleSet> {
    let mut rules = RuleSet::new();
    for pair in args.chunks_exact(2) {
        let rule = ReplacementRule::new(pair[0].as_str(), pair[1].as_str())
            .with_context(|| format!("Invalid rule {:?} -> {:?}", pair[0], pair[1]))?;
        rules.add(rule)?;
    }
    Ok(rules)
}

fn edit_rules(config_manager: &ConfigManager, action: RulesCommand) -> Result<()> {
    let mut rules = config_manager.load_rules()?;

    match action {
        RulesCommand::List => {
            if rules.is_empty() {
                println!("No replacement rules ({})", config_manager.rules_path());
            }
            for (index, rule) in rules.iter().enumerate() {
                println!("{:>3}. {:?} → {:?}", index + 1, rule.old_text(), rule.new_text());
            }
            for (producer, consumer) in rules.cascade_conflicts() {
                println!(
                    "warning: rule {} produces text matched by rule {}",
                    producer + 1,
                    consumer + 1
                );
            }
            return Ok(());
        }
        RulesCommand::Add { old, new } => {
            rules.add(ReplacementRule::new(old, new)?)?;
        }
        RulesCommand::Remove { number } => {
            let index = number
                .checked_sub(1)
                .ok_or_else(|| anyhow!("Rule numbers start at 1"))?;
            let removed = rules.remove(index)?;
            tracing::info!("Removed rule {:?} -> {:?}", removed.old_text(), removed.new_text());
        }
        RulesCommand::Clear => rules.clear(),
    }

    config_manager.save_rules(&rules)?;
    println!("{} rule(s) saved to {}", rules.len(), config_manager.rules_path());
    Ok(())
}
