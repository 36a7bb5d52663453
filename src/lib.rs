// DocFlow - batch text replacement, invoice merging and font normalization
//
// This is the library crate containing the core business logic and data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use batch::{BatchOrchestrator, BatchPlan, TaskExecutor};
pub use config::ConfigManager;
pub use error::{SetupError, TaskError};
pub use models::{BatchReport, ProcessingResult, ReplacementRule, RuleSet, UserConfig};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
