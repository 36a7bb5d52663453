//! Data models for DocFlow.
//!
//! - [`ReplacementRule`] / [`RuleSet`]: ordered literal substitutions for document text and file names
//! - [`FileTask`], [`ProcessingResult`], [`ProgressEvent`]: the batch pipeline's units of work and outputs
//! - [`UserConfig`] / [`RulesConfig`]: settings and rule table loaded from YAML by
//!   [`ConfigManager`](crate::config::ConfigManager)
//!
//! Rule sets are passed into the planner explicitly; nothing here is process-wide state.

pub mod config;
pub mod rules;
pub mod task;

pub use config::{DocFlowSettings, FontSettings, RulesConfig, UserConfig};
pub use rules::{ReplacementRule, RuleError, RuleSet};
pub use task::{
    BatchReport, BatchSummary, FileTask, JobKind, ProcessingResult, ProgressEvent, ProgressKey,
    TaskId, TaskOperation, TaskStatus,
};
