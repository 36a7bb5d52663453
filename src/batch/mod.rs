//! Batch pipeline: plan → execute → collect.
//!
//! Planning discovers inputs and resolves names and pairings up front, so
//! every conflict is known before the first worker starts. The orchestrator
//! then fans the plan out over a bounded pool and reports through the
//! progress queue.

pub mod executor;
pub mod orchestrator;
pub mod plan;

pub use executor::{TaskContext, TaskExecutor};
pub use orchestrator::BatchOrchestrator;
pub use plan::{BatchPlan, plan_font_normalization, plan_invoice_merge, plan_text_replacement};
