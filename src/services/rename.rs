//! Filename matcher.
//!
//! Rules are applied to the whole file name (extension included), one after
//! another: each rule sees the output of the previous one. The result is
//! deterministic but not idempotent when a rule's new text contains some
//! rule's old text (see [`RuleSet::cascade_conflicts`]).

use crate::models::RuleSet;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

/// Compute the new file name for `file_name`
pub fn target_name(file_name: &str, rules: &RuleSet) -> String {
    rules.apply(file_name)
}

/// A source whose computed name is usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub source: Utf8PathBuf,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another source already maps to the same output name
    Collision { claimed_by: String },
    /// The rules produced an empty name or one containing a path separator
    InvalidName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameConflict {
    pub source: Utf8PathBuf,
    pub output_name: String,
    pub reason: ConflictReason,
}

#[derive(Debug, Clone, Default)]
pub struct RenamePlan {
    pub renames: Vec<PlannedRename>,
    pub conflicts: Vec<RenameConflict>,
}

/// Compute output names for every source and guard their uniqueness.
///
/// Sources are considered in the given order; the first source to claim a
/// name keeps it and later claimants become conflicts. Names are compared
/// case-insensitively because the destination may live on a
/// case-insensitive filesystem.
pub fn plan_renames(sources: &[Utf8PathBuf], rules: &RuleSet) -> RenamePlan {
    let mut plan = RenamePlan::default();
    let mut claimed: IndexMap<String, String> = IndexMap::new();

    for source in sources {
        let file_name = source_file_name(source);
        let output_name = target_name(file_name, rules);

        if !is_valid_file_name(&output_name) {
            tracing::warn!("Rules turn {} into invalid name {:?}", file_name, output_name);
            plan.conflicts.push(RenameConflict {
                source: source.clone(),
                output_name,
                reason: ConflictReason::InvalidName,
            });
            continue;
        }

        let key = output_name.to_lowercase();
        if let Some(claimed_by) = claimed.get(&key) {
            tracing::warn!(
                "{} would be written as {}, already produced by {}",
                file_name,
                output_name,
                claimed_by
            );
            plan.conflicts.push(RenameConflict {
                source: source.clone(),
                output_name,
                reason: ConflictReason::Collision {
                    claimed_by: claimed_by.clone(),
                },
            });
            continue;
        }

        claimed.insert(key, file_name.to_string());
        plan.renames.push(PlannedRename {
            source: source.clone(),
            output_name,
        });
    }

    plan
}

fn source_file_name(source: &Utf8Path) -> &str {
    source.file_name().unwrap_or(source.as_str())
}

fn is_valid_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
