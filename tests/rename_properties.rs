//! Property tests for file name rewriting and output name planning

use camino::Utf8PathBuf;
use docflow::models::{ReplacementRule, RuleSet};
use docflow::services::{ConflictReason, plan_renames, target_name};
use proptest::prelude::*;
use std::collections::HashSet;

/// Rule sets whose old texts (letters a-c) never appear in new texts
/// (letters x-z) and whose new texts are never empty, so no substitution can
/// produce or join text into another match
fn non_cascading_rules() -> impl Strategy<Value = RuleSet> {
    prop::collection::vec(("[abc]{1,3}", "[xyz]{1,3}"), 0..5).prop_map(|pairs| {
        let mut rules = RuleSet::new();
        for (old, new) in pairs {
            if let Ok(rule) = ReplacementRule::new(old, new) {
                // Duplicates are rejected; skipping them keeps the set valid
                let _ = rules.add(rule);
            }
        }
        rules
    })
}

fn any_rules() -> impl Strategy<Value = RuleSet> {
    prop::collection::vec(("[a-d]{1,3}", "[a-d]{0,3}"), 0..5).prop_map(|pairs| {
        let mut rules = RuleSet::new();
        for (old, new) in pairs {
            if let Ok(rule) = ReplacementRule::new(old, new) {
                let _ = rules.add(rule);
            }
        }
        rules
    })
}

proptest! {
    #[test]
    fn prop_idempotent_without_cascades(
        rules in non_cascading_rules(),
        name in "[abcxyz ]{0,16}\\.docx",
    ) {
        prop_assert!(rules.cascade_conflicts().is_empty());
        let once = target_name(&name, &rules);
        let twice = target_name(&once, &rules);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_deterministic(rules in any_rules(), name in "[a-d ]{0,16}\\.docx") {
        prop_assert_eq!(target_name(&name, &rules), target_name(&name, &rules));
    }

    #[test]
    fn prop_planned_outputs_are_unique(
        rules in any_rules(),
        names in prop::collection::btree_set("[a-d]{1,6}\\.docx", 1..20),
    ) {
        let sources: Vec<Utf8PathBuf> = names
            .iter()
            .map(|name| Utf8PathBuf::from(format!("in/{name}")))
            .collect();
        let plan = plan_renames(&sources, &rules);

        // Every source is either renamed or reported
        prop_assert_eq!(plan.renames.len() + plan.conflicts.len(), sources.len());

        let mut seen = HashSet::new();
        for rename in &plan.renames {
            prop_assert!(seen.insert(rename.output_name.to_lowercase()));
        }
        for conflict in &plan.conflicts {
            if let ConflictReason::Collision { .. } = conflict.reason {
                prop_assert!(seen.contains(&conflict.output_name.to_lowercase()));
            }
        }
    }
}
