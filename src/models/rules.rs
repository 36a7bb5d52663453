use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or editing a rule set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Replacement rule has empty old text")]
    EmptyOldText,

    #[error("Replacement rule already exists: {old_text} -> {new_text}")]
    Duplicate { old_text: String, new_text: String },

    #[error("No replacement rule at index {index} (rule count: {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A literal old-text/new-text pair.
///
/// Applied to document content and to file names. `old_text` is never empty;
/// `new_text` may be empty, which deletes every match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
    old_text: String,
    new_text: String,
}

impl ReplacementRule {
    pub fn new(old_text: impl Into<String>, new_text: impl Into<String>) -> Result<Self, RuleError> {
        let old_text = old_text.into();
        if old_text.is_empty() {
            return Err(RuleError::EmptyOldText);
        }
        Ok(Self {
            old_text,
            new_text: new_text.into(),
        })
    }

    pub fn old_text(&self) -> &str {
        &self.old_text
    }

    pub fn new_text(&self) -> &str {
        &self.new_text
    }

    /// Literal substitution of every non-overlapping match, left to right
    pub fn apply(&self, input: &str) -> String {
        input.replace(&self.old_text, &self.new_text)
    }
}

/// Ordered sequence of replacement rules.
///
/// Rules are applied sequentially: rule `n + 1` sees the output of rule `n`,
/// so substitutions may cascade. See [`RuleSet::cascade_conflicts`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ReplacementRule>", into = "Vec<ReplacementRule>")]
pub struct RuleSet {
    rules: Vec<ReplacementRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, rejecting exact duplicates
    pub fn add(&mut self, rule: ReplacementRule) -> Result<(), RuleError> {
        if self.rules.contains(&rule) {
            return Err(RuleError::Duplicate {
                old_text: rule.old_text,
                new_text: rule.new_text,
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Remove the rule at `index`, returning it
    pub fn remove(&mut self, index: usize) -> Result<ReplacementRule, RuleError> {
        if index >= self.rules.len() {
            return Err(RuleError::IndexOutOfRange {
                index,
                len: self.rules.len(),
            });
        }
        Ok(self.rules.remove(index))
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReplacementRule> {
        self.rules.iter()
    }

    /// Apply every rule in order to `input`
    pub fn apply(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, rule| rule.apply(&acc))
    }

    /// Pairs `(i, j)` where rule `i`'s new text contains rule `j`'s old text.
    ///
    /// Each pair can make a second application change an already rewritten
    /// name; with `j > i` it also cascades within a single pass. An empty
    /// result does not prove idempotence: a replacement can still join its
    /// neighbours into a new match (`"ab" -> ""` on `"aabb"`).
    pub fn cascade_conflicts(&self) -> Vec<(usize, usize)> {
        let mut conflicts = Vec::new();
        for (i, producer) in self.rules.iter().enumerate() {
            for (j, consumer) in self.rules.iter().enumerate() {
                if producer.new_text.contains(&consumer.old_text) {
                    conflicts.push((i, j));
                }
            }
        }
        conflicts
    }
}

impl TryFrom<Vec<ReplacementRule>> for RuleSet {
    type Error = RuleError;

    fn try_from(rules: Vec<ReplacementRule>) -> Result<Self, Self::Error> {
        let mut set = RuleSet::new();
        for rule in rules {
            // Deserialized rules bypass `ReplacementRule::new`
            if rule.old_text.is_empty() {
                return Err(RuleError::EmptyOldText);
            }
            set.add(rule)?;
        }
        Ok(set)
    }
}

impl From<RuleSet> for Vec<ReplacementRule> {
    fn from(set: RuleSet) -> Self {
        set.rules
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a ReplacementRule;
    type IntoIter = std::slice::Iter<'a, ReplacementRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
