//! Pairs generated documents with invoice PDFs by file-name key.
//!
//! The key of a generated document is the part of its stem before the
//! separator (`"Acme - January 2025.docx"` → `"acme"`). An invoice matches
//! when its lower-cased file name contains the key. Entries with more than
//! one candidate, and invoices claimed by more than one document, are
//! reported as ambiguous instead of being resolved by guessing.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

/// A generated document and the invoice it will be merged with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub generated: Utf8PathBuf,
    pub invoice: Utf8PathBuf,
    pub key: String,
}

impl MatchedPair {
    /// The merged output keeps the invoice's file name
    pub fn output_name(&self) -> &str {
        self.invoice.file_name().unwrap_or(self.invoice.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbiguityReason {
    /// The key matched several invoices
    MultipleInvoices,
    /// The single matching invoice also matched another document
    SharedInvoice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousMatch {
    pub generated: Utf8PathBuf,
    pub candidates: Vec<Utf8PathBuf>,
    pub reason: AmbiguityReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingOutcome {
    pub pairs: Vec<MatchedPair>,
    pub ambiguous: Vec<AmbiguousMatch>,
    pub unmatched_generated: Vec<Utf8PathBuf>,
    pub unmatched_invoices: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InvoiceMatcher {
    separator: String,
}

impl InvoiceMatcher {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Matching key for a generated document
    pub fn extract_key(&self, generated: &Utf8Path) -> String {
        let stem = generated
            .file_stem()
            .unwrap_or(generated.as_str());

        let head = if self.separator.is_empty() {
            stem
        } else {
            stem.split(self.separator.as_str()).next().unwrap_or(stem)
        };

        let key = head.trim();
        if key.is_empty() {
            stem.trim().to_lowercase()
        } else {
            key.to_lowercase()
        }
    }

    /// Pair every generated document with at most one invoice
    pub fn pair(&self, generated: &[Utf8PathBuf], invoices: &[Utf8PathBuf]) -> PairingOutcome {
        // Not a map: invoices differing only in case must stay separate candidates
        let lookup: Vec<(String, &Utf8PathBuf)> = invoices
            .iter()
            .map(|path| (file_name(path).to_lowercase(), path))
            .collect();

        // First pass: candidates per generated document
        let mut candidates: Vec<(&Utf8PathBuf, String, Vec<&Utf8PathBuf>)> = Vec::new();
        let mut claims: IndexMap<&Utf8PathBuf, usize> = IndexMap::new();

        for doc in generated {
            let key = self.extract_key(doc);
            let found: Vec<&Utf8PathBuf> = if key.is_empty() {
                Vec::new()
            } else {
                lookup
                    .iter()
                    .filter(|(name, _)| name.contains(key.as_str()))
                    .map(|(_, path)| *path)
                    .collect()
            };

            if let [only] = found.as_slice() {
                *claims.entry(*only).or_insert(0) += 1;
            }
            candidates.push((doc, key, found));
        }

        // Second pass: classify
        let mut outcome = PairingOutcome::default();
        for (doc, key, found) in candidates {
            match found.as_slice() {
                [] => {
                    tracing::warn!("No matching invoice for {} (key {:?})", file_name(doc), key);
                    outcome.unmatched_generated.push(doc.clone());
                }
                [invoice] if claims.get(invoice).copied().unwrap_or(0) > 1 => {
                    tracing::warn!(
                        "Invoice {} matches several documents, including {}",
                        file_name(invoice),
                        file_name(doc)
                    );
                    outcome.ambiguous.push(AmbiguousMatch {
                        generated: doc.clone(),
                        candidates: vec![(*invoice).clone()],
                        reason: AmbiguityReason::SharedInvoice,
                    });
                }
                [invoice] => {
                    tracing::debug!("Matched {} with {}", file_name(doc), file_name(invoice));
                    outcome.pairs.push(MatchedPair {
                        generated: doc.clone(),
                        invoice: (*invoice).clone(),
                        key,
                    });
                }
                many => {
                    tracing::warn!(
                        "{} matches {} invoices (key {:?})",
                        file_name(doc),
                        many.len(),
                        key
                    );
                    outcome.ambiguous.push(AmbiguousMatch {
                        generated: doc.clone(),
                        candidates: many.iter().map(|p| (*p).clone()).collect(),
                        reason: AmbiguityReason::MultipleInvoices,
                    });
                }
            }
        }

        // Invoices no document claimed at all
        let mut referenced: Vec<&Utf8PathBuf> = outcome.pairs.iter().map(|p| &p.invoice).collect();
        referenced.extend(outcome.ambiguous.iter().flat_map(|a| a.candidates.iter()));
        outcome.unmatched_invoices = invoices
            .iter()
            .filter(|invoice| !referenced.contains(invoice))
            .cloned()
            .collect();

        outcome
    }
}

impl Default for InvoiceMatcher {
    fn default() -> Self {
        Self::new(" - ")
    }
}

fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}
