//! PDF concatenation with lopdf.

use camino::{Utf8Path, Utf8PathBuf};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic page trees
const MAX_TREE_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Nothing to merge")]
    NoInputs,

    #[error("Input PDF not found: {0}")]
    MissingInput(Utf8PathBuf),

    #[error("Failed to load PDF {path}: {source}")]
    Load {
        path: Utf8PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("PDF has no pages: {0}")]
    NoPages(Utf8PathBuf),

    #[error("Failed to write merged PDF {path}: {source}")]
    Save {
        path: Utf8PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Concatenates PDFs, pages in input order
#[cfg_attr(test, mockall::automock)]
pub trait PdfMerger: Send + Sync {
    fn merge(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<(), MergeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfMerger;

impl PdfMerger for LopdfMerger {
    fn merge(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<(), MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoInputs);
        }

        let mut documents = Vec::with_capacity(inputs.len());
        for path in inputs {
            if !path.is_file() {
                return Err(MergeError::MissingInput(path.clone()));
            }
            let mut doc = Document::load(path).map_err(|source| MergeError::Load {
                path: path.clone(),
                source,
            })?;
            if doc.get_pages().is_empty() {
                return Err(MergeError::NoPages(path.clone()));
            }
            flatten_inherited_attributes(&mut doc);
            documents.push(doc);
        }

        let mut merged = concatenate(documents);

        let folder = output
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let mut staged = NamedTempFile::new_in(folder).map_err(|source| MergeError::Io {
            path: output.to_path_buf(),
            source,
        })?;

        merged.compress();
        merged
            .save_to(&mut staged)
            .map_err(|source| MergeError::Save {
                path: output.to_path_buf(),
                source: lopdf::Error::IO(source),
            })?;
        staged.persist(output).map_err(|e| MergeError::Io {
            path: output.to_path_buf(),
            source: e.error,
        })?;

        tracing::debug!("Merged {} PDFs into {}", inputs.len(), output);
        Ok(())
    }
}

/// Build one document holding every page of `documents`, in order
fn concatenate(documents: Vec<Document>) -> Document {
    let version = documents
        .iter()
        .map(|doc| doc.version.clone())
        .max()
        .unwrap_or_else(|| "1.5".to_string());

    let mut max_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        page_ids.extend(doc.get_pages().into_values());
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version(version);
    merged.objects.extend(objects);
    // new_object_id() must hand out ids above every imported object
    merged.max_id = max_id - 1;

    let pages_id = merged.new_object_id();
    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(page_ids.len() as i64));
    pages.set(
        "Kids",
        Object::Array(page_ids.iter().map(|&id| Object::Reference(id)).collect()),
    );

    let catalog_id = merged.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    merged.objects.insert(pages_id, Object::Dictionary(pages));
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.trailer.set("Root", Object::Reference(catalog_id));

    for &page_id in &page_ids {
        if let Ok(page) = merged.get_dictionary_mut(page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    // Old catalogs and page tree nodes are no longer reachable
    let pruned = merged.prune_objects();
    tracing::trace!("Pruned {} unreachable objects", pruned.len());

    merged
}

/// Copy inherited attributes onto each page so it keeps them once re-parented
fn flatten_inherited_attributes(doc: &mut Document) {
    for page_id in doc.get_pages().into_values() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            continue;
        };

        let mut missing: Vec<&[u8]> = INHERITABLE
            .iter()
            .copied()
            .filter(|key| !page.has(key))
            .collect();
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut inherited: Vec<(Vec<u8>, Object)> = Vec::new();

        let mut depth = 0;
        while let Some(node_id) = parent {
            if missing.is_empty() || depth >= MAX_TREE_DEPTH {
                break;
            }
            let Ok(node) = doc.get_dictionary(node_id) else {
                break;
            };
            missing.retain(|key| match node.get(key) {
                Ok(value) => {
                    inherited.push((key.to_vec(), value.clone()));
                    false
                }
                Err(_) => true,
            });
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
            depth += 1;
        }

        if inherited.is_empty() {
            continue;
        }
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            for (key, value) in inherited {
                page.set(key, value);
            }
        }
    }
}
