//! Services module - document operations used by the batch jobs.
//!
//! Nothing here knows about batches, progress or the console. Each service
//! takes explicit inputs and returns explicit results, so the executor can
//! run them on any worker and tests can swap in fakes.
//!
//! # Components
//!
//! - [`discovery`]: lists the input files of a folder
//! - [`rename`]: output names from replacement rules, with collision checks
//! - [`pairing`]: matches generated documents with invoice PDFs
//! - [`DocxEditor`]: rewrites text and fonts inside DOCX packages
//! - [`DocumentConverter`]: DOCX to PDF through headless LibreOffice
//! - [`PdfMerger`]: concatenates PDFs with lopdf
//!
//! The converter and merger are traits because they are the slow,
//! environment-dependent seams of a combine job.

pub mod conversion;
pub mod discovery;
pub mod docx;
pub mod merge;
pub mod pairing;
pub mod rename;

pub use conversion::{ConversionError, DocumentConverter, SofficeConverter};
pub use discovery::list_files;
pub use docx::{DocumentError, DocxEditor};
pub use merge::{LopdfMerger, MergeError, PdfMerger};
pub use pairing::{AmbiguityReason, AmbiguousMatch, InvoiceMatcher, MatchedPair, PairingOutcome};
pub use rename::{plan_renames, target_name, ConflictReason, PlannedRename, RenameConflict, RenamePlan};
