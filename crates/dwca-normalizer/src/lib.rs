//! DwC-A Normalizer
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Rebuilds a taxonomic classification from the tables of a Darwin Core
//! Archive.
//!
//! - **Descriptors**: [`descriptor::FieldMap`] resolves declared terms to
//!   column indices
//! - **Reading**: [`reader::TableReader`] streams rows in batches, repairing
//!   or quarantining undecodable and short rows
//! - **Normalizing**: [`ClassificationNormalizer`] builds the taxon map,
//!   ancestry paths, the nested tree, name indexes and an error log
//!
//! # Example
//!
//! ```no_run
//! use dwca_normalizer::{ArchiveDescriptor, ClassificationNormalizer, NormalizeOptions};
//!
//! fn run() -> dwca_common::Result<()> {
//!     let archive = ArchiveDescriptor::from_path("archive/descriptor.json")?;
//!     let mut normalizer = ClassificationNormalizer::new(&archive)?;
//!     let taxa = normalizer.normalize(NormalizeOptions::default())?;
//!     println!("{} taxa", taxa.len());
//!     Ok(())
//! }
//! ```

pub mod canonical;
pub mod config;
pub mod descriptor;
pub mod error_log;
pub mod events;
pub mod normalizer;
pub mod reader;
pub mod report;
pub mod taxon;

pub use canonical::{BasicCanonicalizer, NameCanonicalizer, VerbatimCanonicalizer};
pub use config::{NormalizeOptions, NormalizerConfig, StringsOptions};
pub use descriptor::{ArchiveDescriptor, FieldMap, TableDescriptor, TableRole};
pub use error_log::{ErrorKind, ErrorRecord};
pub use events::{EventSink, MemorySink, NormalizeEvent, TracingSink};
pub use normalizer::{ClassificationNormalizer, NameStrings, NormalizeStats};
pub use reader::{BadRow, BadRowReason, RawRow, RowBatch, TableReader};
pub use report::{NormalizationReport, SummaryReport};
pub use taxon::{
    ExtendedIdentity, LinneanRank, NormalizedTaxon, SynonymRecord, TaxonTree, VernacularRecord,
};
