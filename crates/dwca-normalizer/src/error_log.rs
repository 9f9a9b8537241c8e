//! Structured, non-fatal problems found while normalizing
//!
//! These never abort a run. They are collected in order and handed back
//! through `ClassificationNormalizer::error_names`.

use serde::{Deserialize, Serialize};

use crate::reader::BadRow;
use crate::taxon::{SynonymRecord, VernacularRecord};

/// One logged problem, serialized with an `error` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ErrorRecord {
    /// A quarantined row
    ReadingOrEncodingError { table: String, data: BadRow },

    /// Parent reference points at a synonym or at nothing at all
    ///
    /// `current_parent` is the accepted taxon the reference was redirected
    /// to; `None` means the parent is unknown and the taxon stays unresolved.
    DeprecatedParent {
        taxon: String,
        parent_id: String,
        current_parent: Option<String>,
    },

    /// Ancestry is deeper than the configured limit or loops back on itself
    TooDeepHierarchy { taxon: String },

    SynonymOfUnknownTaxa {
        taxon_id: String,
        synonym: SynonymRecord,
    },

    VernacularOfUnknownTaxa {
        taxon_id: String,
        vernacular: VernacularRecord,
    },
}

/// Discriminant of an [`ErrorRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ReadingOrEncodingError,
    DeprecatedParent,
    TooDeepHierarchy,
    SynonymOfUnknownTaxa,
    VernacularOfUnknownTaxa,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ReadingOrEncodingError => "reading_or_encoding_error",
            ErrorKind::DeprecatedParent => "deprecated_parent",
            ErrorKind::TooDeepHierarchy => "too_deep_hierarchy",
            ErrorKind::SynonymOfUnknownTaxa => "synonym_of_unknown_taxa",
            ErrorKind::VernacularOfUnknownTaxa => "vernacular_of_unknown_taxa",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorRecord {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorRecord::ReadingOrEncodingError { .. } => ErrorKind::ReadingOrEncodingError,
            ErrorRecord::DeprecatedParent { .. } => ErrorKind::DeprecatedParent,
            ErrorRecord::TooDeepHierarchy { .. } => ErrorKind::TooDeepHierarchy,
            ErrorRecord::SynonymOfUnknownTaxa { .. } => ErrorKind::SynonymOfUnknownTaxa,
            ErrorRecord::VernacularOfUnknownTaxa { .. } => ErrorKind::VernacularOfUnknownTaxa,
        }
    }

    /// Deprecated-parent entry with no accepted taxon to redirect to
    pub fn is_unknown_parent(&self) -> bool {
        matches!(
            self,
            ErrorRecord::DeprecatedParent {
                current_parent: None,
                ..
            }
        )
    }

    /// Id of the taxon the entry is about, when there is one
    pub fn taxon_id(&self) -> Option<&str> {
        match self {
            ErrorRecord::ReadingOrEncodingError { .. } => None,
            ErrorRecord::DeprecatedParent { taxon, .. } | ErrorRecord::TooDeepHierarchy { taxon } => {
                Some(taxon)
            },
            ErrorRecord::SynonymOfUnknownTaxa { taxon_id, .. }
            | ErrorRecord::VernacularOfUnknownTaxa { taxon_id, .. } => Some(taxon_id),
        }
    }
}
