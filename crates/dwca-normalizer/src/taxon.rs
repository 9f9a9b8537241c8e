//! Normalized classification model

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ranks read directly from dedicated rank columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinneanRank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Subgenus,
}

impl LinneanRank {
    /// All ranks, highest first
    pub const ALL: [LinneanRank; 7] = [
        LinneanRank::Kingdom,
        LinneanRank::Phylum,
        LinneanRank::Class,
        LinneanRank::Order,
        LinneanRank::Family,
        LinneanRank::Genus,
        LinneanRank::Subgenus,
    ];

    /// Normalized term of the column carrying this rank
    pub fn term(&self) -> &'static str {
        match self {
            LinneanRank::Kingdom => "kingdom",
            LinneanRank::Phylum => "phylum",
            LinneanRank::Class => "class",
            LinneanRank::Order => "order",
            LinneanRank::Family => "family",
            LinneanRank::Genus => "genus",
            LinneanRank::Subgenus => "subgenus",
        }
    }
}

impl std::fmt::Display for LinneanRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.term())
    }
}

/// Stable identifiers of GNUB-flavoured sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedIdentity {
    pub uuid: Option<String>,
    pub uuid_path: Vec<String>,
}

/// A synonym attached to its accepted taxon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymRecord {
    /// The synonym's own row id; absent for side-table rows without one
    pub id: Option<String>,
    pub name: String,
    pub canonical_name: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub local_id: Option<String>,
    pub global_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VernacularRecord {
    pub name: String,
    pub language: Option<String>,
    pub locality: Option<String>,
    pub country_code: Option<String>,
}

/// One node of the normalized classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTaxon {
    pub id: String,
    pub local_id: Option<String>,
    pub global_id: Option<String>,
    pub source: Option<String>,
    pub parent_id: Option<String>,
    /// Root-first ancestor ids ending with `id`; empty until resolved
    pub classification_path_id: Vec<String>,
    /// Canonical names parallel to `classification_path_id`
    pub classification_path: Vec<String>,
    pub linnean_classification_path: Vec<(String, LinneanRank)>,
    pub current_name: String,
    pub current_name_canonical: Option<String>,
    pub rank: Option<String>,
    pub status: Option<String>,
    pub synonyms: Vec<SynonymRecord>,
    pub vernacular_names: Vec<VernacularRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_identity: Option<ExtendedIdentity>,
}

impl NormalizedTaxon {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// True once an ancestry path has been computed
    pub fn is_resolved(&self) -> bool {
        !self.classification_path_id.is_empty()
    }

    /// True for a resolved node whose path is only itself
    pub fn is_root(&self) -> bool {
        self.classification_path_id.len() == 1
    }
}

/// Nested id tree mirroring the computed ancestry paths
///
/// Serializes as nested JSON objects: `{"1": {"2": {"3": {}}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaxonTree(IndexMap<String, TaxonTree>);

impl TaxonTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Add `id` at the top level if it is not there yet
    pub fn insert_root(&mut self, id: &str) {
        self.0.entry(id.to_string()).or_default();
    }

    /// Add `id` under the node reached by following `parent_path`
    ///
    /// Returns `false` if `parent_path` does not lead to an existing node.
    pub fn insert_at(&mut self, parent_path: &[String], id: &str) -> bool {
        let mut node = self;
        for key in parent_path {
            match node.0.get_mut(key) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.0.entry(id.to_string()).or_default();
        true
    }

    /// Node reached by following `path` from the top level
    pub fn get(&self, path: &[String]) -> Option<&TaxonTree> {
        let mut node = self;
        for key in path {
            node = node.0.get(key)?;
        }
        Some(node)
    }

    pub fn contains_path(&self, path: &[String]) -> bool {
        self.get(path).is_some()
    }

    /// Child ids in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &TaxonTree)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of nodes below this one
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += node.0.len();
            stack.extend(node.0.values());
        }
        count
    }
}

// Deep hierarchies would overflow the stack with the derived recursive drop
impl Drop for TaxonTree {
    fn drop(&mut self) {
        let mut pending = vec![std::mem::take(&mut self.0)];
        while let Some(mut level) = pending.pop() {
            for (_, mut child) in level.drain(..) {
                pending.push(std::mem::take(&mut child.0));
            }
        }
    }
}
