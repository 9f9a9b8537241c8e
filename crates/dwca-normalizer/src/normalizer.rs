//! Classification graph builder
//!
//! [`ClassificationNormalizer::normalize`] runs three passes in order:
//!
//! 1. ingest the core table into a flat id → taxon map, attaching core
//!    synonyms to their accepted taxa and remembering synonym redirects
//! 2. compute every taxon's ancestry path and the nested id tree
//! 3. attach synonyms and vernacular names from extension tables
//!
//! Broken references never abort a run; they are collected as
//! [`ErrorRecord`]s. Only unreadable tables and a core table without an id
//! or a scientific name are fatal.

use dwca_common::{DwcaError, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::canonical::{BasicCanonicalizer, NameCanonicalizer};
use crate::config::{NormalizeOptions, NormalizerConfig, StringsOptions, PATH_PROGRESS_INTERVAL};
use crate::descriptor::{terms, ArchiveDescriptor, FieldMap, TableRole};
use crate::error_log::ErrorRecord;
use crate::events::{EventSink, ExtensionKind, NormalizeEvent, TracingSink};
use crate::reader::{BadRow, TableReader};
use crate::taxon::{
    ExtendedIdentity, LinneanRank, NormalizedTaxon, SynonymRecord, TaxonTree, VernacularRecord,
};

/// Parent values that mean "no parent"
const NONE_SENTINELS: &[&str] = &["", "/N", "\\N"];

/// Parent value generated archives write for a root
const ROOT_PARENT: &str = "0";

/// Name used when a row has no scientific name
const MISSING_NAME: &str = "N/A";

/// A name index, either as its keys or as the backing map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameStrings<'a> {
    List(Vec<&'a str>),
    Hash(&'a IndexMap<String, u8>),
}

impl<'a> NameStrings<'a> {
    /// Names in insertion order
    pub fn into_vec(self) -> Vec<&'a str> {
        match self {
            NameStrings::List(list) => list,
            NameStrings::Hash(map) => map.keys().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NameStrings::List(list) => list.len(),
            NameStrings::Hash(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            NameStrings::List(list) => list.contains(&name),
            NameStrings::Hash(map) => map.contains_key(name),
        }
    }
}

/// Counts describing the last run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub taxa: usize,
    pub resolved_paths: usize,
    pub synonyms: usize,
    pub vernaculars: usize,
    pub errors: usize,
    pub name_strings: usize,
    pub vernacular_strings: usize,
}

/// Scientific name of one row, computed without touching the row
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScientificName {
    name: String,
    canonical: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathState {
    Unvisited,
    InProgress,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentLink {
    Root,
    Node(usize),
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: usize,
    parent: ParentLink,
}

pub struct ClassificationNormalizer<'a> {
    core: FieldMap,
    extensions: Vec<FieldMap>,
    canonicalizer: Box<dyn NameCanonicalizer + 'a>,
    sink: Box<dyn EventSink + 'a>,
    config: NormalizerConfig,
    status_synonym: Regex,
    synonym_table: Regex,
    with_canonical_names: bool,
    normalized_data: IndexMap<String, NormalizedTaxon>,
    synonyms: IndexMap<String, String>,
    name_strings: IndexMap<String, u8>,
    vernacular_name_strings: IndexMap<String, u8>,
    error_names: Vec<ErrorRecord>,
    tree: TaxonTree,
    paths_num: usize,
}

impl<'a> ClassificationNormalizer<'a> {
    /// Resolve the fields of every table in `archive`
    pub fn new(archive: &ArchiveDescriptor) -> Result<Self> {
        if archive.core.id.is_none() {
            return Err(DwcaError::CoreFile(
                "Darwin Core core fields must contain taxon id and scientific name".to_string(),
            ));
        }
        let core = FieldMap::resolve(&archive.core, TableRole::Core)?;
        let extensions = archive
            .extensions
            .iter()
            .map(|e| FieldMap::resolve(e, TableRole::Extension))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            core = %core.file_name(),
            extensions = extensions.len(),
            hierarchical = core.has_parent_reference(),
            "Resolved archive fields"
        );

        Ok(Self {
            core,
            extensions,
            canonicalizer: Box::new(BasicCanonicalizer::new()?),
            sink: Box::new(TracingSink),
            config: NormalizerConfig::default(),
            status_synonym: Regex::new(r"(?i)^syn")?,
            synonym_table: Regex::new(r"(?i)synonym")?,
            with_canonical_names: true,
            normalized_data: IndexMap::new(),
            synonyms: IndexMap::new(),
            name_strings: IndexMap::new(),
            vernacular_name_strings: IndexMap::new(),
            error_names: Vec::new(),
            tree: TaxonTree::new(),
            paths_num: 0,
        })
    }

    pub fn with_canonicalizer(mut self, canonicalizer: impl NameCanonicalizer + 'a) -> Self {
        self.canonicalizer = Box::new(canonicalizer);
        self
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_config(mut self, config: NormalizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.config.max_hierarchy_depth = depth;
        self
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn core_fields(&self) -> &FieldMap {
        &self.core
    }

    /// True if the core table declares a parent reference column
    pub fn is_hierarchical(&self) -> bool {
        self.core.has_parent_reference()
    }

    /// Build the normalized classification
    ///
    /// Every call starts from scratch, so repeated runs over the same tables
    /// produce equal results.
    pub fn normalize(&mut self, options: NormalizeOptions) -> Result<&IndexMap<String, NormalizedTaxon>> {
        self.config.validate()?;
        self.reset();
        self.with_canonical_names = options.with_canonical_names;

        self.sink.record(NormalizeEvent::Started {
            table: self.core.file_name(),
        });
        self.ingest_core()?;

        info!("Calculating the classification parent/child paths");
        if self.is_hierarchical() {
            self.calculate_classification_paths();
        } else {
            self.flat_classification();
        }

        if options.with_extensions {
            info!("Ingesting data from extensions");
            self.ingest_extensions()?;
        }

        self.sink.record(NormalizeEvent::Finished {
            taxa: self.normalized_data.len(),
            errors: self.error_names.len(),
        });
        Ok(&self.normalized_data)
    }

    pub fn normalized_data(&self) -> &IndexMap<String, NormalizedTaxon> {
        &self.normalized_data
    }

    pub fn tree(&self) -> &TaxonTree {
        &self.tree
    }

    pub fn error_names(&self) -> &[ErrorRecord] {
        &self.error_names
    }

    pub fn name_strings(&self, options: StringsOptions) -> NameStrings<'_> {
        Self::strings(&self.name_strings, options)
    }

    pub fn vernacular_name_strings(&self, options: StringsOptions) -> NameStrings<'_> {
        Self::strings(&self.vernacular_name_strings, options)
    }

    pub fn stats(&self) -> NormalizeStats {
        let values = self.normalized_data.values();
        NormalizeStats {
            taxa: self.normalized_data.len(),
            resolved_paths: values.clone().filter(|t| t.is_resolved()).count(),
            synonyms: values.clone().map(|t| t.synonyms.len()).sum(),
            vernaculars: values.map(|t| t.vernacular_names.len()).sum(),
            errors: self.error_names.len(),
            name_strings: self.name_strings.len(),
            vernacular_strings: self.vernacular_name_strings.len(),
        }
    }

    fn strings(map: &IndexMap<String, u8>, options: StringsOptions) -> NameStrings<'_> {
        if options.with_hash {
            NameStrings::Hash(map)
        } else {
            NameStrings::List(map.keys().map(String::as_str).collect())
        }
    }

    fn reset(&mut self) {
        self.normalized_data.clear();
        self.synonyms.clear();
        self.name_strings.clear();
        self.vernacular_name_strings.clear();
        self.error_names.clear();
        self.tree.clear();
        self.paths_num = 0;
    }

    fn add_name_string(&mut self, name: &str) {
        if !name.is_empty() && !self.name_strings.contains_key(name) {
            self.name_strings.insert(name.to_string(), 1);
        }
    }

    fn add_vernacular_name_string(&mut self, name: &str) {
        if !name.is_empty() && !self.vernacular_name_strings.contains_key(name) {
            self.vernacular_name_strings.insert(name.to_string(), 1);
        }
    }

    fn log_error(&mut self, record: ErrorRecord) {
        self.sink.record(NormalizeEvent::ErrorRecorded {
            kind: record.kind(),
            taxon: record.taxon_id().map(str::to_string),
        });
        self.error_names.push(record);
    }

    fn log_bad_rows(&mut self, table: &str, rows: Vec<BadRow>) {
        for data in rows {
            self.log_error(ErrorRecord::ReadingOrEncodingError {
                table: table.to_string(),
                data,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------------

    /// Full name and canonical form of a row
    ///
    /// An authorship column is appended to the name unless the name already
    /// contains it. When it is appended, the bare name is the canonical form.
    fn scientific_name(&self, fields: &FieldMap, cells: &[String]) -> ScientificName {
        let raw = fields
            .cell(cells, terms::SCIENTIFIC_NAME)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(MISSING_NAME);
        let authorship = fields
            .cell(cells, terms::SCIENTIFIC_NAME_AUTHORSHIP)
            .map(str::trim)
            .unwrap_or("");

        if !authorship.is_empty() && !raw.contains(authorship) {
            return ScientificName {
                name: format!("{} {}", raw, authorship),
                canonical: self.with_canonical_names.then(|| raw.to_string()),
            };
        }

        let canonical = self.with_canonical_names.then(|| {
            self.canonicalizer
                .canonicalize(raw)
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| raw.to_string())
        });
        ScientificName {
            name: raw.to_string(),
            canonical,
        }
    }

    // ------------------------------------------------------------------------
    // Pass 1: core table
    // ------------------------------------------------------------------------

    fn ingest_core(&mut self) -> Result<()> {
        if !self.core.has(terms::SCIENTIFIC_NAME) {
            return Err(DwcaError::CoreFile(
                "Darwin Core core fields must contain taxon id and scientific name".to_string(),
            ));
        }

        let core = self.core.clone();
        let table = core.file_name();
        let mut processed = 0;
        for batch in TableReader::open(&core, Some(self.config.batch_size))? {
            let batch = batch?;
            processed += batch.len();
            let quarantined = batch.bad.len();
            self.log_bad_rows(&table, batch.bad);
            for row in &batch.good {
                self.ingest_core_row(&core, &row.cells);
            }
            self.sink.record(NormalizeEvent::BatchIngested {
                table: table.clone(),
                processed,
                quarantined,
            });
        }
        Ok(())
    }

    fn ingest_core_row(&mut self, core: &FieldMap, cells: &[String]) {
        let id = core.id_cell(cells).map(str::trim).unwrap_or("").to_string();
        let name = self.scientific_name(core, cells);

        let accepted = core
            .cell(cells, terms::ACCEPTED_NAME_USAGE_ID)
            .map(str::trim)
            .filter(|a| !a.is_empty() && *a != id);
        if let Some(accepted) = accepted {
            self.add_synonym_from_core(core, cells, &id, accepted, name);
            return;
        }

        let synonym_by_status = !core.has(terms::ACCEPTED_NAME_USAGE_ID)
            && core
                .cell(cells, terms::TAXONOMIC_STATUS)
                .is_some_and(|s| self.status_synonym.is_match(s.trim()));
        if synonym_by_status && core.has_parent_reference() {
            let parent = core.parent_cell(cells).map(str::trim).unwrap_or("");
            if is_none_sentinel(parent) {
                let synonym = synonym_record(core, cells, Some(id), name);
                self.log_error(ErrorRecord::SynonymOfUnknownTaxa {
                    taxon_id: parent.to_string(),
                    synonym,
                });
            } else {
                self.add_synonym_from_core(core, cells, &id, parent, name);
            }
            return;
        }

        self.add_taxon_from_core(core, cells, id, name);
    }

    fn add_synonym_from_core(
        &mut self,
        core: &FieldMap,
        cells: &[String],
        own_id: &str,
        accepted_id: &str,
        name: ScientificName,
    ) {
        self.synonyms.insert(own_id.to_string(), accepted_id.to_string());
        let synonym = synonym_record(core, cells, Some(own_id.to_string()), name);
        self.add_name_string(&synonym.name);
        if let Some(canonical) = &synonym.canonical_name {
            self.add_name_string(canonical);
        }
        self.normalized_data
            .entry(accepted_id.to_string())
            .or_insert_with(|| NormalizedTaxon::new(accepted_id))
            .synonyms
            .push(synonym);
    }

    fn add_taxon_from_core(&mut self, core: &FieldMap, cells: &[String], id: String, name: ScientificName) {
        self.add_name_string(&name.name);
        if let Some(canonical) = &name.canonical {
            self.add_name_string(canonical);
        }

        let taxon = self
            .normalized_data
            .entry(id.clone())
            .or_insert_with(|| NormalizedTaxon::new(id.as_str()));

        taxon.id = id;
        taxon.current_name = name.name;
        taxon.current_name_canonical = name.canonical;
        taxon.parent_id = if core.has_parent_reference() {
            core.parent_cell(cells).map(|p| p.trim().to_string())
        } else {
            None
        };
        if core.has(terms::TAXON_RANK) {
            taxon.rank = optional_cell(core, cells, terms::TAXON_RANK);
        }
        if core.has(terms::TAXONOMIC_STATUS) {
            taxon.status = optional_cell(core, cells, terms::TAXONOMIC_STATUS);
        }
        if core.has(terms::SOURCE) {
            taxon.source = optional_cell(core, cells, terms::SOURCE);
        }
        if core.has(terms::LOCAL_ID) {
            taxon.local_id = optional_cell(core, cells, terms::LOCAL_ID);
        }
        if core.has(terms::GLOBAL_ID) {
            taxon.global_id = optional_cell(core, cells, terms::GLOBAL_ID);
        }
        taxon.linnean_classification_path = linnean_path(core, cells);

        if core.has(terms::ORIGINAL_NAME_USAGE_ID_PATH) {
            taxon.extended_identity = Some(ExtendedIdentity {
                uuid: optional_cell(core, cells, terms::ORIGINAL_NAME_USAGE_ID),
                uuid_path: core
                    .cell(cells, terms::ORIGINAL_NAME_USAGE_ID_PATH)
                    .map(|p| {
                        p.split('|')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Pass 2: ancestry paths
    // ------------------------------------------------------------------------

    fn flat_classification(&mut self) {
        let with_canonical = self.with_canonical_names;
        for taxon in self.normalized_data.values_mut() {
            taxon.classification_path_id = vec![taxon.id.clone()];
            if with_canonical {
                taxon.classification_path = vec![canonical_or_name(taxon)];
            }
            self.tree.insert_root(&taxon.id);
        }
    }

    fn calculate_classification_paths(&mut self) {
        let mut states = vec![PathState::Unvisited; self.normalized_data.len()];
        for start in 0..states.len() {
            if states[start] == PathState::Unvisited {
                self.resolve_path(start, &mut states);
            }
        }
        debug!(paths = self.paths_num, "Finished calculating paths");
    }

    /// Resolve `start` and every unresolved ancestor with an explicit stack
    ///
    /// A node fails as too deep exactly when its path would be longer than
    /// `max_hierarchy_depth`; its descendants fail with it. The outcome for
    /// every node is the same whichever row the walk starts from.
    fn resolve_path(&mut self, start: usize, states: &mut [PathState]) {
        let mut stack = vec![self.enter(start, states)];

        while let Some(&frame) = stack.last() {
            let parent = match frame.parent {
                ParentLink::Root => {
                    self.set_root_path(frame.node);
                    states[frame.node] = PathState::Resolved;
                    stack.pop();
                    continue;
                },
                ParentLink::Unknown => {
                    states[frame.node] = PathState::Failed;
                    stack.pop();
                    continue;
                },
                ParentLink::Node(parent) => parent,
            };

            match states[parent] {
                PathState::Resolved => {
                    if self.path_len(parent) >= self.config.max_hierarchy_depth {
                        states[frame.node] = PathState::Failed;
                        self.log_too_deep(frame.node);
                    } else {
                        self.set_child_path(frame.node, parent);
                        states[frame.node] = PathState::Resolved;
                    }
                    stack.pop();
                },
                PathState::Failed => {
                    states[frame.node] = PathState::Failed;
                    stack.pop();
                },
                PathState::InProgress => {
                    // Parent is on the stack, so the chain loops back on itself
                    let cycle_start = stack.iter().rposition(|f| f.node == parent).unwrap_or(0);
                    for member in stack.split_off(cycle_start) {
                        states[member.node] = PathState::Failed;
                        self.log_too_deep(member.node);
                    }
                },
                PathState::Unvisited => {
                    let next = self.enter(parent, states);
                    stack.push(next);
                },
            }
        }
    }

    /// Mark `node` in progress and look up its parent once
    fn enter(&mut self, node: usize, states: &mut [PathState]) -> Frame {
        states[node] = PathState::InProgress;
        Frame {
            node,
            parent: self.parent_link(node),
        }
    }

    fn parent_link(&mut self, node: usize) -> ParentLink {
        let Some((id, taxon)) = self.normalized_data.get_index(node) else {
            return ParentLink::Unknown;
        };
        let parent_id = match taxon.parent_id.as_deref() {
            None => return ParentLink::Root,
            Some(p) if is_none_sentinel(p) => return ParentLink::Root,
            Some(p) => p,
        };

        if let Some(index) = self.normalized_data.get_index_of(parent_id) {
            return ParentLink::Node(index);
        }
        if parent_id == ROOT_PARENT {
            return ParentLink::Root;
        }

        let id = id.clone();
        let parent_id = parent_id.to_string();
        let redirect = self
            .synonyms
            .get(&parent_id)
            .and_then(|accepted| self.normalized_data.get_index_of(accepted).map(|i| (i, accepted.clone())));

        match redirect {
            Some((index, accepted)) => {
                self.log_error(ErrorRecord::DeprecatedParent {
                    taxon: id,
                    parent_id,
                    current_parent: Some(accepted),
                });
                ParentLink::Node(index)
            },
            None => {
                self.log_error(ErrorRecord::DeprecatedParent {
                    taxon: id,
                    parent_id,
                    current_parent: None,
                });
                ParentLink::Unknown
            },
        }
    }

    fn path_len(&self, node: usize) -> usize {
        self.normalized_data
            .get_index(node)
            .map_or(0, |(_, taxon)| taxon.classification_path_id.len())
    }

    fn log_too_deep(&mut self, node: usize) {
        let taxon = self
            .normalized_data
            .get_index(node)
            .map(|(id, _)| id.clone())
            .unwrap_or_default();
        self.log_error(ErrorRecord::TooDeepHierarchy { taxon });
    }

    fn set_root_path(&mut self, node: usize) {
        let with_canonical = self.with_canonical_names;
        if let Some((_, taxon)) = self.normalized_data.get_index_mut(node) {
            taxon.classification_path_id = vec![taxon.id.clone()];
            if with_canonical {
                taxon.classification_path = vec![canonical_or_name(taxon)];
            }
            self.tree.insert_root(&taxon.id);
        }
        self.path_calculated();
    }

    fn set_child_path(&mut self, node: usize, parent: usize) {
        let Some((_, parent_taxon)) = self.normalized_data.get_index(parent) else {
            return;
        };
        let parent_ids = parent_taxon.classification_path_id.clone();
        let parent_names = parent_taxon.classification_path.clone();

        let with_canonical = self.with_canonical_names;
        if let Some((_, taxon)) = self.normalized_data.get_index_mut(node) {
            let mut ids = parent_ids;
            ids.push(taxon.id.clone());
            if with_canonical {
                let mut names = parent_names;
                names.push(canonical_or_name(taxon));
                taxon.classification_path = names;
            }
            self.tree.insert_at(&ids[..ids.len() - 1], &taxon.id);
            taxon.classification_path_id = ids;
        }
        self.path_calculated();
    }

    fn path_calculated(&mut self) {
        self.paths_num += 1;
        if self.paths_num % PATH_PROGRESS_INTERVAL == 0 {
            self.sink.record(NormalizeEvent::PathsCalculated {
                count: self.paths_num,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Pass 3: extensions
    // ------------------------------------------------------------------------

    fn ingest_extensions(&mut self) -> Result<()> {
        let extensions = self.extensions.clone();
        for extension in &extensions {
            let table = extension.file_name();
            let synonyms =
                self.synonym_table.is_match(&table) && extension.has(terms::SCIENTIFIC_NAME);
            let vernaculars = extension.has(terms::VERNACULAR_NAME);
            if !synonyms && !vernaculars {
                debug!(table = %table, "Skipping extension without synonyms or vernacular names");
                continue;
            }

            if synonyms {
                self.sink.record(NormalizeEvent::ExtensionStarted {
                    table: table.clone(),
                    kind: ExtensionKind::Synonyms,
                });
            }
            if vernaculars {
                self.sink.record(NormalizeEvent::ExtensionStarted {
                    table: table.clone(),
                    kind: ExtensionKind::VernacularNames,
                });
            }

            let mut processed = 0;
            for batch in TableReader::open(extension, Some(self.config.batch_size))? {
                let batch = batch?;
                processed += batch.len();
                let quarantined = batch.bad.len();
                self.log_bad_rows(&table, batch.bad);
                for row in &batch.good {
                    if synonyms {
                        self.ingest_extension_synonym(extension, &row.cells);
                    }
                    if vernaculars {
                        self.ingest_extension_vernacular(extension, &row.cells);
                    }
                }
                self.sink.record(NormalizeEvent::BatchIngested {
                    table: table.clone(),
                    processed,
                    quarantined,
                });
            }
        }
        Ok(())
    }

    fn ingest_extension_synonym(&mut self, fields: &FieldMap, cells: &[String]) {
        let taxon_id = fields.id_cell(cells).map(str::trim).unwrap_or("").to_string();
        let own_id = fields
            .index_of(terms::TAXON_ID)
            .filter(|i| *i != fields.id_index())
            .and_then(|i| cells.get(i))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let name = self.scientific_name(fields, cells);
        let synonym = synonym_record(fields, cells, own_id, name);

        if !self.normalized_data.contains_key(&taxon_id) {
            self.log_error(ErrorRecord::SynonymOfUnknownTaxa { taxon_id, synonym });
            return;
        }

        self.add_name_string(&synonym.name);
        if let Some(canonical) = &synonym.canonical_name {
            self.add_name_string(canonical);
        }
        if let Some(taxon) = self.normalized_data.get_mut(&taxon_id) {
            taxon.synonyms.push(synonym);
        }
    }

    fn ingest_extension_vernacular(&mut self, fields: &FieldMap, cells: &[String]) {
        let taxon_id = fields.id_cell(cells).map(str::trim).unwrap_or("").to_string();
        let vernacular = VernacularRecord {
            name: fields
                .cell(cells, terms::VERNACULAR_NAME)
                .map(|n| n.trim().to_string())
                .unwrap_or_default(),
            language: optional_cell(fields, cells, terms::LANGUAGE)
                .or_else(|| optional_cell(fields, cells, terms::LANGUAGE_CODE)),
            locality: optional_cell(fields, cells, terms::LOCALITY),
            country_code: optional_cell(fields, cells, terms::COUNTRY_CODE),
        };

        match self.normalized_data.get_mut(&taxon_id) {
            Some(taxon) => {
                let name = vernacular.name.clone();
                taxon.vernacular_names.push(vernacular);
                self.add_vernacular_name_string(&name);
            },
            None => {
                self.log_error(ErrorRecord::VernacularOfUnknownTaxa {
                    taxon_id,
                    vernacular,
                });
            },
        }
    }
}

fn is_none_sentinel(value: &str) -> bool {
    NONE_SENTINELS.contains(&value.trim())
}

/// Trimmed, non-empty cell of a declared term
fn optional_cell(fields: &FieldMap, cells: &[String], term: &str) -> Option<String> {
    fields
        .cell(cells, term)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn synonym_record(
    fields: &FieldMap,
    cells: &[String],
    id: Option<String>,
    name: ScientificName,
) -> SynonymRecord {
    SynonymRecord {
        id,
        name: name.name,
        canonical_name: name.canonical,
        status: optional_cell(fields, cells, terms::TAXONOMIC_STATUS),
        source: optional_cell(fields, cells, terms::SOURCE),
        local_id: optional_cell(fields, cells, terms::LOCAL_ID),
        global_id: optional_cell(fields, cells, terms::GLOBAL_ID),
    }
}

fn linnean_path(fields: &FieldMap, cells: &[String]) -> Vec<(String, LinneanRank)> {
    LinneanRank::ALL
        .iter()
        .filter_map(|rank| optional_cell(fields, cells, rank.term()).map(|v| (v, *rank)))
        .collect()
}

fn canonical_or_name(taxon: &NormalizedTaxon) -> String {
    taxon
        .current_name_canonical
        .clone()
        .unwrap_or_else(|| taxon.current_name.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::canonical::VerbatimCanonicalizer;
    use crate::descriptor::{FieldDescriptor, IdColumn, TableDescriptor, TableProperties};
    use crate::error_log::ErrorKind;
    use crate::events::MemorySink;
    use std::path::Path;
    use tempfile::TempDir;

    fn table(dir: &Path, name: &str, terms: &[&str], rows: &[&[&str]]) -> TableDescriptor {
        let mut content = terms.join("\t");
        content.push('\n');
        for row in rows {
            content.push_str(&row.join("\t"));
            content.push('\n');
        }
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        TableDescriptor {
            id: Some(IdColumn {
                index: 0,
                term: None,
            }),
            coreid: None,
            fields: terms
                .iter()
                .enumerate()
                .map(|(index, term)| FieldDescriptor {
                    term: format!("http://rs.tdwg.org/dwc/terms/{}", term),
                    index,
                })
                .collect(),
            properties: TableProperties {
                fields_terminated_by: Some("\\t".into()),
                ignore_header_lines: true,
                ..Default::default()
            },
            file_path: path,
        }
    }

    fn core(dir: &Path, terms: &[&str], rows: &[&[&str]]) -> ArchiveDescriptor {
        ArchiveDescriptor {
            core: table(dir, "taxa.txt", terms, rows),
            extensions: Vec::new(),
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scenario_chain_with_zero_root() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "parentNameUsageID", "scientificName"],
            &[
                &["1", "0", "Plantae"],
                &["2", "1", "Betula"],
                &["3", "2", "Betula verucosa"],
            ],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        let data = normalizer.normalize(NormalizeOptions::default()).unwrap();

        let taxon = &data["3"];
        assert_eq!(taxon.classification_path_id, ids(&["1", "2", "3"]));
        assert_eq!(taxon.classification_path, ids(&["Plantae", "Betula", "Betula verucosa"]));
        assert!(normalizer.error_names().is_empty());
        assert!(normalizer.tree().contains_path(&ids(&["1", "2", "3"])));
    }

    #[test]
    fn test_parent_redirected_through_synonym() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "parentNameUsageID", "acceptedNameUsageID", "scientificName"],
            &[
                &["1", "", "", "Plantae"],
                &["2", "1", "", "Betula"],
                &["5", "1", "2", "Betulla"],
                &["3", "5", "", "Betula verucosa"],
            ],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        let data = normalizer.normalize(NormalizeOptions::default()).unwrap();

        assert_eq!(data["3"].classification_path_id, ids(&["1", "2", "3"]));
        assert!(!data.contains_key("5"));
        assert_eq!(data["2"].synonyms[0].id.as_deref(), Some("5"));

        let errors = normalizer.error_names();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            ErrorRecord::DeprecatedParent {
                taxon: "3".into(),
                parent_id: "5".into(),
                current_parent: Some("2".into()),
            }
        );
    }

    #[test]
    fn test_unknown_parent_fails_only_that_branch() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "parentNameUsageID", "scientificName"],
            &[
                &["1", "", "Plantae"],
                &["2", "42", "Orphanus"],
                &["3", "2", "Orphanus minor"],
                &["4", "1", "Betula"],
            ],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        let data = normalizer.normalize(NormalizeOptions::default()).unwrap();

        assert!(data["2"].classification_path_id.is_empty());
        assert!(data["3"].classification_path_id.is_empty());
        assert_eq!(data["4"].classification_path_id, ids(&["1", "4"]));

        let errors = normalizer.error_names();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_unknown_parent());
    }

    #[test]
    fn test_cycle_is_reported_for_every_member() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "parentNameUsageID", "scientificName"],
            &[
                &["1", "3", "Alpha"],
                &["2", "1", "Beta"],
                &["3", "2", "Gamma"],
                &["4", "3", "Delta"],
            ],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        normalizer.normalize(NormalizeOptions::default()).unwrap();

        let too_deep: Vec<&str> = normalizer
            .error_names()
            .iter()
            .filter(|e| e.kind() == ErrorKind::TooDeepHierarchy)
            .filter_map(|e| e.taxon_id())
            .collect();
        assert_eq!(too_deep.len(), 3);
        assert!(!too_deep.contains(&"4"));
        assert!(normalizer.normalized_data()["4"].classification_path_id.is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Vec<String>> = (1..=20)
            .map(|i| vec![i.to_string(), if i == 1 { String::new() } else { (i - 1).to_string() }, format!("Name{}", i)])
            .rev()
            .collect();
        let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
        let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
        let archive = core(dir.path(), &["taxonID", "parentNameUsageID", "scientificName"], &rows);

        let mut normalizer = ClassificationNormalizer::new(&archive)
            .unwrap()
            .with_max_hierarchy_depth(5);
        normalizer.normalize(NormalizeOptions::default()).unwrap();

        let too_deep: Vec<&str> = normalizer
            .error_names()
            .iter()
            .filter(|e| e.kind() == ErrorKind::TooDeepHierarchy)
            .filter_map(|e| e.taxon_id())
            .collect();
        assert_eq!(too_deep, vec!["6"]);
        assert_eq!(normalizer.error_names().len(), 1);

        let data = normalizer.normalized_data();
        assert!(data["1"].is_root());
        for i in 1..=5 {
            assert_eq!(data[i.to_string().as_str()].classification_path_id.len(), i);
        }
        for i in 6..=20 {
            assert!(!data[i.to_string().as_str()].is_resolved());
        }
        assert_eq!(normalizer.tree().node_count(), 5);
    }

    #[test]
    fn test_status_synonym_attached_to_parent() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "parentNameUsageID", "scientificName", "taxonomicStatus"],
            &[
                &["1", "", "Betula", "accepted"],
                &["2", "1", "Betulla", "Synonym"],
                &["3", "", "Orphan", "synonym"],
            ],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        let data = normalizer.normalize(NormalizeOptions::default()).unwrap();

        assert_eq!(data.len(), 1);
        assert_eq!(data["1"].synonyms.len(), 1);
        assert_eq!(data["1"].synonyms[0].status.as_deref(), Some("Synonym"));
        assert_eq!(
            normalizer.error_names()[0].kind(),
            ErrorKind::SynonymOfUnknownTaxa
        );
    }

    #[test]
    fn test_flat_table() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "scientificName", "kingdom", "genus"],
            &[&["a", "Betula alba L.", "Plantae", "Betula"], &["b", "Alnus", "", "Alnus"]],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        let data = normalizer.normalize(NormalizeOptions::default()).unwrap();

        assert_eq!(data["a"].classification_path_id, ids(&["a"]));
        assert_eq!(data["a"].classification_path, ids(&["Betula alba"]));
        assert_eq!(
            data["a"].linnean_classification_path,
            vec![
                ("Plantae".to_string(), LinneanRank::Kingdom),
                ("Betula".to_string(), LinneanRank::Genus)
            ]
        );
        assert_eq!(data["b"].linnean_classification_path.len(), 1);
        assert_eq!(normalizer.tree().len(), 2);
    }

    #[test]
    fn test_authorship_column() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "scientificName", "scientificNameAuthorship"],
            &[
                &["1", "Betula verucosa", "Ehrh."],
                &["2", "Alnus glutinosa (L.) Gaertn.", "(L.) Gaertn."],
                &["3", "", ""],
            ],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive)
            .unwrap()
            .with_canonicalizer(VerbatimCanonicalizer);
        let data = normalizer.normalize(NormalizeOptions::default()).unwrap();

        assert_eq!(data["1"].current_name, "Betula verucosa Ehrh.");
        assert_eq!(data["1"].current_name_canonical.as_deref(), Some("Betula verucosa"));
        assert_eq!(data["2"].current_name, "Alnus glutinosa (L.) Gaertn.");
        assert_eq!(data["3"].current_name, "N/A");
    }

    #[test]
    fn test_missing_scientific_name_is_fatal() {
        let dir = TempDir::new().unwrap();
        let archive = core(dir.path(), &["taxonID", "taxonRank"], &[&["1", "species"]]);
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        let err = normalizer.normalize(NormalizeOptions::default()).unwrap_err();
        assert!(matches!(err, DwcaError::CoreFile(_)));
    }

    #[test]
    fn test_missing_id_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut archive = core(dir.path(), &["taxonID", "scientificName"], &[&["1", "Betula"]]);
        archive.core.id = None;
        assert!(matches!(
            ClassificationNormalizer::new(&archive),
            Err(DwcaError::CoreFile(_))
        ));
    }

    #[test]
    fn test_events_recorded() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "parentNameUsageID", "scientificName"],
            &[&["1", "", "Plantae"], &["2", "9", "Lost"]],
        );
        let mut sink = MemorySink::new();
        {
            let mut normalizer = ClassificationNormalizer::new(&archive)
                .unwrap()
                .with_sink(&mut sink);
            normalizer.normalize(NormalizeOptions::default()).unwrap();
        }
        assert!(matches!(sink.events.first(), Some(NormalizeEvent::Started { .. })));
        assert!(matches!(
            sink.events.last(),
            Some(NormalizeEvent::Finished { taxa: 2, errors: 1 })
        ));
        assert_eq!(
            sink.count(|e| matches!(e, NormalizeEvent::ErrorRecorded { .. })),
            1
        );
    }

    #[test]
    fn test_name_strings_options() {
        let dir = TempDir::new().unwrap();
        let archive = core(
            dir.path(),
            &["taxonID", "scientificName"],
            &[&["1", "Betula alba L."], &["2", "Betula alba L."]],
        );
        let mut normalizer = ClassificationNormalizer::new(&archive).unwrap();
        normalizer.normalize(NormalizeOptions::default()).unwrap();

        let list = normalizer.name_strings(StringsOptions::default());
        assert_eq!(list, NameStrings::List(vec!["Betula alba L.", "Betula alba"]));
        match normalizer.name_strings(StringsOptions::hash()) {
            NameStrings::Hash(map) => assert!(map.values().all(|v| *v == 1)),
            other => panic!("expected hash, got {:?}", other),
        }
        assert_eq!(normalizer.stats().name_strings, 2);
    }
}
