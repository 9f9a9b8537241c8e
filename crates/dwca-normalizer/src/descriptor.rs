//! Table descriptors and the field resolver
//!
//! A [`TableDescriptor`] is what the archive/descriptor collaborator hands
//! over for each table: the declared fields, the id (or core-id) column and
//! the text-format properties. [`FieldMap::resolve`] turns it into the
//! immutable lookup used by the reader and the classification normalizer.
//!
//! Terms are matched by their last URI segment, lowercased, so
//! `http://rs.tdwg.org/dwc/terms/scientificName` and `scientificName` are
//! the same field.

use dwca_common::{DwcaError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Normalized term names used by the normalizer
pub mod terms {
    pub const TAXON_ID: &str = "taxonid";
    pub const SCIENTIFIC_NAME: &str = "scientificname";
    pub const SCIENTIFIC_NAME_AUTHORSHIP: &str = "scientificnameauthorship";
    pub const ACCEPTED_NAME_USAGE_ID: &str = "acceptednameusageid";
    pub const HIGHER_TAXON_ID: &str = "highertaxonid";
    pub const PARENT_NAME_USAGE_ID: &str = "parentnameusageid";
    pub const ORIGINAL_NAME_USAGE_ID: &str = "originalnameusageid";
    pub const ORIGINAL_NAME_USAGE_ID_PATH: &str = "originalnameusageidpath";
    pub const TAXON_RANK: &str = "taxonrank";
    pub const TAXONOMIC_STATUS: &str = "taxonomicstatus";
    pub const SOURCE: &str = "source";
    pub const LOCAL_ID: &str = "localid";
    pub const GLOBAL_ID: &str = "globalid";
    pub const VERNACULAR_NAME: &str = "vernacularname";
    pub const LANGUAGE: &str = "language";
    pub const LANGUAGE_CODE: &str = "languagecode";
    pub const LOCALITY: &str = "locality";
    pub const COUNTRY_CODE: &str = "countrycode";
}

/// Reduce a term URI to its lookup key
pub fn normalize_term(term: &str) -> String {
    term.rsplit('/').next().unwrap_or(term).trim().to_lowercase()
}

/// Declared id or core-id column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdColumn {
    pub index: usize,
    #[serde(default)]
    pub term: Option<String>,
}

/// One declared field of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub term: String,
    pub index: usize,
}

/// Text-format attributes of a table, as declared by the descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableProperties {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub fields_terminated_by: Option<String>,
    #[serde(default)]
    pub fields_enclosed_by: Option<String>,
    #[serde(default)]
    pub lines_terminated_by: Option<String>,
    #[serde(default, deserialize_with = "deserialize_header_flag")]
    pub ignore_header_lines: bool,
    #[serde(default)]
    pub row_type: Option<String>,
}

/// Descriptors write `ignoreHeaderLines` as `1`, `"1"`, `true` or `"true"`
fn deserialize_header_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Number(n)) => n == 1,
        Some(Flag::Text(s)) => matches!(s.trim().to_lowercase().as_str(), "1" | "true"),
        None => false,
    })
}

/// Everything known about one table before it is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default)]
    pub id: Option<IdColumn>,
    #[serde(default)]
    pub coreid: Option<IdColumn>,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub properties: TableProperties,
    pub file_path: PathBuf,
}

/// Core table plus extensions, as produced by the descriptor collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub core: TableDescriptor,
    #[serde(default)]
    pub extensions: Vec<TableDescriptor>,
}

impl ArchiveDescriptor {
    /// Load a JSON descriptor; relative table paths resolve against its directory
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut descriptor: ArchiveDescriptor = serde_json::from_str(&content)?;
        if let Some(base) = path.parent() {
            descriptor.resolve_paths(base);
        }
        Ok(descriptor)
    }

    /// Prefix every relative `file_path` with `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for table in std::iter::once(&mut self.core).chain(self.extensions.iter_mut()) {
            if table.file_path.is_relative() {
                table.file_path = base.join(&table.file_path);
            }
        }
    }
}

/// Whether a table is the core table or an extension linked to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableRole {
    Core,
    Extension,
}

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    Utf8,
    Utf16,
}

impl TextEncoding {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-16" | "utf16" => Ok(TextEncoding::Utf16),
            other => Err(DwcaError::Encoding(format!(
                "No support for encodings other than utf-8 or utf-16, got '{}'",
                other
            ))),
        }
    }
}

/// How physical lines end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    /// `\n`, `\r\n` or `\r`
    Newline,
    Byte(u8),
}

/// Immutable per-table lookup: term → column, id column, text format
#[derive(Debug, Clone)]
pub struct FieldMap {
    role: TableRole,
    file_path: PathBuf,
    fields: IndexMap<String, usize>,
    id_index: usize,
    parent_index: Option<usize>,
    encoding: TextEncoding,
    delimiter: u8,
    quote: Option<u8>,
    terminator: LineTerminator,
    ignore_header: bool,
    min_columns: usize,
}

impl FieldMap {
    /// Resolve a table descriptor
    ///
    /// The core table needs an `id` column. Extensions link through `coreid`,
    /// falling back to `id` when a descriptor only declares that.
    pub fn resolve(descriptor: &TableDescriptor, role: TableRole) -> Result<Self> {
        if descriptor.fields.is_empty() {
            return Err(DwcaError::Descriptor(format!(
                "No data fields are declared for {}",
                descriptor.file_path.display()
            )));
        }

        let id = match role {
            TableRole::Core => descriptor.id.as_ref(),
            TableRole::Extension => descriptor.coreid.as_ref().or(descriptor.id.as_ref()),
        };
        let id_index = id.map(|c| c.index).ok_or_else(|| {
            DwcaError::Descriptor(format!(
                "{} table {} has no id column",
                match role {
                    TableRole::Core => "Core",
                    TableRole::Extension => "Extension",
                },
                descriptor.file_path.display()
            ))
        })?;

        let mut fields = IndexMap::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            fields.insert(normalize_term(&field.term), field.index);
        }

        let parent_index = fields
            .get(terms::HIGHER_TAXON_ID)
            .or_else(|| fields.get(terms::PARENT_NAME_USAGE_ID))
            .copied();

        let props = &descriptor.properties;
        let encoding = TextEncoding::parse(props.encoding.as_deref().unwrap_or("UTF-8"))?;
        let delimiter = parse_delimiter(props.fields_terminated_by.as_deref())?;
        let quote = parse_quote(props.fields_enclosed_by.as_deref())?;
        let terminator = parse_terminator(props.lines_terminated_by.as_deref())?;

        let max_index = fields.values().copied().chain(std::iter::once(id_index)).max().unwrap_or(0);

        Ok(Self {
            role,
            file_path: descriptor.file_path.clone(),
            fields,
            id_index,
            parent_index,
            encoding,
            delimiter,
            quote,
            terminator,
            ignore_header: props.ignore_header_lines,
            min_columns: max_index + 1,
        })
    }

    pub fn role(&self) -> TableRole {
        self.role
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// File name used in log lines and for extension classification
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.display().to_string())
    }

    pub fn has(&self, term: &str) -> bool {
        self.fields.contains_key(term)
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.fields.get(term).copied()
    }

    /// Declared (term, index) pairs in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, usize)> {
        self.fields.iter().map(|(t, i)| (t.as_str(), *i))
    }

    /// Cell of `term` in a decoded row, if the term is declared
    pub fn cell<'r>(&self, cells: &'r [String], term: &str) -> Option<&'r str> {
        self.index_of(term)
            .and_then(|i| cells.get(i))
            .map(String::as_str)
    }

    /// Id column for the core, core-id column for extensions
    pub fn id_index(&self) -> usize {
        self.id_index
    }

    pub fn id_cell<'r>(&self, cells: &'r [String]) -> Option<&'r str> {
        cells.get(self.id_index).map(String::as_str)
    }

    /// True if `higherTaxonID` or `parentNameUsageID` is declared
    pub fn has_parent_reference(&self) -> bool {
        self.parent_index.is_some()
    }

    /// Column of the parent reference, `higherTaxonID` preferred
    pub fn parent_reference_index(&self) -> Option<usize> {
        self.parent_index
    }

    pub fn parent_cell<'r>(&self, cells: &'r [String]) -> Option<&'r str> {
        self.parent_index
            .and_then(|i| cells.get(i))
            .map(String::as_str)
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// `None` means fields are never quoted
    pub fn quote(&self) -> Option<u8> {
        self.quote
    }

    pub fn terminator(&self) -> LineTerminator {
        self.terminator
    }

    pub fn ignore_header(&self) -> bool {
        self.ignore_header
    }

    /// Rows with fewer cells than this are quarantined
    pub fn min_columns(&self) -> usize {
        self.min_columns
    }
}

/// Map escaped descriptor notation (`\t`, `\n`, ...) to the actual character
fn unescape(value: &str) -> String {
    value
        .replace("\\t", "\t")
        .replace("\\r", "\r")
        .replace("\\n", "\n")
}

fn single_byte(value: &str, what: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] => Ok(*b),
        _ => Err(DwcaError::Descriptor(format!(
            "{} must be a single byte, got {:?}",
            what, value
        ))),
    }
}

fn parse_delimiter(value: Option<&str>) -> Result<u8> {
    match value {
        None | Some("") => Ok(b','),
        Some(v) => single_byte(&unescape(v), "fieldsTerminatedBy"),
    }
}

fn parse_quote(value: Option<&str>) -> Result<Option<u8>> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => single_byte(v, "fieldsEnclosedBy").map(Some),
    }
}

fn parse_terminator(value: Option<&str>) -> Result<LineTerminator> {
    let value = value.map(unescape).unwrap_or_else(|| "\n".to_string());
    match value.as_str() {
        "" | "\n" | "\r\n" | "\r" => Ok(LineTerminator::Newline),
        other => single_byte(other, "linesTerminatedBy").map(LineTerminator::Byte),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn field(term: &str, index: usize) -> FieldDescriptor {
        FieldDescriptor {
            term: term.to_string(),
            index,
        }
    }

    fn core_descriptor() -> TableDescriptor {
        TableDescriptor {
            id: Some(IdColumn {
                index: 0,
                term: None,
            }),
            coreid: None,
            fields: vec![
                field("http://rs.tdwg.org/dwc/terms/taxonID", 0),
                field("http://rs.tdwg.org/dwc/terms/parentNameUsageID", 1),
                field("http://rs.tdwg.org/dwc/terms/scientificName", 2),
                field("http://rs.tdwg.org/dwc/terms/taxonRank", 3),
            ],
            properties: TableProperties {
                fields_terminated_by: Some("\\t".to_string()),
                ignore_header_lines: true,
                ..Default::default()
            },
            file_path: PathBuf::from("/tmp/archive/taxa.txt"),
        }
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("http://rs.tdwg.org/dwc/terms/scientificName"), "scientificname");
        assert_eq!(normalize_term("taxonID"), "taxonid");
    }

    #[test]
    fn test_resolve_core() {
        let map = FieldMap::resolve(&core_descriptor(), TableRole::Core).unwrap();
        assert_eq!(map.delimiter(), b'\t');
        assert_eq!(map.quote(), None);
        assert_eq!(map.terminator(), LineTerminator::Newline);
        assert!(map.ignore_header());
        assert_eq!(map.encoding(), TextEncoding::Utf8);
        assert_eq!(map.index_of(terms::SCIENTIFIC_NAME), Some(2));
        assert!(map.has_parent_reference());
        assert_eq!(map.parent_reference_index(), Some(1));
        assert_eq!(map.min_columns(), 4);
        assert_eq!(map.file_name(), "taxa.txt");
    }

    #[test]
    fn test_higher_taxon_preferred() {
        let mut desc = core_descriptor();
        desc.fields.push(field("higherTaxonID", 4));
        let map = FieldMap::resolve(&desc, TableRole::Core).unwrap();
        assert_eq!(map.parent_reference_index(), Some(4));
    }

    #[test]
    fn test_no_parent_reference() {
        let mut desc = core_descriptor();
        desc.fields.remove(1);
        let map = FieldMap::resolve(&desc, TableRole::Core).unwrap();
        assert!(!map.has_parent_reference());
    }

    #[test]
    fn test_core_without_id_fails() {
        let mut desc = core_descriptor();
        desc.id = None;
        let err = FieldMap::resolve(&desc, TableRole::Core).unwrap_err();
        assert!(matches!(err, DwcaError::Descriptor(_)));
    }

    #[test]
    fn test_extension_uses_coreid() {
        let desc = TableDescriptor {
            id: None,
            coreid: Some(IdColumn {
                index: 2,
                term: None,
            }),
            fields: vec![field("vernacularName", 0), field("language", 1)],
            properties: TableProperties::default(),
            file_path: PathBuf::from("vernacular.txt"),
        };
        let map = FieldMap::resolve(&desc, TableRole::Extension).unwrap();
        assert_eq!(map.id_index(), 2);
        assert_eq!(map.min_columns(), 3);
        assert_eq!(map.delimiter(), b',');
    }

    #[test]
    fn test_unsupported_encoding() {
        let mut desc = core_descriptor();
        desc.properties.encoding = Some("ISO-8859-1".to_string());
        let err = FieldMap::resolve(&desc, TableRole::Core).unwrap_err();
        assert!(matches!(err, DwcaError::Encoding(_)));

        desc.properties.encoding = Some("UTF16".to_string());
        let map = FieldMap::resolve(&desc, TableRole::Core).unwrap();
        assert_eq!(map.encoding(), TextEncoding::Utf16);
    }

    #[test]
    fn test_empty_fields_fail() {
        let mut desc = core_descriptor();
        desc.fields.clear();
        assert!(FieldMap::resolve(&desc, TableRole::Core).is_err());
    }

    #[test]
    fn test_cell_lookup() {
        let map = FieldMap::resolve(&core_descriptor(), TableRole::Core).unwrap();
        let row: Vec<String> = ["3", "2", "Betula verucosa", "species"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(map.cell(&row, terms::SCIENTIFIC_NAME), Some("Betula verucosa"));
        assert_eq!(map.cell(&row, terms::TAXONOMIC_STATUS), None);
        assert_eq!(map.id_cell(&row), Some("3"));
        assert_eq!(map.parent_cell(&row), Some("2"));
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "core": {
                "id": {"index": 0},
                "fields": [
                    {"term": "http://rs.tdwg.org/dwc/terms/taxonID", "index": 0},
                    {"term": "http://rs.tdwg.org/dwc/terms/scientificName", "index": 1}
                ],
                "properties": {"encoding": "UTF-8", "fieldsTerminatedBy": "\\t", "ignoreHeaderLines": "1"},
                "file_path": "taxa.txt"
            },
            "extensions": [{
                "coreid": {"index": 0},
                "fields": [{"term": "vernacularName", "index": 1}],
                "properties": {"ignoreHeaderLines": 1},
                "file_path": "/data/vernacular.txt"
            }]
        }"#;
        let mut archive: ArchiveDescriptor = serde_json::from_str(json).unwrap();
        assert!(archive.core.properties.ignore_header_lines);
        assert!(archive.extensions[0].properties.ignore_header_lines);

        archive.resolve_paths(Path::new("/archive"));
        assert_eq!(archive.core.file_path, PathBuf::from("/archive/taxa.txt"));
        assert_eq!(archive.extensions[0].file_path, PathBuf::from("/data/vernacular.txt"));
    }
}
