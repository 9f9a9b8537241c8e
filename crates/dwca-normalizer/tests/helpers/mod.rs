//! Test helpers for normalizer integration tests
//!
//! This module provides utilities for:
//! - Writing tab-separated fixture tables into a temporary archive directory
//! - Building the matching descriptors
//! - Small assertion helpers
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use dwca_normalizer::descriptor::{FieldDescriptor, IdColumn, TableProperties};
use dwca_normalizer::{ArchiveDescriptor, TableDescriptor};
use tempfile::TempDir;

const DWC_TERMS: &str = "http://rs.tdwg.org/dwc/terms/";

/// Temporary archive directory with a core table and optional extensions
pub struct TestArchive {
    dir: TempDir,
    core: Option<TableDescriptor>,
    extensions: Vec<TableDescriptor>,
}

impl TestArchive {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            core: None,
            extensions: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Core table `taxa.txt` with a header line; the id is column 0
    pub fn with_core(mut self, terms: &[&str], rows: &[&[&str]]) -> Self {
        let path = self.write_table("taxa.txt", terms, rows);
        self.core = Some(table_descriptor(path, terms, true));
        self
    }

    /// Extension table with a header line; the core id is column 0
    pub fn with_extension(mut self, file_name: &str, terms: &[&str], rows: &[&[&str]]) -> Self {
        let path = self.write_table(file_name, terms, rows);
        self.extensions.push(table_descriptor(path, terms, false));
        self
    }

    /// Core table from raw bytes, no header, tab separated
    pub fn with_raw_core(mut self, terms: &[&str], bytes: &[u8], encoding: &str) -> Self {
        let path = self.write_raw("taxa.txt", bytes);
        let mut descriptor = table_descriptor(path, terms, true);
        descriptor.properties.ignore_header_lines = false;
        descriptor.properties.encoding = Some(encoding.to_string());
        self.core = Some(descriptor);
        self
    }

    pub fn write_raw(&self, file_name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, bytes).expect("Failed to write fixture");
        path
    }

    pub fn descriptor(&self) -> ArchiveDescriptor {
        ArchiveDescriptor {
            core: self.core.clone().expect("Core table not set"),
            extensions: self.extensions.clone(),
        }
    }

    /// Write `descriptor.json` with table paths relative to the archive directory
    pub fn write_descriptor(&self) -> PathBuf {
        let mut descriptor = self.descriptor();
        for table in std::iter::once(&mut descriptor.core).chain(descriptor.extensions.iter_mut()) {
            let name = table.file_path.file_name().unwrap().to_owned();
            table.file_path = PathBuf::from(name);
        }
        let path = self.dir.path().join("descriptor.json");
        std::fs::write(&path, serde_json::to_string_pretty(&descriptor).unwrap())
            .expect("Failed to write descriptor");
        path
    }

    fn write_table(&self, file_name: &str, terms: &[&str], rows: &[&[&str]]) -> PathBuf {
        let mut content = terms.join("\t");
        content.push('\n');
        for row in rows {
            content.push_str(&row.join("\t"));
            content.push('\n');
        }
        self.write_raw(file_name, content.as_bytes())
    }
}

impl Default for TestArchive {
    fn default() -> Self {
        Self::new()
    }
}

fn table_descriptor(path: PathBuf, terms: &[&str], core: bool) -> TableDescriptor {
    let id = Some(IdColumn {
        index: 0,
        term: None,
    });
    TableDescriptor {
        id: if core { id.clone() } else { None },
        coreid: if core { None } else { id },
        fields: terms
            .iter()
            .enumerate()
            .map(|(index, term)| FieldDescriptor {
                term: if term.contains('/') {
                    term.to_string()
                } else {
                    format!("{}{}", DWC_TERMS, term)
                },
                index,
            })
            .collect(),
        properties: TableProperties {
            encoding: Some("UTF-8".to_string()),
            fields_terminated_by: Some("\\t".to_string()),
            ignore_header_lines: true,
            ..Default::default()
        },
        file_path: path,
    }
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Rows of a chain where row `i` (1-based) points at `parent(i)`
pub fn numbered_rows<F>(count: usize, parent: F) -> Vec<Vec<String>>
where
    F: Fn(usize) -> String,
{
    (1..=count)
        .map(|i| vec![i.to_string(), parent(i), format!("Taxon{}", i)])
        .collect()
}

/// Borrow owned rows in the shape `with_core` takes
pub fn as_rows(rows: &[Vec<String>]) -> Vec<Vec<&str>> {
    rows.iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect()
}

pub fn as_slices<'a>(rows: &'a [Vec<&'a str>]) -> Vec<&'a [&'a str]> {
    rows.iter().map(Vec::as_slice).collect()
}
