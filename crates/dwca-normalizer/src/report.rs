//! Serializable views of a finished normalization

use std::io::Write;

use chrono::{DateTime, Utc};
use dwca_common::Result;
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::StringsOptions;
use crate::error_log::ErrorRecord;
use crate::normalizer::{ClassificationNormalizer, NormalizeStats};
use crate::taxon::{NormalizedTaxon, TaxonTree};

/// Everything a run produced
#[derive(Debug, Serialize)]
pub struct NormalizationReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub taxa: &'a IndexMap<String, NormalizedTaxon>,
    pub tree: &'a TaxonTree,
    pub errors: &'a [ErrorRecord],
    pub name_strings: Vec<&'a str>,
    pub vernacular_name_strings: Vec<&'a str>,
    pub stats: NormalizeStats,
}

impl<'a> NormalizationReport<'a> {
    pub fn new(normalizer: &'a ClassificationNormalizer<'_>) -> Self {
        Self {
            generated_at: Utc::now(),
            taxa: normalizer.normalized_data(),
            tree: normalizer.tree(),
            errors: normalizer.error_names(),
            name_strings: normalizer.name_strings(StringsOptions::default()).into_vec(),
            vernacular_name_strings: normalizer
                .vernacular_name_strings(StringsOptions::default())
                .into_vec(),
            stats: normalizer.stats(),
        }
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Counts only, with errors grouped by kind
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub core: String,
    pub stats: NormalizeStats,
    pub errors_by_kind: IndexMap<String, usize>,
}

impl SummaryReport {
    pub fn new(normalizer: &ClassificationNormalizer<'_>) -> Self {
        let mut errors_by_kind: IndexMap<String, usize> = IndexMap::new();
        for error in normalizer.error_names() {
            *errors_by_kind.entry(error.kind().to_string()).or_default() += 1;
        }
        Self {
            generated_at: Utc::now(),
            core: normalizer.core_fields().file_name(),
            stats: normalizer.stats(),
            errors_by_kind,
        }
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
