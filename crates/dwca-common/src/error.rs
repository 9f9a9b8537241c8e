//! Error types for DwC-A normalization

use thiserror::Error;

/// Result type alias for DwC-A operations
pub type Result<T> = std::result::Result<T, DwcaError>;

/// Main error type for DwC-A operations
///
/// Only fatal conditions are errors. Malformed rows and broken classification
/// links are recoverable and end up in the normalizer's error log instead.
#[derive(Error, Debug)]
pub enum DwcaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delimited text error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Table descriptor is unusable (no fields, no id column, bad index)
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Declared encoding is not supported
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Core table cannot be normalized (missing taxon id or scientific name)
    #[error("Core file error: {0}")]
    CoreFile(String),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DwcaError {
    /// Whether the error comes from the input data rather than the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DwcaError::Descriptor(_) | DwcaError::Encoding(_) | DwcaError::CoreFile(_)
        )
    }
}
