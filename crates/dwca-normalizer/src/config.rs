//! Normalizer configuration

use dwca_common::{DwcaError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Normalizer Configuration Constants
// ============================================================================

/// Default number of data lines delivered per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default for computing canonical names.
pub const DEFAULT_WITH_CANONICAL_NAMES: bool = true;

/// Default for ingesting synonym and vernacular extensions.
pub const DEFAULT_WITH_EXTENSIONS: bool = true;

/// Default limit on the depth of an ancestry chain.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 10_000;

/// Emit a progress event every this many computed paths.
pub const PATH_PROGRESS_INTERVAL: usize = 10_000;

/// Normalizer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    pub batch_size: usize,
    pub with_canonical_names: bool,
    pub with_extensions: bool,
    pub max_hierarchy_depth: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            with_canonical_names: DEFAULT_WITH_CANONICAL_NAMES,
            with_extensions: DEFAULT_WITH_EXTENSIONS,
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }
}

impl NormalizerConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = NormalizerConfig {
            batch_size: std::env::var("DWCA_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            with_canonical_names: std::env::var("DWCA_WITH_CANONICAL_NAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WITH_CANONICAL_NAMES),
            with_extensions: std::env::var("DWCA_WITH_EXTENSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WITH_EXTENSIONS),
            max_hierarchy_depth: std::env::var("DWCA_MAX_HIERARCHY_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_HIERARCHY_DEPTH),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DwcaError::Config("Batch size must be greater than 0".to_string()));
        }

        if self.max_hierarchy_depth == 0 {
            return Err(DwcaError::Config(
                "Max hierarchy depth must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_canonical_names(mut self, enabled: bool) -> Self {
        self.with_canonical_names = enabled;
        self
    }

    pub fn with_extensions(mut self, enabled: bool) -> Self {
        self.with_extensions = enabled;
        self
    }

    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// Per-run options derived from this configuration
    pub fn options(&self) -> NormalizeOptions {
        NormalizeOptions {
            with_canonical_names: self.with_canonical_names,
            with_extensions: self.with_extensions,
        }
    }
}

/// Options for one `normalize` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    pub with_canonical_names: bool,
    pub with_extensions: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            with_canonical_names: true,
            with_extensions: true,
        }
    }
}

impl NormalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_canonical_names(mut self, enabled: bool) -> Self {
        self.with_canonical_names = enabled;
        self
    }

    pub fn with_extensions(mut self, enabled: bool) -> Self {
        self.with_extensions = enabled;
        self
    }
}

/// Options for reading back the name indexes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringsOptions {
    /// Return the backing map instead of a list of keys
    pub with_hash: bool,
}

impl StringsOptions {
    pub fn hash() -> Self {
        Self { with_hash: true }
    }
}
