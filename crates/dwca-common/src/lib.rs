//! DwC-A Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the DwC-A normalizer workspace.
//!
//! - **Error Handling**: [`DwcaError`] and the [`Result`] alias used by every
//!   library crate in the workspace
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`] for
//!   binaries
//!
//! # Example
//!
//! ```no_run
//! use dwca_common::{DwcaError, Result};
//!
//! fn require_id(index: Option<usize>) -> Result<usize> {
//!     index.ok_or_else(|| DwcaError::Descriptor("core table has no id column".into()))
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{DwcaError, Result};
