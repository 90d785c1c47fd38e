//! Record Export Library
//!
//! Validated, paginated, access-scoped tabular exports from a record store.
//! An export record names a target collection, a filter and sort, a list of
//! column headers (dotted field paths with optional timezone and value
//! map) and an output format. The engine validates it, pages through the
//! matching records on behalf of the export's owner, resolves each header
//! into a cell and streams the rows into a CSV or XLSX artifact.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Validation, generation and lifecycle hooks
//! - `storage`: Artifact storage sinks
//! - `store`: Record store abstraction and in-memory implementation
//! - `utils`: Utility functions and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use record_export::{Config, ExportOptions, ExportService};
//! use record_export::storage::LocalStorage;
//! use record_export::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let store = MemoryStore::load_fixture("fixture.json").await?;
//!     let service = ExportService::new(
//!         Arc::new(store),
//!         Arc::new(LocalStorage::new(&config.storage.root)),
//!         ExportOptions::from(&config.export),
//!     );
//!
//!     let swept = service.on_periodic_sweep(config.retention()).await?;
//!     println!("Removed {} expired exports", swept);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod storage;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{ExportOptions, ExportRequest, ExportService, ExportSpecification, OutputFormat};
pub use storage::ArtifactStorage;
pub use store::{MemoryStore, RecordStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
