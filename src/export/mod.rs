//! Export engine turning a stored export request into a CSV or XLSX artifact
//!
//! # Architecture
//!
//! 1. **validate**: Resolves the export record's references and checks its
//!    filter, sort and headers against the target collection's schema
//! 2. **PageDriver**: Fetches pages of records on behalf of the owner and
//!    loads the relations the headers traverse
//! 3. **resolver**: Turns one record into one row of cells
//! 4. **FormatWriter**: Encodes rows as CSV or XLSX
//!
//! These components are orchestrated by the **ExportCoordinator**, and the
//! **ExportService** hooks the whole pipeline into the record lifecycle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use record_export::export::{ExportOptions, ExportRequest, ExportService, export_collection};
//! use record_export::storage::MemoryStorage;
//! use record_export::store::MemoryStore;
//!
//! # async fn run() -> record_export::Result<()> {
//! let store = Arc::new(MemoryStore::load_fixture("fixture.json").await?);
//! let exports = export_collection();
//! store.add_collection(exports.clone()).await;
//!
//! let service = ExportService::new(store, Arc::new(MemoryStorage::new()), ExportOptions::default());
//! let request: ExportRequest = serde_json::from_str(r#"{
//!     "exportCollectionName": "messages",
//!     "headers": [{ "fieldName": "title", "header": "Title" }],
//!     "format": "csv"
//! }"#).map_err(|e| e.to_string())?;
//! let created = service.create_export(request.to_record(&exports)).await?;
//! println!("artifact stored at {:?}", created.artifact_key);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod format;
pub mod query;
pub mod resolver;
pub mod service;
pub mod spec;
pub mod validate;
pub mod writers;

pub use coordinator::{ExportCoordinator, ExportResult};
pub use query::{DEFAULT_PAGE_SIZE, PageDriver, scoped_query};
pub use resolver::{Column, ExpansionIndex};
pub use service::{
    Artifact, CreatedExport, ExportOptions, ExportService, GenerationHandle, GenerationOutcome, PreparedExport,
};
pub use spec::{
    EXPORT_COLLECTION_NAME, ExportRequest, ExportSpecification, HeaderItem, OutputFormat, export_collection,
};
pub use validate::validate_and_fill;
pub use writers::{CsvWriter, FormatWriter, XlsxWriter};
