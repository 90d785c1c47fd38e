//! Error handling module for export operations.
//!
//! This module provides:
//! - A crate-wide error type wrapping store, storage, output and config failures
//! - Field-attributed validation errors for export requests
//! - Consistent JSON error formatting for clients and logging
//!
//! # Example
//!
//! ```rust
//! use record_export::error::{ErrorResponse, ExportError, ValidationError};
//!
//! let err: ExportError = ValidationError::not_an_export().into();
//! let response = ErrorResponse::from_error(&err);
//! println!("{}", response.to_json_pretty().unwrap());
//! ```

pub mod kinds;
pub mod response;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ExportError, OutputError, Result, StorageError, StoreError, ValidationError,
    ValidationKind,
};
pub use response::{ErrorInfo, ErrorResponse};
