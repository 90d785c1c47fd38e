use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ExportError, ValidationError};

/// Structured error information for a single field or for the request as a whole.
///
/// This is intended to be serialized to JSON and consumed by clients that
/// present field-level messages.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub(crate) code: String,
    pub(crate) message: String,
}

/// JSON error envelope returned to the caller that requested an export.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub(crate) error_type: String,
    pub(crate) message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub(crate) data: BTreeMap<String, ErrorInfo>,
}

impl ErrorResponse {
    /// Build a response from any crate error.
    pub fn from_error(error: &ExportError) -> Self {
        match error {
            ExportError::Validation(v) => Self::from_validation(v),
            ExportError::Store(e) => Self::simple("store_error", e.to_string()),
            ExportError::Storage(e) => Self::simple("storage_error", e.to_string()),
            ExportError::Output(e) => Self::simple("output_error", e.to_string()),
            ExportError::Config(e) => Self::simple("config_error", e.to_string()),
            ExportError::Io(e) => Self::simple("io_error", e.to_string()),
            ExportError::Generic(msg) => Self::simple("error", msg.clone()),
        }
    }

    /// One `data` entry per attributed field, all sharing the same code.
    pub fn from_validation(error: &ValidationError) -> Self {
        let info = ErrorInfo {
            code: error.kind.code().to_string(),
            message: error.message.clone(),
        };

        let data = error
            .fields
            .iter()
            .map(|field| (field.to_string(), info.clone()))
            .collect();

        Self {
            error_type: error.kind.code().to_string(),
            message: "Failed to create export.".to_string(),
            data,
        }
    }

    fn simple(error_type: &str, message: String) -> Self {
        Self {
            error_type: error_type.to_string(),
            message,
            data: BTreeMap::new(),
        }
    }

    /// Field names carrying an error.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Convert to pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Convert to compact JSON string (single line).
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
