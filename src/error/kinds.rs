use std::{fmt, io};

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// An export request failed validation.
    Validation(ValidationError),

    /// The record store rejected a lookup or query.
    Store(StoreError),

    /// The artifact storage failed to persist or remove a file.
    Storage(StorageError),

    /// A serializer failed to produce output.
    Output(OutputError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// The presented record does not belong to the export collection.
    NotAnExport,

    /// Target collection or owner could not be resolved.
    InvalidReference,

    /// Header list is malformed, names an unknown or fan-out path, or a bad timezone.
    InvalidHeaders,

    /// Filter, sort or access rule could not be executed.
    InvalidQuery,

    /// Output format is not one of the supported values.
    InvalidFormat,
}

impl ValidationKind {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationKind::NotAnExport => "validation_is_not_export",
            ValidationKind::InvalidReference => "validation_invalid_reference",
            ValidationKind::InvalidHeaders => "validation_invalid_headers",
            ValidationKind::InvalidQuery => "validation_invalid_query",
            ValidationKind::InvalidFormat => "validation_invalid_format",
        }
    }
}

/// A validation failure attributed to one or more declared export fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub fields: Vec<&'static str>,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationKind, fields: &[&'static str], message: impl Into<String>) -> Self {
        Self {
            kind,
            fields: fields.to_vec(),
            message: message.into(),
        }
    }

    pub fn not_an_export() -> Self {
        Self::new(ValidationKind::NotAnExport, &[], "is not export")
    }

    /// Whether this error is attributed to the given field.
    pub fn concerns(&self, field: &str) -> bool {
        self.fields.iter().any(|f| *f == field)
    }
}

/// Record store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No collection with the given name or id.
    CollectionNotFound(String),

    /// No record with the given id in the collection.
    RecordNotFound { collection: String, id: String },

    /// No admin with the given id.
    AdminNotFound(String),

    /// Filter expression failed to parse or names an unknown field.
    InvalidFilter(String),

    /// Sort expression names an unknown field.
    InvalidSort(String),

    /// A record could not be stored.
    InvalidRecord(String),
}

/// Artifact storage errors.
#[derive(Debug)]
pub enum StorageError {
    /// Key is empty or escapes the storage root.
    InvalidKey(String),

    /// Writing the artifact failed.
    WriteFailed { key: String, source: io::Error },

    /// Removing artifacts failed.
    DeleteFailed { key: String, source: io::Error },
}

/// Serializer errors.
#[derive(Debug)]
pub enum OutputError {
    /// Delimited-text writer failure.
    Csv(String),

    /// Spreadsheet writer failure.
    Xlsx(String),

    /// Rows were written after the output was finalized.
    Finalized,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Validation(e) => write!(f, "{e}"),
            ExportError::Store(e) => write!(f, "Store error: {e}"),
            ExportError::Storage(e) => write!(f, "Storage error: {e}"),
            ExportError::Output(e) => write!(f, "Output error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            write!(f, "{}: {}", self.kind.code(), self.message)
        } else {
            write!(
                f,
                "{} ({}): {}",
                self.kind.code(),
                self.fields.join(", "),
                self.message
            )
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::CollectionNotFound(name) => write!(f, "Collection not found: {name}"),
            StoreError::RecordNotFound { collection, id } => {
                write!(f, "Record '{id}' not found in '{collection}'")
            }
            StoreError::AdminNotFound(id) => write!(f, "Admin not found: {id}"),
            StoreError::InvalidFilter(msg) => write!(f, "Invalid filter: {msg}"),
            StoreError::InvalidSort(msg) => write!(f, "Invalid sort: {msg}"),
            StoreError::InvalidRecord(msg) => write!(f, "Invalid record: {msg}"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidKey(key) => write!(f, "Invalid artifact key: '{key}'"),
            StorageError::WriteFailed { key, source } => {
                write!(f, "Failed to write '{key}': {source}")
            }
            StorageError::DeleteFailed { key, source } => {
                write!(f, "Failed to delete '{key}': {source}")
            }
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Csv(msg) => write!(f, "CSV write error: {msg}"),
            OutputError::Xlsx(msg) => write!(f, "XLSX write error: {msg}"),
            OutputError::Finalized => write!(f, "Output already finalized"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for StoreError {}
impl std::error::Error for OutputError {}
impl std::error::Error for ConfigError {}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::InvalidKey(_) => None,
            StorageError::WriteFailed { source, .. } | StorageError::DeleteFailed { source, .. } => {
                Some(source)
            }
        }
    }
}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<ValidationError> for ExportError {
    fn from(err: ValidationError) -> Self {
        ExportError::Validation(err)
    }
}

impl From<StoreError> for ExportError {
    fn from(err: StoreError) -> Self {
        ExportError::Store(err)
    }
}

impl From<StorageError> for ExportError {
    fn from(err: StorageError) -> Self {
        ExportError::Storage(err)
    }
}

impl From<OutputError> for ExportError {
    fn from(err: OutputError) -> Self {
        ExportError::Output(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::Output(OutputError::Csv(err.to_string()))
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::Output(OutputError::Xlsx(err.to_string()))
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}

impl ExportError {
    /// Validation details, if this is a validation failure.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ExportError::Validation(e) => Some(e),
            _ => None,
        }
    }
}
