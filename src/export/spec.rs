//! Export specification types
//!
//! An export is requested by creating a record in the `exports`
//! collection. The record carries the target collection, the owner, the
//! filter and sort strings, the serialized header list and the output
//! format. [`ExportSpecification`] is the filled, validated form of such a
//! record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::{Collection, CollectionKind, Field, FieldKind, Principal, Record, Value};

/// Name of the collection holding export records
pub const EXPORT_COLLECTION_NAME: &str = "exports";

/// Field names persisted on an export record
pub mod fields {
    pub const EXPORT_COLLECTION_NAME: &str = "exportCollectionName";
    pub const OWNER_ID: &str = "ownerId";
    pub const OWNER_COLLECTION_NAME: &str = "ownerCollectionName";
    pub const FILTER: &str = "filter";
    pub const SORT: &str = "sort";
    pub const HEADERS: &str = "headers";
    pub const FORMAT: &str = "format";
    pub const OUTPUT: &str = "output";
}

/// Rule hosts should apply when a non-admin creates an export record
pub const EXPORT_CREATE_RULE: &str = "ownerId = @request.auth.id && ownerCollectionName = @request.auth.collectionName && @request.data.output:isset = false";

/// Output format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma separated values
    Csv,
    /// Office Open XML spreadsheet
    Xlsx,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }

    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Parse the persisted format string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(OutputFormat::Csv),
            "xlsx" => Some(OutputFormat::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared output column
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderItem {
    /// Dotted field path, e.g. `author.email`
    pub field_name: String,
    /// Column label
    #[serde(default)]
    pub header: String,
    /// IANA zone for timestamp cells; empty means UTC
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timezone: String,
    /// Substitutions keyed by the stringified cell value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_map: BTreeMap<String, serde_json::Value>,
}

impl HeaderItem {
    pub fn new(field_name: &str, header: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            header: header.to_string(),
            ..Default::default()
        }
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    pub fn with_value(mut self, raw: &str, display: impl Into<serde_json::Value>) -> Self {
        self.value_map.insert(raw.to_string(), display.into());
        self
    }
}

/// Parse the serialized header list stored on an export record
///
/// The field may hold a JSON array (as stored) or its text form.
pub fn parse_headers(value: &Value) -> Result<Vec<HeaderItem>, String> {
    let headers: Vec<HeaderItem> = match value {
        Value::Null => Vec::new(),
        Value::Text(s) if s.trim().is_empty() => Vec::new(),
        Value::Text(s) => serde_json::from_str(s).map_err(|e| e.to_string())?,
        other => serde_json::from_value(serde_json::Value::from(other)).map_err(|e| e.to_string())?,
    };

    if headers.is_empty() {
        return Err("at least one header is required".to_string());
    }
    if let Some(item) = headers.iter().find(|h| h.field_name.trim().is_empty()) {
        return Err(format!("header \"{}\" has an empty field name", item.header));
    }
    Ok(headers)
}

/// A validated export request
///
/// Built by [`super::validate::validate_and_fill`]; carries the resolved
/// target collection and acting principal so generation does not need to
/// look them up again.
#[derive(Debug, Clone)]
pub struct ExportSpecification {
    /// The export record the specification was built from
    pub record: Record,
    /// Collection the rows are read from
    pub collection: Collection,
    /// Identity the export runs on behalf of
    pub principal: Principal,
    pub headers: Vec<HeaderItem>,
    pub filter: String,
    pub sort: String,
    pub format: OutputFormat,
    /// Artifact file name, empty until assigned
    pub output: String,
}

impl ExportSpecification {
    /// Header labels in declared order
    pub fn labels(&self) -> Vec<&str> {
        self.headers.iter().map(|h| h.header.as_str()).collect()
    }

    /// Storage key of the artifact for this export
    pub fn artifact_key(&self) -> String {
        crate::storage::artifact_key(&self.record.base_files_path(), &self.output)
    }
}

/// Untrusted export request as submitted by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub export_collection_name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub owner_collection_name: String,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub sort: String,
    #[serde(default)]
    pub headers: Vec<HeaderItem>,
    pub format: String,
}

impl ExportRequest {
    /// Build an (unsaved) export record from this request
    pub fn to_record(&self, exports: &Collection) -> Record {
        let headers = serde_json::to_value(&self.headers).unwrap_or_default();
        Record::new(exports)
            .with(fields::EXPORT_COLLECTION_NAME, self.export_collection_name.as_str())
            .with(fields::OWNER_ID, self.owner_id.as_str())
            .with(fields::OWNER_COLLECTION_NAME, self.owner_collection_name.as_str())
            .with(fields::FILTER, self.filter.as_str())
            .with(fields::SORT, self.sort.as_str())
            .with(fields::HEADERS, Value::Json(headers))
            .with(fields::FORMAT, self.format.as_str())
    }
}

/// Schema of the export record collection
pub fn export_collection() -> Collection {
    let text = |name| Field::new(name, FieldKind::Text);

    let mut collection = Collection::new(EXPORT_COLLECTION_NAME, EXPORT_COLLECTION_NAME, CollectionKind::Base)
        .with_field(text(fields::EXPORT_COLLECTION_NAME))
        .with_field(Field::new(fields::HEADERS, FieldKind::Json))
        .with_field(text(fields::FILTER))
        .with_field(text(fields::SORT))
        .with_field(Field::new(fields::OUTPUT, FieldKind::File))
        .with_field(Field::new(
            fields::FORMAT,
            FieldKind::Select {
                values: vec![OutputFormat::Csv.to_string(), OutputFormat::Xlsx.to_string()],
            },
        ))
        .with_field(text(fields::OWNER_ID))
        .with_field(text(fields::OWNER_COLLECTION_NAME));
    collection.create_rule = Some(EXPORT_CREATE_RULE.to_string());
    collection
}
