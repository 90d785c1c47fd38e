//! Data model shared with the record store
//!
//! Collections describe a schema, records hold typed [`Value`]s keyed by
//! field name. System fields (`id`, `created`, `updated`, and for auth
//! collections `username`, `email`, `emailVisibility`, `verified`) are
//! always resolvable even though they are not listed in the schema.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layout used by the store when rendering timestamps as text.
pub const DEFAULT_DATE_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

const BASE_SYSTEM_FIELDS: [&str; 3] = ["id", "created", "updated"];
const AUTH_SYSTEM_FIELDS: [&str; 4] = ["username", "email", "emailVisibility", "verified"];

/// A single field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Json(serde_json::Value),
}

impl Value {
    /// Whether the value counts as blank (null, empty text, empty list)
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Borrow the text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value according to the declared field kind
    ///
    /// # Arguments
    /// * `value` - Raw JSON value
    /// * `kind` - Declared schema kind of the field
    ///
    /// # Returns
    /// * `Result<Value, String>` - Typed value or a description of the mismatch
    pub fn from_json_with_kind(
        value: serde_json::Value,
        kind: &FieldKind,
    ) -> std::result::Result<Value, String> {
        match (kind, value) {
            (_, serde_json::Value::Null) => Ok(Value::Null),
            (FieldKind::Json, value) => Ok(Value::Json(value)),
            (FieldKind::Date, serde_json::Value::String(s)) => {
                if s.is_empty() {
                    return Ok(Value::Null);
                }
                parse_datetime(&s)
                    .map(Value::DateTime)
                    .ok_or_else(|| format!("invalid date '{s}'"))
            }
            (FieldKind::Date, other) => Err(format!("invalid date {other}")),
            (FieldKind::Relation { .. }, serde_json::Value::String(s)) => Ok(Value::Text(s)),
            (FieldKind::Relation { .. }, serde_json::Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(Value::Text(s)),
                    other => Err(format!("invalid relation id {other}")),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::List),
            (FieldKind::Relation { .. }, other) => Err(format!("invalid relation {other}")),
            (_, value) => Ok(Value::from(value)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DEFAULT_DATE_LAYOUT)),
            Value::List(_) => write!(f, "{}", serde_json::Value::from(self)),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Render a float without a trailing `.0` for whole numbers
fn format_float(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e10 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Parse a timestamp in RFC 3339 or the store's own layouts
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in ["%Y-%m-%d %H:%M:%S%.fZ", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            object @ serde_json::Value::Object(_) => Value::Json(object),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Value::from(*n),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(_) => serde_json::Value::String(value.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Json(v) => v.clone(),
        }
    }
}

/// Collection type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    #[default]
    Base,
    Auth,
}

/// Schema kind of a field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Email,
    Url,
    Date,
    Json,
    File,
    Select {
        #[serde(default)]
        values: Vec<String>,
    },
    Relation {
        #[serde(rename = "collectionId")]
        collection_id: String,
        #[serde(rename = "maxSelect", default)]
        max_select: Option<u32>,
    },
}

impl FieldKind {
    /// Target collection and whether the relation yields at most one record
    pub fn relation(&self) -> Option<(&str, bool)> {
        match self {
            FieldKind::Relation {
                collection_id,
                max_select,
            } => Some((collection_id.as_str(), *max_select == Some(1))),
            _ => None,
        }
    }
}

/// Schema field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// Single-record relation to the given collection
    pub fn relation(name: &str, collection_id: &str) -> Self {
        Self::new(
            name,
            FieldKind::Relation {
                collection_id: collection_id.to_string(),
                max_select: Some(1),
            },
        )
    }
}

/// Collection schema and access rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CollectionKind,
    #[serde(default)]
    pub schema: Vec<Field>,
    /// Filter applied to list queries by non-admin principals; `None` means no rule
    #[serde(default)]
    pub list_rule: Option<String>,
    #[serde(default)]
    pub create_rule: Option<String>,
}

impl Collection {
    pub fn new(id: &str, name: &str, kind: CollectionKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            schema: Vec::new(),
            list_rule: None,
            create_rule: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.schema.push(field);
        self
    }

    pub fn with_list_rule(mut self, rule: &str) -> Self {
        self.list_rule = Some(rule.to_string());
        self
    }

    pub fn is_auth(&self) -> bool {
        self.kind == CollectionKind::Auth
    }

    /// Look up a schema field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.schema.iter().find(|f| f.name == name)
    }

    /// Whether `name` is a system field of this collection
    pub fn is_system_field(&self, name: &str) -> bool {
        BASE_SYSTEM_FIELDS.contains(&name) || (self.is_auth() && AUTH_SYSTEM_FIELDS.contains(&name))
    }

    /// Whether `name` resolves to a schema or system field
    pub fn has_field(&self, name: &str) -> bool {
        self.is_system_field(name) || self.field(name).is_some()
    }

    /// Schema kind of `name`; system timestamps are dates, other system fields text
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        if let Some(field) = self.field(name) {
            return Some(field.kind.clone());
        }
        match name {
            "created" | "updated" => Some(FieldKind::Date),
            "verified" | "emailVisibility" if self.is_auth() => Some(FieldKind::Bool),
            _ if self.is_system_field(name) => Some(FieldKind::Text),
            _ => None,
        }
    }
}

/// Privileged administrator identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    collection_id: String,
    collection_name: String,
    id: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    data: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record of the given collection
    pub fn new(collection: &Collection) -> Self {
        let now = Utc::now();
        Self {
            collection_id: collection.id.clone(),
            collection_name: collection.name.clone(),
            id: String::new(),
            created: now,
            updated: now,
            data: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self.updated = created;
        self
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Whether the record belongs to the collection with the given name
    pub fn belongs_to(&self, collection_name: &str) -> bool {
        self.collection_name == collection_name
    }

    /// Read a field, including system fields; unknown fields read as null
    pub fn get(&self, field: &str) -> Value {
        match field {
            "id" => Value::Text(self.id.clone()),
            "created" => Value::DateTime(self.created),
            "updated" => Value::DateTime(self.updated),
            "collectionId" => Value::Text(self.collection_id.clone()),
            "collectionName" => Value::Text(self.collection_name.clone()),
            _ => self.data.get(field).cloned().unwrap_or_default(),
        }
    }

    /// Read a field as text; null reads as the empty string
    pub fn get_string(&self, field: &str) -> String {
        match self.get(field) {
            Value::Text(s) => s,
            other => other.to_string(),
        }
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        match field {
            "id" => self.id = value.to_string(),
            "created" | "updated" => {
                if let Value::DateTime(dt) = value {
                    if field == "created" {
                        self.created = dt;
                    } else {
                        self.updated = dt;
                    }
                }
            }
            _ => {
                self.data.insert(field.to_string(), value);
            }
        }
    }

    /// Ids referenced by a relation field (single or multiple)
    pub fn relation_ids(&self, field: &str) -> Vec<String> {
        match self.data.get(field) {
            Some(Value::Text(id)) if !id.is_empty() => vec![id.clone()],
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Storage prefix for files attached to this record
    pub fn base_files_path(&self) -> String {
        format!("{}/{}", self.collection_id, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(42.0).to_string(), "42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(
            Value::List(vec!["a".into(), Value::Int(1)]).to_string(),
            "[\"a\",1]"
        );

        let dt = Utc.with_ymd_and_hms(2023, 6, 11, 5, 57, 46).unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2023-06-11 05:57:46.000Z");
    }

    #[test]
    fn test_parse_datetime_layouts() {
        let expected = Utc.with_ymd_and_hms(2023, 6, 11, 5, 57, 46).unwrap();
        assert_eq!(parse_datetime("2023-06-11T05:57:46Z"), Some(expected));
        assert_eq!(parse_datetime("2023-06-11 05:57:46.000Z"), Some(expected));
        assert_eq!(parse_datetime("2023-06-11 05:57:46"), Some(expected));
        assert!(parse_datetime("2023-06-11").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_from_json_with_kind() {
        let date = Value::from_json_with_kind(
            serde_json::json!("2023-06-11 05:57:46.552Z"),
            &FieldKind::Date,
        )
        .unwrap();
        assert!(matches!(date, Value::DateTime(_)));

        let relation = Value::from_json_with_kind(
            serde_json::json!(["a", "b"]),
            &FieldKind::Relation {
                collection_id: "users".into(),
                max_select: None,
            },
        )
        .unwrap();
        assert_eq!(relation, Value::List(vec!["a".into(), "b".into()]));

        assert!(Value::from_json_with_kind(serde_json::json!(1), &FieldKind::Date).is_err());
    }

    #[test]
    fn test_record_system_fields() {
        let users = Collection::new("_pb_users", "users", CollectionKind::Auth);
        let record = Record::new(&users).with_id("u1").with("name", "Ann");

        assert_eq!(record.get_string("id"), "u1");
        assert_eq!(record.get_string("collectionName"), "users");
        assert_eq!(record.get_string("name"), "Ann");
        assert_eq!(record.get("missing"), Value::Null);
        assert_eq!(record.base_files_path(), "_pb_users/u1");
        assert!(users.has_field("email"));
        assert!(!users.has_field("nope"));
    }

    #[test]
    fn test_collection_schema_deserialize() {
        let json = serde_json::json!({
            "id": "msgs",
            "name": "messages",
            "schema": [
                { "name": "message", "type": "text" },
                { "name": "author", "type": "relation", "collectionId": "users", "maxSelect": 1 }
            ],
            "listRule": "author = @request.auth.id"
        });
        let collection: Collection = serde_json::from_value(json).unwrap();

        assert_eq!(collection.kind, CollectionKind::Base);
        assert_eq!(
            collection.field("author").unwrap().kind.relation(),
            Some(("users", true))
        );
        assert_eq!(collection.list_rule.as_deref(), Some("author = @request.auth.id"));
    }
}
