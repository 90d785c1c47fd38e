//! Field path resolution
//!
//! A header's field path such as `author.team.name` is split on `.`; every
//! segment but the last names a relation that the query driver expands
//! into the [`ExpansionIndex`]. Resolution walks those expansions and reads
//! the last segment from the record it ends on. A missing expansion at any
//! step yields an empty cell, never an error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono_tz::Tz;
use tracing::trace;

use crate::store::{Record, Value};

use super::format::{format_value, parse_timezone};
use super::spec::HeaderItem;

/// Split every header's field path into segments, keyed by the path
pub fn header_split_map(headers: &[HeaderItem]) -> BTreeMap<String, Vec<String>> {
    headers
        .iter()
        .map(|item| {
            let segments = item.field_name.split('.').map(str::to_string).collect();
            (item.field_name.clone(), segments)
        })
        .collect()
}

/// Relation paths that must be expanded to resolve every header
///
/// Each header contributes every proper prefix of its path, so
/// `author.team.name` needs both `author` and `author.team`. Plain fields
/// contribute nothing.
pub fn expands_from_split_map(split_map: &BTreeMap<String, Vec<String>>) -> BTreeSet<String> {
    split_map
        .values()
        .flat_map(|segments| (1..segments.len()).map(|end| segments[..end].join(".")))
        .collect()
}

/// `(collection id, record id)` of a parent record
type RecordKey = (String, String);

/// Expanded relations of one page
///
/// Maps a parent record and relation field to the related record. Filled
/// by the query driver once per page and read-only during resolution.
#[derive(Debug, Default)]
pub struct ExpansionIndex {
    links: HashMap<RecordKey, HashMap<String, Record>>,
}

impl ExpansionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(record: &Record) -> RecordKey {
        (record.collection_id().to_string(), record.id().to_string())
    }

    /// Record `related` as the expansion of `parent.field`
    pub fn insert(&mut self, parent: &Record, field: &str, related: Record) {
        self.links
            .entry(Self::key(parent))
            .or_default()
            .insert(field.to_string(), related);
    }

    /// The record expanded under `parent.field`, if any
    pub fn get(&self, parent: &Record, field: &str) -> Option<&Record> {
        self.links
            .get(&(parent.collection_id().to_string(), parent.id().to_string()))
            .and_then(|fields| fields.get(field))
    }

    /// Drop all expansions; keeps the allocation for the next page
    pub fn clear(&mut self) {
        self.links.clear();
    }

    /// Number of parent records with at least one expansion
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// A header compiled for resolution
#[derive(Debug, Clone)]
pub struct Column {
    pub label: String,
    segments: Vec<String>,
    zone: Option<Tz>,
    value_map: BTreeMap<String, serde_json::Value>,
}

impl Column {
    pub fn from_header(item: &HeaderItem) -> Self {
        Self {
            label: item.header.clone(),
            segments: item.field_name.split('.').map(str::to_string).collect(),
            zone: parse_timezone(&item.timezone),
            value_map: item.value_map.clone(),
        }
    }

    /// Compile all headers, preserving order
    pub fn compile(headers: &[HeaderItem]) -> Vec<Self> {
        headers.iter().map(Self::from_header).collect()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Resolve one column for one record
pub fn resolve(record: &Record, column: &Column, index: &ExpansionIndex) -> Value {
    let Some((last, relations)) = column.segments.split_last() else {
        return Value::Text(String::new());
    };

    let mut current = record;
    for segment in relations {
        match index.get(current, segment) {
            Some(related) => current = related,
            None => {
                trace!(
                    "No expansion for '{}' on {}/{}, leaving '{}' blank",
                    segment,
                    current.collection_name(),
                    current.id(),
                    column.label
                );
                return Value::Text(String::new());
            }
        }
    }

    format_value(current.get(last), column.zone, &column.value_map)
}

/// Resolve every column for one record, reusing `row`
pub fn resolve_row(record: &Record, columns: &[Column], index: &ExpansionIndex, row: &mut Vec<Value>) {
    row.clear();
    row.extend(columns.iter().map(|column| resolve(record, column, index)));
}
