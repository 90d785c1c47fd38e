//! Record store collaborator
//!
//! The export engine never talks to a database directly. Everything it
//! needs from the store goes through [`RecordStore`]:
//! - collection schema lookup by name or id
//! - record and admin lookup by id
//! - paged queries with filter strings, parsed sort and an attached request context
//! - record creation and deletion (used by the host flow and the retention sweep)
//!
//! [`MemoryStore`] is a complete in-process implementation used by the
//! binary and the tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{Result, StoreError};

pub mod filter;
pub mod memory;
pub mod model;

pub use memory::MemoryStore;
pub use model::{Admin, Collection, CollectionKind, Field, FieldKind, Record, Value};

/// Identity a query runs on behalf of
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Principal {
    /// No owner; treated as a non-privileged caller
    #[default]
    Anonymous,
    /// An authenticated record of some auth collection
    Record(Record),
    /// A privileged administrator; access rules are skipped
    Admin(Admin),
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin(_))
    }

    pub fn auth_record(&self) -> Option<&Record> {
        match self {
            Principal::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn admin(&self) -> Option<&Admin> {
        match self {
            Principal::Admin(a) => Some(a),
            _ => None,
        }
    }

    /// Value of `@request.auth.<field>`; anonymous callers read null
    pub fn auth_field(&self, field: &str) -> Value {
        match self {
            Principal::Anonymous => Value::Null,
            Principal::Record(r) => r.get(field),
            Principal::Admin(a) => match field {
                "id" => Value::Text(a.id.clone()),
                "email" => Value::Text(a.email.clone()),
                _ => Value::Null,
            },
        }
    }
}

/// Request context attached to every store query
///
/// Exports always run as a read with empty query, body and header maps;
/// only the principal varies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestInfo {
    pub method: String,
    pub query: BTreeMap<String, serde_json::Value>,
    pub data: BTreeMap<String, serde_json::Value>,
    pub headers: BTreeMap<String, serde_json::Value>,
    pub principal: Principal,
}

impl RequestInfo {
    /// Read-only request for the given principal
    pub fn read(principal: Principal) -> Self {
        Self {
            method: "GET".to_string(),
            query: BTreeMap::new(),
            data: BTreeMap::new(),
            headers: BTreeMap::new(),
            principal,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One `(field, direction)` pair of a sort expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub direction: SortDirection,
}

/// Parse a sort string like `-created,+name,title`
///
/// Blank entries are skipped; an empty string yields no sort fields.
pub fn parse_sort(sort: &str) -> Vec<SortField> {
    sort.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if let Some(name) = part.strip_prefix('-') {
                SortField {
                    name: name.trim().to_string(),
                    direction: SortDirection::Desc,
                }
            } else {
                SortField {
                    name: part.trim_start_matches('+').trim().to_string(),
                    direction: SortDirection::Asc,
                }
            }
        })
        .collect()
}

/// A paged query against one collection
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub collection: Collection,
    /// Filter expressions, all of which must match
    pub filters: Vec<String>,
    pub sort: Vec<SortField>,
    /// Restrict the result to these record ids
    pub ids: Option<Vec<String>>,
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
    pub request: RequestInfo,
}

impl RecordQuery {
    pub fn new(collection: Collection, request: RequestInfo) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            sort: Vec::new(),
            ids: None,
            page: 1,
            per_page: 1000,
            request,
        }
    }

    /// Add a filter; blank filters are ignored
    pub fn filter(mut self, filter: &str) -> Self {
        if !filter.trim().is_empty() {
            self.filters.push(filter.to_string());
        }
        self
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page.max(1);
        self.per_page = per_page;
        self
    }
}

/// Narrow interface to the external record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find a collection by name or id
    async fn find_collection(&self, name_or_id: &str) -> Result<Collection>;

    /// Find a record by collection (name or id) and record id
    async fn find_record(&self, collection: &str, id: &str) -> Result<Record>;

    /// Find a privileged admin by id
    async fn find_admin(&self, id: &str) -> Result<Admin>;

    /// Execute a paged query, replacing the contents of `out`
    async fn query(&self, query: &RecordQuery, out: &mut Vec<Record>) -> Result<()>;

    /// Persist a new record, assigning an id when it has none
    async fn create_record(&self, record: Record) -> Result<Record>;

    /// Delete a record by collection (name or id) and record id
    async fn delete_record(&self, collection: &str, id: &str) -> Result<()>;
}

/// Shorthand used by store implementations for a missing record
pub(crate) fn record_not_found(collection: &str, id: &str) -> StoreError {
    StoreError::RecordNotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        let sort = parse_sort("-created, +name,title,,");
        assert_eq!(
            sort,
            vec![
                SortField {
                    name: "created".into(),
                    direction: SortDirection::Desc
                },
                SortField {
                    name: "name".into(),
                    direction: SortDirection::Asc
                },
                SortField {
                    name: "title".into(),
                    direction: SortDirection::Asc
                },
            ]
        );
        assert!(parse_sort("").is_empty());
    }

    #[test]
    fn test_principal_auth_field() {
        let admin = Principal::Admin(Admin {
            id: "a1".into(),
            email: "root@example.com".into(),
        });
        assert!(admin.is_admin());
        assert_eq!(admin.auth_field("id"), Value::Text("a1".into()));
        assert_eq!(Principal::Anonymous.auth_field("id"), Value::Null);
    }

    #[test]
    fn test_read_request() {
        let request = RequestInfo::read(Principal::Anonymous);
        assert_eq!(request.method, "GET");
        assert!(request.query.is_empty() && request.data.is_empty() && request.headers.is_empty());
    }
}
