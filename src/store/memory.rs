//! In-memory record store
//!
//! Holds collections, admins and records in insertion order behind a
//! `tokio` read/write lock. Queries parse and check every filter against
//! the collection schema before evaluating it, so a bad filter fails even
//! when the collection is empty.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::utils::random_string;

use super::filter::{self, EvalContext, RecordLookup};
use super::model::{Admin, Collection, Record, Value, parse_datetime};
use super::{RecordQuery, RecordStore, SortDirection, record_not_found};

const RECORD_ID_LENGTH: usize = 15;

/// JSON fixture describing a whole store
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub admins: Vec<Admin>,
    /// Records keyed by collection name
    #[serde(default)]
    pub records: BTreeMap<String, Vec<serde_json::Value>>,
}

#[derive(Default)]
struct Inner {
    collections: Vec<Collection>,
    admins: Vec<Admin>,
    /// Records per collection id, in insertion order
    records: HashMap<String, Vec<Record>>,
}

impl RecordLookup for Inner {
    fn collection(&self, name_or_id: &str) -> Option<&Collection> {
        self.collections
            .iter()
            .find(|c| c.id == name_or_id)
            .or_else(|| self.collections.iter().find(|c| c.name == name_or_id))
    }

    fn record(&self, collection_id: &str, id: &str) -> Option<&Record> {
        self.records
            .get(collection_id)
            .and_then(|records| records.iter().find(|r| r.id() == id))
    }
}

impl Inner {
    fn require_collection(&self, name_or_id: &str) -> Result<&Collection> {
        self.collection(name_or_id)
            .ok_or_else(|| StoreError::CollectionNotFound(name_or_id.to_string()).into())
    }
}

/// In-process [`RecordStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a parsed fixture
    pub async fn from_fixture(fixture: Fixture) -> Result<Self> {
        let store = Self::new();
        for collection in fixture.collections {
            store.add_collection(collection).await;
        }
        for admin in fixture.admins {
            store.add_admin(admin).await;
        }
        for (collection, records) in fixture.records {
            for record in records {
                store.insert_json(&collection, record).await?;
            }
        }
        Ok(store)
    }

    /// Load a JSON fixture file
    pub async fn load_fixture<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let fixture: Fixture = serde_json::from_str(&content).map_err(|e| {
            StoreError::InvalidRecord(format!("invalid fixture {}: {e}", path.display()))
        })?;
        debug!("Loaded fixture from {}", path.display());
        Self::from_fixture(fixture).await
    }

    /// Register or replace a collection
    pub async fn add_collection(&self, collection: Collection) {
        let mut inner = self.inner.write().await;
        inner.collections.retain(|c| c.id != collection.id);
        inner.records.entry(collection.id.clone()).or_default();
        inner.collections.push(collection);
    }

    pub async fn add_admin(&self, admin: Admin) {
        self.inner.write().await.admins.push(admin);
    }

    /// Insert a record built from a JSON object, converting values per schema
    pub async fn insert_json(&self, collection: &str, json: serde_json::Value) -> Result<Record> {
        let collection = self.find_collection(collection).await?;
        let serde_json::Value::Object(fields) = json else {
            return Err(StoreError::InvalidRecord(format!(
                "record of '{}' must be an object",
                collection.name
            ))
            .into());
        };

        let mut record = Record::new(&collection);
        for (name, value) in fields {
            match name.as_str() {
                "id" => record.set_id(value.as_str().unwrap_or_default()),
                "created" | "updated" => {
                    let parsed = value.as_str().and_then(parse_datetime).ok_or_else(|| {
                        StoreError::InvalidRecord(format!("invalid {name} timestamp {value}"))
                    })?;
                    record.set(&name, Value::DateTime(parsed));
                }
                _ => {
                    let kind = collection.field_kind(&name).ok_or_else(|| {
                        StoreError::InvalidRecord(format!(
                            "unknown field '{name}' in '{}'",
                            collection.name
                        ))
                    })?;
                    let value = Value::from_json_with_kind(value, &kind)
                        .map_err(|e| StoreError::InvalidRecord(format!("{name}: {e}")))?;
                    record.set(&name, value);
                }
            }
        }

        self.create_record(record).await
    }

    /// Number of records in a collection
    pub async fn count(&self, collection: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .collection(collection)
            .and_then(|c| inner.records.get(&c.id))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of queries executed so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_collection(&self, name_or_id: &str) -> Result<Collection> {
        let inner = self.inner.read().await;
        inner.require_collection(name_or_id).cloned()
    }

    async fn find_record(&self, collection: &str, id: &str) -> Result<Record> {
        let inner = self.inner.read().await;
        let collection = inner.require_collection(collection)?;
        inner
            .record(&collection.id, id)
            .cloned()
            .ok_or_else(|| record_not_found(&collection.name, id).into())
    }

    async fn find_admin(&self, id: &str) -> Result<Admin> {
        let inner = self.inner.read().await;
        inner
            .admins
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| StoreError::AdminNotFound(id.to_string()).into())
    }

    async fn query(&self, query: &RecordQuery, out: &mut Vec<Record>) -> Result<()> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        out.clear();

        let inner = self.inner.read().await;
        let collection = inner.require_collection(&query.collection.id)?;

        let mut filters = Vec::with_capacity(query.filters.len());
        for raw in &query.filters {
            let expr = filter::parse(raw)
                .and_then(|expr| expr.check(collection, &*inner).map(|_| expr))
                .map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
            filters.push(expr);
        }

        let mut sort_paths = Vec::with_capacity(query.sort.len());
        for field in &query.sort {
            let path: Vec<String> = field.name.split('.').map(str::to_string).collect();
            filter::check_path(&path, collection, &*inner)
                .map_err(|e| StoreError::InvalidSort(e.to_string()))?;
            sort_paths.push((path, field.direction));
        }

        let ctx = EvalContext {
            request: &query.request,
            lookup: &*inner,
            now: Utc::now(),
        };

        let empty = Vec::new();
        let records = inner.records.get(&collection.id).unwrap_or(&empty);
        let mut matched: Vec<&Record> = records
            .iter()
            .filter(|r| {
                query
                    .ids
                    .as_ref()
                    .is_none_or(|ids| ids.iter().any(|id| id == r.id()))
            })
            .filter(|r| filters.iter().all(|f| f.matches(r, &ctx)))
            .collect();

        if !sort_paths.is_empty() {
            let keys: HashMap<&str, Vec<Value>> = matched
                .iter()
                .map(|r| {
                    let key = sort_paths
                        .iter()
                        .map(|(path, _)| {
                            filter::path_values(path, r, &*inner)
                                .into_iter()
                                .next()
                                .unwrap_or_default()
                        })
                        .collect();
                    (r.id(), key)
                })
                .collect();

            matched.sort_by(|a, b| {
                let (ka, kb) = (&keys[a.id()], &keys[b.id()]);
                for (i, (_, direction)) in sort_paths.iter().enumerate() {
                    let ord = filter::compare_values(&ka[i], &kb[i])
                        .unwrap_or(std::cmp::Ordering::Equal);
                    let ord = match direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let offset = (query.page.max(1) - 1).saturating_mul(query.per_page);
        out.extend(
            matched
                .into_iter()
                .skip(offset)
                .take(query.per_page)
                .cloned(),
        );

        debug!(
            "Query on '{}' page {} returned {} records",
            collection.name,
            query.page,
            out.len()
        );
        Ok(())
    }

    async fn create_record(&self, mut record: Record) -> Result<Record> {
        let mut inner = self.inner.write().await;
        let collection_id = inner.require_collection(record.collection_id())?.id.clone();

        if record.id().is_empty() {
            record.set_id(&random_string(RECORD_ID_LENGTH));
        }

        let records = inner.records.entry(collection_id).or_default();
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(StoreError::InvalidRecord(format!(
                "duplicate id '{}' in '{}'",
                record.id(),
                record.collection_name()
            ))
            .into());
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let collection = inner.require_collection(collection)?.clone();
        let records = inner.records.entry(collection.id.clone()).or_default();
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Err(record_not_found(&collection.name, id).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{CollectionKind, Field, FieldKind};
    use crate::store::{Principal, RequestInfo, parse_sort};

    async fn store() -> MemoryStore {
        let fixture: Fixture = serde_json::from_value(serde_json::json!({
            "collections": [
                { "id": "users", "name": "users", "type": "auth",
                  "schema": [ { "name": "name", "type": "text" } ] },
                { "id": "posts", "name": "posts",
                  "schema": [
                      { "name": "title", "type": "text" },
                      { "name": "rank", "type": "number" },
                      { "name": "owner", "type": "relation", "collectionId": "users", "maxSelect": 1 }
                  ],
                  "listRule": "owner = @request.auth.id" }
            ],
            "admins": [ { "id": "root", "email": "root@example.com" } ],
            "records": {
                "users": [ { "id": "u1", "name": "Ann", "email": "ann@example.com" } ],
                "posts": [
                    { "id": "p1", "title": "b", "rank": 2, "owner": "u1", "created": "2023-01-01 00:00:00.000Z" },
                    { "id": "p2", "title": "a", "rank": 1, "owner": "", "created": "2023-01-02 00:00:00.000Z" },
                    { "id": "p3", "title": "c", "rank": 3, "owner": "u1", "created": "2023-01-03 00:00:00.000Z" }
                ]
            }
        }))
        .unwrap();
        MemoryStore::from_fixture(fixture).await.unwrap()
    }

    async fn run(store: &MemoryStore, query: RecordQuery) -> Result<Vec<String>> {
        let mut out = Vec::new();
        store.query(&query, &mut out).await?;
        Ok(out.iter().map(|r| r.id().to_string()).collect())
    }

    #[tokio::test]
    async fn test_query_filter_sort_page() {
        let store = store().await;
        let posts = store.find_collection("posts").await.unwrap();
        let request = RequestInfo::read(Principal::Anonymous);

        let all = RecordQuery::new(posts.clone(), request.clone()).sort(parse_sort("-rank"));
        assert_eq!(run(&store, all).await.unwrap(), vec!["p3", "p1", "p2"]);

        let filtered = RecordQuery::new(posts.clone(), request.clone())
            .filter("rank >= 2")
            .sort(parse_sort("title"));
        assert_eq!(run(&store, filtered).await.unwrap(), vec!["p1", "p3"]);

        let paged = RecordQuery::new(posts.clone(), request.clone())
            .sort(parse_sort("created"))
            .page(2, 2);
        assert_eq!(run(&store, paged).await.unwrap(), vec!["p3"]);

        let by_id = RecordQuery::new(posts, request).ids(vec!["p2".into()]);
        assert_eq!(run(&store, by_id).await.unwrap(), vec!["p2"]);
        assert_eq!(store.query_count(), 4);
    }

    #[tokio::test]
    async fn test_query_rejects_unknown_fields() {
        let store = store().await;
        let posts = store.find_collection("posts").await.unwrap();
        let request = RequestInfo::read(Principal::Anonymous);

        let bad_filter = RecordQuery::new(posts.clone(), request.clone()).filter("wrong_field != ''");
        assert!(matches!(
            run(&store, bad_filter).await,
            Err(crate::error::ExportError::Store(StoreError::InvalidFilter(_)))
        ));

        let bad_sort = RecordQuery::new(posts, request).sort(parse_sort("-nope"));
        assert!(matches!(
            run(&store, bad_sort).await,
            Err(crate::error::ExportError::Store(StoreError::InvalidSort(_)))
        ));
    }

    #[tokio::test]
    async fn test_lookups_and_mutations() {
        let store = store().await;

        assert_eq!(store.find_record("users", "u1").await.unwrap().get_string("name"), "Ann");
        assert!(store.find_record("users", "nobody").await.is_err());
        assert!(store.find_admin("root").await.is_ok());
        assert!(store.find_admin("u1").await.is_err());
        assert!(store.find_collection("missing").await.is_err());

        let tags = Collection::new("tags", "tags", CollectionKind::Base)
            .with_field(Field::new("label", FieldKind::Text));
        store.add_collection(tags.clone()).await;
        let created = store
            .create_record(Record::new(&tags).with("label", "x"))
            .await
            .unwrap();
        assert_eq!(created.id().len(), RECORD_ID_LENGTH);
        assert_eq!(store.count("tags").await, 1);

        store.delete_record("tags", created.id()).await.unwrap();
        assert_eq!(store.count("tags").await, 0);
        assert!(store.delete_record("tags", created.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_insert_json_rejects_unknown_field() {
        let store = store().await;
        let result = store
            .insert_json("posts", serde_json::json!({ "title": "x", "bogus": 1 }))
            .await;
        assert!(result.is_err());
    }
}
