//! Paginated query driver
//!
//! Fetches the export's records one bounded page at a time, applying the
//! declared filter and sort plus the collection's list rule when the
//! acting principal is not an admin. After each page the relation paths
//! needed by the headers are expanded into an [`ExpansionIndex`] so the
//! resolver never goes back to the store.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::Result;
use crate::store::{
    Collection, Principal, Record, RecordQuery, RecordStore, RequestInfo, parse_sort,
};

use super::resolver::{ExpansionIndex, expands_from_split_map, header_split_map};
use super::spec::ExportSpecification;

/// Default number of records per page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Build a query scoped to what `principal` may list
///
/// The list rule is conjoined for every non-admin principal, anonymous
/// included. A collection without a rule adds no filter.
pub fn scoped_query(
    collection: &Collection,
    principal: &Principal,
    filter: &str,
    sort: &str,
) -> RecordQuery {
    let mut query = RecordQuery::new(collection.clone(), RequestInfo::read(principal.clone()))
        .filter(filter)
        .sort(parse_sort(sort));

    if !principal.is_admin()
        && let Some(rule) = &collection.list_rule
    {
        query = query.filter(rule);
    }
    query
}

/// Sequential page fetcher for one export
pub struct PageDriver<'a> {
    store: &'a dyn RecordStore,
    spec: &'a ExportSpecification,
    base: RecordQuery,
    /// Relation paths to expand, parents before children
    expands: Vec<Vec<String>>,
    page_size: usize,
    pages_fetched: usize,
}

impl<'a> PageDriver<'a> {
    pub fn new(store: &'a dyn RecordStore, spec: &'a ExportSpecification, page_size: usize) -> Self {
        let expands = expands_from_split_map(&header_split_map(&spec.headers))
            .into_iter()
            .map(|path| path.split('.').map(str::to_string).collect())
            .collect();

        Self {
            store,
            spec,
            base: scoped_query(&spec.collection, &spec.principal, &spec.filter, &spec.sort),
            expands,
            page_size: page_size.max(1),
            pages_fetched: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of page fetches issued so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch page `page` (1-based) into `records` and expand its relations
    ///
    /// `records` and `index` are cleared first so their allocations are
    /// reused across pages.
    pub async fn fetch_page(
        &mut self,
        page: usize,
        records: &mut Vec<Record>,
        index: &mut ExpansionIndex,
    ) -> Result<()> {
        let query = self.base.clone().page(page, self.page_size);
        self.store.query(&query, records).await?;
        self.pages_fetched += 1;
        debug!(
            "Fetched page {} of '{}': {} records",
            page,
            self.spec.collection.name,
            records.len()
        );

        index.clear();
        self.expand(records, index).await
    }

    /// Expand every configured relation path for `records`
    pub async fn expand(&self, records: &[Record], index: &mut ExpansionIndex) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut schemas: HashMap<String, Collection> = HashMap::new();
        for path in &self.expands {
            let Some((field, parents_path)) = path.split_last() else {
                continue;
            };

            let parents = walk(records, parents_path, index);
            if parents.is_empty() {
                continue;
            }

            // All parents at one depth share a collection
            let parent_collection = parents[0].collection_id().to_string();
            if !schemas.contains_key(&parent_collection) {
                let collection = self.store.find_collection(&parent_collection).await?;
                schemas.insert(parent_collection.clone(), collection);
            }
            let Some(target) = schemas[&parent_collection]
                .field(field)
                .and_then(|f| f.kind.relation())
                .map(|(target, _)| target.to_string())
            else {
                continue;
            };

            let ids: BTreeSet<String> = parents
                .iter()
                .filter_map(|parent| parent.relation_ids(field).into_iter().next())
                .collect();
            if ids.is_empty() {
                continue;
            }

            let related_collection = self.store.find_collection(&target).await?;
            let mut query = scoped_query(&related_collection, &self.spec.principal, "", "")
                .ids(ids.iter().cloned().collect());
            query.per_page = ids.len();

            let mut related = Vec::with_capacity(ids.len());
            self.store.query(&query, &mut related).await?;
            debug!(
                "Expanded '{}': {} of {} related records visible",
                path.join("."),
                related.len(),
                ids.len()
            );

            let by_id: HashMap<&str, &Record> = related.iter().map(|r| (r.id(), r)).collect();
            for parent in &parents {
                if let Some(id) = parent.relation_ids(field).into_iter().next()
                    && let Some(record) = by_id.get(id.as_str())
                {
                    index.insert(parent, field, (*record).clone());
                }
            }
        }

        Ok(())
    }
}

/// Records reached from `records` by following `path` through `index`
fn walk(records: &[Record], path: &[String], index: &ExpansionIndex) -> Vec<Record> {
    let mut current: Vec<&Record> = records.iter().collect();
    for segment in path {
        current = current
            .into_iter()
            .filter_map(|r| index.get(r, segment))
            .collect();
    }
    current.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::spec::{HeaderItem, OutputFormat, export_collection};
    use crate::store::{Admin, CollectionKind, Field, FieldKind, MemoryStore};

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        let users = Collection::new("users", "users", CollectionKind::Auth)
            .with_field(Field::new("name", FieldKind::Text))
            .with_list_rule("id = @request.auth.id");
        let posts = Collection::new("posts", "posts", CollectionKind::Base)
            .with_field(Field::new("title", FieldKind::Text))
            .with_field(Field::relation("author", "users"))
            .with_list_rule("author = @request.auth.id || title = 'public'");
        store.add_collection(users.clone()).await;
        store.add_collection(posts.clone()).await;

        for (id, name) in [("u1", "Ann"), ("u2", "Bob")] {
            store
                .create_record(Record::new(&users).with_id(id).with("name", name))
                .await
                .unwrap();
        }
        for (id, title, author) in [("p1", "a", "u1"), ("p2", "public", "u2"), ("p3", "c", "u2")] {
            store
                .create_record(
                    Record::new(&posts)
                        .with_id(id)
                        .with("title", title)
                        .with("author", author),
                )
                .await
                .unwrap();
        }
        store
    }

    async fn spec(store: &MemoryStore, principal: Principal) -> ExportSpecification {
        ExportSpecification {
            record: Record::new(&export_collection()).with_id("e1"),
            collection: store.find_collection("posts").await.unwrap(),
            principal,
            headers: vec![
                HeaderItem::new("title", "Title"),
                HeaderItem::new("author.name", "Author"),
            ],
            filter: String::new(),
            sort: "title".into(),
            format: OutputFormat::Csv,
            output: String::new(),
        }
    }

    #[tokio::test]
    async fn test_list_rule_scopes_records_and_expansions() {
        let store = store().await;
        let ann = store.find_record("users", "u1").await.unwrap();
        let spec = spec(&store, Principal::Record(ann)).await;

        let mut driver = PageDriver::new(&store, &spec, 10);
        let mut records = Vec::new();
        let mut index = ExpansionIndex::new();
        driver.fetch_page(1, &mut records, &mut index).await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        // Ann may list herself but not Bob
        assert_eq!(index.get(&records[0], "author").unwrap().get_string("name"), "Ann");
        assert!(index.get(&records[1], "author").is_none());
        assert_eq!(driver.pages_fetched(), 1);
    }

    #[tokio::test]
    async fn test_admin_skips_rules() {
        let store = store().await;
        let admin = Principal::Admin(Admin {
            id: "root".into(),
            email: String::new(),
        });
        let spec = spec(&store, admin).await;

        let mut driver = PageDriver::new(&store, &spec, 2);
        let mut records = Vec::new();
        let mut index = ExpansionIndex::new();

        driver.fetch_page(1, &mut records, &mut index).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(index.len(), 2);

        driver.fetch_page(2, &mut records, &mut index).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(index.get(&records[0], "author").unwrap().get_string("name"), "Bob");
    }

    #[test]
    fn test_scoped_query_filters() {
        let posts = Collection::new("posts", "posts", CollectionKind::Base).with_list_rule("a = 1");
        let query = scoped_query(&posts, &Principal::Anonymous, "b = 2", "-b");
        assert_eq!(query.filters, vec!["b = 2".to_string(), "a = 1".to_string()]);
        assert_eq!(query.sort.len(), 1);

        let admin = Principal::Admin(Admin {
            id: "root".into(),
            email: String::new(),
        });
        assert_eq!(scoped_query(&posts, &admin, "", "").filters, Vec::<String>::new());
    }
}
