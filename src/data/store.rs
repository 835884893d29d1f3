use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::bail;
use log::{info, warn};
use serde_json::{json, Map, Value as JsonValue};

use crate::data::model::{Column, Dataset, Value};
use crate::error::{DataError, Result};

/// One document: field name → JSON value.
pub type Record = Map<String, JsonValue>;

/// Store-internal identity field, stripped on load.
pub const ID_FIELD: &str = "_id";

// ---------------------------------------------------------------------------
// DocumentStore – the narrow external-collaborator contract
// ---------------------------------------------------------------------------

/// The document-store wire contract the core depends on. Implementations
/// own the actual protocol; the core never sees past this trait.
///
/// All calls are blocking. Errors are collaborator-level (`anyhow`) and get
/// wrapped into [`DataError::Runtime`] by [`DocumentStoreLoader`].
pub trait DocumentStore {
    /// Establish a connection. Returns `Ok(false)` when the store is
    /// reachable but refuses the database, `Err` on transport failure.
    fn connect(&mut self, uri: &str, database: &str) -> anyhow::Result<bool>;

    fn is_connected(&self) -> bool;

    fn list_collections(&self) -> anyhow::Result<Vec<String>>;

    /// Fetch documents matching a top-level equality filter.
    /// `limit == 0` means no limit.
    fn find(&self, collection: &str, filter: &JsonValue, limit: usize)
        -> anyhow::Result<Vec<Record>>;

    fn insert_many(&mut self, collection: &str, records: Vec<Record>) -> anyhow::Result<usize>;

    fn drop_collection(&mut self, collection: &str) -> anyhow::Result<()>;

    fn coll_stats(&self, collection: &str) -> anyhow::Result<JsonValue>;

    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// JSON <-> Value conversion
// ---------------------------------------------------------------------------

/// Map a JSON field onto a cell value. Arrays/objects are flattened to their
/// JSON text since the tabular model has no nested types.
pub fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

pub fn value_to_json(val: &Value) -> JsonValue {
    match val {
        Value::Int(i) => json!(i),
        Value::Float(f) if f.is_finite() => json!(f),
        Value::Float(_) => JsonValue::Null,
        Value::Text(s) | Value::Timestamp(s) => json!(s),
        Value::Bool(b) => json!(b),
        Value::Null => JsonValue::Null,
    }
}

/// Assemble fetched documents into a dataset. Column order follows first
/// appearance across the documents; fields absent from a document become
/// nulls; the store identity field is dropped.
pub fn records_to_dataset(records: &[Record]) -> Result<Dataset> {
    let mut order: Vec<String> = Vec::new();
    for rec in records {
        for key in rec.keys() {
            if key != ID_FIELD && !order.iter().any(|k| k == key) {
                order.push(key.clone());
            }
        }
    }
    let columns: Vec<Column> = order
        .into_iter()
        .map(|name| {
            let values: Vec<Value> = records
                .iter()
                .map(|rec| rec.get(&name).map(json_to_value).unwrap_or(Value::Null))
                .collect();
            Column::new(name, values)
        })
        .collect();
    Dataset::from_columns(columns)
}

/// Row-wise document view of a dataset, ready for `insert_many`.
pub fn dataset_to_records(dataset: &Dataset) -> Vec<Record> {
    (0..dataset.row_count())
        .map(|row| {
            let mut rec = Record::new();
            for col in dataset.columns() {
                rec.insert(col.name.clone(), value_to_json(&col.values[row]));
            }
            rec
        })
        .collect()
}

// ---------------------------------------------------------------------------
// DocumentStoreLoader
// ---------------------------------------------------------------------------

/// Loads datasets from (and saves them to) a document store through the
/// [`DocumentStore`] contract. Holds a single reusable connection handle.
pub struct DocumentStoreLoader {
    store: Box<dyn DocumentStore>,
}

impl DocumentStoreLoader {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        DocumentStoreLoader { store }
    }

    /// Establish the store connection.
    pub fn connect(&mut self, uri: &str, database: &str) -> Result<bool> {
        let ok = self
            .store
            .connect(uri, database)
            .map_err(DataError::Runtime)?;
        if ok {
            info!("connected to document store {uri} (database {database})");
        } else {
            warn!("document store {uri} refused database {database}");
        }
        Ok(ok)
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Fetch a collection into a dataset, stripping the store identity
    /// field. An empty result is an empty dataset, not an error.
    pub fn load(
        &self,
        collection: &str,
        filter: Option<&JsonValue>,
        limit: usize,
    ) -> Result<Dataset> {
        if !self.store.is_connected() {
            return Err(DataError::ConnectionError);
        }
        let default_filter = json!({});
        let records = self
            .store
            .find(collection, filter.unwrap_or(&default_filter), limit)
            .map_err(DataError::Runtime)?;
        if records.is_empty() {
            info!("collection {collection} returned no documents");
            return Ok(Dataset::default());
        }
        let dataset = records_to_dataset(&records)?;
        info!(
            "loaded {} documents from collection {collection}",
            dataset.row_count()
        );
        Ok(dataset)
    }

    /// Export a dataset into a collection. Returns the inserted count.
    pub fn save(&mut self, dataset: &Dataset, collection: &str, drop_existing: bool) -> Result<usize> {
        if !self.store.is_connected() {
            return Err(DataError::ConnectionError);
        }
        if dataset.is_empty() {
            return Err(DataError::InvalidArgument(
                "cannot save an empty dataset".to_string(),
            ));
        }
        if drop_existing {
            self.store
                .drop_collection(collection)
                .map_err(DataError::Runtime)?;
            info!("dropped existing collection {collection}");
        }
        let records = dataset_to_records(dataset);
        let inserted = self
            .store
            .insert_many(collection, records)
            .map_err(DataError::Runtime)?;
        info!("inserted {inserted} documents into collection {collection}");
        Ok(inserted)
    }

    pub fn list_collections(&self) -> Result<Vec<String>> {
        if !self.store.is_connected() {
            return Err(DataError::ConnectionError);
        }
        self.store.list_collections().map_err(DataError::Runtime)
    }

    pub fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.list_collections()?.iter().any(|c| c == collection))
    }

    /// Store-side statistics for a collection.
    pub fn stats(&self, collection: &str) -> Result<JsonValue> {
        if !self.store.is_connected() {
            return Err(DataError::ConnectionError);
        }
        if !self.collection_exists(collection)? {
            return Err(DataError::NotFound(collection.to_string()));
        }
        self.store.coll_stats(collection).map_err(DataError::Runtime)
    }

    /// Close the connection and release the handle.
    pub fn close(&mut self) {
        if self.store.is_connected() {
            self.store.close();
            info!("document store connection closed");
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore – in-process DocumentStore implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryStoreInner {
    connected: bool,
    database: String,
    collections: BTreeMap<String, Vec<Record>>,
    next_id: u64,
    find_calls: usize,
}

/// An in-process [`DocumentStore`]: collections held in a map, auto-assigned
/// identity fields, top-level equality filters. Clones share state so tests
/// and embedders can observe a store handed into a loader. Not thread-safe;
/// callers serialize access (as everywhere in this crate).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many `find` calls the store has served. Lets tests assert that a
    /// cache hit performed no loader I/O.
    pub fn find_calls(&self) -> usize {
        self.inner.borrow().find_calls
    }

    /// Documents currently held in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .borrow()
            .collections
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn matches_filter(record: &Record, filter: &JsonValue) -> bool {
    match filter.as_object() {
        None => true,
        Some(obj) => obj
            .iter()
            .all(|(key, expected)| record.get(key) == Some(expected)),
    }
}

impl DocumentStore for MemoryStore {
    fn connect(&mut self, _uri: &str, database: &str) -> anyhow::Result<bool> {
        if database.is_empty() {
            bail!("database name is required");
        }
        let mut inner = self.inner.borrow_mut();
        inner.connected = true;
        inner.database = database.to_string();
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.borrow();
        if !inner.connected {
            bail!("not connected");
        }
        Ok(inner.collections.keys().cloned().collect())
    }

    fn find(
        &self,
        collection: &str,
        filter: &JsonValue,
        limit: usize,
    ) -> anyhow::Result<Vec<Record>> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            bail!("not connected");
        }
        inner.find_calls += 1;
        let docs = inner.collections.get(collection).cloned().unwrap_or_default();
        let matched = docs.into_iter().filter(|r| matches_filter(r, filter));
        Ok(if limit > 0 {
            matched.take(limit).collect()
        } else {
            matched.collect()
        })
    }

    fn insert_many(&mut self, collection: &str, records: Vec<Record>) -> anyhow::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            bail!("not connected");
        }
        let count = records.len();
        for mut rec in records {
            if !rec.contains_key(ID_FIELD) {
                inner.next_id += 1;
                let id = format!("mem-{}", inner.next_id);
                rec.insert(ID_FIELD.to_string(), json!(id));
            }
            inner
                .collections
                .entry(collection.to_string())
                .or_default()
                .push(rec);
        }
        Ok(count)
    }

    fn drop_collection(&mut self, collection: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            bail!("not connected");
        }
        inner.collections.remove(collection);
        Ok(())
    }

    fn coll_stats(&self, collection: &str) -> anyhow::Result<JsonValue> {
        let inner = self.inner.borrow();
        if !inner.connected {
            bail!("not connected");
        }
        let count = inner.collections.get(collection).map(Vec::len).unwrap_or(0);
        Ok(json!({
            "ns": format!("{}.{}", inner.database, collection),
            "count": count,
        }))
    }

    fn close(&mut self) {
        self.inner.borrow_mut().connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::ColumnType;

    fn connected_loader() -> (DocumentStoreLoader, MemoryStore) {
        let store = MemoryStore::new();
        let mut loader = DocumentStoreLoader::new(Box::new(store.clone()));
        loader.connect("store://local", "testdb").unwrap();
        (loader, store)
    }

    fn sample_dataset() -> Dataset {
        Dataset::from_columns(vec![
            Column::new("city", vec![Value::Text("ams".into()), Value::Text("utr".into())]),
            Column::new("pop", vec![Value::Int(900), Value::Int(360)]),
        ])
        .unwrap()
    }

    #[test]
    fn load_before_connect_is_a_connection_error() {
        let loader = DocumentStoreLoader::new(Box::new(MemoryStore::new()));
        let err = loader.load("any", None, 0).unwrap_err();
        assert!(matches!(err, DataError::ConnectionError));
    }

    #[test]
    fn save_then_load_round_trips_minus_the_id_field() {
        let (mut loader, _store) = connected_loader();
        let ds = sample_dataset();
        let inserted = loader.save(&ds, "cities", false).unwrap();
        assert_eq!(inserted, 2);

        let loaded = loader.load("cities", None, 0).unwrap();
        assert_eq!(loaded.row_count(), 2);
        assert_eq!(loaded.column_names(), vec!["city", "pop"]);
        assert!(loaded.column(ID_FIELD).is_none());
        assert_eq!(loaded.column("pop").unwrap().dtype, ColumnType::Integer);
    }

    #[test]
    fn save_empty_dataset_is_rejected() {
        let (mut loader, _store) = connected_loader();
        let err = loader.save(&Dataset::default(), "cities", false).unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
    }

    #[test]
    fn drop_existing_replaces_the_collection() {
        let (mut loader, store) = connected_loader();
        let ds = sample_dataset();
        loader.save(&ds, "cities", false).unwrap();
        loader.save(&ds, "cities", false).unwrap();
        assert_eq!(store.document_count("cities"), 4);

        loader.save(&ds, "cities", true).unwrap();
        assert_eq!(store.document_count("cities"), 2);
    }

    #[test]
    fn filter_and_limit_narrow_the_fetch() {
        let (mut loader, _store) = connected_loader();
        loader.save(&sample_dataset(), "cities", false).unwrap();

        let filtered = loader
            .load("cities", Some(&json!({"city": "ams"})), 0)
            .unwrap();
        assert_eq!(filtered.row_count(), 1);

        let limited = loader.load("cities", None, 1).unwrap();
        assert_eq!(limited.row_count(), 1);
    }

    #[test]
    fn missing_fields_become_nulls_in_first_appearance_order() {
        let (loader, mut store) = connected_loader();
        let records = vec![
            json!({"a": 1, "b": 2}).as_object().unwrap().clone(),
            json!({"a": 3, "c": 4}).as_object().unwrap().clone(),
        ];
        store.insert_many("mixed", records).unwrap();

        let ds = loader.load("mixed", None, 0).unwrap();
        assert_eq!(ds.column_names(), vec!["a", "b", "c"]);
        assert_eq!(ds.column("b").unwrap().null_count(), 1);
        assert_eq!(ds.column("c").unwrap().null_count(), 1);
    }

    #[test]
    fn stats_requires_an_existing_collection() {
        let (loader, _store) = connected_loader();
        let err = loader.stats("ghost").unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[test]
    fn empty_collection_loads_as_an_empty_dataset() {
        let (loader, _store) = connected_loader();
        let ds = loader.load("nothing-here", None, 0).unwrap();
        assert!(ds.is_empty());
    }
}
