use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::collection::{Collection, UpdateResult};
use crate::document::DocumentId;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::query::FindOptions;
use crate::storage::Storage;

/// The ShelfDB engine: a named set of collections.
///
/// Collections are created on first write. Reads on a collection that does
/// not exist behave as reads on an empty one. When opened on a directory,
/// every mutation rewrites that collection's snapshot before returning.
pub struct ShelfDb {
    storage: Option<Storage>,
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCollectionName(name.to_string()))
    }
}

impl ShelfDb {
    /// A database that lives only as long as this handle.
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Open or create a database in `data_dir`, loading every snapshot found.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let storage = Storage::open(data_dir)?;
        let mut collections = HashMap::new();
        for name in storage.collection_names()? {
            let col = storage.load(&name)?;
            collections.insert(name, Arc::new(RwLock::new(col)));
        }
        info!(dir = %data_dir.display(), collections = collections.len(), "opened database");
        Ok(Self {
            storage: Some(storage),
            collections: RwLock::new(collections),
        })
    }

    fn get_collection(&self, name: &str) -> Option<Arc<RwLock<Collection>>> {
        self.collections.read().get(name).map(Arc::clone)
    }

    fn get_or_create_collection(&self, name: &str) -> Result<Arc<RwLock<Collection>>> {
        if let Some(col) = self.get_collection(name) {
            return Ok(col);
        }
        validate_name(name)?;
        let mut cols = self.collections.write();
        let col = cols
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Collection::new(name))));
        Ok(Arc::clone(col))
    }

    /// Run `f` against a collection under its write lock. On a persistent
    /// database `f` works on a copy, which replaces the live collection only
    /// once its snapshot is saved.
    fn write<T>(&self, name: &str, f: impl FnOnce(&mut Collection) -> Result<T>) -> Result<T> {
        loop {
            let col = self.get_or_create_collection(name)?;
            let mut guard = col.write();
            // Dropped while we waited for the lock; retry on the live collection.
            if self.is_current(name, &col) {
                return self.commit(&mut guard, f);
            }
        }
    }

    fn is_current(&self, name: &str, col: &Arc<RwLock<Collection>>) -> bool {
        self.collections
            .read()
            .get(name)
            .is_some_and(|live| Arc::ptr_eq(live, col))
    }

    fn commit<T>(
        &self,
        live: &mut Collection,
        f: impl FnOnce(&mut Collection) -> Result<T>,
    ) -> Result<T> {
        let Some(storage) = &self.storage else {
            return f(live);
        };
        let mut next = live.clone();
        let out = f(&mut next)?;
        storage.save(&next)?;
        *live = next;
        Ok(out)
    }

    fn read<T>(&self, name: &str, f: impl FnOnce(&Collection) -> Result<T>) -> Result<T> {
        match self.get_collection(name) {
            Some(col) => f(&col.read()),
            None => f(&Collection::new(name)),
        }
    }

    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a collection and its data. Returns false if it did not exist.
    ///
    /// The collection's own lock is held across the removal, so a write that
    /// already holds it finishes saving first, and the map lock is held while
    /// the snapshot is deleted, so no new incarnation can save in between.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        loop {
            let col = self.get_collection(name);
            let _guard = col.as_ref().map(|c| c.write());
            let mut cols = self.collections.write();
            let unchanged = match (&col, cols.get(name)) {
                (Some(held), Some(live)) => Arc::ptr_eq(held, live),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                continue;
            }
            let removed = cols.remove(name).is_some();
            let removed_on_disk = match &self.storage {
                Some(storage) => storage.remove(name)?,
                None => false,
            };
            debug!(collection = name, removed, "drop_collection");
            return Ok(removed || removed_on_disk);
        }
    }

    // -----------------------------------------------------------------------
    // Convenience methods that delegate to collections
    // -----------------------------------------------------------------------

    pub fn create_unique_index(&self, collection: &str, field: &str) -> Result<()> {
        self.write(collection, |col| col.create_unique_index(field))
    }

    pub fn insert(&self, collection: &str, doc: Value) -> Result<DocumentId> {
        self.write(collection, |col| col.insert(doc))
    }

    pub fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<DocumentId>> {
        self.write(collection, |col| col.insert_many(docs))
    }

    pub fn find(&self, collection: &str, query: &Value) -> Result<Vec<Value>> {
        self.read(collection, |col| col.find(query))
    }

    pub fn find_with_options(
        &self,
        collection: &str,
        query: &Value,
        opts: &FindOptions,
    ) -> Result<Vec<Value>> {
        self.read(collection, |col| col.find_with_options(query, opts))
    }

    pub fn find_one(&self, collection: &str, query: &Value) -> Result<Option<Value>> {
        self.read(collection, |col| col.find_one(query))
    }

    pub fn count(&self, collection: &str, query: &Value) -> Result<usize> {
        self.read(collection, |col| col.count_matching(query))
    }

    /// Update the first matching document.
    pub fn update_one(&self, collection: &str, query: &Value, update: &Value) -> Result<UpdateResult> {
        self.write(collection, |col| col.update(query, update, Some(1)))
    }

    /// Run an aggregation pipeline. A leading `$match` is applied while
    /// scanning the collection.
    pub fn aggregate(&self, collection: &str, pipeline_json: &Value) -> Result<Vec<Value>> {
        let pipeline = Pipeline::parse(pipeline_json)?;
        let (leading_match, start_idx) = pipeline.take_leading_match();
        let query = leading_match.cloned().unwrap_or_else(|| json!({}));
        let initial_docs = self.find(collection, &query)?;
        Ok(pipeline.execute_from(start_idx, initial_docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_on_missing_collection_are_empty() {
        let db = ShelfDb::in_memory();
        assert!(db.find("products", &json!({})).unwrap().is_empty());
        assert_eq!(db.count("products", &json!({})).unwrap(), 0);
        assert!(db.list_collections().is_empty());
    }

    #[test]
    fn drop_then_reinsert() {
        let db = ShelfDb::in_memory();
        db.insert_many("products", vec![json!({"a": 1}), json!({"a": 2})])
            .unwrap();
        assert!(db.drop_collection("products").unwrap());
        assert!(!db.drop_collection("products").unwrap());
        db.insert("products", json!({"a": 3})).unwrap();
        assert_eq!(db.count("products", &json!({})).unwrap(), 1);
    }

    #[test]
    fn invalid_collection_names_are_rejected() {
        let db = ShelfDb::in_memory();
        for bad in ["", "../etc", "a b", "x.y"] {
            assert!(matches!(
                db.insert(bad, json!({})),
                Err(Error::InvalidCollectionName(_))
            ));
        }
    }

    #[test]
    fn aggregate_uses_leading_match() {
        let db = ShelfDb::in_memory();
        db.insert_many(
            "products",
            vec![
                json!({"category": "Fashion", "price": 10}),
                json!({"category": "Fashion", "price": 20}),
                json!({"category": "Electronics", "price": 99}),
            ],
        )
        .unwrap();
        let out = db
            .aggregate(
                "products",
                &json!([
                    {"$match": {"category": "Fashion"}},
                    {"$group": {"_id": null, "total": {"$sum": "$price"}}}
                ]),
            )
            .unwrap();
        assert_eq!(out, vec![json!({"_id": null, "total": 30})]);
    }

    #[test]
    fn reopen_restores_collections() {
        let dir = tempdir().unwrap();
        {
            let db = ShelfDb::open(dir.path()).unwrap();
            db.create_unique_index("products", "product_id").unwrap();
            db.insert("products", json!({"product_id": "ELEC001", "reviews": []}))
                .unwrap();
            db.update_one(
                "products",
                &json!({"product_id": "ELEC001"}),
                &json!({"$push": {"reviews": {"rating": 4}}}),
            )
            .unwrap();
        }
        let db = ShelfDb::open(dir.path()).unwrap();
        let doc = db
            .find_one("products", &json!({"product_id": "ELEC001"}))
            .unwrap()
            .unwrap();
        assert_eq!(doc["reviews"], json!([{"rating": 4}]));
        assert!(db.insert("products", json!({"product_id": "ELEC001"})).is_err());
    }

    #[test]
    fn failed_write_is_not_persisted() {
        let dir = tempdir().unwrap();
        {
            let db = ShelfDb::open(dir.path()).unwrap();
            db.create_unique_index("products", "product_id").unwrap();
            db.insert("products", json!({"product_id": "A"})).unwrap();
            assert!(db
                .insert_many("products", vec![json!({"product_id": "B"}), json!({"product_id": "A"})])
                .is_err());
        }
        let db = ShelfDb::open(dir.path()).unwrap();
        assert_eq!(db.count("products", &json!({})).unwrap(), 1);
    }

    #[test]
    fn failed_save_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("db");
        let db = ShelfDb::open(&data).unwrap();
        db.insert("products", json!({"product_id": "ELEC001", "reviews": [{"rating": 5}]}))
            .unwrap();

        std::fs::remove_dir_all(&data).unwrap();
        let result = db.update_one(
            "products",
            &json!({"product_id": "ELEC001"}),
            &json!({"$push": {"reviews": {"rating": 4}}}),
        );
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(db.insert("products", json!({"product_id": "ELEC002"})).is_err());

        let doc = db
            .find_one("products", &json!({"product_id": "ELEC001"}))
            .unwrap()
            .unwrap();
        assert_eq!(doc["reviews"], json!([{"rating": 5}]));
        assert_eq!(db.count("products", &json!({})).unwrap(), 1);
    }

    #[test]
    fn stale_handle_is_not_current_after_drop() {
        let db = ShelfDb::in_memory();
        db.insert("products", json!({"a": 1})).unwrap();
        let stale = db.get_collection("products").unwrap();
        db.drop_collection("products").unwrap();
        assert!(!db.is_current("products", &stale));

        db.insert("products", json!({"a": 2})).unwrap();
        assert!(!db.is_current("products", &stale));
        assert_eq!(stale.read().count(), 1);
        assert_eq!(db.count("products", &json!({})).unwrap(), 1);
    }

    #[test]
    fn concurrent_drops_and_writes_agree_with_disk() {
        let dir = tempdir().unwrap();
        let db = ShelfDb::open(dir.path()).unwrap();
        std::thread::scope(|s| {
            for t in 0..4 {
                let db = &db;
                s.spawn(move || {
                    for i in 0..25 {
                        db.insert("products", json!({"t": t, "i": i})).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..25 {
                    db.drop_collection("products").unwrap();
                }
            });
        });
        let in_memory = db.count("products", &json!({})).unwrap();
        drop(db);
        let reopened = ShelfDb::open(dir.path()).unwrap();
        assert_eq!(reopened.count("products", &json!({})).unwrap(), in_memory);
    }

    #[test]
    fn drop_removes_snapshot() {
        let dir = tempdir().unwrap();
        let db = ShelfDb::open(dir.path()).unwrap();
        db.insert("products", json!({"a": 1})).unwrap();
        assert!(db.drop_collection("products").unwrap());
        drop(db);
        let db = ShelfDb::open(dir.path()).unwrap();
        assert!(db.list_collections().is_empty());
    }
}
