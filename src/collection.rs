use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::document::{DocumentId, resolve_path};
use crate::error::{Error, Result};
use crate::pipeline::sort_docs;
use crate::query::{self, FindOptions, Query};
use crate::update::apply_update;
use crate::value::IndexValue;

/// Outcome of an update command.
///
/// `matched_count` counts documents selected by the filter; a document can
/// match without being modified (e.g. `$set` to the current value).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Unique constraint on a single field: value → owning document.
#[derive(Debug, Clone, Default)]
struct UniqueIndex {
    entries: HashMap<IndexValue, DocumentId>,
}

impl UniqueIndex {
    fn key(doc: &Value, field: &str) -> Option<IndexValue> {
        resolve_path(doc, field).map(|v| IndexValue::from_json(&v))
    }
}

/// An ordered set of JSON documents.
///
/// Documents are kept in insertion order, which is also the natural order
/// returned by `find` without a sort. Each document gets a sequential `_id`.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    docs: BTreeMap<DocumentId, Value>,
    unique_indexes: BTreeMap<String, UniqueIndex>,
    next_id: DocumentId,
}

impl Collection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            docs: BTreeMap::new(),
            unique_indexes: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Rebuild a collection from stored documents, keeping their `_id`s.
    pub(crate) fn from_documents(name: &str, docs: Vec<Value>, unique_fields: &[String]) -> Result<Self> {
        let mut col = Self::new(name);
        for doc in docs {
            let id = doc
                .get("_id")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::CorruptSnapshot(format!("document in '{name}' has no numeric _id")))?;
            col.next_id = col.next_id.max(id + 1);
            col.docs.insert(id, doc);
        }
        for field in unique_fields {
            col.create_unique_index(field)?;
        }
        Ok(col)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_fields(&self) -> Vec<String> {
        self.unique_indexes.keys().cloned().collect()
    }

    /// Documents in `_id` order.
    pub fn documents(&self) -> impl Iterator<Item = &Value> {
        self.docs.values()
    }

    // -----------------------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------------------

    /// Enforce uniqueness of `field`. Fails if existing documents already
    /// share a value. Documents without the field are not constrained.
    pub fn create_unique_index(&mut self, field: &str) -> Result<()> {
        if self.unique_indexes.contains_key(field) {
            return Ok(());
        }
        let mut index = UniqueIndex::default();
        for (&id, doc) in &self.docs {
            if let Some(key) = UniqueIndex::key(doc, field) {
                if index.entries.insert(key, id).is_some() {
                    return Err(Error::UniqueViolation {
                        field: field.to_string(),
                    });
                }
            }
        }
        self.unique_indexes.insert(field.to_string(), index);
        Ok(())
    }

    fn check_unique(&self, doc: &Value, own_id: Option<DocumentId>) -> Result<()> {
        for (field, index) in &self.unique_indexes {
            let Some(key) = UniqueIndex::key(doc, field) else {
                continue;
            };
            if let Some(&holder) = index.entries.get(&key) {
                if Some(holder) != own_id {
                    return Err(Error::UniqueViolation {
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_doc(&mut self, id: DocumentId, doc: &Value) {
        for (field, index) in self.unique_indexes.iter_mut() {
            if let Some(key) = UniqueIndex::key(doc, field) {
                index.entries.insert(key, id);
            }
        }
    }

    fn unindex_doc(&mut self, doc: &Value) {
        for (field, index) in self.unique_indexes.iter_mut() {
            if let Some(key) = UniqueIndex::key(doc, field) {
                index.entries.remove(&key);
            }
        }
    }

    // -----------------------------------------------------------------------
    // CRUD operations
    // -----------------------------------------------------------------------

    /// Insert a document. Returns the assigned `_id`.
    pub fn insert(&mut self, data: Value) -> Result<DocumentId> {
        let ids = self.insert_many(vec![data])?;
        Ok(ids[0])
    }

    /// Insert documents in order as one batch: either all are inserted or,
    /// on a constraint violation, none are.
    pub fn insert_many(&mut self, docs: Vec<Value>) -> Result<Vec<DocumentId>> {
        let mut prepared = Vec::with_capacity(docs.len());
        let mut pending: HashMap<&str, Vec<IndexValue>> = HashMap::new();

        for (offset, mut data) in docs.into_iter().enumerate() {
            let obj = data.as_object_mut().ok_or(Error::NotAnObject)?;
            let id = self.next_id + offset as u64;
            obj.insert("_id".to_string(), Value::Number(id.into()));

            self.check_unique(&data, None)?;
            for field in self.unique_indexes.keys() {
                if let Some(key) = UniqueIndex::key(&data, field) {
                    let seen = pending.entry(field.as_str()).or_default();
                    if seen.contains(&key) {
                        return Err(Error::UniqueViolation {
                            field: field.clone(),
                        });
                    }
                    seen.push(key);
                }
            }
            prepared.push((id, data));
        }

        let ids: Vec<DocumentId> = prepared.iter().map(|(id, _)| *id).collect();
        self.next_id += prepared.len() as u64;
        for (id, data) in prepared {
            self.index_doc(id, &data);
            self.docs.insert(id, data);
        }
        debug!(collection = %self.name, inserted = ids.len(), "insert_many");
        Ok(ids)
    }

    pub fn find(&self, query_json: &Value) -> Result<Vec<Value>> {
        self.find_with_options(query_json, &FindOptions::default())
    }

    /// Find matching documents, then sort, skip, limit and project them in
    /// that order.
    pub fn find_with_options(&self, query_json: &Value, opts: &FindOptions) -> Result<Vec<Value>> {
        let query = query::parse_query(query_json)?;
        let mut results: Vec<Value> = self.matching(&query).map(|(_, d)| d.clone()).collect();

        if let Some(sort) = &opts.sort {
            sort_docs(&mut results, sort);
        }
        let skip = opts.skip.unwrap_or(0) as usize;
        let limit = opts.limit.map_or(usize::MAX, |l| l as usize);
        let results = results.into_iter().skip(skip).take(limit);

        Ok(match &opts.projection {
            Some(projection) => results.map(|doc| projection.apply(&doc)).collect(),
            None => results.collect(),
        })
    }

    pub fn find_one(&self, query_json: &Value) -> Result<Option<Value>> {
        let query = query::parse_query(query_json)?;
        Ok(self.matching(&query).next().map(|(_, d)| d.clone()))
    }

    pub fn get(&self, id: DocumentId) -> Option<&Value> {
        self.docs.get(&id)
    }

    pub fn count(&self) -> usize {
        self.docs.len()
    }

    pub fn count_matching(&self, query_json: &Value) -> Result<usize> {
        let query = query::parse_query(query_json)?;
        Ok(self.matching(&query).count())
    }

    fn matching<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = (DocumentId, &'a Value)> + 'a {
        self.docs
            .iter()
            .filter(move |(_, doc)| query::matches_value(query, doc))
            .map(|(&id, doc)| (id, doc))
    }

    /// Apply `update_json` to matching documents. `limit` caps how many are
    /// touched (`Some(1)` for update-one). All updated documents are validated
    /// before any is written; a failure leaves the collection unchanged.
    pub fn update(
        &mut self,
        query_json: &Value,
        update_json: &Value,
        limit: Option<usize>,
    ) -> Result<UpdateResult> {
        let query = query::parse_query(query_json)?;
        let targets: Vec<DocumentId> = self
            .matching(&query)
            .map(|(id, _)| id)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        let mut staged = Vec::with_capacity(targets.len());
        for id in &targets {
            let Some(old) = self.docs.get(id) else {
                continue;
            };
            let mut new = old.clone();
            apply_update(&mut new, update_json)?;
            if new != *old {
                self.check_unique(&new, Some(*id))?;
                staged.push((*id, new));
            }
        }

        // Two staged docs could claim the same unique value between them.
        for field in self.unique_indexes.keys() {
            let mut seen = Vec::new();
            for (_, doc) in &staged {
                if let Some(key) = UniqueIndex::key(doc, field) {
                    if seen.contains(&key) {
                        return Err(Error::UniqueViolation {
                            field: field.clone(),
                        });
                    }
                    seen.push(key);
                }
            }
        }

        let result = UpdateResult {
            matched_count: targets.len() as u64,
            modified_count: staged.len() as u64,
        };
        for (id, new) in staged {
            if let Some(old) = self.docs.remove(&id) {
                self.unindex_doc(&old);
            }
            self.index_doc(id, &new);
            self.docs.insert(id, new);
        }
        debug!(
            collection = %self.name,
            matched = result.matched_count,
            modified = result.modified_count,
            "update"
        );
        Ok(result)
    }
}
