#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde_json::Value;
use wetcheck_contracts::ContractViolation;

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    NotFound {
        collection: String,
        id: String,
    },
    Encoding {
        detail: String,
    },
    OrderedQueryUnsupported {
        collection: String,
        field: String,
    },
    Backend {
        detail: String,
    },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// Equality filter over a top-level document field, the only predicate the
/// backing stores are guaranteed to support.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub equals: Value,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub field: String,
    pub descending: bool,
}

impl Ordering {
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Capability interface over the shared document store. Documents are
/// schemaless key-value maps; schema discipline belongs to the adapters.
pub trait DocumentStore {
    fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError>;
    fn put(&mut self, collection: &str, id: &str, document: Value) -> Result<(), StorageError>;
    /// Idempotent: removing an id that does not exist is not an error.
    fn delete_by_id(&mut self, collection: &str, id: &str) -> Result<(), StorageError>;
    fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        ordering: Option<&Ordering>,
    ) -> Result<Vec<(String, Value)>, StorageError>;
}

#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    ordered_queries: bool,
}

impl MemoryDocumentStore {
    pub fn new_in_memory() -> Self {
        Self {
            collections: BTreeMap::new(),
            ordered_queries: true,
        }
    }

    /// Simulates a backend whose ordered query requires an index that was
    /// never provisioned; `query` with an `ordering` then fails with
    /// `OrderedQueryUnsupported` and callers must fall back.
    pub fn without_ordered_queries(mut self) -> Self {
        self.ordered_queries = false;
        self
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, BTreeMap::len)
    }
}

fn matches(document: &Value, filters: &[FieldFilter]) -> bool {
    filters
        .iter()
        .all(|f| document.get(&f.field) == Some(&f.equals))
}

fn order_key(document: &Value, field: &str) -> String {
    document
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

impl DocumentStore for MemoryDocumentStore {
    fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn put(&mut self, collection: &str, id: &str, document: Value) -> Result<(), StorageError> {
        if !document.is_object() {
            return Err(StorageError::Encoding {
                detail: format!("document {collection}/{id} must be a JSON object"),
            });
        }
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    fn delete_by_id(&mut self, collection: &str, id: &str) -> Result<(), StorageError> {
        if let Some(docs) = self.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        ordering: Option<&Ordering>,
    ) -> Result<Vec<(String, Value)>, StorageError> {
        let mut hits: Vec<(String, Value)> = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| matches(doc, filters))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = ordering {
            if !self.ordered_queries {
                return Err(StorageError::OrderedQueryUnsupported {
                    collection: collection.to_string(),
                    field: order.field.clone(),
                });
            }
            hits.sort_by(|(_, a), (_, b)| {
                let ka = order_key(a, &order.field);
                let kb = order_key(b, &order.field);
                if order.descending {
                    kb.cmp(&ka)
                } else {
                    ka.cmp(&kb)
                }
            });
        }
        Ok(hits)
    }
}
