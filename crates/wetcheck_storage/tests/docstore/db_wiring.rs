#![forbid(unsafe_code)]

use serde_json::json;
use wetcheck_storage::docstore::{
    DocumentStore, FieldFilter, MemoryDocumentStore, Ordering, StorageError,
};

#[test]
fn at_docstore_db_01_put_get_overwrite() {
    let mut s = MemoryDocumentStore::new_in_memory();
    s.put("inspections", "a", json!({"v": 1})).unwrap();
    s.put("inspections", "a", json!({"v": 2})).unwrap();
    assert_eq!(s.get_by_id("inspections", "a").unwrap(), Some(json!({"v": 2})));
    assert_eq!(s.get_by_id("inspections", "missing").unwrap(), None);
    assert_eq!(s.document_count("inspections"), 1);
}

#[test]
fn at_docstore_db_02_delete_is_idempotent() {
    let mut s = MemoryDocumentStore::new_in_memory();
    s.put("inspections", "a", json!({})).unwrap();
    s.delete_by_id("inspections", "a").unwrap();
    s.delete_by_id("inspections", "a").unwrap();
    s.delete_by_id("never_created", "b").unwrap();
    assert_eq!(s.document_count("inspections"), 0);
}

#[test]
fn at_docstore_db_03_rejects_non_object_documents() {
    let mut s = MemoryDocumentStore::new_in_memory();
    let err = s.put("inspections", "a", json!("just a string")).unwrap_err();
    assert!(matches!(err, StorageError::Encoding { .. }));
}

#[test]
fn at_docstore_db_04_query_filters_on_field_equality() {
    let mut s = MemoryDocumentStore::new_in_memory();
    s.put("inspections", "a", json!({"userId": "u1", "savedAt": "2025-01-02T00:00:00Z"}))
        .unwrap();
    s.put("inspections", "b", json!({"userId": "u2", "savedAt": "2025-01-03T00:00:00Z"}))
        .unwrap();
    s.put("inspections", "c", json!({"userId": "u1", "savedAt": "2025-01-01T00:00:00Z"}))
        .unwrap();

    let filters = [FieldFilter::equals("userId", "u1")];
    let rows = s.query("inspections", &filters, None).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|(_, doc)| doc["userId"] == "u1"));
}

#[test]
fn at_docstore_db_05_ordered_query_sorts_descending() {
    let mut s = MemoryDocumentStore::new_in_memory();
    s.put("inspections", "old", json!({"userId": "u1", "savedAt": "2025-01-01T00:00:00Z"}))
        .unwrap();
    s.put("inspections", "new", json!({"userId": "u1", "savedAt": "2025-02-01T00:00:00Z"}))
        .unwrap();

    let filters = [FieldFilter::equals("userId", "u1")];
    let ordering = Ordering::descending("savedAt");
    let rows = s.query("inspections", &filters, Some(&ordering)).unwrap();
    let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
}

#[test]
fn at_docstore_db_06_missing_index_refuses_ordered_query() {
    let mut s = MemoryDocumentStore::new_in_memory().without_ordered_queries();
    s.put("inspections", "a", json!({"userId": "u1"})).unwrap();

    let filters = [FieldFilter::equals("userId", "u1")];
    let ordering = Ordering::descending("savedAt");
    let err = s
        .query("inspections", &filters, Some(&ordering))
        .unwrap_err();
    assert!(matches!(err, StorageError::OrderedQueryUnsupported { .. }));

    // The unordered form of the same query still works.
    assert_eq!(s.query("inspections", &filters, None).unwrap().len(), 1);
}
