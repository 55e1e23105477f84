//! tests/persistence/file_storage.rs
//!
//! Der dateibasierte Dokumentenspeicher über Instanzen hinweg.

use sealed_forms_lib::storage::file_storage::FileDocumentStore;
use sealed_forms_lib::{DocumentStore, StorageError};
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn documents_survive_a_new_instance() {
    let dir = tempdir().unwrap();
    let rev = {
        let store = FileDocumentStore::new(dir.path());
        store.put("form/1", None, json!({"answer": 1})).await.unwrap()
    };

    let reopened = FileDocumentStore::new(dir.path());
    let doc = reopened.get("form/1").await.unwrap().expect("document persisted");
    assert_eq!(doc.rev, rev);
    assert_eq!(doc.body, json!({"answer": 1}));
    assert_eq!(reopened.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_revision_is_a_conflict_across_instances() {
    let dir = tempdir().unwrap();
    let first = FileDocumentStore::new(dir.path());
    let second = FileDocumentStore::new(dir.path());

    let rev1 = first.put("doc", None, json!(1)).await.unwrap();
    let rev2 = second.put("doc", Some(rev1.as_str()), json!(2)).await.unwrap();
    assert_ne!(rev1, rev2);

    assert!(matches!(
        first.put("doc", Some(rev1.as_str()), json!(3)).await,
        Err(StorageError::Conflict(_))
    ));
    assert!(matches!(first.put("doc", None, json!(3)).await, Err(StorageError::Conflict(_))));
    assert!(matches!(first.remove("doc", &rev1).await, Err(StorageError::Conflict(_))));

    first.remove("doc", &rev2).await.unwrap();
    assert!(second.get("doc").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_directory_lists_nothing() {
    let dir = tempdir().unwrap();
    let store = FileDocumentStore::new(dir.path().join("not-yet-created"));
    assert!(store.list().await.unwrap().is_empty());
    assert!(store.get("anything").await.unwrap().is_none());
}

#[tokio::test]
async fn corrupted_file_is_reported() {
    let dir = tempdir().unwrap();
    let store = FileDocumentStore::new(dir.path());
    store.put("ok", None, json!({})).await.unwrap();
    std::fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();

    assert!(matches!(store.list().await, Err(StorageError::InvalidFormat(_))));
}
