//! # src/storage/memory_storage.rs
//!
//! Ein flüchtiger `DocumentStore` im Arbeitsspeicher. Wird in Tests und für
//! Sitzungen ohne Datenverzeichnis verwendet.

use super::{check_revision, next_revision, DocumentStore, StorageError, StoredDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn put(
        &self,
        id: &str,
        expected_rev: Option<&str>,
        body: serde_json::Value,
    ) -> Result<String, StorageError> {
        let mut documents = self.documents.write().await;
        check_revision(id, documents.get(id).map(|d| d.rev.as_str()), expected_rev)?;

        let rev = next_revision(expected_rev, &body);
        documents.insert(
            id.to_string(),
            StoredDocument {
                id: id.to_string(),
                rev: rev.clone(),
                body,
            },
        );
        Ok(rev)
    }

    async fn remove(&self, id: &str, expected_rev: &str) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        let current = documents
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        check_revision(id, Some(current.rev.as_str()), Some(expected_rev))?;
        documents.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredDocument>, StorageError> {
        Ok(self.documents.read().await.values().cloned().collect())
    }
}
