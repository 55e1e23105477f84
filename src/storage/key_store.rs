//! # src/storage/key_store.rs
//!
//! Lokale Ablage privater Schlüssel. Die Schlüssel verlassen das Gerät nur
//! als passwortgeschütztes Backup.

use super::collection::Collection;
use super::{DocumentStore, StorageError};
use crate::models::keys::KeyFingerprint;
use crate::models::records::PrivateKeyRecord;
use std::sync::Arc;

pub struct PrivateKeyStore {
    keys: Collection<PrivateKeyRecord>,
}

impl PrivateKeyStore {
    pub fn new(store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        PrivateKeyStore {
            keys: Collection::new("private_keys", store, conflict_retries),
        }
    }

    pub async fn put(&self, record: &PrivateKeyRecord) -> Result<(), StorageError> {
        self.keys.upsert(record).await
    }

    pub async fn get(&self, fingerprint: &KeyFingerprint) -> Result<Option<PrivateKeyRecord>, StorageError> {
        self.keys.get(fingerprint.as_str()).await
    }

    pub async fn find_by_server_id(&self, server_id: &str) -> Result<Option<PrivateKeyRecord>, StorageError> {
        Ok(self
            .keys
            .find(|k| k.server_id == server_id)
            .await?
            .into_iter()
            .next())
    }

    /// Alle Schlüssel einer Organisation.
    pub async fn for_org(&self, org_id: &str) -> Result<Vec<PrivateKeyRecord>, StorageError> {
        self.keys.find(|k| k.org_id == org_id).await
    }

    pub async fn all(&self) -> Result<Vec<PrivateKeyRecord>, StorageError> {
        self.keys.all().await
    }

    pub async fn remove(&self, fingerprint: &KeyFingerprint) -> Result<bool, StorageError> {
        self.keys.remove(fingerprint.as_str()).await
    }
}
