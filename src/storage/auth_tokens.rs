//! # src/storage/auth_tokens.rs
//!
//! Lokale Ablage der Auth-Tokens, mit denen sich der Client gegenüber der
//! REST-API ausweist.

use super::collection::Collection;
use super::{DocumentStore, StorageError};
use crate::models::records::AuthTokenRecord;
use std::sync::Arc;

pub struct AuthTokenStore {
    tokens: Collection<AuthTokenRecord>,
}

impl AuthTokenStore {
    pub fn new(store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        AuthTokenStore {
            tokens: Collection::new("auth_tokens", store, conflict_retries),
        }
    }

    pub async fn put(&self, token: &AuthTokenRecord) -> Result<(), StorageError> {
        self.tokens.upsert(token).await
    }

    /// Das jüngste Token, das zum Zeitpunkt `now` (ms) noch gültig ist.
    pub async fn current(&self, now: i64) -> Result<Option<AuthTokenRecord>, StorageError> {
        Ok(self
            .tokens
            .find(|t| t.expires > now)
            .await?
            .into_iter()
            .max_by_key(|t| t.created))
    }

    pub async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        self.tokens.remove(id).await
    }

    /// Löscht alle abgelaufenen Tokens und liefert deren Anzahl.
    pub async fn purge_expired(&self, now: i64) -> Result<usize, StorageError> {
        let expired: Vec<String> = self
            .tokens
            .find(|t| t.expires <= now)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        self.tokens.remove_many(&expired).await
    }
}
