//! # src/storage/mod.rs
//!
//! Definiert die Abstraktion für den lokalen, persistenten Dokumentenspeicher.
//!
//! Jedes Dokument trägt ein Revisions-Token. Schreibzugriffe müssen die aktuelle
//! Revision mitliefern, sonst schlägt der Zugriff mit `StorageError::Conflict`
//! fehl (optimistische Nebenläufigkeit). Typisierte Zugriffe laufen über
//! [`collection::Collection`], die Schreiber serialisiert.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod auth_tokens;
pub mod collection;
pub mod file_storage;
pub mod in_progress;
pub mod key_store;
pub mod memory_storage;
pub mod org_visits;
pub mod submission_cache;

/// Ein generischer Fehler-Typ für alle Speicheroperationen.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document '{0}' not found.")]
    NotFound(String),

    /// Die mitgelieferte Revision entspricht nicht der gespeicherten.
    #[error("Revision conflict while writing document '{0}'.")]
    Conflict(String),

    #[error("Data is corrupted or has an invalid format: {0}")]
    InvalidFormat(String),

    #[error("Underlying I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("An unexpected error occurred: {0}")]
    Generic(String),
}

/// Ein gespeichertes Dokument samt Revision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub rev: String,
    pub body: serde_json::Value,
}

/// Ein Datensatz, der in einem Dokumentenspeicher abgelegt werden kann.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Die stabile Dokument-ID des Datensatzes.
    fn document_id(&self) -> String;
}

/// Die Schnittstelle eines Dokumentenspeichers.
///
/// Eine Instanz entspricht genau einer logischen Datenbank (z.B. dem Cache
/// entschlüsselter Einsendungen).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lädt ein Dokument. `Ok(None)`, wenn es nicht existiert.
    async fn get(&self, id: &str) -> Result<Option<StoredDocument>, StorageError>;

    /// Schreibt ein Dokument und liefert die neue Revision.
    ///
    /// `expected_rev` muss `None` sein, wenn das Dokument neu ist, und sonst der
    /// aktuellen Revision entsprechen. Andernfalls `StorageError::Conflict`.
    async fn put(
        &self,
        id: &str,
        expected_rev: Option<&str>,
        body: serde_json::Value,
    ) -> Result<String, StorageError>;

    /// Löscht ein Dokument mit der angegebenen Revision.
    async fn remove(&self, id: &str, expected_rev: &str) -> Result<(), StorageError>;

    /// Liefert alle Dokumente in unbestimmter Reihenfolge.
    async fn list(&self) -> Result<Vec<StoredDocument>, StorageError>;
}

/// Berechnet die Folgerevision `<generation>-<hash>` für einen neuen Dokumentinhalt.
pub fn next_revision(previous: Option<&str>, body: &serde_json::Value) -> String {
    let generation = previous
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(gen, _)| gen.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;

    let mut hasher = Sha256::new();
    hasher.update(body.to_string().as_bytes());
    let hash = hasher.finalize();
    format!("{}-{}", generation, hex::encode(&hash[..8]))
}

/// Prüft die erwartete gegen die gespeicherte Revision.
pub(crate) fn check_revision(
    id: &str,
    current: Option<&str>,
    expected: Option<&str>,
) -> Result<(), StorageError> {
    if current == expected {
        Ok(())
    } else {
        Err(StorageError::Conflict(id.to_string()))
    }
}
