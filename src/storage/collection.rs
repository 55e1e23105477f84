//! # src/storage/collection.rs
//!
//! Typisierter Zugriff auf einen `DocumentStore`.
//!
//! Alle schreibenden Operationen einer Collection laufen unter einer
//! gemeinsamen Sperre (read-modify-write). Meldet der Speicher trotzdem einen
//! Revisionskonflikt (z.B. durch einen zweiten Prozess), wird die Operation mit
//! frisch gelesenem Zustand wiederholt.

use super::{DocumentStore, Record, StorageError};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct Collection<T> {
    name: &'static str,
    store: Arc<dyn DocumentStore>,
    write_lock: Mutex<()>,
    conflict_retries: u32,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Collection<T> {
    /// Erstellt eine Collection über einem Speicher.
    ///
    /// # Arguments
    /// * `name` - Ein Name für Log-Ausgaben.
    /// * `conflict_retries` - Wie oft eine Schreiboperation nach einem Konflikt wiederholt wird.
    pub fn new(name: &'static str, store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        Collection {
            name,
            store,
            write_lock: Mutex::new(()),
            conflict_retries,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lädt einen Datensatz anhand seiner Dokument-ID.
    pub async fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(id).await? {
            Some(document) => Ok(Some(decode(document.body)?)),
            None => Ok(None),
        }
    }

    /// Lädt alle Datensätze.
    pub async fn all(&self) -> Result<Vec<T>, StorageError> {
        self.store
            .list()
            .await?
            .into_iter()
            .map(|document| decode(document.body))
            .collect()
    }

    /// Lädt alle Datensätze, die das Prädikat erfüllen.
    pub async fn find<F>(&self, predicate: F) -> Result<Vec<T>, StorageError>
    where
        F: Fn(&T) -> bool,
    {
        Ok(self.all().await?.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Schreibt einen Datensatz; ein vorhandener Datensatz mit derselben ID wird ersetzt.
    pub async fn upsert(&self, record: &T) -> Result<(), StorageError> {
        let id = record.document_id();
        self.update(&id, |_| record.clone()).await.map(|_| ())
    }

    /// Liest den aktuellen Datensatz, wendet `apply` an und schreibt das Ergebnis.
    ///
    /// `apply` kann bei Konflikten mehrfach aufgerufen werden und erhält jedes
    /// Mal den frisch gelesenen Zustand.
    pub async fn update<F>(&self, id: &str, mut apply: F) -> Result<T, StorageError>
    where
        F: FnMut(Option<T>) -> T + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut attempt = 0;
        loop {
            let current = self.store.get(id).await?;
            let (rev, value) = match current {
                Some(document) => (Some(document.rev), Some(decode::<T>(document.body)?)),
                None => (None, None),
            };

            let next = apply(value);
            if next.document_id() != id {
                return Err(StorageError::Generic(format!(
                    "Record id '{}' does not match document id '{}'.",
                    next.document_id(),
                    id
                )));
            }
            let body = serde_json::to_value(&next)?;

            match self.store.put(id, rev.as_deref(), body).await {
                Ok(_) => return Ok(next),
                Err(StorageError::Conflict(_)) if attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(collection = self.name, id, attempt, "Revision conflict, retrying write");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Löscht einen Datensatz. Gibt `false` zurück, wenn er nicht existierte.
    pub async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut attempt = 0;
        loop {
            let Some(document) = self.store.get(id).await? else {
                return Ok(false);
            };
            match self.store.remove(id, &document.rev).await {
                Ok(()) => {
                    debug!(collection = self.name, id, "Removed document");
                    return Ok(true);
                }
                Err(StorageError::NotFound(_)) => return Ok(false),
                Err(StorageError::Conflict(_)) if attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(collection = self.name, id, attempt, "Revision conflict, retrying removal");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Löscht einen Datensatz nur, wenn sein aktueller Stand `predicate` erfüllt.
    /// Gibt `false` zurück, wenn er nicht existierte oder erhalten blieb.
    pub async fn remove_if<F>(&self, id: &str, predicate: F) -> Result<bool, StorageError>
    where
        F: Fn(&T) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut attempt = 0;
        loop {
            let Some(document) = self.store.get(id).await? else {
                return Ok(false);
            };
            if !predicate(&decode::<T>(document.body)?) {
                return Ok(false);
            }
            match self.store.remove(id, &document.rev).await {
                Ok(()) => {
                    debug!(collection = self.name, id, "Removed document");
                    return Ok(true);
                }
                Err(StorageError::NotFound(_)) => return Ok(false),
                Err(StorageError::Conflict(_)) if attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(collection = self.name, id, attempt, "Revision conflict, retrying removal");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Löscht mehrere Datensätze und liefert die Anzahl tatsächlich gelöschter.
    pub async fn remove_many<I, S>(&self, ids: I) -> Result<usize, StorageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;
        for id in ids {
            if self.remove(id.as_ref()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn decode<T: Record>(body: serde_json::Value) -> Result<T, StorageError> {
    serde_json::from_value(body).map_err(|e| StorageError::InvalidFormat(e.to_string()))
}
