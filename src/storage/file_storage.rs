//! # src/storage/file_storage.rs
//!
//! Eine Implementierung des `DocumentStore`-Traits, die jedes Dokument als
//! eigene JSON-Datei in einem Verzeichnis ablegt.
//!
//! Dateinamen sind die hex-kodierte Dokument-ID, damit beliebige IDs
//! (Slashes, Punkte) sicher auf das Dateisystem abgebildet werden. Schreibzugriffe
//! erfolgen über eine temporäre Datei und ein anschließendes `rename`.

use super::{check_revision, next_revision, DocumentStore, StorageError, StoredDocument};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

const DOCUMENT_EXTENSION: &str = "json";

/// Ein dateibasierter Dokumentenspeicher.
pub struct FileDocumentStore {
    /// Das Verzeichnis, das die Dokument-Dateien enthält.
    directory: PathBuf,
    /// Macht Revisionsprüfung und Schreibzugriff innerhalb des Prozesses atomar.
    write_guard: Mutex<()>,
}

impl FileDocumentStore {
    /// Erstellt einen neuen Speicher für ein Verzeichnis. Das Verzeichnis wird
    /// beim ersten Schreibzugriff angelegt.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        FileDocumentStore {
            directory: directory.into(),
            write_guard: Mutex::new(()),
        }
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", hex::encode(id.as_bytes()), DOCUMENT_EXTENSION))
    }

    async fn read_document(&self, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        let path = self.document_path(id);
        match fs::read(&path).await {
            Ok(bytes) => {
                let document: StoredDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::InvalidFormat(format!("{}: {}", path.display(), e))
                })?;
                Ok(Some(document))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        self.read_document(id).await
    }

    async fn put(
        &self,
        id: &str,
        expected_rev: Option<&str>,
        body: serde_json::Value,
    ) -> Result<String, StorageError> {
        let _guard = self.write_guard.lock().await;

        let current = self.read_document(id).await?;
        check_revision(id, current.as_ref().map(|d| d.rev.as_str()), expected_rev)?;

        let rev = next_revision(expected_rev, &body);
        let document = StoredDocument {
            id: id.to_string(),
            rev: rev.clone(),
            body,
        };

        fs::create_dir_all(&self.directory).await?;
        let path = self.document_path(id);
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_vec(&document)?).await?;
        fs::rename(&tmp_path, &path).await?;

        Ok(rev)
    }

    async fn remove(&self, id: &str, expected_rev: &str) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;

        let current = self
            .read_document(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        check_revision(id, Some(current.rev.as_str()), Some(expected_rev))?;

        fs::remove_file(self.document_path(id)).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredDocument>, StorageError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let document: StoredDocument = serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::InvalidFormat(format!("{}: {}", path.display(), e))
            })?;
            documents.push(document);
        }
        Ok(documents)
    }
}
