//! # src/error.rs
//!
//! Definiert den zentralen Fehlertyp der sealed_forms-Bibliothek.
//! Verwendet `thiserror` zur einfachen Erstellung von aussagekräftigen Fehlern
//! und zur automatischen Konvertierung von untergeordneten Fehlertypen.

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::services::key_integrity::KeyIntegrityError;
use crate::services::key_manager::KeyError;
use crate::services::sealed_message_manager::{DecryptionError, SealError};
use crate::storage::StorageError;
use thiserror::Error;

/// Der zentrale Fehlertyp für alle Operationen der Bibliothek.
#[derive(Error, Debug)]
pub enum SubmissionCoreError {
    /// Der Server hat keine (gültigen) Empfänger-Schlüssel für das Formular geliefert.
    #[error("No keys found for the form; cannot encrypt submission.")]
    NoKeysFound,

    /// Die Schlüssel des Servers passen nicht zum Vertrauensanker des Ausfüll-Links.
    #[error("Key integrity check failed: {0}")]
    KeyIntegrity(#[from] KeyIntegrityError),

    /// Eine einzelne Nachricht konnte nicht entschlüsselt werden.
    #[error("Decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("Encryption failed: {0}")]
    Encryption(#[from] SealError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] ApiError),

    /// Die Operation wurde vom Aufrufer abgebrochen.
    #[error("The operation was cancelled.")]
    Cancelled,

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ein Worker ist unerwartet ausgefallen.
    #[error("Worker failed: {0}")]
    Worker(String),
}
