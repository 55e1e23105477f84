//! # sealed_forms_core
//!
//! Die Client-Kernlogik für Ende-zu-Ende-verschlüsselte Formular-Einsendungen.
//! Antworten werden beim Ausfüllenden für die öffentlichen Schlüssel des
//! Formulars versiegelt; nur Inhaber der passenden privaten Schlüssel können
//! sie wieder öffnen. Der Server sieht ausschließlich Chiffrate.

// Deklariert die Hauptmodule der Bibliothek und macht sie öffentlich.
pub mod api;
pub mod app_service;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod test_utils;

// Re-exportiert die wichtigsten öffentlichen Typen für eine einfachere Nutzung.

// Fassade und Konfiguration
pub use app_service::fill::FillTarget;
pub use app_service::{ClientContext, ClientStores};
pub use config::CoreConfig;
pub use error::SubmissionCoreError;

// Modelle
pub use models::keys::KeyFingerprint;
pub use models::sealed_message::{PayloadType, SealedMessage};
pub use models::submission::{
    DecryptedSubmission, EncryptedSubmission, QuestionSubmission, QuestionSubmissionData, SubmissionStream,
};

// Services
pub use services::batch_decryption::{BatchProgress, DecryptionMode, SyncOutcome};
pub use services::crypto_utils;
pub use services::key_integrity::{KeyIntegrityGuard, TrustAnchor};
pub use services::key_manager::{KeyResolver, RecipientKey};
pub use services::utils;

// Speicher und API
pub use api::{ApiError, FormApi};
pub use storage::{DocumentStore, StorageError};
