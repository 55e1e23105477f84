//! # src/app_service/mod.rs
//!
//! Definiert den `ClientContext`, eine Fassade über den Diensten der
//! Bibliothek für Client-Anwendungen (Ausfüll-Oberfläche, Admin-Oberfläche, CLI).
//!
//! Der Kontext wird explizit erzeugt und an Aufrufer weitergereicht; es gibt
//! keine globalen Speicher. Die Operationen sind nach Anwendungsfall auf
//! Untermodule verteilt:
//! - `lifecycle`: Erzeugung und Konfiguration
//! - `fill`: Ausfüllen und Absenden von Formularen
//! - `results`: Synchronisation und Entschlüsselung von Einsendungen
//! - `keys`: Verwaltung der lokalen Schlüssel

use crate::api::FormApi;
use crate::config::CoreConfig;
use crate::services::batch_decryption::BatchDecryptionCoordinator;
use crate::services::key_integrity::KeyIntegrityGuard;
use crate::services::submission_crypto::SubmissionCryptoService;
use crate::storage::auth_tokens::AuthTokenStore;
use crate::storage::file_storage::FileDocumentStore;
use crate::storage::in_progress::InProgressStore;
use crate::storage::key_store::PrivateKeyStore;
use crate::storage::memory_storage::MemoryDocumentStore;
use crate::storage::org_visits::OrgVisitStore;
use crate::storage::DocumentStore;
use std::path::Path;
use std::sync::Arc;

pub mod fill;
pub mod keys;
pub mod lifecycle;
pub mod results;

/// Die Dokumentenspeicher, auf denen ein `ClientContext` arbeitet.
/// Jeder Speicher entspricht einer logischen Datenbank.
#[derive(Clone)]
pub struct ClientStores {
    pub submission_cache: Arc<dyn DocumentStore>,
    pub decryption_failures: Arc<dyn DocumentStore>,
    pub in_progress: Arc<dyn DocumentStore>,
    pub private_keys: Arc<dyn DocumentStore>,
    pub auth_tokens: Arc<dyn DocumentStore>,
    pub org_visits: Arc<dyn DocumentStore>,
}

impl ClientStores {
    /// Legt jede Datenbank in einem eigenen Unterverzeichnis von `data_dir` ab.
    pub fn on_disk(data_dir: &Path) -> Self {
        let store = |name: &str| -> Arc<dyn DocumentStore> { Arc::new(FileDocumentStore::new(data_dir.join(name))) };
        ClientStores {
            submission_cache: store("submission_cache"),
            decryption_failures: store("decryption_failures"),
            in_progress: store("in_progress_submissions"),
            private_keys: store("private_keys"),
            auth_tokens: store("auth_tokens"),
            org_visits: store("org_visits"),
        }
    }

    /// Flüchtige Speicher, z.B. für Tests.
    pub fn in_memory() -> Self {
        let store = || -> Arc<dyn DocumentStore> { Arc::new(MemoryDocumentStore::new()) };
        ClientStores {
            submission_cache: store(),
            decryption_failures: store(),
            in_progress: store(),
            private_keys: store(),
            auth_tokens: store(),
            org_visits: store(),
        }
    }
}

/// Die `ClientContext`-Fassade.
pub struct ClientContext {
    config: CoreConfig,
    api: Arc<dyn FormApi>,
    guard: KeyIntegrityGuard,
    crypto: SubmissionCryptoService,
    coordinator: BatchDecryptionCoordinator,
    in_progress: InProgressStore,
    private_keys: PrivateKeyStore,
    auth_tokens: Arc<AuthTokenStore>,
    org_visits: OrgVisitStore,
}
