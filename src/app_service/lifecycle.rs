//! # src/app_service/lifecycle.rs
//!
//! Erzeugung eines `ClientContext` und Zugriff auf seine Konfiguration.

use super::{ClientContext, ClientStores};
use crate::api::http_client::HttpFormApi;
use crate::api::FormApi;
use crate::config::CoreConfig;
use crate::error::SubmissionCoreError;
use crate::models::records::AuthTokenRecord;
use crate::services::batch_decryption::BatchDecryptionCoordinator;
use crate::services::key_integrity::KeyIntegrityGuard;
use crate::services::submission_crypto::SubmissionCryptoService;
use crate::storage::auth_tokens::AuthTokenStore;
use crate::storage::in_progress::InProgressStore;
use crate::storage::key_store::PrivateKeyStore;
use crate::storage::org_visits::OrgVisitStore;
use crate::storage::submission_cache::SubmissionCache;
use std::sync::Arc;
use tracing::info;

impl ClientContext {
    /// Erstellt einen Kontext mit einer beliebigen API-Implementierung.
    pub fn new(
        config: CoreConfig,
        api: Arc<dyn FormApi>,
        stores: ClientStores,
    ) -> Result<Self, SubmissionCoreError> {
        config.validate()?;
        let tokens = Arc::new(AuthTokenStore::new(
            stores.auth_tokens.clone(),
            config.storage_conflict_retries,
        ));
        Ok(Self::assemble(config, api, stores, tokens))
    }

    /// Erstellt einen Kontext mit dateibasierten Speichern unter `config.data_dir`
    /// und dem HTTP-Client für `config.api_base_url`.
    pub fn connect(config: CoreConfig) -> Result<Self, SubmissionCoreError> {
        config.validate()?;
        let stores = ClientStores::on_disk(&config.data_dir);
        let tokens = Arc::new(AuthTokenStore::new(
            stores.auth_tokens.clone(),
            config.storage_conflict_retries,
        ));
        let api: Arc<dyn FormApi> = Arc::new(HttpFormApi::new(&config, tokens.clone())?);
        info!(
            api = %config.api_base_url,
            data_dir = %config.data_dir.display(),
            "Client context connected"
        );
        Ok(Self::assemble(config, api, stores, tokens))
    }

    fn assemble(
        config: CoreConfig,
        api: Arc<dyn FormApi>,
        stores: ClientStores,
        auth_tokens: Arc<AuthTokenStore>,
    ) -> Self {
        let retries = config.storage_conflict_retries;
        let cache = Arc::new(SubmissionCache::new(
            stores.submission_cache,
            stores.decryption_failures,
            retries,
        ));
        let coordinator = BatchDecryptionCoordinator::new(
            api.clone(),
            cache,
            config.sequential_threshold,
            config.effective_worker_count(),
        );

        ClientContext {
            guard: KeyIntegrityGuard::new(config.trust_anchor_param.clone()),
            crypto: SubmissionCryptoService::new(api.clone()),
            coordinator,
            in_progress: InProgressStore::new(stores.in_progress, retries),
            private_keys: PrivateKeyStore::new(stores.private_keys, retries),
            auth_tokens,
            org_visits: OrgVisitStore::new(stores.org_visits, retries),
            api,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn key_integrity_guard(&self) -> &KeyIntegrityGuard {
        &self.guard
    }

    /// Speichert ein Auth-Token für die Verwaltungs-Endpunkte der API.
    pub async fn store_auth_token(&self, token: &AuthTokenRecord) -> Result<(), SubmissionCoreError> {
        self.auth_tokens.put(token).await?;
        Ok(())
    }

    /// Entfernt alle abgelaufenen Auth-Tokens.
    pub async fn purge_expired_tokens(&self) -> Result<usize, SubmissionCoreError> {
        Ok(self
            .auth_tokens
            .purge_expired(crate::services::utils::now_millis())
            .await?)
    }
}
