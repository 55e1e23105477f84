//! # src/app_service/results.rs
//!
//! Abruf und Entschlüsselung von Einsendungen auf Admin-Seite.

use super::ClientContext;
use crate::error::SubmissionCoreError;
use crate::models::keys::KeyFingerprint;
use crate::models::sealed_message::PayloadType;
use crate::services::batch_decryption::{BatchProgress, SyncOutcome};
use crate::services::key_integrity::KeyIntegrityError;
use crate::services::key_manager::KeyResolver;
use crate::services::sealed_message_manager::DecryptionError;
use crate::services::submission_crypto::decrypt_blob;
use crate::services::utils::now_millis;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

impl ClientContext {
    /// Baut einen Resolver aus allen lokalen Schlüsseln einer Organisation.
    pub async fn key_resolver(&self, org_id: &str) -> Result<KeyResolver, SubmissionCoreError> {
        let records = self.private_keys.for_org(org_id).await?;
        Ok(KeyResolver::new(records.iter().map(|r| r.private_key.as_str()))?)
    }

    /// Synchronisiert und entschlüsselt alle Einsendungen eines Formulars.
    pub async fn sync_submissions(
        &self,
        org_id: &str,
        form_id: &str,
        progress: &watch::Sender<BatchProgress>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SubmissionCoreError> {
        let resolver = Arc::new(self.key_resolver(org_id).await?);
        self.coordinator
            .sync(org_id, form_id, resolver, progress, cancel)
            .await
    }

    /// Lädt einen Datei-Anhang einer Einsendung und entschlüsselt ihn.
    pub async fn decrypt_submission_asset(
        &self,
        org_id: &str,
        form_id: &str,
        file_id: &str,
    ) -> Result<Vec<u8>, SubmissionCoreError> {
        let sealed = self.api.fetch_asset(org_id, form_id, file_id).await?;
        let armored = String::from_utf8(sealed)
            .map_err(|_| DecryptionError::Malformed("Asset is not an armored message".to_string()))?;
        let resolver = self.key_resolver(org_id).await?;
        Ok(decrypt_blob(&armored, PayloadType::Asset, &resolver)?)
    }

    /// Erzeugt einen Ausfüll-Link, der die Schlüssel eines Teams als
    /// Vertrauensanker enthält.
    pub async fn team_fill_link(
        &self,
        org_id: &str,
        team_id: &str,
        fill_link: &Url,
    ) -> Result<Url, SubmissionCoreError> {
        let fingerprints = self
            .api
            .team_key_fingerprints(org_id, team_id)
            .await?
            .iter()
            .map(|value| {
                KeyFingerprint::parse(value).map_err(|source| KeyIntegrityError::MalformedFingerprint {
                    value: value.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.guard.embed_trust_anchor(fill_link, &fingerprints))
    }

    /// Merkt sich, dass eine Organisation gerade angesehen wurde.
    pub async fn record_org_visit(&self, org_id: &str) -> Result<(), SubmissionCoreError> {
        Ok(self.org_visits.record_visit(org_id, now_millis()).await?)
    }

    /// Der Zeitpunkt des letzten Besuchs einer Organisation.
    pub async fn last_org_visit(&self, org_id: &str) -> Result<Option<DateTime<Utc>>, SubmissionCoreError> {
        Ok(self
            .org_visits
            .last_visit(org_id)
            .await?
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()))
    }
}
