//! # src/app_service/keys.rs
//!
//! Verwaltung der lokalen Empfänger-Schlüssel: Erzeugen, Importieren,
//! Sichern, Wiederherstellen und Löschen.

use super::ClientContext;
use crate::error::SubmissionCoreError;
use crate::models::keys::KeyFingerprint;
use crate::models::records::PrivateKeyRecord;
use crate::services::key_manager::{self, KeyError};
use chrono::Duration;
use tracing::info;

impl ClientContext {
    /// Erzeugt ein neues Schlüsselpaar, registriert den öffentlichen Teil beim
    /// Server und speichert den privaten Teil lokal.
    ///
    /// # Arguments
    /// * `validity_days` - Gültigkeit in Tagen; `None` verwendet `key_validity_days`
    ///   aus der Konfiguration, `0` die maximale Gültigkeit.
    ///
    /// # Returns
    /// Die vom Server vergebene Schlüssel-ID.
    pub async fn register_new_key(
        &self,
        org_id: &str,
        user_id: &str,
        validity_days: Option<u32>,
    ) -> Result<String, SubmissionCoreError> {
        let days = validity_days.unwrap_or(self.config.key_validity_days);
        let keypair = key_manager::generate_keypair(org_id, user_id, Duration::days(i64::from(days)))?;

        let server_id = self.api.register_key(org_id, &keypair.public).await?;
        self.private_keys
            .put(&PrivateKeyRecord {
                fingerprint: keypair.fingerprint.clone(),
                private_key: keypair.private,
                server_id: server_id.clone(),
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
            })
            .await?;

        info!(org_id, server_id = %server_id, fingerprint = %keypair.fingerprint, "Registered new key");
        Ok(server_id)
    }

    /// Importiert einen vorhandenen geheimen Schlüssel.
    ///
    /// Reine öffentliche Schlüssel werden abgelehnt, da mit ihnen nichts
    /// entschlüsselt werden kann.
    pub async fn import_key(
        &self,
        org_id: &str,
        user_id: &str,
        private_armored: &str,
    ) -> Result<String, SubmissionCoreError> {
        let metadata = key_manager::key_metadata(private_armored)?;
        if !metadata.has_secret {
            return Err(KeyError::NotASecretKey.into());
        }

        let public = key_manager::strip_secret(private_armored)?;
        let server_id = self.api.register_key(org_id, &public).await?;
        self.private_keys
            .put(&PrivateKeyRecord {
                fingerprint: metadata.fingerprint.clone(),
                private_key: private_armored.to_string(),
                server_id: server_id.clone(),
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
            })
            .await?;

        info!(org_id, server_id = %server_id, fingerprint = %metadata.fingerprint, "Imported key");
        Ok(server_id)
    }

    /// Hinterlegt ein passwortgeschütztes Backup eines lokalen Schlüssels beim Server.
    pub async fn backup_key(&self, org_id: &str, server_id: &str, passphrase: &str) -> Result<(), SubmissionCoreError> {
        let record = self
            .private_keys
            .find_by_server_id(server_id)
            .await?
            .ok_or_else(|| KeyError::UnknownKey(server_id.to_string()))?;

        let backup = key_manager::encrypt_key_for_backup(&record.private_key, passphrase)?;
        self.api.register_key_backup(org_id, server_id, &backup).await?;
        info!(org_id, server_id, "Uploaded key backup");
        Ok(())
    }

    /// Stellt einen Schlüssel aus dem beim Server hinterlegten Backup wieder her.
    pub async fn restore_key_from_backup(
        &self,
        org_id: &str,
        user_id: &str,
        server_id: &str,
        passphrase: &str,
    ) -> Result<KeyFingerprint, SubmissionCoreError> {
        let backup = self
            .api
            .key_backup(org_id, server_id)
            .await?
            .ok_or_else(|| KeyError::BackupNotFound(server_id.to_string()))?;

        let restored = key_manager::decrypt_key_backup(&backup, passphrase)?;
        self.private_keys
            .put(&PrivateKeyRecord {
                fingerprint: restored.fingerprint.clone(),
                private_key: restored.private,
                server_id: server_id.to_string(),
                org_id: org_id.to_string(),
                user_id: user_id.to_string(),
            })
            .await?;

        info!(org_id, server_id, fingerprint = %restored.fingerprint, "Restored key from backup");
        Ok(restored.fingerprint)
    }

    /// Die lokalen Schlüssel einer Organisation.
    pub async fn local_keys(&self, org_id: &str) -> Result<Vec<PrivateKeyRecord>, SubmissionCoreError> {
        Ok(self.private_keys.for_org(org_id).await?)
    }

    pub async fn find_local_key(&self, server_id: &str) -> Result<Option<PrivateKeyRecord>, SubmissionCoreError> {
        Ok(self.private_keys.find_by_server_id(server_id).await?)
    }

    /// Löscht einen lokalen Schlüssel. Einsendungen für diesen Schlüssel sind
    /// danach auf diesem Gerät nicht mehr lesbar.
    pub async fn delete_local_key(&self, fingerprint: &KeyFingerprint) -> Result<bool, SubmissionCoreError> {
        Ok(self.private_keys.remove(fingerprint).await?)
    }
}
