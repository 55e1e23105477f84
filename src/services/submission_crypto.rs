//! # src/services/submission_crypto.rs
//!
//! Verschlüsselt Einsendungen und Datei-Anhänge für die Schlüssel eines
//! Formulars und entschlüsselt sie auf Admin-Seite wieder.
//!
//! Die Schlüssel werden bei jeder Operation frisch vom Server geholt und nie
//! zwischengespeichert.

use crate::api::FormApi;
use crate::error::SubmissionCoreError;
use crate::models::records::InProgressSubmissionRecord;
use crate::models::sealed_message::PayloadType;
use crate::models::submission::{
    DecryptedSubmission, DecryptedSubmissionError, DecryptedSubmissionSuccess, EncryptedSubmission,
    InProgressSubmission,
};
use crate::services::key_integrity::{self, TrustAnchor};
use crate::services::key_manager::{self, KeyResolver, RecipientKey};
use crate::services::sealed_message_manager::{self, DecryptionError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SubmissionCryptoService {
    api: Arc<dyn FormApi>,
}

impl SubmissionCryptoService {
    pub fn new(api: Arc<dyn FormApi>) -> Self {
        SubmissionCryptoService { api }
    }

    /// Holt die armierten öffentlichen Schlüssel des Formulars.
    ///
    /// # Returns
    /// `NoKeysFound`, wenn der Server keine Schlüssel liefert.
    pub async fn resolve_recipient_keys(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
    ) -> Result<Vec<String>, SubmissionCoreError> {
        let keys = self.api.form_keys(org_id, form_id, fill_token).await?;
        debug!(org_id, form_id, count = keys.len(), "Resolved form keys");
        if keys.is_empty() {
            return Err(SubmissionCoreError::NoKeysFound);
        }
        Ok(keys)
    }

    /// Ermittelt die Empfänger für eine Verschlüsselung.
    ///
    /// Reihenfolge: Schlüssel parsen, Vertrauensanker anwenden (falls vorhanden),
    /// abgelaufene Schlüssel verwerfen.
    async fn recipients(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        anchor: Option<&TrustAnchor>,
    ) -> Result<Vec<RecipientKey>, SubmissionCoreError> {
        let armored = self.resolve_recipient_keys(org_id, form_id, fill_token).await?;

        let parsed: Vec<RecipientKey> = armored
            .iter()
            .filter_map(|key| match key_manager::parse_public_key(key) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(org_id, form_id, error = %e, "Ignoring unreadable form key");
                    None
                }
            })
            .collect();

        let trusted = match anchor {
            Some(anchor) => key_integrity::filter_recipients(parsed, anchor)?,
            None => parsed,
        };

        let now = Utc::now();
        let valid: Vec<RecipientKey> = trusted.into_iter().filter(|k| k.is_valid_at(now)).collect();
        if valid.is_empty() {
            return Err(SubmissionCoreError::NoKeysFound);
        }
        Ok(valid)
    }

    /// Verschlüsselt einen Entwurf als fertige Einsendung.
    ///
    /// Die letzte Gruppe wird an `groups_completed` angehängt. Es findet kein
    /// Versand statt; das Ergebnis ist die armierte Nachricht.
    pub async fn encrypt_submission(
        &self,
        record: &InProgressSubmissionRecord,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        last_group_id: &str,
        anchor: Option<&TrustAnchor>,
    ) -> Result<String, SubmissionCoreError> {
        let recipients = self.recipients(org_id, form_id, fill_token, anchor).await?;
        let payload: InProgressSubmission = record.to_outbound_payload(last_group_id);
        let json = serde_json::to_vec(&payload)?;
        Ok(sealed_message_manager::seal_armored(
            &json,
            PayloadType::Submission,
            &recipients,
        )?)
    }

    /// Verschlüsselt einen Datei-Anhang und liefert die armierte Nachricht als Bytes.
    pub async fn encrypt_asset(
        &self,
        data: &[u8],
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        anchor: Option<&TrustAnchor>,
    ) -> Result<Vec<u8>, SubmissionCoreError> {
        let recipients = self.recipients(org_id, form_id, fill_token, anchor).await?;
        let armored = sealed_message_manager::seal_armored(data, PayloadType::Asset, &recipients)?;
        Ok(armored.into_bytes())
    }
}

/// Entschlüsselt eine armierte Nachricht mit den lokalen Schlüsseln.
pub fn decrypt_blob(
    armored: &str,
    payload_type: PayloadType,
    resolver: &KeyResolver,
) -> Result<Vec<u8>, DecryptionError> {
    sealed_message_manager::open_armored(armored, payload_type, resolver)
}

/// Entschlüsselt eine einzelne Einsendung. Schlägt nie fehl: Fehler werden
/// als `DecryptedSubmission::Error` zurückgegeben.
pub fn decrypt_submission(submission: &EncryptedSubmission, resolver: &KeyResolver) -> DecryptedSubmission {
    let result = decrypt_blob(&submission.data, PayloadType::Submission, resolver).and_then(|plain| {
        serde_json::from_slice::<InProgressSubmission>(&plain)
            .map_err(|e| DecryptionError::Malformed(e.to_string()))
    });

    match result {
        Ok(payload) => DecryptedSubmission::Success(DecryptedSubmissionSuccess {
            id: submission.id.clone(),
            created_at: submission.created_at,
            for_token: submission.for_token.clone(),
            questions: payload.questions,
            groups: payload.groups_completed,
        }),
        Err(e) => {
            debug!(submission_id = %submission.id, error = %e, "Submission could not be decrypted");
            DecryptedSubmission::Error(DecryptedSubmissionError {
                id: submission.id.clone(),
                created_at: submission.created_at,
                for_token: submission.for_token.clone(),
                error: e.to_string(),
            })
        }
    }
}
