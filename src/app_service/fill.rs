//! # src/app_service/fill.rs
//!
//! Ausfüllen und Absenden eines Formulars.
//!
//! Antworten werden sofort im lokalen Entwurf gesichert. Erst beim Absenden
//! wird der Entwurf für die Schlüssel des Formulars verschlüsselt; nach
//! erfolgreichem Versand wird er gelöscht.

use super::ClientContext;
use crate::error::SubmissionCoreError;
use crate::models::records::InProgressSubmissionRecord;
use crate::models::submission::QuestionSubmission;
use crate::services::key_integrity::TrustAnchor;
use crate::storage::StorageError;
use tracing::{info, warn};
use url::Url;

/// Das Formular, das ausgefüllt wird, und das Token, mit dem es geöffnet wurde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillTarget {
    pub org_id: String,
    pub form_id: String,
    pub fill_token: String,
}

impl ClientContext {
    /// Liest den Vertrauensanker aus einem Ausfüll-Link.
    pub fn trust_anchor_from_link(&self, link: &Url) -> Result<Option<TrustAnchor>, SubmissionCoreError> {
        Ok(self.guard.derive_trust_anchor(link)?)
    }

    /// Lädt den Entwurf eines Formulars oder legt einen neuen an.
    pub async fn open_fill_session(&self, form_id: &str) -> Result<InProgressSubmissionRecord, SubmissionCoreError> {
        Ok(self.in_progress.load_or_create(form_id).await?)
    }

    /// Speichert die Antwort auf eine Frage (Autosave).
    pub async fn record_answer(
        &self,
        form_id: &str,
        answer: QuestionSubmission,
    ) -> Result<InProgressSubmissionRecord, SubmissionCoreError> {
        Ok(self.in_progress.record_answer(form_id, answer).await?)
    }

    pub async fn clear_answer(
        &self,
        form_id: &str,
        question_id: &str,
    ) -> Result<InProgressSubmissionRecord, SubmissionCoreError> {
        Ok(self.in_progress.clear_answer(form_id, question_id).await?)
    }

    /// Markiert eine Fragengruppe als abgeschlossen.
    pub async fn complete_group(
        &self,
        form_id: &str,
        group_id: &str,
    ) -> Result<InProgressSubmissionRecord, SubmissionCoreError> {
        Ok(self.in_progress.complete_group(form_id, group_id).await?)
    }

    /// Verschlüsselt den Entwurf und sendet ihn ab.
    ///
    /// Schlägt die Schlüsselauflösung oder die Integritätsprüfung fehl, wird
    /// nichts gesendet und der Entwurf bleibt erhalten. Wurde der Entwurf
    /// während des Versands geändert, bleibt er ebenfalls erhalten, damit die
    /// neuen Antworten nicht verloren gehen.
    pub async fn submit_form(
        &self,
        target: &FillTarget,
        last_group_id: &str,
        anchor: Option<&TrustAnchor>,
        captcha: Option<&str>,
    ) -> Result<(), SubmissionCoreError> {
        let record = self
            .in_progress
            .get(&target.form_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(target.form_id.clone()))?;

        let sealed = self
            .crypto
            .encrypt_submission(
                &record,
                &target.org_id,
                &target.form_id,
                &target.fill_token,
                last_group_id,
                anchor,
            )
            .await?;

        self.api
            .submit(&target.org_id, &target.form_id, &target.fill_token, &sealed, captcha)
            .await?;
        if !self.in_progress.remove_if_unchanged(&record).await? {
            warn!(form_id = %target.form_id, "Draft changed while sending, keeping it");
        }

        info!(org_id = %target.org_id, form_id = %target.form_id, "Submission sent");
        Ok(())
    }

    /// Verschlüsselt einen Datei-Anhang, lädt ihn hoch und liefert die Datei-ID.
    pub async fn upload_asset(
        &self,
        target: &FillTarget,
        data: &[u8],
        anchor: Option<&TrustAnchor>,
    ) -> Result<String, SubmissionCoreError> {
        let sealed = self
            .crypto
            .encrypt_asset(data, &target.org_id, &target.form_id, &target.fill_token, anchor)
            .await?;
        Ok(self
            .api
            .upload_asset(&target.org_id, &target.form_id, &target.fill_token, sealed)
            .await?)
    }

    /// Verwirft den Entwurf eines Formulars.
    pub async fn abandon_fill_session(&self, form_id: &str) -> Result<bool, SubmissionCoreError> {
        Ok(self.in_progress.remove(form_id).await?)
    }
}
