//! # src/storage/submission_cache.rs
//!
//! Lokaler Cache bereits entschlüsselter Einsendungen. Ermöglicht die
//! inkrementelle Synchronisation: nur Einsendungen nach dem letzten
//! gecachten Eintrag werden erneut vom Server geladen.
//!
//! Einsendungen, die nicht entschlüsselt werden konnten, landen nicht im
//! Cache, sondern in einer Fehlerliste pro Formular. Solange diese Liste nicht
//! leer ist, liegt der Cursor vor der ältesten fehlgeschlagenen Einsendung.

use super::collection::Collection;
use super::{DocumentStore, StorageError};
use crate::models::records::{DecryptedSubmissionCacheEntry, FailedDecryptionRecord, FailedSubmissionRef};
use std::sync::Arc;
use tracing::debug;

pub struct SubmissionCache {
    entries: Collection<DecryptedSubmissionCacheEntry>,
    failures: Collection<FailedDecryptionRecord>,
}

impl SubmissionCache {
    /// # Arguments
    /// * `store` - Speicher der entschlüsselten Einträge.
    /// * `failure_store` - Speicher der Fehlerlisten pro Formular.
    pub fn new(store: Arc<dyn DocumentStore>, failure_store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        SubmissionCache {
            entries: Collection::new("submission_cache", store, conflict_retries),
            failures: Collection::new("decryption_failures", failure_store, conflict_retries),
        }
    }

    /// Alle Einträge eines Formulars, aufsteigend nach Erstellungszeit (bei
    /// Gleichstand nach ID).
    pub async fn entries_for_form(
        &self,
        form_id: &str,
    ) -> Result<Vec<DecryptedSubmissionCacheEntry>, StorageError> {
        let mut entries = self.entries.find(|e| e.form_id == form_id).await?;
        entries.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| a.submission_id.cmp(&b.submission_id))
        });
        Ok(entries)
    }

    /// Legt einen Eintrag ab. Ein bereits vorhandener Eintrag mit derselben
    /// Einsendungs-ID bleibt unverändert.
    pub async fn put(&self, entry: &DecryptedSubmissionCacheEntry) -> Result<(), StorageError> {
        self.entries
            .update(&entry.submission_id, |current| current.unwrap_or_else(|| entry.clone()))
            .await
            .map(|_| ())
    }

    /// Entfernt einen Eintrag. `false`, wenn er nicht im Cache lag.
    pub async fn remove(&self, submission_id: &str) -> Result<bool, StorageError> {
        self.entries.remove(submission_id).await
    }

    /// Entfernt mehrere Einträge, z.B. serverseitig gelöschte Einsendungen.
    pub async fn remove_many(&self, submission_ids: &[String]) -> Result<usize, StorageError> {
        let removed = self.entries.remove_many(submission_ids).await?;
        if removed > 0 {
            debug!(removed, requested = submission_ids.len(), "Removed deleted submissions from cache");
        }
        Ok(removed)
    }

    /// Die nicht entschlüsselbaren Einsendungen eines Formulars, aufsteigend
    /// nach Erstellungszeit (bei Gleichstand nach ID).
    pub async fn failures_for_form(&self, form_id: &str) -> Result<Vec<FailedSubmissionRef>, StorageError> {
        let mut failures = self
            .failures
            .get(form_id)
            .await?
            .map(|record| record.submissions)
            .unwrap_or_default();
        failures.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| a.submission_id.cmp(&b.submission_id))
        });
        Ok(failures)
    }

    /// Vermerkt eine fehlgeschlagene Entschlüsselung (idempotent).
    pub async fn record_failure(
        &self,
        org_id: &str,
        form_id: &str,
        failure: FailedSubmissionRef,
    ) -> Result<(), StorageError> {
        self.failures
            .update(form_id, |current| {
                let mut record = current.unwrap_or_else(|| FailedDecryptionRecord {
                    form_id: form_id.to_string(),
                    org_id: org_id.to_string(),
                    submissions: Vec::new(),
                });
                if !record
                    .submissions
                    .iter()
                    .any(|f| f.submission_id == failure.submission_id)
                {
                    record.submissions.push(failure.clone());
                }
                record
            })
            .await
            .map(|_| ())
    }

    /// Streicht Einsendungen aus der Fehlerliste eines Formulars, z.B. nach
    /// erfolgreicher Entschlüsselung oder serverseitiger Löschung.
    /// Liefert die Anzahl gestrichener Einträge.
    pub async fn clear_failures(&self, form_id: &str, submission_ids: &[String]) -> Result<usize, StorageError> {
        let Some(current) = self.failures.get(form_id).await? else {
            return Ok(0);
        };
        if !current
            .submissions
            .iter()
            .any(|f| submission_ids.contains(&f.submission_id))
        {
            return Ok(0);
        }

        let before = current.submissions.len();
        let updated = self
            .failures
            .update(form_id, |record| {
                let mut record = record.unwrap_or_else(|| current.clone());
                record
                    .submissions
                    .retain(|f| !submission_ids.contains(&f.submission_id));
                record
            })
            .await?;
        if updated.submissions.is_empty() {
            self.failures.remove(form_id).await?;
        }
        Ok(before.saturating_sub(updated.submissions.len()))
    }
}
