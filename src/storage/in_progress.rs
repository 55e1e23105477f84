//! # src/storage/in_progress.rs
//!
//! Speichert angefangene Einsendungen (Entwürfe), genau einen pro Formular.
//! Jede Antwort wird sofort gesichert, damit ein Neuladen nichts verliert.

use super::collection::Collection;
use super::{DocumentStore, StorageError};
use crate::models::records::InProgressSubmissionRecord;
use crate::models::submission::QuestionSubmission;
use std::sync::Arc;

pub struct InProgressStore {
    records: Collection<InProgressSubmissionRecord>,
}

impl InProgressStore {
    pub fn new(store: Arc<dyn DocumentStore>, conflict_retries: u32) -> Self {
        InProgressStore {
            records: Collection::new("in_progress_submissions", store, conflict_retries),
        }
    }

    pub async fn get(&self, form_id: &str) -> Result<Option<InProgressSubmissionRecord>, StorageError> {
        self.records.get(form_id).await
    }

    /// Lädt den Entwurf eines Formulars oder legt einen leeren an.
    pub async fn load_or_create(&self, form_id: &str) -> Result<InProgressSubmissionRecord, StorageError> {
        self.records
            .update(form_id, |current| {
                current.unwrap_or_else(|| InProgressSubmissionRecord::new(form_id))
            })
            .await
    }

    /// Setzt eine Antwort und speichert den Entwurf.
    pub async fn record_answer(
        &self,
        form_id: &str,
        answer: QuestionSubmission,
    ) -> Result<InProgressSubmissionRecord, StorageError> {
        self.records
            .update(form_id, |current| {
                let mut record = current.unwrap_or_else(|| InProgressSubmissionRecord::new(form_id));
                record.set_answer(answer.clone());
                record
            })
            .await
    }

    pub async fn clear_answer(
        &self,
        form_id: &str,
        question_id: &str,
    ) -> Result<InProgressSubmissionRecord, StorageError> {
        self.records
            .update(form_id, |current| {
                let mut record = current.unwrap_or_else(|| InProgressSubmissionRecord::new(form_id));
                record.clear_answer(question_id);
                record
            })
            .await
    }

    pub async fn complete_group(
        &self,
        form_id: &str,
        group_id: &str,
    ) -> Result<InProgressSubmissionRecord, StorageError> {
        self.records
            .update(form_id, |current| {
                let mut record = current.unwrap_or_else(|| InProgressSubmissionRecord::new(form_id));
                record.complete_group(group_id);
                record
            })
            .await
    }

    /// Löscht den Entwurf nur, wenn er noch dem übergebenen Stand entspricht.
    /// Ein zwischenzeitlich geänderter Entwurf bleibt erhalten.
    pub async fn remove_if_unchanged(&self, sent: &InProgressSubmissionRecord) -> Result<bool, StorageError> {
        self.records.remove_if(&sent.form_id, |current| current == sent).await
    }

    pub async fn remove(&self, form_id: &str) -> Result<bool, StorageError> {
        self.records.remove(form_id).await
    }
}
