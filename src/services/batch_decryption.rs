//! # src/services/batch_decryption.rs
//!
//! Synchronisiert und entschlüsselt alle Einsendungen eines Formulars.
//!
//! Ablauf:
//! 1. Gecachte Einträge laden; der jüngste Eintrag ist der Cursor.
//! 2. Nur neuere Einsendungen sowie die gelöschten IDs vom Server holen. Gibt
//!    es nicht entschlüsselbare Einsendungen, liegt der Cursor vor der ältesten.
//! 3. Gelöschte Einsendungen aus dem Cache entfernen.
//! 4. Wenige neue Einsendungen direkt entschlüsseln, viele auf Worker verteilen.
//! 5. Jede erfolgreiche Entschlüsselung sofort cachen, Fehlschläge vermerken.
//! 6. Gecachte und neue Ergebnisse zusammenführen und stabil nach Zeit sortieren.

use crate::api::FormApi;
use crate::error::SubmissionCoreError;
use crate::models::records::{DecryptedSubmissionCacheEntry, FailedSubmissionRef};
use crate::models::submission::{DecryptedSubmission, EncryptedSubmission};
use crate::services::key_manager::KeyResolver;
use crate::services::submission_crypto::decrypt_submission;
use crate::services::utils::to_millis;
use crate::storage::submission_cache::SubmissionCache;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Fortschritt einer Synchronisation. `done` zählt gecachte und neu verarbeitete Einsendungen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: u64,
    pub done: u64,
}

/// Wie die neuen Einsendungen entschlüsselt wurden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionMode {
    Sequential,
    Parallel { workers: usize },
}

/// Ergebnis einer Synchronisation.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Alle Einsendungen des Formulars, aufsteigend nach Erstellungszeit.
    pub submissions: Vec<DecryptedSubmission>,
    pub mode: DecryptionMode,
    /// Anzahl der neu vom Server geladenen Einsendungen.
    pub fetched: usize,
    /// Anzahl der aus dem Cache entfernten, serverseitig gelöschten Einsendungen.
    pub removed: usize,
}

/// Die Arbeitseinheit eines Workers.
pub struct DecryptionJob {
    pub items: Vec<EncryptedSubmission>,
    pub resolver: Arc<KeyResolver>,
}

impl DecryptionJob {
    /// Entschlüsselt alle Einträge der Reihe nach und meldet jedes Ergebnis an `emit`.
    ///
    /// Vor jedem Eintrag wird `cancel` geprüft. Gibt `false` zurück, wenn die
    /// Arbeit abgebrochen wurde.
    pub fn process<F>(&self, cancel: &CancellationToken, mut emit: F) -> bool
    where
        F: FnMut(DecryptedSubmission),
    {
        for item in &self.items {
            if cancel.is_cancelled() {
                return false;
            }
            emit(decrypt_submission(item, &self.resolver));
        }
        true
    }

    /// Entschlüsselt alle Einträge und liefert genau ein Ergebnis pro Eintrag.
    pub fn run(&self) -> Vec<DecryptedSubmission> {
        let mut results = Vec::with_capacity(self.items.len());
        self.process(&CancellationToken::new(), |r| results.push(r));
        results
    }
}

/// Nachrichten eines Workers an den Koordinator.
#[derive(Debug)]
enum WorkerEvent {
    Decrypted {
        worker: usize,
        result: DecryptedSubmission,
    },
    Finished {
        worker: usize,
    },
}

/// Verteilt Einträge reihum auf `groups` Gruppen (Eintrag `i` an Gruppe `i % groups`).
pub fn partition_round_robin<T>(items: Vec<T>, groups: usize) -> Vec<Vec<T>> {
    let groups = groups.max(1);
    let mut partitions: Vec<Vec<T>> = (0..groups)
        .map(|_| Vec::with_capacity(items.len() / groups + 1))
        .collect();
    for (index, item) in items.into_iter().enumerate() {
        partitions[index % groups].push(item);
    }
    partitions
}

pub struct BatchDecryptionCoordinator {
    api: Arc<dyn FormApi>,
    cache: Arc<SubmissionCache>,
    sequential_threshold: usize,
    worker_count: usize,
}

impl BatchDecryptionCoordinator {
    /// # Arguments
    /// * `sequential_threshold` - Bis zu dieser Anzahl neuer Einsendungen wird ohne Worker gearbeitet.
    /// * `worker_count` - Anzahl der Worker im parallelen Modus (mindestens 2).
    pub fn new(
        api: Arc<dyn FormApi>,
        cache: Arc<SubmissionCache>,
        sequential_threshold: usize,
        worker_count: usize,
    ) -> Self {
        BatchDecryptionCoordinator {
            api,
            cache,
            sequential_threshold,
            worker_count: worker_count.max(2),
        }
    }

    /// Synchronisiert die Einsendungen eines Formulars.
    ///
    /// Bei Abbruch wird `SubmissionCoreError::Cancelled` zurückgegeben; bereits
    /// gecachte Einträge bleiben erhalten. Nicht entschlüsselbare Einsendungen
    /// werden bei jeder weiteren Synchronisation erneut angefragt.
    #[instrument(skip(self, resolver, progress, cancel))]
    pub async fn sync(
        &self,
        org_id: &str,
        form_id: &str,
        resolver: Arc<KeyResolver>,
        progress: &watch::Sender<BatchProgress>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SubmissionCoreError> {
        let mut cached = self.cache.entries_for_form(form_id).await?;
        let failures = self.cache.failures_for_form(form_id).await?;
        let cursor = sync_cursor(&cached, failures.first());

        let stream = self
            .api
            .list_submissions(org_id, form_id, cursor.as_deref())
            .await?;

        // Gelöschte IDs werden auch dann aus dem Speicher entfernt, wenn sie
        // nicht unter den gecachten Einträgen dieses Formulars waren.
        let removed = if stream.deleted.is_empty() {
            0
        } else {
            let deleted: HashSet<&str> = stream.deleted.iter().map(String::as_str).collect();
            cached.retain(|e| !deleted.contains(e.submission_id.as_str()));
            self.cache.remove_many(&stream.deleted).await?
                + self.cache.clear_failures(form_id, &stream.deleted).await?
        };

        // Liegt der Cursor vor einer fehlgeschlagenen Einsendung, liefert der
        // Server auch bereits gecachte Einsendungen erneut.
        let pending: Vec<EncryptedSubmission> = {
            let known: HashSet<&str> = cached.iter().map(|e| e.submission_id.as_str()).collect();
            stream
                .new
                .into_iter()
                .filter(|s| !known.contains(s.id.as_str()))
                .collect()
        };
        let retrying: HashSet<String> = failures
            .into_iter()
            .map(|f| f.submission_id)
            .filter(|id| !stream.deleted.contains(id))
            .collect();

        progress.send_replace(BatchProgress {
            total: stream.total,
            done: cached.len() as u64,
        });

        if cancel.is_cancelled() {
            return Err(SubmissionCoreError::Cancelled);
        }

        let fetched = pending.len();
        let parallel = fetched > self.sequential_threshold;
        info!(
            cached = cached.len(),
            fetched,
            retrying = retrying.len(),
            removed,
            parallel,
            "Starting submission sync"
        );

        let scope = SyncScope {
            org_id,
            form_id,
            retrying,
            progress,
        };
        let (fresh, mode) = if parallel {
            let fresh = self.decrypt_parallel(&scope, pending, resolver, cancel).await?;
            (fresh, DecryptionMode::Parallel { workers: self.worker_count })
        } else {
            let fresh = self.decrypt_sequential(&scope, &pending, &resolver, cancel).await?;
            (fresh, DecryptionMode::Sequential)
        };

        let mut submissions: Vec<DecryptedSubmission> = cached
            .into_iter()
            .map(|e| DecryptedSubmission::Success(e.submission))
            .chain(fresh)
            .collect();
        // `sort_by_key` ist stabil: bei gleicher Zeit bleibt "gecacht vor neu".
        submissions.sort_by_key(|s| s.created_at());

        info!(total = submissions.len(), ?mode, "Submission sync finished");
        Ok(SyncOutcome {
            submissions,
            mode,
            fetched,
            removed,
        })
    }

    async fn decrypt_sequential(
        &self,
        scope: &SyncScope<'_>,
        items: &[EncryptedSubmission],
        resolver: &KeyResolver,
        cancel: &CancellationToken,
    ) -> Result<Vec<DecryptedSubmission>, SubmissionCoreError> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            if cancel.is_cancelled() {
                return Err(SubmissionCoreError::Cancelled);
            }
            let result = decrypt_submission(item, resolver);
            self.record(scope, &result).await?;
            results.push(result);
        }
        Ok(results)
    }

    async fn decrypt_parallel(
        &self,
        scope: &SyncScope<'_>,
        items: Vec<EncryptedSubmission>,
        resolver: Arc<KeyResolver>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DecryptedSubmission>, SubmissionCoreError> {
        let partitions = partition_round_robin(items, self.worker_count);
        let workers = partitions.len();
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerEvent>();

        // Die Worker enden mit dem Koordinator, auch wenn dessen Future verworfen wird.
        let worker_cancel = cancel.child_token();
        let _stop_workers = worker_cancel.clone().drop_guard();

        let mut handles = Vec::with_capacity(workers);
        for (worker, items) in partitions.into_iter().enumerate() {
            let job = DecryptionJob {
                items,
                resolver: resolver.clone(),
            };
            let tx = tx.clone();
            let worker_cancel = worker_cancel.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let completed = job.process(&worker_cancel, |result| {
                    // Ist der Empfänger weg, wurde die Synchronisation beendet.
                    let _ = tx.send(WorkerEvent::Decrypted { worker, result });
                });
                if completed {
                    let _ = tx.send(WorkerEvent::Finished { worker });
                }
            }));
        }
        drop(tx);
        debug!(workers, "Spawned decryption workers");

        let received = self.collect_worker_events(scope, &mut rx, workers, cancel).await;

        worker_cancel.cancel();
        drop(rx);
        for handle in handles {
            handle
                .await
                .map_err(|e| SubmissionCoreError::Worker(e.to_string()))?;
        }

        let (results, finished) = received?;
        if finished != workers {
            if cancel.is_cancelled() {
                return Err(SubmissionCoreError::Cancelled);
            }
            return Err(SubmissionCoreError::Worker(format!(
                "only {} of {} workers finished",
                finished, workers
            )));
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Nimmt die Ergebnisse der Worker entgegen, bis alle Kanäle geschlossen sind.
    /// Liefert die Ergebnisse pro Worker und die Anzahl vollständig beendeter Worker.
    async fn collect_worker_events(
        &self,
        scope: &SyncScope<'_>,
        rx: &mut mpsc::UnboundedReceiver<WorkerEvent>,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Vec<DecryptedSubmission>>, usize), SubmissionCoreError> {
        let mut results: Vec<Vec<DecryptedSubmission>> = (0..workers).map(|_| Vec::new()).collect();
        let mut finished = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SubmissionCoreError::Cancelled);
                }
                event = rx.recv() => match event {
                    Some(WorkerEvent::Decrypted { worker, result }) => {
                        self.record(scope, &result).await?;
                        results[worker].push(result);
                    }
                    Some(WorkerEvent::Finished { worker }) => {
                        debug!(worker, "Decryption worker finished");
                        finished += 1;
                    }
                    None => return Ok((results, finished)),
                },
            }
        }
    }

    /// Cacht ein erfolgreiches Ergebnis bzw. vermerkt ein fehlgeschlagenes und
    /// erhöht den Fortschritt.
    async fn record(&self, scope: &SyncScope<'_>, result: &DecryptedSubmission) -> Result<(), SubmissionCoreError> {
        match result {
            DecryptedSubmission::Success(success) => {
                self.cache
                    .put(&DecryptedSubmissionCacheEntry {
                        submission_id: success.id.clone(),
                        org_id: scope.org_id.to_string(),
                        form_id: scope.form_id.to_string(),
                        submission: success.clone(),
                        created: to_millis(&success.created_at),
                    })
                    .await?;
                if scope.retrying.contains(&success.id) {
                    self.cache
                        .clear_failures(scope.form_id, std::slice::from_ref(&success.id))
                        .await?;
                }
            }
            DecryptedSubmission::Error(failed) => {
                self.cache
                    .record_failure(
                        scope.org_id,
                        scope.form_id,
                        FailedSubmissionRef {
                            submission_id: failed.id.clone(),
                            created: to_millis(&failed.created_at),
                        },
                    )
                    .await?;
            }
        }
        scope.progress.send_modify(|p| p.done += 1);
        Ok(())
    }
}

/// Was beim Ablegen eines Ergebnisses über die laufende Synchronisation bekannt ist.
struct SyncScope<'a> {
    org_id: &'a str,
    form_id: &'a str,
    /// Einsendungen, die bei einer früheren Synchronisation fehlgeschlagen sind.
    retrying: HashSet<String>,
    progress: &'a watch::Sender<BatchProgress>,
}

/// Der Cursor für den Abruf: der jüngste gecachte Eintrag, der vor der ältesten
/// fehlgeschlagenen Einsendung liegt. Ohne Fehlschläge der jüngste gecachte Eintrag.
fn sync_cursor(
    cached: &[DecryptedSubmissionCacheEntry],
    oldest_failure: Option<&FailedSubmissionRef>,
) -> Option<String> {
    cached
        .iter()
        .rev()
        .find(|e| match oldest_failure {
            Some(failure) => {
                (e.created, e.submission_id.as_str()) < (failure.created, failure.submission_id.as_str())
            }
            None => true,
        })
        .map(|e| e.submission_id.clone())
}
