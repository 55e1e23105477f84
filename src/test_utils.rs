//! # src/test_utils.rs
//!
//! Zentrale Hilfsfunktionen für alle Tests (intern und extern): eine
//! In-Memory-Implementierung der REST-API, Test-Schlüssel und Generatoren
//! für verschlüsselte Einsendungen.

use crate::api::{ApiError, FormApi};
use crate::app_service::{ClientContext, ClientStores};
use crate::config::CoreConfig;
use crate::models::keys::KeyFingerprint;
use crate::models::sealed_message::PayloadType;
use crate::models::submission::{
    EncryptedSubmission, InProgressSubmission, QuestionSubmission, QuestionSubmissionData, SubmissionStream,
};
use crate::services::key_manager::{self, RecipientKey};
use crate::services::sealed_message_manager;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const TEST_ORG: &str = "org-1";
pub const TEST_FORM: &str = "form-1";
pub const TEST_FILL_TOKEN: &str = "fill-token-1";

/// Ein Test-Schlüsselpaar in armierter Form.
#[derive(Clone)]
pub struct TestKey {
    pub public: String,
    pub private: String,
    pub fingerprint: KeyFingerprint,
}

impl TestKey {
    /// Der geparste öffentliche Schlüssel, z.B. als Empfänger für `seal`.
    pub fn recipient(&self) -> RecipientKey {
        key_manager::parse_public_key(&self.public).expect("test key must parse")
    }
}

/// Erzeugt ein neues Schlüsselpaar mit der angegebenen Gültigkeit.
/// Negative Dauern erzeugen bereits abgelaufene Schlüssel.
pub fn test_key(user_id: &str, validity: Duration) -> TestKey {
    let keypair = key_manager::generate_keypair(TEST_ORG, user_id, validity).expect("key generation must succeed");
    TestKey {
        public: keypair.public,
        private: keypair.private,
        fingerprint: keypair.fingerprint,
    }
}

/// Ein Schlüssel, der seit einer Stunde abgelaufen ist.
pub fn expired_test_key(user_id: &str) -> TestKey {
    test_key(user_id, Duration::hours(-1))
}

lazy_static! {
    /// Der Schlüssel des Haupt-Administrators.
    pub static ref ADMIN_KEY: TestKey = test_key("admin", Duration::days(30));
    /// Ein zweiter Administrator derselben Organisation.
    pub static ref SECOND_ADMIN_KEY: TestKey = test_key("second-admin", Duration::days(30));
    /// Ein gültiger Schlüssel, der keinem Vertrauensanker angehört.
    pub static ref OUTSIDER_KEY: TestKey = test_key("outsider", Duration::days(30));
}

/// Ein fester Zeitpunkt, von dem aus Test-Einsendungen datiert werden.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn sample_answers(seed: usize) -> Vec<QuestionSubmission> {
    vec![
        QuestionSubmission {
            question_id: "q-name".to_string(),
            data: QuestionSubmissionData::Text {
                value: format!("Respondent {}", seed),
            },
        },
        QuestionSubmission {
            question_id: "q-rating".to_string(),
            data: QuestionSubmissionData::Scale {
                value: Some((seed % 5) as i32 + 1),
            },
        },
    ]
}

/// Versiegelt eine Einsendung für die angegebenen Schlüssel.
pub fn sealed_submission(
    id: &str,
    created_at: DateTime<Utc>,
    answers: Vec<QuestionSubmission>,
    recipients: &[&TestKey],
) -> EncryptedSubmission {
    let payload = InProgressSubmission {
        form_id: TEST_FORM.to_string(),
        groups_completed: vec!["g-1".to_string()],
        questions: answers,
    };
    let json = serde_json::to_vec(&payload).expect("payload must serialize");
    let recipients: Vec<RecipientKey> = recipients.iter().map(|k| k.recipient()).collect();
    let data = sealed_message_manager::seal_armored(&json, PayloadType::Submission, &recipients)
        .expect("sealing must succeed");
    EncryptedSubmission {
        id: id.to_string(),
        created_at,
        for_token: None,
        data,
    }
}

/// Erzeugt `count` Einsendungen mit IDs `sub-0000..` im Sekundenabstand ab `start`.
pub fn sealed_submissions(
    count: usize,
    start: DateTime<Utc>,
    recipients: &[&TestKey],
) -> Vec<EncryptedSubmission> {
    (0..count)
        .map(|i| {
            sealed_submission(
                &format!("sub-{:04}", i),
                start + Duration::seconds(i as i64),
                sample_answers(i),
                recipients,
            )
        })
        .collect()
}

/// Eine über die API abgesendete Einsendung.
#[derive(Debug, Clone)]
pub struct SentSubmission {
    pub org_id: String,
    pub form_id: String,
    pub fill_token: String,
    pub sealed: String,
    pub captcha: Option<String>,
}

#[derive(Default)]
struct FakeState {
    form_keys: HashMap<String, Vec<String>>,
    submissions: HashMap<String, Vec<EncryptedSubmission>>,
    deleted: HashMap<String, Vec<String>>,
    assets: HashMap<String, Vec<u8>>,
    team_fingerprints: HashMap<String, Vec<String>>,
    registered_keys: Vec<(String, String)>,
    backups: HashMap<String, String>,
    sent: Vec<SentSubmission>,
    list_cursors: Vec<Option<String>>,
}

/// In-Memory-Implementierung von `FormApi` für Tests.
#[derive(Default)]
pub struct FakeFormApi {
    state: Mutex<FakeState>,
}

impl FakeFormApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_form_keys(&self, form_id: &str, keys: Vec<String>) {
        self.state.lock().unwrap().form_keys.insert(form_id.to_string(), keys);
    }

    pub fn add_submissions(&self, form_id: &str, submissions: Vec<EncryptedSubmission>) {
        self.state
            .lock()
            .unwrap()
            .submissions
            .entry(form_id.to_string())
            .or_default()
            .extend(submissions);
    }

    /// Löscht Einsendungen serverseitig; ihre IDs erscheinen danach in `deleted`.
    pub fn delete_submissions(&self, form_id: &str, ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        if let Some(list) = state.submissions.get_mut(form_id) {
            list.retain(|s| !ids.contains(&s.id.as_str()));
        }
        state
            .deleted
            .entry(form_id.to_string())
            .or_default()
            .extend(ids.iter().map(|id| id.to_string()));
    }

    pub fn set_team_fingerprints(&self, team_id: &str, fingerprints: Vec<String>) {
        self.state
            .lock()
            .unwrap()
            .team_fingerprints
            .insert(team_id.to_string(), fingerprints);
    }

    pub fn sent_submissions(&self) -> Vec<SentSubmission> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Die `since`-Cursor aller bisherigen Listen-Aufrufe.
    pub fn list_cursors(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().list_cursors.clone()
    }

    /// Alle registrierten öffentlichen Schlüssel als `(org_id, public_key)`.
    pub fn registered_keys(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().registered_keys.clone()
    }

    pub fn stored_asset(&self, file_id: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().assets.get(file_id).cloned()
    }
}

#[async_trait]
impl FormApi for FakeFormApi {
    async fn list_submissions(
        &self,
        _org_id: &str,
        form_id: &str,
        since: Option<&str>,
    ) -> Result<SubmissionStream, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.list_cursors.push(since.map(str::to_string));

        let mut all = state.submissions.get(form_id).cloned().unwrap_or_default();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let start = since
            .and_then(|cursor| all.iter().position(|s| s.id == cursor))
            .map_or(0, |pos| pos + 1);

        Ok(SubmissionStream {
            since: since.map(str::to_string),
            total: all.len() as u64,
            new: all[start..].to_vec(),
            deleted: state.deleted.get(form_id).cloned().unwrap_or_default(),
        })
    }

    async fn form_keys(&self, _org_id: &str, form_id: &str, _fill_token: &str) -> Result<Vec<String>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .form_keys
            .get(form_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_submission: &str,
        captcha: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let list = state.submissions.entry(form_id.to_string()).or_default();
        let id = format!("sent-{:04}", list.len());
        list.push(EncryptedSubmission {
            id,
            created_at: Utc::now(),
            for_token: None,
            data: sealed_submission.to_string(),
        });
        state.sent.push(SentSubmission {
            org_id: org_id.to_string(),
            form_id: form_id.to_string(),
            fill_token: fill_token.to_string(),
            sealed: sealed_submission.to_string(),
            captcha: captcha.map(str::to_string),
        });
        Ok(())
    }

    async fn upload_asset(
        &self,
        _org_id: &str,
        _form_id: &str,
        _fill_token: &str,
        sealed_asset: Vec<u8>,
    ) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        let file_id = format!("file-{}", state.assets.len());
        state.assets.insert(file_id.clone(), sealed_asset);
        Ok(file_id)
    }

    async fn fetch_asset(&self, _org_id: &str, _form_id: &str, file_id: &str) -> Result<Vec<u8>, ApiError> {
        self.state
            .lock()
            .unwrap()
            .assets
            .get(file_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("asset {} not found", file_id),
            })
    }

    async fn team_key_fingerprints(&self, _org_id: &str, team_id: &str) -> Result<Vec<String>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .team_fingerprints
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn register_key(&self, org_id: &str, public_key: &str) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.registered_keys.push((org_id.to_string(), public_key.to_string()));
        Ok(format!("key-{}", state.registered_keys.len()))
    }

    async fn register_key_backup(&self, _org_id: &str, key_id: &str, backup: &str) -> Result<(), ApiError> {
        self.state
            .lock()
            .unwrap()
            .backups
            .insert(key_id.to_string(), backup.to_string());
        Ok(())
    }

    async fn key_backup(&self, _org_id: &str, key_id: &str) -> Result<Option<String>, ApiError> {
        Ok(self.state.lock().unwrap().backups.get(key_id).cloned())
    }
}

/// Eine Konfiguration mit fester Worker-Anzahl, damit Tests unabhängig von
/// der Anzahl der CPU-Kerne sind.
pub fn test_config() -> CoreConfig {
    CoreConfig {
        worker_count: Some(3),
        ..CoreConfig::default()
    }
}

/// Ein `ClientContext` mit In-Memory-Speichern und einer `FakeFormApi`.
pub fn setup_client() -> (ClientContext, Arc<FakeFormApi>) {
    setup_client_with(test_config(), ClientStores::in_memory())
}

pub fn setup_client_with(config: CoreConfig, stores: ClientStores) -> (ClientContext, Arc<FakeFormApi>) {
    let api = Arc::new(FakeFormApi::new());
    let client = ClientContext::new(config, api.clone(), stores).expect("test config must be valid");
    (client, api)
}
