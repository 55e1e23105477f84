//! tests/app_service/fill_and_results.rs
//!
//! Vom Ausfüllen eines Formulars bis zur entschlüsselten Einsendung beim Admin.

use async_trait::async_trait;
use sealed_forms_lib::services::key_integrity::KeyIntegrityError;
use sealed_forms_lib::storage::in_progress::InProgressStore;
use sealed_forms_lib::test_utils::{
    sample_answers, setup_client, test_config, FakeFormApi, ADMIN_KEY, OUTSIDER_KEY, SECOND_ADMIN_KEY,
    TEST_FILL_TOKEN, TEST_FORM, TEST_ORG,
};
use sealed_forms_lib::{
    ApiError, BatchProgress, ClientContext, ClientStores, DecryptionMode, FillTarget, FormApi, QuestionSubmission,
    QuestionSubmissionData, StorageError, SubmissionCoreError, SubmissionStream,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

fn target() -> FillTarget {
    FillTarget {
        org_id: TEST_ORG.to_string(),
        form_id: TEST_FORM.to_string(),
        fill_token: TEST_FILL_TOKEN.to_string(),
    }
}

async fn store_admin_key(client: &ClientContext) {
    // Der Schlüssel wird direkt über den Import-Weg abgelegt.
    client.import_key(TEST_ORG, "admin", &ADMIN_KEY.private).await.unwrap();
}

async fn fill_draft(client: &ClientContext) {
    client.open_fill_session(TEST_FORM).await.unwrap();
    for answer in sample_answers(3) {
        client.record_answer(TEST_FORM, answer).await.unwrap();
    }
    client.complete_group(TEST_FORM, "g-1").await.unwrap();
}

#[tokio::test]
async fn submitted_form_is_readable_by_the_admin() {
    let (client, api) = setup_client();
    api.set_form_keys(TEST_FORM, vec![ADMIN_KEY.public.clone()]);
    fill_draft(&client).await;

    client
        .submit_form(&target(), "g-2", None, Some("captcha-ok"))
        .await
        .unwrap();

    let sent = api.sent_submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].fill_token, TEST_FILL_TOKEN);
    assert_eq!(sent[0].captcha.as_deref(), Some("captcha-ok"));
    assert!(!sent[0].sealed.contains("Respondent"));

    // Nach dem Versand ist der Entwurf weg; ein neuer Aufruf beginnt leer.
    assert!(client.open_fill_session(TEST_FORM).await.unwrap().questions.is_empty());

    store_admin_key(&client).await;
    let (progress, _rx) = watch::channel(BatchProgress::default());
    let outcome = client
        .sync_submissions(TEST_ORG, TEST_FORM, &progress, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.mode, DecryptionMode::Sequential);
    assert_eq!(outcome.submissions.len(), 1);
    let success = outcome.submissions[0].as_success().expect("decryptable");
    assert_eq!(success.questions, sample_answers(3));
    assert_eq!(success.groups, vec!["g-1".to_string(), "g-2".to_string()]);
}

#[tokio::test]
async fn form_without_keys_keeps_the_draft() {
    let (client, api) = setup_client();
    fill_draft(&client).await;

    let result = client.submit_form(&target(), "g-2", None, None).await;
    assert!(matches!(result, Err(SubmissionCoreError::NoKeysFound)));
    assert!(api.sent_submissions().is_empty());
    assert_eq!(client.open_fill_session(TEST_FORM).await.unwrap().questions.len(), 2);
}

#[tokio::test]
async fn submitting_without_a_draft_fails() {
    let (client, api) = setup_client();
    api.set_form_keys(TEST_FORM, vec![ADMIN_KEY.public.clone()]);
    let result = client.submit_form(&target(), "g-1", None, None).await;
    assert!(matches!(result, Err(SubmissionCoreError::Storage(StorageError::NotFound(_)))));
}

#[tokio::test]
async fn trust_anchor_from_link_rejects_foreign_keys() {
    let (client, api) = setup_client();
    api.set_form_keys(TEST_FORM, vec![OUTSIDER_KEY.public.clone()]);
    fill_draft(&client).await;

    let link = Url::parse(&format!(
        "https://forms.example/fill/{}?token={}#ak={}",
        TEST_FORM, TEST_FILL_TOKEN, ADMIN_KEY.fingerprint
    ))
    .unwrap();
    let anchor = client.trust_anchor_from_link(&link).unwrap().expect("anchor present");

    let result = client.submit_form(&target(), "g-2", Some(&anchor), None).await;
    assert!(matches!(
        result,
        Err(SubmissionCoreError::KeyIntegrity(KeyIntegrityError::NoTrustedKeys))
    ));
    assert!(api.sent_submissions().is_empty());
}

#[tokio::test]
async fn malformed_anchor_is_an_error() {
    let (client, _api) = setup_client();
    let link = Url::parse("https://forms.example/fill/f1#ak=not-hex").unwrap();
    assert!(matches!(
        client.trust_anchor_from_link(&link),
        Err(SubmissionCoreError::KeyIntegrity(KeyIntegrityError::MalformedFingerprint { .. }))
    ));
    let plain = Url::parse("https://forms.example/fill/f1").unwrap();
    assert!(client.trust_anchor_from_link(&plain).unwrap().is_none());
}

#[tokio::test]
async fn uploaded_asset_is_decrypted_by_the_admin() {
    let (client, api) = setup_client();
    api.set_form_keys(TEST_FORM, vec![ADMIN_KEY.public.clone()]);

    let file_id = client.upload_asset(&target(), b"%PDF-1.7 ...", None).await.unwrap();
    let stored = api.stored_asset(&file_id).unwrap();
    assert_ne!(stored, b"%PDF-1.7 ...".to_vec());

    store_admin_key(&client).await;
    let plain = client
        .decrypt_submission_asset(TEST_ORG, TEST_FORM, &file_id)
        .await
        .unwrap();
    assert_eq!(plain, b"%PDF-1.7 ...".to_vec());
}

#[tokio::test]
async fn keys_of_other_orgs_are_not_used_for_decryption() {
    let (client, api) = setup_client();
    api.set_form_keys(TEST_FORM, vec![ADMIN_KEY.public.clone()]);
    fill_draft(&client).await;
    client.submit_form(&target(), "g-2", None, None).await.unwrap();

    client.import_key("org-2", "admin", &ADMIN_KEY.private).await.unwrap();
    let (progress, _rx) = watch::channel(BatchProgress::default());
    let outcome = client
        .sync_submissions(TEST_ORG, TEST_FORM, &progress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.submissions.len(), 1);
    assert!(!outcome.submissions[0].is_success());
}

#[tokio::test]
async fn team_fill_link_embeds_member_fingerprints() {
    let (client, api) = setup_client();
    api.set_team_fingerprints(
        "team-a",
        vec![ADMIN_KEY.fingerprint.to_string(), SECOND_ADMIN_KEY.fingerprint.to_string()],
    );

    let base = Url::parse("https://forms.example/fill/f1?token=t").unwrap();
    let link = client.team_fill_link(TEST_ORG, "team-a", &base).await.unwrap();
    let anchor = client.trust_anchor_from_link(&link).unwrap().unwrap();
    assert!(anchor.contains(&ADMIN_KEY.fingerprint));
    assert!(anchor.contains(&SECOND_ADMIN_KEY.fingerprint));
    assert!(!anchor.contains(&OUTSIDER_KEY.fingerprint));
}

#[tokio::test]
async fn abandoning_a_session_discards_the_draft() {
    let (client, _api) = setup_client();
    fill_draft(&client).await;
    let after_clear = client.clear_answer(TEST_FORM, "q-rating").await.unwrap();
    assert_eq!(after_clear.questions.len(), 1);

    assert!(client.abandon_fill_session(TEST_FORM).await.unwrap());
    assert!(!client.abandon_fill_session(TEST_FORM).await.unwrap());
}

/// Eine API, die während des Versands eine weitere Antwort im Entwurf speichert,
/// wie es ein Autosave aus einem zweiten Tab tun würde.
struct AutosaveDuringSubmit {
    inner: FakeFormApi,
    drafts: InProgressStore,
}

#[async_trait]
impl FormApi for AutosaveDuringSubmit {
    async fn list_submissions(
        &self,
        org_id: &str,
        form_id: &str,
        since: Option<&str>,
    ) -> Result<SubmissionStream, ApiError> {
        self.inner.list_submissions(org_id, form_id, since).await
    }

    async fn form_keys(&self, org_id: &str, form_id: &str, fill_token: &str) -> Result<Vec<String>, ApiError> {
        self.inner.form_keys(org_id, form_id, fill_token).await
    }

    async fn submit(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_submission: &str,
        captcha: Option<&str>,
    ) -> Result<(), ApiError> {
        self.inner
            .submit(org_id, form_id, fill_token, sealed_submission, captcha)
            .await?;
        let late = QuestionSubmission {
            question_id: "q-late".to_string(),
            data: QuestionSubmissionData::Text {
                value: "typed while sending".to_string(),
            },
        };
        self.drafts
            .record_answer(form_id, late)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn upload_asset(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_asset: Vec<u8>,
    ) -> Result<String, ApiError> {
        self.inner.upload_asset(org_id, form_id, fill_token, sealed_asset).await
    }

    async fn fetch_asset(&self, org_id: &str, form_id: &str, file_id: &str) -> Result<Vec<u8>, ApiError> {
        self.inner.fetch_asset(org_id, form_id, file_id).await
    }

    async fn team_key_fingerprints(&self, org_id: &str, team_id: &str) -> Result<Vec<String>, ApiError> {
        self.inner.team_key_fingerprints(org_id, team_id).await
    }

    async fn register_key(&self, org_id: &str, public_key: &str) -> Result<String, ApiError> {
        self.inner.register_key(org_id, public_key).await
    }

    async fn register_key_backup(&self, org_id: &str, key_id: &str, backup: &str) -> Result<(), ApiError> {
        self.inner.register_key_backup(org_id, key_id, backup).await
    }

    async fn key_backup(&self, org_id: &str, key_id: &str) -> Result<Option<String>, ApiError> {
        self.inner.key_backup(org_id, key_id).await
    }
}

#[tokio::test]
async fn answer_saved_while_sending_keeps_the_draft() {
    let stores = ClientStores::in_memory();
    let api = Arc::new(AutosaveDuringSubmit {
        inner: FakeFormApi::new(),
        drafts: InProgressStore::new(stores.in_progress.clone(), 3),
    });
    api.inner.set_form_keys(TEST_FORM, vec![ADMIN_KEY.public.clone()]);
    let client = ClientContext::new(test_config(), api.clone(), stores).unwrap();
    fill_draft(&client).await;

    client.submit_form(&target(), "g-2", None, None).await.unwrap();

    assert_eq!(api.inner.sent_submissions().len(), 1);
    let draft = client.open_fill_session(TEST_FORM).await.unwrap();
    assert!(draft.questions.iter().any(|q| q.question_id == "q-late"));
    assert_eq!(draft.questions.len(), 3);
}
