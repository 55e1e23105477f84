//! tests/app_service/lifecycle.rs
//!
//! Erzeugung des Kontexts, Konfiguration und lokale Verwaltungsdaten.

use sealed_forms_lib::models::records::AuthTokenRecord;
use sealed_forms_lib::test_utils::{setup_client, setup_client_with, test_config, TEST_ORG};
use sealed_forms_lib::utils::now_millis;
use sealed_forms_lib::{ClientStores, CoreConfig, SubmissionCoreError};
use tempfile::tempdir;

#[test]
fn invalid_config_is_rejected() {
    let config = CoreConfig {
        trust_anchor_param: " ".to_string(),
        ..test_config()
    };
    let api = std::sync::Arc::new(sealed_forms_lib::test_utils::FakeFormApi::new());
    let result = sealed_forms_lib::ClientContext::new(config, api, ClientStores::in_memory());
    assert!(matches!(result, Err(SubmissionCoreError::Config(_))));
}

#[test]
fn config_is_loaded_from_toml() {
    let config = CoreConfig::from_toml_str(
        r#"
        api_base_url = "https://api.forms.example/"
        sequential_threshold = 50
        worker_count = 4
        "#,
    )
    .unwrap();
    assert_eq!(config.sequential_threshold, 50);
    assert_eq!(config.effective_worker_count(), 4);
    assert_eq!(config.trust_anchor_param, "ak");
}

#[tokio::test]
async fn org_visits_are_remembered() {
    let (client, _api) = setup_client();
    assert!(client.last_org_visit(TEST_ORG).await.unwrap().is_none());
    let before = chrono::Utc::now() - chrono::Duration::seconds(1);
    client.record_org_visit(TEST_ORG).await.unwrap();
    let visit = client.last_org_visit(TEST_ORG).await.unwrap().unwrap();
    assert!(visit >= before);
}

#[tokio::test]
async fn expired_tokens_are_purged() {
    let (client, _api) = setup_client();
    let now = now_millis();
    for (id, expires) in [("expired", now - 1), ("fresh", now + 60_000)] {
        client
            .store_auth_token(&AuthTokenRecord {
                id: id.to_string(),
                token_secret: "secret".to_string(),
                created: now - 10,
                expires,
            })
            .await
            .unwrap();
    }
    assert_eq!(client.purge_expired_tokens().await.unwrap(), 1);
}

#[tokio::test]
async fn on_disk_stores_keep_drafts_between_contexts() {
    let dir = tempdir().unwrap();
    {
        let (client, _api) = setup_client_with(test_config(), ClientStores::on_disk(dir.path()));
        client
            .record_answer("form-x", sealed_forms_lib::test_utils::sample_answers(1).remove(0))
            .await
            .unwrap();
    }
    let (client, _api) = setup_client_with(test_config(), ClientStores::on_disk(dir.path()));
    let draft = client.open_fill_session("form-x").await.unwrap();
    assert_eq!(draft.questions.len(), 1);
    assert!(dir.path().join("in_progress_submissions").is_dir());
}
