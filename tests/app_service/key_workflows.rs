//! tests/app_service/key_workflows.rs
//!
//! Erzeugen, Importieren, Sichern und Wiederherstellen lokaler Schlüssel.

use sealed_forms_lib::services::key_manager::{self, KeyError};
use sealed_forms_lib::test_utils::{setup_client, ADMIN_KEY, TEST_ORG};
use sealed_forms_lib::SubmissionCoreError;

#[tokio::test]
async fn new_key_is_registered_and_stored_locally() {
    let (client, api) = setup_client();
    let server_id = client.register_new_key(TEST_ORG, "alice", Some(30)).await.unwrap();

    let registered = api.registered_keys();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].0, TEST_ORG);
    let public = key_manager::parse_public_key(&registered[0].1).unwrap();

    let local = client.find_local_key(&server_id).await.unwrap().expect("stored locally");
    assert_eq!(local.fingerprint, public.fingerprint);
    assert_eq!(local.user_id, "alice");
    assert!(!format!("{:?}", local).contains(&local.private_key));
    assert_eq!(client.local_keys(TEST_ORG).await.unwrap().len(), 1);
}

#[tokio::test]
async fn default_validity_comes_from_config() {
    let (client, api) = setup_client();
    client.register_new_key(TEST_ORG, "alice", None).await.unwrap();
    let public = key_manager::parse_public_key(&api.registered_keys()[0].1).unwrap();
    let expiry = public.certificate.expires_at.unwrap();
    let days = (expiry - public.certificate.created_at).num_days();
    assert_eq!(days, i64::from(client.config().key_validity_days));
}

#[tokio::test]
async fn importing_a_public_key_is_rejected() {
    let (client, api) = setup_client();
    let result = client.import_key(TEST_ORG, "alice", &ADMIN_KEY.public).await;
    assert!(matches!(result, Err(SubmissionCoreError::Key(KeyError::NotASecretKey))));
    assert!(api.registered_keys().is_empty());
}

#[tokio::test]
async fn imported_key_registers_only_the_public_part() {
    let (client, api) = setup_client();
    client.import_key(TEST_ORG, "alice", &ADMIN_KEY.private).await.unwrap();
    assert_eq!(api.registered_keys()[0].1, ADMIN_KEY.public);
}

#[tokio::test]
async fn backup_can_be_restored_on_a_fresh_device() {
    let (client, api) = setup_client();
    let server_id = client.register_new_key(TEST_ORG, "alice", None).await.unwrap();
    let original = client.find_local_key(&server_id).await.unwrap().unwrap();

    let passphrase = key_manager::generate_backup_passphrase().unwrap();
    client.backup_key(TEST_ORG, &server_id, &passphrase).await.unwrap();

    // Gerätewechsel: lokale Kopie löschen und aus dem Server-Backup wiederherstellen.
    assert!(client.delete_local_key(&original.fingerprint).await.unwrap());
    assert!(client.find_local_key(&server_id).await.unwrap().is_none());

    let restored = client
        .restore_key_from_backup(TEST_ORG, "alice", &server_id, &passphrase)
        .await
        .unwrap();
    assert_eq!(restored, original.fingerprint);
    let local = client.find_local_key(&server_id).await.unwrap().unwrap();
    assert_eq!(local.private_key, original.private_key);
    assert_eq!(api.registered_keys().len(), 1);
}

#[tokio::test]
async fn wrong_passphrase_does_not_restore() {
    let (client, _api) = setup_client();
    let server_id = client.register_new_key(TEST_ORG, "alice", None).await.unwrap();
    client.backup_key(TEST_ORG, &server_id, "right").await.unwrap();

    let result = client
        .restore_key_from_backup(TEST_ORG, "alice", &server_id, "wrong")
        .await;
    assert!(matches!(
        result,
        Err(SubmissionCoreError::Key(KeyError::BackupPassphraseInvalid))
    ));
}

#[tokio::test]
async fn missing_backup_and_unknown_key_are_reported() {
    let (client, _api) = setup_client();
    assert!(matches!(
        client.restore_key_from_backup(TEST_ORG, "alice", "key-404", "x").await,
        Err(SubmissionCoreError::Key(KeyError::BackupNotFound(_)))
    ));
    assert!(matches!(
        client.backup_key(TEST_ORG, "key-404", "x").await,
        Err(SubmissionCoreError::Key(KeyError::UnknownKey(_)))
    ));
}
