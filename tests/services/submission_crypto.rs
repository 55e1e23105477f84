//! tests/services/submission_crypto.rs
//!
//! Verschlüsseln von Einsendungen gegen die Schlüssel eines Formulars.

use sealed_forms_lib::models::records::InProgressSubmissionRecord;
use sealed_forms_lib::services::key_integrity::{KeyIntegrityError, TrustAnchor};
use sealed_forms_lib::services::key_manager::KeyResolver;
use sealed_forms_lib::services::submission_crypto::{decrypt_blob, decrypt_submission, SubmissionCryptoService};
use sealed_forms_lib::test_utils::{
    expired_test_key, sample_answers, FakeFormApi, ADMIN_KEY, OUTSIDER_KEY, SECOND_ADMIN_KEY, TEST_FILL_TOKEN,
    TEST_FORM, TEST_ORG,
};
use sealed_forms_lib::{
    DecryptedSubmission, EncryptedSubmission, KeyFingerprint, PayloadType, SubmissionCoreError,
};
use std::sync::Arc;

fn draft() -> InProgressSubmissionRecord {
    let mut record = InProgressSubmissionRecord::new(TEST_FORM);
    for answer in sample_answers(7) {
        record.set_answer(answer);
    }
    record.complete_group("g-1");
    record
}

fn service_with_keys(keys: Vec<String>) -> SubmissionCryptoService {
    let api = Arc::new(FakeFormApi::new());
    api.set_form_keys(TEST_FORM, keys);
    SubmissionCryptoService::new(api)
}

#[tokio::test]
async fn submission_round_trip_includes_last_group() {
    let service = service_with_keys(vec![ADMIN_KEY.public.clone()]);
    let sealed = service
        .encrypt_submission(&draft(), TEST_ORG, TEST_FORM, TEST_FILL_TOKEN, "g-2", None)
        .await
        .unwrap();

    let encrypted = EncryptedSubmission {
        id: "s1".to_string(),
        created_at: chrono::Utc::now(),
        for_token: Some("team-a".to_string()),
        data: sealed,
    };
    let resolver = KeyResolver::new([ADMIN_KEY.private.as_str()]).unwrap();
    match decrypt_submission(&encrypted, &resolver) {
        DecryptedSubmission::Success(success) => {
            assert_eq!(success.id, "s1");
            assert_eq!(success.for_token.as_deref(), Some("team-a"));
            assert_eq!(success.questions, sample_answers(7));
            assert_eq!(success.groups, vec!["g-1".to_string(), "g-2".to_string()]);
        }
        DecryptedSubmission::Error(e) => panic!("expected success, got {:?}", e),
    }
}

#[tokio::test]
async fn form_without_keys_fails_before_encrypting() {
    let service = service_with_keys(Vec::new());
    let result = service
        .encrypt_submission(&draft(), TEST_ORG, TEST_FORM, TEST_FILL_TOKEN, "g-2", None)
        .await;
    assert!(matches!(result, Err(SubmissionCoreError::NoKeysFound)));

    let result = service
        .resolve_recipient_keys(TEST_ORG, TEST_FORM, TEST_FILL_TOKEN)
        .await;
    assert!(matches!(result, Err(SubmissionCoreError::NoKeysFound)));
}

#[tokio::test]
async fn expired_keys_are_skipped() {
    let expired = expired_test_key("expired");
    let service = service_with_keys(vec![expired.public.clone(), ADMIN_KEY.public.clone()]);
    let sealed = service
        .encrypt_asset(b"attachment", TEST_ORG, TEST_FORM, TEST_FILL_TOKEN, None)
        .await
        .unwrap();
    let armored = String::from_utf8(sealed).unwrap();

    let admin = KeyResolver::new([ADMIN_KEY.private.as_str()]).unwrap();
    assert_eq!(decrypt_blob(&armored, PayloadType::Asset, &admin).unwrap(), b"attachment");

    let expired_only = KeyResolver::new([expired.private.as_str()]).unwrap();
    assert!(decrypt_blob(&armored, PayloadType::Asset, &expired_only).is_err());
}

#[tokio::test]
async fn only_expired_keys_means_no_keys() {
    let service = service_with_keys(vec![expired_test_key("expired").public]);
    let result = service
        .encrypt_asset(b"attachment", TEST_ORG, TEST_FORM, TEST_FILL_TOKEN, None)
        .await;
    assert!(matches!(result, Err(SubmissionCoreError::NoKeysFound)));
}

#[tokio::test]
async fn trust_anchor_limits_recipients() {
    let service = service_with_keys(vec![ADMIN_KEY.public.clone(), OUTSIDER_KEY.public.clone()]);
    let anchor = TrustAnchor::new([ADMIN_KEY.fingerprint.clone(), KeyFingerprint::parse("BBBB").unwrap()]).unwrap();

    let sealed = service
        .encrypt_submission(&draft(), TEST_ORG, TEST_FORM, TEST_FILL_TOKEN, "g-2", Some(&anchor))
        .await
        .unwrap();
    let encrypted = EncryptedSubmission {
        id: "s1".to_string(),
        created_at: chrono::Utc::now(),
        for_token: None,
        data: sealed,
    };

    let admin = KeyResolver::new([ADMIN_KEY.private.as_str()]).unwrap();
    assert!(decrypt_submission(&encrypted, &admin).is_success());
    let outsider = KeyResolver::new([OUTSIDER_KEY.private.as_str()]).unwrap();
    assert!(!decrypt_submission(&encrypted, &outsider).is_success());
}

#[tokio::test]
async fn anchor_without_overlap_aborts() {
    let service = service_with_keys(vec![ADMIN_KEY.public.clone(), SECOND_ADMIN_KEY.public.clone()]);
    let anchor = TrustAnchor::new([OUTSIDER_KEY.fingerprint.clone()]).unwrap();
    let result = service
        .encrypt_submission(&draft(), TEST_ORG, TEST_FORM, TEST_FILL_TOKEN, "g-2", Some(&anchor))
        .await;
    assert!(matches!(
        result,
        Err(SubmissionCoreError::KeyIntegrity(KeyIntegrityError::NoTrustedKeys))
    ));
}

#[test]
fn undecryptable_submission_becomes_error_entry() {
    let encrypted = EncryptedSubmission {
        id: "broken".to_string(),
        created_at: chrono::Utc::now(),
        for_token: None,
        data: "garbage".to_string(),
    };
    let resolver = KeyResolver::new([ADMIN_KEY.private.as_str()]).unwrap();
    match decrypt_submission(&encrypted, &resolver) {
        DecryptedSubmission::Error(e) => {
            assert_eq!(e.id, "broken");
            assert!(!e.error.is_empty());
        }
        DecryptedSubmission::Success(_) => panic!("garbage must not decrypt"),
    }
}
