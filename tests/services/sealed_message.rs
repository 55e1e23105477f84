//! tests/services/sealed_message.rs
//!
//! Versiegeln und Öffnen von Nachrichten über die öffentliche API.

use sealed_forms_lib::services::key_manager::KeyResolver;
use sealed_forms_lib::services::sealed_message_manager::{
    open, open_armored, parse_armored, seal, seal_armored, DecryptionError, SealError,
};
use sealed_forms_lib::test_utils::{expired_test_key, ADMIN_KEY, OUTSIDER_KEY, SECOND_ADMIN_KEY};
use sealed_forms_lib::utils::{armor, ArmorKind};
use sealed_forms_lib::PayloadType;

fn resolver_for(keys: &[&str]) -> KeyResolver {
    KeyResolver::new(keys.iter().copied()).unwrap()
}

#[test]
fn every_recipient_can_open_the_message() {
    let payload = b"{\"answer\":42}";
    let armored = seal_armored(
        payload,
        PayloadType::Submission,
        &[ADMIN_KEY.recipient(), SECOND_ADMIN_KEY.recipient()],
    )
    .unwrap();
    assert!(armored.starts_with("-----BEGIN SEALED FORMS MESSAGE-----"));

    for key in [&*ADMIN_KEY, &*SECOND_ADMIN_KEY] {
        let resolver = resolver_for(&[key.private.as_str()]);
        let plain = open_armored(&armored, PayloadType::Submission, &resolver).unwrap();
        assert_eq!(plain, payload);
    }
}

#[test]
fn message_lists_one_stanza_per_recipient() {
    let message = seal(
        b"data",
        PayloadType::Asset,
        &[ADMIN_KEY.recipient(), SECOND_ADMIN_KEY.recipient()],
    )
    .unwrap();
    let fingerprints: Vec<_> = message.recipients.iter().map(|r| r.fingerprint.clone()).collect();
    assert_eq!(
        fingerprints,
        vec![ADMIN_KEY.fingerprint.clone(), SECOND_ADMIN_KEY.fingerprint.clone()]
    );
}

#[test]
fn sealing_twice_yields_different_ciphertexts() {
    let recipients = [ADMIN_KEY.recipient()];
    let first = seal(b"same", PayloadType::Submission, &recipients).unwrap();
    let second = seal(b"same", PayloadType::Submission, &recipients).unwrap();
    assert_ne!(first.ephemeral_public, second.ephemeral_public);
    assert_ne!(first.encrypted_payload, second.encrypted_payload);
}

#[test]
fn sealing_without_recipients_fails() {
    assert!(matches!(
        seal(b"data", PayloadType::Submission, &[]),
        Err(SealError::NoRecipients)
    ));
}

#[test]
fn foreign_key_cannot_open() {
    let armored = seal_armored(b"secret", PayloadType::Submission, &[ADMIN_KEY.recipient()]).unwrap();
    let resolver = resolver_for(&[OUTSIDER_KEY.private.as_str()]);
    assert_eq!(
        open_armored(&armored, PayloadType::Submission, &resolver),
        Err(DecryptionError::NoMatchingKey)
    );
    assert_eq!(
        open_armored(&armored, PayloadType::Submission, &KeyResolver::empty()),
        Err(DecryptionError::NoMatchingKey)
    );
}

#[test]
fn sealing_does_not_check_expiry() {
    let expired = expired_test_key("expired");
    let armored = seal_armored(b"late", PayloadType::Submission, &[expired.recipient()]).unwrap();
    let resolver = resolver_for(&[expired.private.as_str()]);
    assert_eq!(open_armored(&armored, PayloadType::Submission, &resolver).unwrap(), b"late");
}

#[test]
fn payload_type_must_match() {
    let armored = seal_armored(b"file", PayloadType::Asset, &[ADMIN_KEY.recipient()]).unwrap();
    let resolver = resolver_for(&[ADMIN_KEY.private.as_str()]);
    assert!(matches!(
        open_armored(&armored, PayloadType::Submission, &resolver),
        Err(DecryptionError::Malformed(_))
    ));
}

#[test]
fn tampered_payload_is_reported_as_corrupt() {
    let armored = seal_armored(b"original", PayloadType::Submission, &[ADMIN_KEY.recipient()]).unwrap();
    let mut message = parse_armored(&armored).unwrap();
    let last = message.encrypted_payload.len() - 1;
    message.encrypted_payload[last] ^= 0x01;

    let resolver = resolver_for(&[ADMIN_KEY.private.as_str()]);
    assert_eq!(
        open(&message, PayloadType::Submission, &resolver),
        Err(DecryptionError::CorruptPayload)
    );
}

#[test]
fn tampered_wrapped_key_is_a_key_mismatch() {
    let armored = seal_armored(b"original", PayloadType::Submission, &[ADMIN_KEY.recipient()]).unwrap();
    let mut message = parse_armored(&armored).unwrap();
    message.recipients[0].wrapped_key[0] ^= 0x01;

    let resolver = resolver_for(&[ADMIN_KEY.private.as_str()]);
    assert_eq!(
        open(&message, PayloadType::Submission, &resolver),
        Err(DecryptionError::KeyMismatch(ADMIN_KEY.fingerprint.clone()))
    );
}

#[test]
fn damaged_stanza_falls_back_to_the_next_local_key() {
    let armored = seal_armored(
        b"original",
        PayloadType::Submission,
        &[ADMIN_KEY.recipient(), SECOND_ADMIN_KEY.recipient()],
    )
    .unwrap();
    let mut message = parse_armored(&armored).unwrap();
    message.recipients[0].wrapped_key[0] ^= 0x01;

    let both = resolver_for(&[ADMIN_KEY.private.as_str(), SECOND_ADMIN_KEY.private.as_str()]);
    assert_eq!(open(&message, PayloadType::Submission, &both).unwrap(), b"original");

    // Schlagen alle passenden Einträge fehl, zählt der letzte Versuch.
    message.recipients[1].wrapped_key[0] ^= 0x01;
    assert_eq!(
        open(&message, PayloadType::Submission, &both),
        Err(DecryptionError::KeyMismatch(SECOND_ADMIN_KEY.fingerprint.clone()))
    );
}

#[test]
fn garbage_is_malformed() {
    let resolver = resolver_for(&[ADMIN_KEY.private.as_str()]);
    assert!(matches!(
        open_armored("hello", PayloadType::Submission, &resolver),
        Err(DecryptionError::Malformed(_))
    ));
    let not_json = armor(ArmorKind::Message, b"not json");
    assert!(matches!(
        open_armored(&not_json, PayloadType::Submission, &resolver),
        Err(DecryptionError::Malformed(_))
    ));
}
