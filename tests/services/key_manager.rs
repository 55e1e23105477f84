//! tests/services/key_manager.rs
//!
//! Erzeugung, Import und Backup von Schlüsseln.

use chrono::{Duration, Utc};
use sealed_forms_lib::services::key_manager::{
    decrypt_key_backup, encrypt_key_for_backup, generate_backup_passphrase, generate_keypair, key_metadata,
    parse_public_key, strip_secret, KeyError, KeyResolver,
};
use sealed_forms_lib::test_utils::{ADMIN_KEY, TEST_ORG};

#[test]
fn generated_key_carries_expiry_and_label() {
    let keypair = generate_keypair(TEST_ORG, "alice", Duration::days(10)).unwrap();
    let public = parse_public_key(&keypair.public).unwrap();
    assert_eq!(public.fingerprint, keypair.fingerprint);
    assert_eq!(public.certificate.label, "org-1_alice");

    let expiry = public.certificate.expires_at.expect("expiry is always set");
    let remaining = expiry - Utc::now();
    assert!(remaining > Duration::days(9) && remaining <= Duration::days(10));
}

#[test]
fn zero_validity_means_maximum() {
    let keypair = generate_keypair(TEST_ORG, "alice", Duration::zero()).unwrap();
    let metadata = key_metadata(&keypair.private).unwrap();
    let expiry = metadata.expires_at.unwrap();
    assert!(expiry - Utc::now() > Duration::days(365 * 100));
}

#[test]
fn metadata_distinguishes_public_and_secret() {
    let secret = key_metadata(&ADMIN_KEY.private).unwrap();
    let public = key_metadata(&ADMIN_KEY.public).unwrap();
    assert!(secret.has_secret);
    assert!(!public.has_secret);
    assert_eq!(secret.fingerprint, public.fingerprint);
}

#[test]
fn strip_secret_yields_the_public_key() {
    assert_eq!(strip_secret(&ADMIN_KEY.private).unwrap(), ADMIN_KEY.public);
    assert!(strip_secret(&ADMIN_KEY.public).is_err());
}

#[test]
fn backup_round_trip_restores_the_same_key() {
    let passphrase = generate_backup_passphrase().unwrap();
    assert_eq!(passphrase.split_whitespace().count(), 18);

    let backup = encrypt_key_for_backup(&ADMIN_KEY.private, &passphrase).unwrap();
    assert!(!backup.contains(&ADMIN_KEY.private));

    let restored = decrypt_key_backup(&backup, &passphrase).unwrap();
    assert_eq!(restored.fingerprint, ADMIN_KEY.fingerprint);
    let resolver = KeyResolver::new([restored.private.as_str()]).unwrap();
    assert_eq!(resolver.fingerprints().next(), Some(&ADMIN_KEY.fingerprint));
}

#[test]
fn wrong_backup_passphrase_is_rejected() {
    let backup = encrypt_key_for_backup(&ADMIN_KEY.private, "correct horse").unwrap();
    assert!(matches!(
        decrypt_key_backup(&backup, "battery staple"),
        Err(KeyError::BackupPassphraseInvalid)
    ));
}

#[test]
fn resolver_rejects_public_keys() {
    assert!(KeyResolver::new([ADMIN_KEY.public.as_str()]).is_err());
    assert!(KeyResolver::new(Vec::<String>::new()).unwrap().is_empty());
}
