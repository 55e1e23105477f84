//! tests/services/key_integrity.rs
//!
//! Der Vertrauensanker eines Ausfüll-Links zusammen mit echten Schlüsseln.

use sealed_forms_lib::services::key_integrity::{
    filter_by_trust_anchor, filter_recipients, KeyIntegrityError, KeyIntegrityGuard, TrustAnchor,
};
use sealed_forms_lib::test_utils::{ADMIN_KEY, OUTSIDER_KEY, SECOND_ADMIN_KEY};
use sealed_forms_lib::KeyFingerprint;
use url::Url;

fn link_with_anchor(fingerprints: &[&str]) -> Url {
    Url::parse(&format!("https://forms.example/fill/f1#ak={}", fingerprints.join(","))).unwrap()
}

#[test]
fn only_keys_listed_in_the_link_survive() {
    // Der Link nennt den Admin und einen unbekannten Fingerprint, der Server
    // liefert den Admin und einen fremden Schlüssel.
    let link = link_with_anchor(&[ADMIN_KEY.fingerprint.as_str(), "BBBB"]);
    let anchor = KeyIntegrityGuard::default()
        .derive_trust_anchor(&link)
        .unwrap()
        .expect("link carries an anchor");

    let served = vec![ADMIN_KEY.public.clone(), OUTSIDER_KEY.public.clone()];
    let trusted = filter_by_trust_anchor(&served, &anchor).unwrap();
    assert_eq!(trusted, vec![ADMIN_KEY.public.clone()]);

    let recipients = filter_recipients(vec![ADMIN_KEY.recipient(), OUTSIDER_KEY.recipient()], &anchor).unwrap();
    assert_eq!(recipients.len(), 1);
    assert_eq!(recipients[0].fingerprint, ADMIN_KEY.fingerprint);
}

#[test]
fn lowercase_fingerprints_in_link_match() {
    let lower = ADMIN_KEY.fingerprint.as_str().to_ascii_lowercase();
    let link = link_with_anchor(&[&lower]);
    let anchor = KeyIntegrityGuard::default().derive_trust_anchor(&link).unwrap().unwrap();
    assert!(anchor.contains(&ADMIN_KEY.fingerprint));
}

#[test]
fn no_overlap_is_rejected() {
    let anchor = TrustAnchor::new([OUTSIDER_KEY.fingerprint.clone()]).unwrap();
    let served = vec![ADMIN_KEY.public.clone(), SECOND_ADMIN_KEY.public.clone()];
    assert_eq!(
        filter_by_trust_anchor(&served, &anchor).unwrap_err(),
        KeyIntegrityError::NoTrustedKeys
    );
}

#[test]
fn unreadable_served_keys_are_dropped() {
    let anchor = TrustAnchor::new([ADMIN_KEY.fingerprint.clone()]).unwrap();
    let served = vec!["not a key".to_string(), ADMIN_KEY.public.clone()];
    assert_eq!(filter_by_trust_anchor(&served, &anchor).unwrap(), vec![ADMIN_KEY.public.clone()]);
}

#[test]
fn embedded_anchor_can_be_read_back() {
    let guard = KeyIntegrityGuard::default();
    let base = Url::parse("https://forms.example/fill/f1?token=abc").unwrap();
    let fingerprints: Vec<KeyFingerprint> = vec![ADMIN_KEY.fingerprint.clone(), SECOND_ADMIN_KEY.fingerprint.clone()];

    let link = guard.embed_trust_anchor(&base, &fingerprints);
    assert_eq!(link.query(), Some("token=abc"));

    let anchor = guard.derive_trust_anchor(&link).unwrap().unwrap();
    assert_eq!(anchor.fingerprints(), fingerprints.as_slice());
}
