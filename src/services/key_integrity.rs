//! # src/services/key_integrity.rs
//!
//! Schutz gegen das Unterschieben fremder Schlüssel durch den Server.
//!
//! Ein Ausfüll-Link kann im URL-Fragment (`#ak=<fp1>,<fp2>`) die Fingerprints
//! der erwarteten Empfänger-Schlüssel tragen. Das Fragment wird nie an den
//! Server übertragen. Vor dem Verschlüsseln werden nur Schlüssel verwendet,
//! deren Fingerprint in dieser Liste steht.

use crate::models::keys::{FingerprintError, KeyFingerprint};
use crate::services::key_manager::{self, RecipientKey};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Standardname des Fragment-Parameters.
pub const DEFAULT_TRUST_ANCHOR_PARAM: &str = "ak";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyIntegrityError {
    #[error("Malformed fingerprint '{value}' in fill link: {source}")]
    MalformedFingerprint {
        value: String,
        #[source]
        source: FingerprintError,
    },

    /// Keiner der vom Server gelieferten Schlüssel steht im Vertrauensanker.
    #[error("None of the form's keys match the fingerprints in the fill link.")]
    NoTrustedKeys,
}

/// Eine nicht-leere, geordnete Menge erwarteter Fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor(Vec<KeyFingerprint>);

impl TrustAnchor {
    /// Erstellt einen Vertrauensanker. Duplikate werden entfernt, die
    /// Reihenfolge bleibt erhalten. `None`, wenn keine Fingerprints übrig bleiben.
    pub fn new(fingerprints: impl IntoIterator<Item = KeyFingerprint>) -> Option<Self> {
        let mut unique: Vec<KeyFingerprint> = Vec::new();
        for fingerprint in fingerprints {
            if !unique.contains(&fingerprint) {
                unique.push(fingerprint);
            }
        }
        if unique.is_empty() {
            None
        } else {
            Some(TrustAnchor(unique))
        }
    }

    pub fn contains(&self, fingerprint: &KeyFingerprint) -> bool {
        self.0.contains(fingerprint)
    }

    pub fn fingerprints(&self) -> &[KeyFingerprint] {
        &self.0
    }
}

/// Liest, schreibt und prüft Vertrauensanker in Ausfüll-Links.
#[derive(Debug, Clone)]
pub struct KeyIntegrityGuard {
    param: String,
}

impl Default for KeyIntegrityGuard {
    fn default() -> Self {
        KeyIntegrityGuard::new(DEFAULT_TRUST_ANCHOR_PARAM)
    }
}

impl KeyIntegrityGuard {
    pub fn new(param: impl Into<String>) -> Self {
        KeyIntegrityGuard { param: param.into() }
    }

    /// Liest den Vertrauensanker aus dem Fragment einer URL.
    ///
    /// Fehlt das Fragment, der Parameter oder ist sein Wert leer, gibt es keine
    /// Einschränkung (`Ok(None)`). Ein fehlerhafter Fingerprint ist dagegen ein Fehler.
    pub fn derive_trust_anchor(&self, url: &Url) -> Result<Option<TrustAnchor>, KeyIntegrityError> {
        let Some(fragment) = url.fragment() else {
            return Ok(None);
        };

        let Some(value) = url::form_urlencoded::parse(fragment.as_bytes())
            .find(|(key, _)| key == self.param.as_str())
            .map(|(_, value)| value.into_owned())
        else {
            return Ok(None);
        };

        let mut fingerprints = Vec::new();
        for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let fingerprint = KeyFingerprint::parse(item).map_err(|source| {
                KeyIntegrityError::MalformedFingerprint {
                    value: item.to_string(),
                    source,
                }
            })?;
            fingerprints.push(fingerprint);
        }

        Ok(TrustAnchor::new(fingerprints))
    }

    /// Liefert eine Kopie der URL, deren Fragment die Fingerprints trägt.
    /// Ein vorhandenes Fragment wird ersetzt.
    pub fn embed_trust_anchor(&self, url: &Url, fingerprints: &[KeyFingerprint]) -> Url {
        let list: Vec<&str> = fingerprints.iter().map(KeyFingerprint::as_str).collect();
        let mut embedded = url.clone();
        let fragment = format!("{}={}", self.param, list.join(","));
        embedded.set_fragment(Some(fragment.as_str()));
        embedded
    }
}

/// Behält nur die armierten Schlüssel, deren Fingerprint im Vertrauensanker steht.
///
/// Nicht lesbare Schlüssel können keinem Fingerprint entsprechen und werden verworfen.
pub fn filter_by_trust_anchor(keys: &[String], anchor: &TrustAnchor) -> Result<Vec<String>, KeyIntegrityError> {
    let trusted: Vec<String> = keys
        .iter()
        .filter(|armored| match key_manager::parse_public_key(armored) {
            Ok(key) => anchor.contains(&key.fingerprint),
            Err(e) => {
                warn!(error = %e, "Dropping unreadable form key");
                false
            }
        })
        .cloned()
        .collect();

    if trusted.is_empty() {
        return Err(KeyIntegrityError::NoTrustedKeys);
    }
    Ok(trusted)
}

/// Wie [`filter_by_trust_anchor`], für bereits geparste Schlüssel.
pub fn filter_recipients(
    keys: Vec<RecipientKey>,
    anchor: &TrustAnchor,
) -> Result<Vec<RecipientKey>, KeyIntegrityError> {
    let total = keys.len();
    let trusted: Vec<RecipientKey> = keys
        .into_iter()
        .filter(|key| anchor.contains(&key.fingerprint))
        .collect();

    debug!(total, trusted = trusted.len(), "Applied trust anchor to form keys");
    if trusted.is_empty() {
        return Err(KeyIntegrityError::NoTrustedKeys);
    }
    Ok(trusted)
}
