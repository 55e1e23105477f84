//! # src/models/keys.rs
//!
//! Datenstrukturen für Schlüsselmaterial: Fingerprints, öffentliche Zertifikate,
//! geheime Schlüsseldokumente und passwortgeschützte Backups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximale Länge eines Fingerprints in Hex-Zeichen.
const MAX_FINGERPRINT_LEN: usize = 64;

/// Fehler beim Parsen eines Fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    #[error("Fingerprint must not be empty.")]
    Empty,
    #[error("Fingerprint '{0}' is not a valid hex string.")]
    NotHex(String),
    #[error("Fingerprint is too long: {0} characters (maximum is 64).")]
    TooLong(usize),
}

/// Ein hexadezimaler Fingerprint, der einen öffentlichen Schlüssel eindeutig identifiziert.
///
/// Intern immer in Großbuchstaben gespeichert. Dadurch sind `Eq` und `Hash`
/// automatisch unabhängig von der Groß-/Kleinschreibung der Eingabe.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    /// Parst und normalisiert einen Fingerprint.
    pub fn parse(input: &str) -> Result<Self, FingerprintError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FingerprintError::Empty);
        }
        if trimmed.len() > MAX_FINGERPRINT_LEN {
            return Err(FingerprintError::TooLong(trimmed.len()));
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FingerprintError::NotHex(trimmed.to_string()));
        }
        Ok(KeyFingerprint(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for KeyFingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyFingerprint::parse(s)
    }
}

impl TryFrom<String> for KeyFingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        KeyFingerprint::parse(&value)
    }
}

impl From<KeyFingerprint> for String {
    fn from(value: KeyFingerprint) -> Self {
        value.0
    }
}

/// Das asymmetrische Verfahren eines Schlüssels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    X25519,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::X25519 => f.write_str("X25519"),
        }
    }
}

/// Der öffentliche Teil eines Empfänger-Schlüsselpaars.
///
/// Wird als `SEALED FORMS PUBLIC KEY` armiert an den Server übertragen und von
/// dort an Ausfüllende ausgeliefert.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyCertificate {
    /// Formatversion des Zertifikats.
    pub version: u8,
    pub algorithm: KeyAlgorithm,
    /// Der öffentliche X25519-Schlüssel, hex-kodiert.
    pub public_key: String,
    /// Menschenlesbare Zuordnung, `<org_id>_<user_id>`.
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// Ablaufzeitpunkt. Zertifikate ohne Ablaufdatum werden bei der Validierung abgelehnt.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Ein geheimer Schlüssel samt zugehörigem Zertifikat (`SEALED FORMS SECRET KEY`).
#[derive(Serialize, Deserialize, Clone)]
pub struct SecretKeyDocument {
    pub certificate: KeyCertificate,
    /// Der geheime X25519-Schlüssel, hex-kodiert.
    pub secret_key: String,
}

impl fmt::Debug for SecretKeyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyDocument")
            .field("certificate", &self.certificate)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Ein passwortgeschütztes Backup eines geheimen Schlüssels (`SEALED FORMS KEY BACKUP`).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EncryptedKeyBackup {
    pub certificate: KeyCertificate,
    /// Salt für Argon2id, hex-kodiert.
    pub kdf_salt: String,
    /// `[nonce | ciphertext]` des geheimen Schlüssels, hex-kodiert.
    pub wrapped_secret: String,
}

/// Metadaten eines (öffentlichen oder geheimen) Schlüssels.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMetadata {
    pub fingerprint: KeyFingerprint,
    pub algorithm: KeyAlgorithm,
    pub has_secret: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Ein frisch erzeugtes Schlüsselpaar in armierter Form.
#[derive(Clone)]
pub struct NewKeypair {
    pub public: String,
    pub private: String,
    pub fingerprint: KeyFingerprint,
}

/// Ergebnis einer Wiederherstellung aus einem Backup.
#[derive(Clone)]
pub struct RestoredKey {
    pub private: String,
    pub fingerprint: KeyFingerprint,
}
