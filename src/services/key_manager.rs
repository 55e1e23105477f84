//! # src/services/key_manager.rs
//!
//! Erzeugung, Parsen, Prüfung und Sicherung von Empfänger-Schlüsseln.
//!
//! Ein Schlüsselpaar besteht aus einem `KeyCertificate` (öffentlich, wird an den
//! Server übertragen) und einem `SecretKeyDocument` (verbleibt auf dem Gerät).
//! Für Backups wird der geheime Schlüssel mit einem aus einer Passphrase
//! abgeleiteten Schlüssel (Argon2id) verschlüsselt.

use crate::models::keys::{
    EncryptedKeyBackup, KeyAlgorithm, KeyCertificate, KeyFingerprint, KeyMetadata, NewKeypair,
    RestoredKey, SecretKeyDocument,
};
use crate::services::crypto_utils::{self, SymmetricEncryptionError, KEY_SIZE, SALT_SIZE};
use crate::services::utils::{armor, dearmor, ArmorError, ArmorKind};
use bip39::Language;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Aktuelle Formatversion von Zertifikaten und Schlüsseldokumenten.
pub const KEY_FORMAT_VERSION: u8 = 1;

/// Anzahl der Wörter einer generierten Backup-Passphrase.
const BACKUP_PASSPHRASE_WORDS: usize = 18;

/// Definiert die Fehler, die im `key_manager`-Modul auftreten können.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key armor: {0}")]
    Armor(#[from] ArmorError),

    #[error("Key document is malformed: {0}")]
    Malformed(String),

    #[error("Unsupported key format version: {0}")]
    UnsupportedVersion(u8),

    /// Schlüssel ohne Ablaufdatum werden nicht als Empfänger akzeptiert.
    #[error("Encryption key must expire.")]
    MissingExpiry,

    #[error("Key does not contain secret material.")]
    NotASecretKey,

    #[error("The backup passphrase is incorrect or the backup is corrupted.")]
    BackupPassphraseInvalid,

    #[error("No backup found for key '{0}'.")]
    BackupNotFound(String),

    #[error("No local key with server ID '{0}'.")]
    UnknownKey(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] SymmetricEncryptionError),
}

/// Ein geparster, öffentlicher Empfänger-Schlüssel.
#[derive(Clone)]
pub struct RecipientKey {
    pub fingerprint: KeyFingerprint,
    pub certificate: KeyCertificate,
    pub public: X25519PublicKey,
}

impl RecipientKey {
    /// Ein Schlüssel ist gültig, wenn er ein Ablaufdatum besitzt, das nach `now` liegt.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.certificate.expires_at.map_or(false, |expiry| expiry > now)
    }
}

impl fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientKey")
            .field("fingerprint", &self.fingerprint)
            .field("label", &self.certificate.label)
            .field("expires_at", &self.certificate.expires_at)
            .finish()
    }
}

struct LocalKey {
    public: X25519PublicKey,
    secret: StaticSecret,
}

/// Hält die lokal verfügbaren privaten Schlüssel, indiziert nach Fingerprint.
///
/// Wird beim Entschlüsseln nur gelesen und kann daher per `Arc` an mehrere
/// Worker verteilt werden.
pub struct KeyResolver {
    keys: HashMap<KeyFingerprint, LocalKey>,
}

impl KeyResolver {
    /// Baut einen Resolver aus armierten geheimen Schlüsseln.
    pub fn new<I, S>(private_armors: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = HashMap::new();
        for armored in private_armors {
            let (document, secret) = parse_secret_key(armored.as_ref())?;
            let public = decode_public_key(&document.certificate.public_key)?;
            keys.insert(fingerprint_of(&public)?, LocalKey { public, secret });
        }
        Ok(KeyResolver { keys })
    }

    pub fn empty() -> Self {
        KeyResolver { keys: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &KeyFingerprint> {
        self.keys.keys()
    }

    /// Sucht den privaten Schlüssel zu einem Fingerprint.
    pub(crate) fn find(&self, fingerprint: &KeyFingerprint) -> Option<(&X25519PublicKey, &StaticSecret)> {
        self.keys.get(fingerprint).map(|k| (&k.public, &k.secret))
    }
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("fingerprints", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Erzeugt ein neues Schlüsselpaar für ein Organisationsmitglied.
///
/// # Arguments
/// * `org_id`, `user_id` - Bilden das Label des Zertifikats.
/// * `validity` - Gültigkeitsdauer ab jetzt. Eine Dauer von null bedeutet die
///   maximal unterstützte Gültigkeit (`u32::MAX` Sekunden).
pub fn generate_keypair(org_id: &str, user_id: &str, validity: Duration) -> Result<NewKeypair, KeyError> {
    let validity = if validity == Duration::zero() {
        Duration::seconds(i64::from(u32::MAX))
    } else {
        validity
    };

    let (public, secret) = crypto_utils::generate_x25519_keypair();
    let created_at = Utc::now();
    let certificate = KeyCertificate {
        version: KEY_FORMAT_VERSION,
        algorithm: KeyAlgorithm::X25519,
        public_key: hex::encode(public.as_bytes()),
        label: format!("{}_{}", org_id, user_id),
        created_at,
        expires_at: Some(created_at + validity),
    };
    let document = SecretKeyDocument {
        certificate: certificate.clone(),
        secret_key: hex::encode(secret.to_bytes()),
    };

    Ok(NewKeypair {
        public: armor_certificate(&certificate)?,
        private: armor_secret(&document)?,
        fingerprint: fingerprint_of(&public)?,
    })
}

/// Parst einen armierten öffentlichen Schlüssel.
pub fn parse_public_key(armored: &str) -> Result<RecipientKey, KeyError> {
    let bytes = dearmor(ArmorKind::PublicKey, armored)?;
    let certificate: KeyCertificate =
        serde_json::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))?;
    check_version(certificate.version)?;
    let public = decode_public_key(&certificate.public_key)?;
    Ok(RecipientKey {
        fingerprint: fingerprint_of(&public)?,
        certificate,
        public,
    })
}

/// Liefert die Metadaten eines öffentlichen oder geheimen Schlüssels.
pub fn key_metadata(armored: &str) -> Result<KeyMetadata, KeyError> {
    match parse_secret_key(armored) {
        Ok((document, _)) => certificate_metadata(&document.certificate, true),
        Err(KeyError::Armor(ArmorError::MissingHeader(_))) => {
            let key = parse_public_key(armored)?;
            Ok(KeyMetadata {
                fingerprint: key.fingerprint,
                algorithm: key.certificate.algorithm,
                has_secret: false,
                expires_at: key.certificate.expires_at,
            })
        }
        Err(e) => Err(e),
    }
}

/// Entfernt das geheime Material und liefert den armierten öffentlichen Schlüssel.
///
/// Der Schlüssel muss ein Ablaufdatum besitzen, sonst würden ihn Ausfüllende
/// ohnehin ablehnen.
pub fn strip_secret(private_armored: &str) -> Result<String, KeyError> {
    let (document, _) = parse_secret_key(private_armored)?;
    if document.certificate.expires_at.is_none() {
        return Err(KeyError::MissingExpiry);
    }
    armor_certificate(&document.certificate)
}

/// Verschlüsselt einen geheimen Schlüssel mit einer Passphrase.
pub fn encrypt_key_for_backup(private_armored: &str, passphrase: &str) -> Result<String, KeyError> {
    let (document, secret) = parse_secret_key(private_armored)?;

    let salt = crypto_utils::random_salt();
    let backup_key = crypto_utils::derive_key_from_passphrase(passphrase, &salt)?;
    let wrapped = crypto_utils::encrypt_data(&backup_key, &secret.to_bytes())?;

    let backup = EncryptedKeyBackup {
        certificate: document.certificate,
        kdf_salt: hex::encode(salt),
        wrapped_secret: hex::encode(wrapped),
    };
    let json = serde_json::to_vec(&backup).map_err(|e| KeyError::Malformed(e.to_string()))?;
    Ok(armor(ArmorKind::KeyBackup, &json))
}

/// Stellt einen geheimen Schlüssel aus einem Backup wieder her.
pub fn decrypt_key_backup(backup_armored: &str, passphrase: &str) -> Result<RestoredKey, KeyError> {
    let bytes = dearmor(ArmorKind::KeyBackup, backup_armored)?;
    let backup: EncryptedKeyBackup =
        serde_json::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))?;
    check_version(backup.certificate.version)?;

    let salt: [u8; SALT_SIZE] = hex::decode(&backup.kdf_salt)
        .ok()
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| KeyError::Malformed("Invalid backup salt.".to_string()))?;
    let wrapped = hex::decode(&backup.wrapped_secret)
        .map_err(|e| KeyError::Malformed(e.to_string()))?;

    let backup_key = crypto_utils::derive_key_from_passphrase(passphrase, &salt)?;
    let secret_bytes = Zeroizing::new(
        crypto_utils::decrypt_data(&backup_key, &wrapped).map_err(|_| KeyError::BackupPassphraseInvalid)?,
    );
    let secret = secret_from_bytes(&secret_bytes)?;

    let public = decode_public_key(&backup.certificate.public_key)?;
    if X25519PublicKey::from(&secret) != public {
        return Err(KeyError::Malformed(
            "Restored secret does not match the certificate.".to_string(),
        ));
    }

    let document = SecretKeyDocument {
        certificate: backup.certificate,
        secret_key: hex::encode(secret.to_bytes()),
    };
    Ok(RestoredKey {
        private: armor_secret(&document)?,
        fingerprint: fingerprint_of(&public)?,
    })
}

/// Erzeugt eine neue, zufällige Backup-Passphrase aus der BIP-39-Wortliste.
pub fn generate_backup_passphrase() -> Result<String, KeyError> {
    Ok(crypto_utils::generate_mnemonic(BACKUP_PASSPHRASE_WORDS, Language::English)?)
}

fn parse_secret_key(armored: &str) -> Result<(SecretKeyDocument, StaticSecret), KeyError> {
    let bytes = Zeroizing::new(dearmor(ArmorKind::SecretKey, armored)?);
    let document: SecretKeyDocument =
        serde_json::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))?;
    check_version(document.certificate.version)?;

    let secret_bytes = Zeroizing::new(
        hex::decode(&document.secret_key).map_err(|e| KeyError::Malformed(e.to_string()))?,
    );
    let secret = secret_from_bytes(&secret_bytes)?;

    let public = decode_public_key(&document.certificate.public_key)?;
    if X25519PublicKey::from(&secret) != public {
        return Err(KeyError::Malformed(
            "Secret key does not match the certificate.".to_string(),
        ));
    }
    Ok((document, secret))
}

fn certificate_metadata(certificate: &KeyCertificate, has_secret: bool) -> Result<KeyMetadata, KeyError> {
    let public = decode_public_key(&certificate.public_key)?;
    Ok(KeyMetadata {
        fingerprint: fingerprint_of(&public)?,
        algorithm: certificate.algorithm,
        has_secret,
        expires_at: certificate.expires_at,
    })
}

fn check_version(version: u8) -> Result<(), KeyError> {
    if version == KEY_FORMAT_VERSION {
        Ok(())
    } else {
        Err(KeyError::UnsupportedVersion(version))
    }
}

pub(crate) fn decode_public_key(hex_key: &str) -> Result<X25519PublicKey, KeyError> {
    let bytes: [u8; KEY_SIZE] = hex::decode(hex_key)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| KeyError::Malformed("Public key must be 32 hex-encoded bytes.".to_string()))?;
    Ok(X25519PublicKey::from(bytes))
}

fn secret_from_bytes(bytes: &[u8]) -> Result<StaticSecret, KeyError> {
    let array: Zeroizing<[u8; KEY_SIZE]> = Zeroizing::new(
        bytes
            .try_into()
            .map_err(|_| KeyError::Malformed("Secret key must be 32 bytes.".to_string()))?,
    );
    Ok(StaticSecret::from(*array))
}

fn fingerprint_of(public: &X25519PublicKey) -> Result<KeyFingerprint, KeyError> {
    KeyFingerprint::parse(&crypto_utils::compute_fingerprint(public))
        .map_err(|e| KeyError::Malformed(e.to_string()))
}

fn armor_certificate(certificate: &KeyCertificate) -> Result<String, KeyError> {
    let json = serde_json::to_vec(certificate).map_err(|e| KeyError::Malformed(e.to_string()))?;
    Ok(armor(ArmorKind::PublicKey, &json))
}

fn armor_secret(document: &SecretKeyDocument) -> Result<String, KeyError> {
    let json = Zeroizing::new(
        serde_json::to_vec(document).map_err(|e| KeyError::Malformed(e.to_string()))?,
    );
    Ok(armor(ArmorKind::SecretKey, &json))
}
