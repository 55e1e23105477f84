//! # src/services/crypto_utils.rs
//!
//! Kryptographische Grundbausteine: X25519-Schlüssel, Schlüsselableitung,
//! symmetrische AEAD-Verschlüsselung und Fingerprints.

// Zufallszahlengenerierung
use rand::Rng;
use rand_core::{OsRng, RngCore};

// Kryptografische Hashes (SHA-2)
use sha2::{Digest, Sha256};

// Symmetrische Verschlüsselung
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Nonce,
};

// X25519 Schlüsselvereinbarung
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

// BIP39 Wortliste für Backup-Passphrasen
use bip39::{Language, Mnemonic};

// Key Derivation Functions
use argon2::Argon2;
use hkdf::Hkdf;

use zeroize::Zeroizing;

/// Länge eines symmetrischen Schlüssels in Bytes.
pub const KEY_SIZE: usize = 32;
/// Länge des Salts für die passwortbasierte Schlüsselableitung.
pub const SALT_SIZE: usize = 16;
/// Länge der ChaCha20-Poly1305-Nonce, die jedem Chiffrat vorangestellt wird.
pub const NONCE_SIZE: usize = 12;
/// Anzahl der Bytes des SHA-256-Hashes, die in einen Fingerprint eingehen.
pub const FINGERPRINT_BYTES: usize = 20;

const FINGERPRINT_DOMAIN: &[u8] = b"sealed-forms-fingerprint-v1";
const KEK_INFO: &[u8] = b"sealed-forms-kek-v1";

/// Fehler der symmetrischen Ver- und Entschlüsselung sowie der Schlüsselableitung.
#[derive(Debug, thiserror::Error)]
pub enum SymmetricEncryptionError {
    /// Die AEAD-Verschlüsselung ist fehlgeschlagen.
    #[error("AEAD encryption failed.")]
    EncryptionFailed,

    /// Die AEAD-Entschlüsselung ist fehlgeschlagen: falscher Schlüssel oder manipulierte Daten.
    #[error("AEAD decryption failed. The key may be incorrect or the data may have been tampered with.")]
    DecryptionFailed,

    /// Die Daten sind zu kurz, um eine Nonce zu enthalten.
    #[error("Invalid data length: {0}")]
    InvalidLength(String),

    /// Die Ableitung eines Schlüssels (HKDF oder Argon2) ist fehlgeschlagen.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Erzeugt eine Passphrase aus einer BIP-39-Wortliste.
///
/// Wird für Schlüssel-Backups verwendet, damit Nutzer eine gut abschreibbare,
/// aber ausreichend starke Passphrase erhalten.
///
/// # Arguments
/// * `word_count` - Anzahl der Wörter (12, 15, 18, 21 oder 24).
/// * `language` - Die Sprache der Wortliste.
pub fn generate_mnemonic(word_count: usize, language: Language) -> Result<String, SymmetricEncryptionError> {
    let entropy_length = match word_count {
        12 => 16,
        15 => 20,
        18 => 24,
        21 => 28,
        24 => 32,
        _ => {
            return Err(SymmetricEncryptionError::InvalidLength(format!(
                "Unsupported word count: {}",
                word_count
            )))
        }
    };
    let mut rng = rand::thread_rng();
    let entropy: Zeroizing<Vec<u8>> = Zeroizing::new((0..entropy_length).map(|_| rng.gen()).collect());
    let mnemonic = Mnemonic::from_entropy_in(language, &entropy)
        .map_err(|e| SymmetricEncryptionError::KeyDerivation(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Erzeugt ein neues, zufälliges X25519-Schlüsselpaar für einen Empfänger.
pub fn generate_x25519_keypair() -> (X25519PublicKey, StaticSecret) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519PublicKey::from(&secret);
    (public, secret)
}

/// Berechnet den Fingerprint eines öffentlichen X25519-Schlüssels.
///
/// Der Fingerprint sind die ersten 20 Bytes von
/// `SHA-256("sealed-forms-fingerprint-v1" || public_key)`, hexadezimal in Großbuchstaben.
pub fn compute_fingerprint(public_key: &X25519PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(public_key.as_bytes());
    let hash = hasher.finalize();
    hex::encode_upper(&hash[..FINGERPRINT_BYTES])
}

/// Leitet aus einem X25519-Shared-Secret einen Key-Encryption-Key (KEK) ab.
///
/// Der ephemere und der Empfänger-Schlüssel gehen als Salt ein, damit jeder
/// KEK an genau dieses Schlüsselpaar gebunden ist.
pub fn derive_kek(
    shared_secret: &[u8; 32],
    ephemeral_public: &X25519PublicKey,
    recipient_public: &X25519PublicKey,
) -> Result<Zeroizing<[u8; KEY_SIZE]>, SymmetricEncryptionError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public.as_bytes());
    salt[32..].copy_from_slice(recipient_public.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), shared_secret);
    let mut kek = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(KEK_INFO, &mut kek[..])
        .map_err(|e| SymmetricEncryptionError::KeyDerivation(e.to_string()))?;
    Ok(kek)
}

/// Leitet einen symmetrischen Schlüssel aus einer Passphrase ab (Argon2id, Standardparameter).
pub fn derive_key_from_passphrase(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, SymmetricEncryptionError> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| SymmetricEncryptionError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Erzeugt ein zufälliges Salt für [`derive_key_from_passphrase`].
pub fn random_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Erzeugt einen zufälligen, einmaligen Payload-Schlüssel.
pub fn random_payload_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut key[..]);
    key
}

/// Verschlüsselt Daten symmetrisch mit ChaCha20-Poly1305.
///
/// Für jede Verschlüsselung wird eine zufällige 12-Byte-Nonce erzeugt und dem
/// Chiffrat vorangestellt.
///
/// # Returns
/// Ein Byte-Vektor `[12-Byte-Nonce | Chiffrat]`.
pub fn encrypt_data(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>, SymmetricEncryptionError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|_| SymmetricEncryptionError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(nonce.len() + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Entschlüsselt Daten, die mit [`encrypt_data`] verschlüsselt wurden.
///
/// Erwartet `[12-Byte-Nonce | Chiffrat]`. Der Authentifizierungs-Tag wird
/// geprüft, bevor Klartext zurückgegeben wird.
pub fn decrypt_data(key: &[u8; KEY_SIZE], encrypted_data_with_nonce: &[u8]) -> Result<Vec<u8>, SymmetricEncryptionError> {
    if encrypted_data_with_nonce.len() < NONCE_SIZE {
        return Err(SymmetricEncryptionError::InvalidLength(format!(
            "Encrypted data must be at least {} bytes long to contain a nonce.",
            NONCE_SIZE
        )));
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    let (nonce_bytes, ciphertext) = encrypted_data_with_nonce.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SymmetricEncryptionError::DecryptionFailed)
}
