//! # src/services/sealed_message_manager.rs
//!
//! Enthält die Kernlogik zum Versiegeln und Öffnen einer `SealedMessage`.
//!
//! Pro Nachricht wird ein ephemeres X25519-Schlüsselpaar erzeugt. Für jeden
//! Empfänger wird aus dem DH-Austausch ein KEK abgeleitet, mit dem der
//! einmalige Payload Key verpackt wird.

use crate::models::keys::KeyFingerprint;
use crate::models::sealed_message::{PayloadType, RecipientStanza, SealedMessage, SEALED_MESSAGE_VERSION};
use crate::services::crypto_utils::{self, SymmetricEncryptionError, KEY_SIZE};
use crate::services::key_manager::{decode_public_key, KeyResolver, RecipientKey};
use crate::services::utils::{armor, dearmor, ArmorKind};
use thiserror::Error;
use tracing::debug;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Fehler beim Versiegeln einer Nachricht.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("A sealed message needs at least one recipient.")]
    NoRecipients,

    #[error("Encryption failed: {0}")]
    Crypto(#[from] SymmetricEncryptionError),

    #[error("Failed to serialize sealed message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fehler beim Öffnen einer Nachricht.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    /// Keiner der lokalen Schlüssel ist Empfänger der Nachricht.
    #[error("None of the local keys is a recipient of this message.")]
    NoMatchingKey,

    /// Ein passender Fingerprint wurde gefunden, der Payload Key ließ sich aber nicht entpacken.
    #[error("The key for fingerprint {0} could not unwrap the payload key.")]
    KeyMismatch(KeyFingerprint),

    #[error("Message is malformed: {0}")]
    Malformed(String),

    /// Der Payload Key war korrekt, die Nutzdaten sind aber beschädigt.
    #[error("The encrypted payload is corrupted.")]
    CorruptPayload,
}

/// Versiegelt Nutzdaten für alle angegebenen Empfänger.
///
/// # Arguments
/// * `payload` - Die zu verschlüsselnden Rohdaten.
/// * `payload_type` - Die Art der Nutzdaten.
/// * `recipients` - Die Empfänger-Schlüssel. Die Gültigkeit wird hier nicht geprüft.
pub fn seal(
    payload: &[u8],
    payload_type: PayloadType,
    recipients: &[RecipientKey],
) -> Result<SealedMessage, SealError> {
    if recipients.is_empty() {
        return Err(SealError::NoRecipients);
    }

    // 1. Einmaligen Payload Key erzeugen und die Nutzdaten verschlüsseln.
    let payload_key = crypto_utils::random_payload_key();
    let encrypted_payload = crypto_utils::encrypt_data(&payload_key, payload)?;

    // 2. Ephemeres Schlüsselpaar nur für diese Nachricht. Das Geheimnis wird
    //    am Ende der Funktion verworfen (und dabei genullt).
    let (ephemeral_public, ephemeral_secret) = crypto_utils::generate_x25519_keypair();

    // 3. Payload Key für jeden Empfänger verpacken.
    let mut stanzas = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let shared = ephemeral_secret.diffie_hellman(&recipient.public);
        let kek = crypto_utils::derive_kek(shared.as_bytes(), &ephemeral_public, &recipient.public)?;
        let wrapped_key = crypto_utils::encrypt_data(&kek, &payload_key[..])?;
        stanzas.push(RecipientStanza {
            fingerprint: recipient.fingerprint.clone(),
            wrapped_key,
        });
    }

    Ok(SealedMessage {
        version: SEALED_MESSAGE_VERSION,
        payload_type,
        ephemeral_public: hex::encode(ephemeral_public.as_bytes()),
        recipients: stanzas,
        encrypted_payload,
    })
}

/// Versiegelt Nutzdaten und liefert die armierte Nachricht.
pub fn seal_armored(
    payload: &[u8],
    payload_type: PayloadType,
    recipients: &[RecipientKey],
) -> Result<String, SealError> {
    let message = seal(payload, payload_type, recipients)?;
    Ok(armor(ArmorKind::Message, &serde_json::to_vec(&message)?))
}

/// Parst eine armierte Nachricht.
pub fn parse_armored(armored: &str) -> Result<SealedMessage, DecryptionError> {
    let bytes = dearmor(ArmorKind::Message, armored).map_err(|e| DecryptionError::Malformed(e.to_string()))?;
    let message: SealedMessage =
        serde_json::from_slice(&bytes).map_err(|e| DecryptionError::Malformed(e.to_string()))?;
    if message.version != SEALED_MESSAGE_VERSION {
        return Err(DecryptionError::Malformed(format!(
            "Unsupported message version {}",
            message.version
        )));
    }
    Ok(message)
}

/// Öffnet eine Nachricht mit den lokal verfügbaren Schlüsseln.
///
/// Probiert jeden Empfänger-Eintrag, zu dessen Fingerprint ein lokaler
/// Schlüssel existiert, bis einer gelingt. Schlagen alle fehl, wird der
/// Fehler des letzten Versuchs zurückgegeben.
pub fn open(
    message: &SealedMessage,
    expected_type: PayloadType,
    resolver: &KeyResolver,
) -> Result<Vec<u8>, DecryptionError> {
    if message.payload_type != expected_type {
        return Err(DecryptionError::Malformed(format!(
            "Expected payload type {:?}, found {:?}",
            expected_type, message.payload_type
        )));
    }

    let ephemeral_public = decode_public_key(&message.ephemeral_public)
        .map_err(|e| DecryptionError::Malformed(e.to_string()))?;

    let mut last_error = DecryptionError::NoMatchingKey;
    for stanza in &message.recipients {
        let Some((recipient_public, secret)) = resolver.find(&stanza.fingerprint) else {
            continue;
        };
        match open_stanza(message, stanza, &ephemeral_public, recipient_public, secret) {
            Ok(payload) => return Ok(payload),
            Err(e) => {
                debug!(fingerprint = %stanza.fingerprint, error = %e, "Recipient stanza could not be opened");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Entpackt den Payload Key eines Empfänger-Eintrags und entschlüsselt damit die Nutzdaten.
fn open_stanza(
    message: &SealedMessage,
    stanza: &RecipientStanza,
    ephemeral_public: &X25519PublicKey,
    recipient_public: &X25519PublicKey,
    secret: &StaticSecret,
) -> Result<Vec<u8>, DecryptionError> {
    let shared = secret.diffie_hellman(ephemeral_public);
    let kek = crypto_utils::derive_kek(shared.as_bytes(), ephemeral_public, recipient_public)
        .map_err(|e| DecryptionError::Malformed(e.to_string()))?;

    let payload_key_bytes = Zeroizing::new(
        crypto_utils::decrypt_data(&kek, &stanza.wrapped_key)
            .map_err(|_| DecryptionError::KeyMismatch(stanza.fingerprint.clone()))?,
    );
    let payload_key: Zeroizing<[u8; KEY_SIZE]> = Zeroizing::new(
        payload_key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| DecryptionError::Malformed("Payload key has incorrect length".to_string()))?,
    );

    crypto_utils::decrypt_data(&payload_key, &message.encrypted_payload)
        .map_err(|_| DecryptionError::CorruptPayload)
}

/// Parst und öffnet eine armierte Nachricht.
pub fn open_armored(
    armored: &str,
    expected_type: PayloadType,
    resolver: &KeyResolver,
) -> Result<Vec<u8>, DecryptionError> {
    open(&parse_armored(armored)?, expected_type, resolver)
}
