//! # src/models/sealed_message.rs
//!
//! Definiert das Format einer für mehrere Empfänger verschlüsselten Nachricht.
//! Sowohl Formular-Einsendungen als auch Datei-Anhänge werden in diesem
//! Format an den Server übertragen; der Server sieht nie den Klartext.

use crate::models::keys::KeyFingerprint;
use crate::services::utils::base64_bytes;
use serde::{Deserialize, Serialize};

/// Aktuelle Formatversion von `SealedMessage`.
pub const SEALED_MESSAGE_VERSION: u8 = 1;

/// Definiert die Art des Inhalts einer `SealedMessage`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// Eine JSON-serialisierte Formular-Einsendung (`InProgressSubmission`).
    Submission,
    /// Die Rohbytes eines hochgeladenen Datei-Anhangs.
    Asset,
}

/// Der für einen einzelnen Empfänger verpackte Payload Key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecipientStanza {
    /// Fingerprint des Empfänger-Schlüssels. Erlaubt dem Empfänger, den passenden
    /// privaten Schlüssel direkt zu finden, statt alle durchzuprobieren.
    pub fingerprint: KeyFingerprint,
    /// `[nonce | ciphertext]` des Payload Keys, verschlüsselt mit dem KEK.
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
}

/// Eine verschlüsselte Nachricht nach dem "Key Wrapping"-Muster.
///
/// 1. Der `encrypted_payload` ist mit einem einmaligen, symmetrischen Payload Key verschlüsselt.
/// 2. Der Payload Key ist pro Empfänger mit einem KEK verschlüsselt, der aus einem
///    X25519-Austausch zwischen `ephemeral_public` und dem Empfänger-Schlüssel abgeleitet wird.
///
/// Der Absender bleibt anonym, da nur ein ephemerer Schlüssel verwendet wird.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SealedMessage {
    pub version: u8,
    pub payload_type: PayloadType,
    /// Der ephemere öffentliche X25519-Schlüssel des Absenders, hex-kodiert.
    pub ephemeral_public: String,
    pub recipients: Vec<RecipientStanza>,
    /// `[nonce | ciphertext]` der Nutzdaten.
    #[serde(with = "base64_bytes")]
    pub encrypted_payload: Vec<u8>,
}
