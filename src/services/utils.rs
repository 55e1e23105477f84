//! # src/services/utils.rs
//!
//! Allgemeine Hilfsfunktionen: ASCII-Armor für Schlüssel und Nachrichten,
//! Base64-Serialisierung von Bytefeldern und Zeitstempel.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};

/// Maximale Zeilenlänge des Base64-Körpers innerhalb eines Armors.
const ARMOR_LINE_WIDTH: usize = 64;

/// Die Art eines armierten Blocks. Bestimmt die BEGIN/END-Zeilen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKey,
    SecretKey,
    KeyBackup,
    Message,
}

impl ArmorKind {
    fn label(self) -> &'static str {
        match self {
            ArmorKind::PublicKey => "SEALED FORMS PUBLIC KEY",
            ArmorKind::SecretKey => "SEALED FORMS SECRET KEY",
            ArmorKind::KeyBackup => "SEALED FORMS KEY BACKUP",
            ArmorKind::Message => "SEALED FORMS MESSAGE",
        }
    }
}

/// Fehler beim Entfernen eines Armors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArmorError {
    #[error("Missing armor header '-----BEGIN {0}-----'.")]
    MissingHeader(&'static str),
    #[error("Missing armor footer '-----END {0}-----'.")]
    MissingFooter(&'static str),
    #[error("Armor body is not valid base64: {0}")]
    InvalidBase64(String),
}

/// Verpackt Bytes in einen Text-Block mit BEGIN/END-Zeilen und umgebrochenem Base64.
pub fn armor(kind: ArmorKind, data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / ARMOR_LINE_WIDTH + 80);
    out.push_str(&format!("-----BEGIN {}-----\n", kind.label()));
    // Base64 ist reines ASCII, daher sind die Byte-Grenzen auch Zeichengrenzen.
    for chunk in encoded.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", kind.label()));
    out
}

/// Entfernt den Armor eines Blocks der erwarteten Art und liefert die Rohbytes.
///
/// Text vor dem Header und nach dem Footer wird ignoriert, ebenso Leerzeilen
/// und Carriage Returns im Körper.
pub fn dearmor(kind: ArmorKind, text: &str) -> Result<Vec<u8>, ArmorError> {
    let label = kind.label();
    let header = format!("-----BEGIN {}-----", label);
    let footer = format!("-----END {}-----", label);

    let start = text.find(&header).ok_or(ArmorError::MissingHeader(label))? + header.len();
    let end = text[start..]
        .find(&footer)
        .map(|pos| start + pos)
        .ok_or(ArmorError::MissingFooter(label))?;

    let body: String = text[start..end].chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(body.as_bytes())
        .map_err(|e| ArmorError::InvalidBase64(e.to_string()))
}

/// Serde-Hilfsmodul, das `Vec<u8>` als Base64-String (de)serialisiert.
pub mod base64_bytes {
    use super::BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Millisekunden seit der Unix-Epoche, wie sie im lokalen Cache gespeichert werden.
pub fn to_millis(time: &DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Aktueller Zeitpunkt in Millisekunden seit der Unix-Epoche.
pub fn now_millis() -> i64 {
    to_millis(&Utc::now())
}
