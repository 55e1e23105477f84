//! # src/models/submission.rs
//!
//! Datenstrukturen für Formular-Einsendungen: den Klartext-Payload, die
//! verschlüsselte Wire-Repräsentation und das Ergebnis einer Entschlüsselung.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Eine Postadresse, wie sie von Adressfragen erfasst wird.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GenericAddress {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub iso_3166_alpha_1_code: String,
}

impl GenericAddress {
    pub fn is_empty(&self) -> bool {
        self.line1.is_empty()
            && self.line2.is_empty()
            && self.locality.is_empty()
            && self.zip_code.is_empty()
            && self.iso_3166_alpha_1_code.is_empty()
    }
}

/// Eine geographische Position. `(0, 0)` gilt als "nicht gesetzt".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct GenericLocation {
    pub lat: f64,
    pub lng: f64,
}

impl GenericLocation {
    pub fn is_empty(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

/// Die Antwort auf eine einzelne Frage.
///
/// Jede Variante entspricht genau einem Fragetyp, sodass Auswertungen
/// erschöpfend per `match` arbeiten können.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum QuestionSubmissionData {
    Text {
        value: String,
    },
    Choice {
        option: Vec<String>,
    },
    Scale {
        value: Option<i32>,
    },
    Address {
        address: GenericAddress,
        point: GenericLocation,
    },
    PhoneNumber {
        calling_code: String,
        number: String,
    },
    FileUpload {
        file_id: String,
        content_type: String,
    },
    Signature {
        freeform: Vec<Vec<Vec<f32>>>,
        initial: String,
        full_name: String,
    },
    ChoiceMatrix {
        options: HashMap<String, Vec<String>>,
    },
    DateTime {
        value: DateTime<Local>,
    },
    Hidden {
        value: String,
    },
}

impl QuestionSubmissionData {
    /// Prüft, ob die Antwort inhaltlich leer ist (z.B. für Pflichtfragen).
    pub fn is_empty(&self) -> bool {
        match self {
            QuestionSubmissionData::Text { value } => value.trim().is_empty(),
            QuestionSubmissionData::Choice { option } => option.is_empty(),
            QuestionSubmissionData::ChoiceMatrix { options } => options.values().all(|v| v.is_empty()),
            QuestionSubmissionData::Scale { value } => value.is_none(),
            QuestionSubmissionData::Address { address, point } => address.is_empty() && point.is_empty(),
            QuestionSubmissionData::PhoneNumber { calling_code, number } => {
                calling_code.is_empty() || number.is_empty()
            }
            QuestionSubmissionData::FileUpload { file_id, content_type } => {
                file_id.is_empty() || content_type.is_empty()
            }
            QuestionSubmissionData::Signature { freeform, initial, full_name } => {
                freeform.is_empty() && initial.is_empty() && full_name.is_empty()
            }
            QuestionSubmissionData::DateTime { value } => value.timestamp() == 0,
            QuestionSubmissionData::Hidden { value } => value.is_empty(),
        }
    }
}

impl fmt::Display for QuestionSubmissionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionSubmissionData::Text { value } | QuestionSubmissionData::Hidden { value } => {
                write!(f, "{}", value)
            }
            QuestionSubmissionData::Choice { option } => write!(f, "{}", option.join(",")),
            QuestionSubmissionData::ChoiceMatrix { options } => {
                let mut rows: Vec<_> = options.iter().collect();
                rows.sort_by(|a, b| a.0.cmp(b.0));
                let rendered: Vec<String> = rows
                    .into_iter()
                    .map(|(column, items)| format!("{}: {}", column, items.join(",")))
                    .collect();
                write!(f, "{}", rendered.join("; "))
            }
            QuestionSubmissionData::Scale { value } => match value {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
            QuestionSubmissionData::Address { address, .. } => write!(
                f,
                "{}, {}, {}, {}",
                address.line1, address.locality, address.zip_code, address.iso_3166_alpha_1_code
            ),
            QuestionSubmissionData::PhoneNumber { calling_code, number } => {
                write!(f, "+{} {}", calling_code, number)
            }
            QuestionSubmissionData::FileUpload { file_id, .. } => write!(f, "{}", file_id),
            QuestionSubmissionData::Signature { full_name, initial, .. } => {
                if full_name.is_empty() {
                    write!(f, "{}", initial)
                } else {
                    write!(f, "{}", full_name)
                }
            }
            QuestionSubmissionData::DateTime { value } => write!(f, "{}", value.to_rfc3339()),
        }
    }
}

/// Die Antwort auf eine Frage, zugeordnet über die Fragen-ID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuestionSubmission {
    pub question_id: String,
    pub data: QuestionSubmissionData,
}

/// Der Klartext einer Einsendung, der vor dem Versand verschlüsselt wird.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InProgressSubmission {
    pub form_id: String,
    pub groups_completed: Vec<String>,
    pub questions: Vec<QuestionSubmission>,
}

/// Eine verschlüsselte Einsendung, wie sie die REST-API ausliefert.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedSubmission {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub for_token: Option<String>,
    /// Die armierte `SealedMessage`.
    pub data: String,
}

/// Antwort des Listen-Endpunkts: neue Einsendungen seit einem Cursor und
/// die IDs aller serverseitig gelöschten Einsendungen.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SubmissionStream {
    #[serde(default)]
    pub since: Option<String>,
    pub total: u64,
    pub new: Vec<EncryptedSubmission>,
    pub deleted: Vec<String>,
}

/// Erfolgreich entschlüsselte Einsendung.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedSubmissionSuccess {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub for_token: Option<String>,
    pub questions: Vec<QuestionSubmission>,
    pub groups: Vec<String>,
}

/// Einsendung, die nicht entschlüsselt werden konnte.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedSubmissionError {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub for_token: Option<String>,
    pub error: String,
}

/// Das Ergebnis der Entschlüsselung einer einzelnen Einsendung.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecryptedSubmission {
    Success(DecryptedSubmissionSuccess),
    Error(DecryptedSubmissionError),
}

impl DecryptedSubmission {
    pub fn id(&self) -> &str {
        match self {
            DecryptedSubmission::Success(s) => &s.id,
            DecryptedSubmission::Error(e) => &e.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            DecryptedSubmission::Success(s) => s.created_at,
            DecryptedSubmission::Error(e) => e.created_at,
        }
    }

    pub fn for_token(&self) -> Option<&str> {
        match self {
            DecryptedSubmission::Success(s) => s.for_token.as_deref(),
            DecryptedSubmission::Error(e) => e.for_token.as_deref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DecryptedSubmission::Success(_))
    }

    pub fn as_success(&self) -> Option<&DecryptedSubmissionSuccess> {
        match self {
            DecryptedSubmission::Success(s) => Some(s),
            DecryptedSubmission::Error(_) => None,
        }
    }
}
