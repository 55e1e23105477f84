//! # src/models/records.rs
//!
//! Die Datensätze, die lokal im Dokumentenspeicher des Geräts abgelegt werden.
//! Jeder Datensatz kennt seine eigene Dokument-ID.

use crate::models::keys::KeyFingerprint;
use crate::models::submission::{DecryptedSubmissionSuccess, InProgressSubmission, QuestionSubmission};
use crate::storage::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Der lokale Entwurf einer Einsendung. Genau ein Datensatz pro Formular und Gerät.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InProgressSubmissionRecord {
    /// Die Formular-ID, zugleich die Dokument-ID.
    pub form_id: String,
    pub groups_completed: Vec<String>,
    pub questions: Vec<QuestionSubmission>,
}

impl InProgressSubmissionRecord {
    pub fn new(form_id: impl Into<String>) -> Self {
        InProgressSubmissionRecord {
            form_id: form_id.into(),
            groups_completed: Vec::new(),
            questions: Vec::new(),
        }
    }

    /// Setzt die Antwort auf eine Frage. Eine vorhandene Antwort wird ersetzt.
    pub fn set_answer(&mut self, answer: QuestionSubmission) {
        match self
            .questions
            .iter_mut()
            .find(|q| q.question_id == answer.question_id)
        {
            Some(existing) => *existing = answer,
            None => self.questions.push(answer),
        }
    }

    /// Entfernt die Antwort auf eine Frage. Gibt `true` zurück, wenn eine existierte.
    pub fn clear_answer(&mut self, question_id: &str) -> bool {
        let before = self.questions.len();
        self.questions.retain(|q| q.question_id != question_id);
        before != self.questions.len()
    }

    /// Markiert eine Fragengruppe als abgeschlossen (idempotent).
    pub fn complete_group(&mut self, group_id: &str) {
        if !self.groups_completed.iter().any(|g| g == group_id) {
            self.groups_completed.push(group_id.to_string());
        }
    }

    /// Baut den zu verschlüsselnden Payload. Die letzte Gruppe wird angehängt,
    /// der gespeicherte Entwurf bleibt unverändert.
    pub fn to_outbound_payload(&self, last_group_id: &str) -> InProgressSubmission {
        let mut groups_completed = self.groups_completed.clone();
        groups_completed.push(last_group_id.to_string());
        InProgressSubmission {
            form_id: self.form_id.clone(),
            groups_completed,
            questions: self.questions.clone(),
        }
    }
}

impl Record for InProgressSubmissionRecord {
    fn document_id(&self) -> String {
        self.form_id.clone()
    }
}

/// Eine bereits entschlüsselte Einsendung im lokalen Cache.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptedSubmissionCacheEntry {
    pub submission_id: String,
    pub org_id: String,
    pub form_id: String,
    pub submission: DecryptedSubmissionSuccess,
    /// Erstellungszeitpunkt der Einsendung in Millisekunden seit der Unix-Epoche.
    pub created: i64,
}

impl Record for DecryptedSubmissionCacheEntry {
    fn document_id(&self) -> String {
        self.submission_id.clone()
    }
}

/// Eine Einsendung, die auf diesem Gerät nicht entschlüsselt werden konnte.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedSubmissionRef {
    pub submission_id: String,
    /// Erstellungszeitpunkt in Millisekunden seit der Unix-Epoche.
    pub created: i64,
}

/// Die nicht entschlüsselbaren Einsendungen eines Formulars. Sie werden bei
/// jeder Synchronisation erneut angefragt, bis sie entschlüsselt oder
/// serverseitig gelöscht sind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailedDecryptionRecord {
    /// Die Formular-ID, zugleich die Dokument-ID.
    pub form_id: String,
    pub org_id: String,
    pub submissions: Vec<FailedSubmissionRef>,
}

impl Record for FailedDecryptionRecord {
    fn document_id(&self) -> String {
        self.form_id.clone()
    }
}

/// Ein lokal gespeicherter privater Schlüssel.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct PrivateKeyRecord {
    /// Fingerprint des Schlüssels, zugleich die Dokument-ID.
    pub fingerprint: KeyFingerprint,
    /// Der armierte geheime Schlüssel (`SEALED FORMS SECRET KEY`).
    pub private_key: String,
    /// Die vom Server vergebene Schlüssel-ID.
    pub server_id: String,
    pub org_id: String,
    pub user_id: String,
}

impl fmt::Debug for PrivateKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyRecord")
            .field("fingerprint", &self.fingerprint)
            .field("private_key", &"<redacted>")
            .field("server_id", &self.server_id)
            .field("org_id", &self.org_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Record for PrivateKeyRecord {
    fn document_id(&self) -> String {
        self.fingerprint.to_string()
    }
}

/// Ein lokal gespeichertes Auth-Token.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthTokenRecord {
    pub id: String,
    pub token_secret: String,
    /// Erstellungszeitpunkt in Millisekunden seit der Unix-Epoche.
    pub created: i64,
    /// Ablaufzeitpunkt in Millisekunden seit der Unix-Epoche.
    pub expires: i64,
}

impl fmt::Debug for AuthTokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokenRecord")
            .field("id", &self.id)
            .field("token_secret", &"<redacted>")
            .field("created", &self.created)
            .field("expires", &self.expires)
            .finish()
    }
}

impl Record for AuthTokenRecord {
    fn document_id(&self) -> String {
        self.id.clone()
    }
}

/// Der Zeitpunkt, zu dem eine Organisation zuletzt angesehen wurde.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrgVisitRecord {
    pub org_id: String,
    /// Millisekunden seit der Unix-Epoche.
    pub time: i64,
}

impl Record for OrgVisitRecord {
    fn document_id(&self) -> String {
        self.org_id.clone()
    }
}
