//! # src/api/mod.rs
//!
//! Der Vertrag mit der REST-API. Die Bibliothek spricht den Server nur über
//! den `FormApi`-Trait an; [`http_client::HttpFormApi`] ist die Implementierung
//! für den produktiven Einsatz, Tests verwenden eine In-Memory-Variante.

use crate::models::submission::SubmissionStream;
use async_trait::async_trait;
use thiserror::Error;

pub mod http_client;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    /// Für den Aufruf ist ein gültiges Auth-Token nötig, aber keines vorhanden.
    #[error("No valid auth token available.")]
    Unauthenticated,
}

/// Die Endpunkte der REST-API, die die Bibliothek benötigt.
#[async_trait]
pub trait FormApi: Send + Sync {
    /// Einsendungen eines Formulars nach dem Cursor `since` sowie alle gelöschten IDs.
    async fn list_submissions(
        &self,
        org_id: &str,
        form_id: &str,
        since: Option<&str>,
    ) -> Result<SubmissionStream, ApiError>;

    /// Die armierten öffentlichen Schlüssel, für die eine Einsendung verschlüsselt werden soll.
    async fn form_keys(&self, org_id: &str, form_id: &str, fill_token: &str) -> Result<Vec<String>, ApiError>;

    /// Sendet eine verschlüsselte Einsendung ab.
    async fn submit(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_submission: &str,
        captcha: Option<&str>,
    ) -> Result<(), ApiError>;

    /// Lädt einen verschlüsselten Datei-Anhang hoch und liefert dessen Datei-ID.
    async fn upload_asset(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_asset: Vec<u8>,
    ) -> Result<String, ApiError>;

    /// Lädt einen verschlüsselten Datei-Anhang herunter.
    async fn fetch_asset(&self, org_id: &str, form_id: &str, file_id: &str) -> Result<Vec<u8>, ApiError>;

    /// Die Fingerprints aller Schlüssel der Mitglieder eines Teams.
    async fn team_key_fingerprints(&self, org_id: &str, team_id: &str) -> Result<Vec<String>, ApiError>;

    /// Registriert einen öffentlichen Schlüssel und liefert die Server-ID.
    async fn register_key(&self, org_id: &str, public_key: &str) -> Result<String, ApiError>;

    /// Hinterlegt ein passwortgeschütztes Backup eines Schlüssels.
    async fn register_key_backup(&self, org_id: &str, key_id: &str, backup: &str) -> Result<(), ApiError>;

    /// Lädt das hinterlegte Backup eines Schlüssels, falls vorhanden.
    async fn key_backup(&self, org_id: &str, key_id: &str) -> Result<Option<String>, ApiError>;
}
