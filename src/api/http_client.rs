//! # src/api/http_client.rs
//!
//! `FormApi`-Implementierung über HTTP mit `reqwest`.
//!
//! Verwaltungs-Endpunkte authentifizieren sich per Bearer-Token aus dem lokalen
//! Token-Speicher; Ausfüll-Endpunkte über das Fill-Token im Query-Parameter `f`.

use super::{ApiError, FormApi};
use crate::config::CoreConfig;
use crate::models::submission::SubmissionStream;
use crate::services::utils::now_millis;
use crate::storage::auth_tokens::AuthTokenStore;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const CAPTCHA_HEADER: &str = "X-Captcha-Response";
const FILL_TOKEN_PARAM: &str = "f";

#[derive(Serialize)]
struct KeyDataBody<'a> {
    key_data: &'a str,
}

pub struct HttpFormApi {
    client: Client,
    base_url: Url,
    tokens: Arc<AuthTokenStore>,
}

impl HttpFormApi {
    pub fn new(config: &CoreConfig, tokens: Arc<AuthTokenStore>) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(HttpFormApi {
            client,
            base_url,
            tokens,
        })
    }

    /// Baut die URL aus Pfadsegmenten. Segmente werden einzeln kodiert.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn fill_endpoint(&self, segments: &[&str], fill_token: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut().append_pair(FILL_TOKEN_PARAM, fill_token);
        Ok(url)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self
            .tokens
            .current(now_millis())
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read auth token: {}", e)))?
            .ok_or(ApiError::Unauthenticated)?;
        Ok(request.bearer_auth(token.token_secret))
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        Self::send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl FormApi for HttpFormApi {
    async fn list_submissions(
        &self,
        org_id: &str,
        form_id: &str,
        since: Option<&str>,
    ) -> Result<SubmissionStream, ApiError> {
        let mut url = self.endpoint(&["users", "me", "orgs", org_id, "forms", form_id, "submissions"])?;
        if let Some(since) = since {
            url.query_pairs_mut().append_pair("since", since);
        }
        debug!(org_id, form_id, since, "Listing submissions");
        let request = self.authorized(self.client.get(url)).await?;
        Self::send_json(request).await
    }

    async fn form_keys(&self, org_id: &str, form_id: &str, fill_token: &str) -> Result<Vec<String>, ApiError> {
        let url = self.fill_endpoint(&["fill", "orgs", org_id, "forms", form_id, "keys"], fill_token)?;
        Self::send_json(self.client.get(url)).await
    }

    async fn submit(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_submission: &str,
        captcha: Option<&str>,
    ) -> Result<(), ApiError> {
        let url = self.fill_endpoint(&["fill", "orgs", org_id, "forms", form_id], fill_token)?;
        let mut request = self.client.post(url).json(&sealed_submission);
        if let Some(captcha) = captcha {
            request = request.header(CAPTCHA_HEADER, captcha);
        }
        Self::send(request).await.map(|_| ())
    }

    async fn upload_asset(
        &self,
        org_id: &str,
        form_id: &str,
        fill_token: &str,
        sealed_asset: Vec<u8>,
    ) -> Result<String, ApiError> {
        let url = self.fill_endpoint(&["fill", "orgs", org_id, "forms", form_id, "assets"], fill_token)?;
        let part = reqwest::multipart::Part::bytes(sealed_asset).file_name("asset");
        let form = reqwest::multipart::Form::new().part("data", part);
        Self::send_json(self.client.post(url).multipart(form)).await
    }

    async fn fetch_asset(&self, org_id: &str, form_id: &str, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint(&[
            "user",
            "me",
            "orgs",
            org_id,
            "forms",
            form_id,
            "submission-assets",
            file_id,
        ])?;
        let request = self.authorized(self.client.get(url)).await?;
        let bytes = Self::send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn team_key_fingerprints(&self, org_id: &str, team_id: &str) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint(&["users", "me", "orgs", org_id, "teams", team_id, "keys", "all"])?;
        let request = self.authorized(self.client.get(url)).await?;
        Self::send_json(request).await
    }

    async fn register_key(&self, org_id: &str, public_key: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["users", "me", "orgs", org_id, "keys"])?;
        let request = self
            .authorized(self.client.post(url).json(&KeyDataBody { key_data: public_key }))
            .await?;
        Self::send_json(request).await
    }

    async fn register_key_backup(&self, org_id: &str, key_id: &str, backup: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["users", "me", "orgs", org_id, "keys", key_id, "backup"])?;
        let request = self
            .authorized(self.client.put(url).json(&KeyDataBody { key_data: backup }))
            .await?;
        Self::send(request).await.map(|_| ())
    }

    async fn key_backup(&self, org_id: &str, key_id: &str) -> Result<Option<String>, ApiError> {
        let url = self.endpoint(&["users", "me", "orgs", org_id, "keys", key_id, "backup"])?;
        let request = self.authorized(self.client.get(url)).await?;
        Self::send_json(request).await
    }
}
