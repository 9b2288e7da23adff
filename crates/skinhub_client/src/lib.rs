use skinhub_core::prelude::*;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkinhubClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned error {0}: {1}")]
    ServerError(StatusCode, String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, SkinhubClientError>;

/// Mirror of the server's `{success, message, data}` envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    success: bool,
    message: String,
    data: Option<T>,
}

/// Receipt of an upload as the server reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResult {
    pub username: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub hash: String,
    pub size: u64,
    pub stored: bool,
    pub changed: bool,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurgeResult {
    pub players_removed: usize,
    pub assets_removed: Vec<String>,
}

#[derive(Clone)]
pub struct SkinhubClient {
    base_url: String,
    client: Client,
    admin_key: Option<String>,
}

impl SkinhubClient {
    pub fn new(base_url: impl Into<String>, admin_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            admin_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn admin_key(&self) -> Result<&str> {
        self.admin_key
            .as_deref()
            .ok_or_else(|| SkinhubClientError::Validation("Admin key required".into()))
    }

    async fn error_for(response: reqwest::Response) -> SkinhubClientError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        SkinhubClientError::ServerError(status, message)
    }

    async fn data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SkinhubClientError::Validation(format!("Failed to parse response: {e}")))?;
        envelope
            .data
            .ok_or_else(|| SkinhubClientError::Validation("Response carried no data".into()))
    }

    /// Uploads PNG bytes for a player.
    pub async fn upload(
        &self,
        username: &str,
        uuid: Option<&str>,
        kind: AssetKind,
        data: Bytes,
    ) -> Result<UploadResult> {
        let part = Part::bytes(data.to_vec())
            .file_name(format!("{kind}.png"))
            .mime_str("image/png")?;
        let mut form = Form::new()
            .text("username", username.to_string())
            .part("file", part);
        if let Some(uuid) = uuid {
            form = form.text("uuid", uuid.to_string());
        }

        let response = self
            .client
            .post(self.url(&format!("/api/upload/{kind}")))
            .multipart(form)
            .send()
            .await?;

        let result: UploadResult = Self::data(response).await?;
        let local_hash = content_hash(&data);
        if result.hash != local_hash {
            return Err(SkinhubClientError::Validation(format!(
                "Server hash mismatch: expected {local_hash}, got {}",
                result.hash
            )));
        }
        Ok(result)
    }

    pub async fn upload_file(
        &self,
        username: &str,
        uuid: Option<&str>,
        kind: AssetKind,
        path: &Path,
    ) -> Result<UploadResult> {
        let data = tokio::fs::read(path).await?;
        self.upload(username, uuid, kind, Bytes::from(data)).await
    }

    /// Raw PNG of a player, `None` when the server has none.
    pub async fn download(&self, username: &str, kind: AssetKind) -> Result<Option<Bytes>> {
        let response = self
            .client
            .get(self.url(&format!("/{kind}/{username}")))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            _ => Err(Self::error_for(response).await),
        }
    }

    /// Same as [`download`](Self::download) through the base64 JSON endpoint.
    pub async fn download_base64(&self, username: &str, kind: AssetKind) -> Result<Option<Bytes>> {
        #[derive(Deserialize)]
        struct Payload {
            image: String,
        }

        let response = self
            .client
            .get(self.url(&format!("/api/{kind}/{username}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let payload: Payload = Self::data(response).await?;
        STANDARD
            .decode(payload.image)
            .map(|data| Some(Bytes::from(data)))
            .map_err(|e| SkinhubClientError::Validation(format!("Invalid base64 image: {e}")))
    }

    pub async fn players(&self) -> Result<Vec<PlayerSummary>> {
        let response = self.client.get(self.url("/api/players")).send().await?;
        Self::data(response).await
    }

    pub async fn player(&self, username: &str) -> Result<Option<PlayerRecord>> {
        let response = self
            .client
            .get(self.url(&format!("/api/players/{username}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::data(response).await.map(Some)
    }

    /// The whole metadata document.
    pub async fn document(&self) -> Result<MetadataDocument> {
        let response = self.client.get(self.url("/api/get-all")).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| SkinhubClientError::Validation(format!("Failed to parse document: {e}")))
    }

    pub async fn stats(&self) -> Result<serde_json::Value> {
        let response = self.client.get(self.url("/stats")).send().await?;
        Self::data(response).await
    }

    pub async fn delete_player(&self, username: &str) -> Result<PurgeResult> {
        let response = self
            .client
            .delete(self.url(&format!("/api/players/{username}")))
            .query(&[("key", self.admin_key()?)])
            .send()
            .await?;
        Self::data(response).await
    }

    pub async fn reset(&self) -> Result<PurgeResult> {
        let response = self
            .client
            .delete(self.url("/reset"))
            .query(&[("key", self.admin_key()?)])
            .send()
            .await?;
        Self::data(response).await
    }
}
