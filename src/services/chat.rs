use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::models::chat::{ImageRef, PhotoAttachment};
use crate::models::job::OriginId;

/// Capabilities the pipeline needs from the chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, origin: &OriginId, text: &str) -> Result<(), TransportError>;

    async fn send_image(&self, origin: &OriginId, image: &ImageRef) -> Result<(), TransportError>;

    /// Fetch the bytes of a photo attached to an inbound message.
    async fn download_attachment(&self, photo: &PhotoAttachment) -> Result<Vec<u8>, TransportError>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram Bot API client.
pub struct TelegramClient {
    http: Client,
    api_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        let parsed: ApiResponse<T> = response.json().await?;
        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api {
                method: method.to_string(),
                description: parsed
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    /// Point the bot's webhook at `url`, optionally with a secret token that
    /// Telegram echoes back in every update request.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TransportError> {
        let mut body = serde_json::json!({ "url": url });
        if let Some(secret) = secret {
            body["secret_token"] = serde_json::Value::String(secret.to_string());
        }
        let _: bool = self.call("setWebhook", &body).await?;
        tracing::info!(url, "Webhook registered");
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, origin: &OriginId, text: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": origin.as_str(), "text": text });
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn send_image(&self, origin: &OriginId, image: &ImageRef) -> Result<(), TransportError> {
        let ImageRef::Url(url) = image;
        let body = serde_json::json!({ "chat_id": origin.as_str(), "photo": url });
        let _: serde_json::Value = self.call("sendPhoto", &body).await?;
        Ok(())
    }

    async fn download_attachment(
        &self,
        photo: &PhotoAttachment,
    ) -> Result<Vec<u8>, TransportError> {
        let body = serde_json::json!({ "file_id": photo.file_id });
        let info: FileInfo = self.call("getFile", &body).await?;
        let file_path = info.file_path.ok_or_else(|| TransportError::Api {
            method: "getFile".to_string(),
            description: "file is not available for download".to_string(),
        })?;

        let response = self
            .http
            .get(format!("{}/file/bot{}/{}", self.api_url, self.token, file_path))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API call {method} failed: {description}")]
    Api { method: String, description: String },
}
