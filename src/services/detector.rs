use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::label::RawDetection;

/// Object detector: image bytes in, boxes in normalized coordinates out.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<RawDetection>, DetectorError>;
}

/// Client for an HTTP object detection inference service.
pub struct HttpDetector {
    http: Client,
    predict_url: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

impl HttpDetector {
    /// `timeout` bounds the whole request, body included.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DetectorError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<RawDetection>, DetectorError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
        });

        let response = self
            .http
            .post(&self.predict_url)
            .json(&request_body)
            .send()
            .await
            .map_err(DetectorError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status(status.as_u16(), body));
        }

        let body = response.bytes().await.map_err(DetectorError::Http)?;
        let parsed: PredictResponse =
            serde_json::from_slice(&body).map_err(DetectorError::Decode)?;
        Ok(parsed.detections)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Detector returned status {0}: {1}")]
    Status(u16, String),

    #[error("Failed to parse detector response: {0}")]
    Decode(#[from] serde_json::Error),
}
