use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::chat::ImageRef;
use crate::models::record::ResultRecord;
use crate::services::chat::{ChatTransport, TransportError};
use crate::services::records::{RecordStore, RecordStoreError};

/// Delivery of a persisted result to its origin conversation.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn notify(&self, record: &ResultRecord) -> Result<(), NotifyError>;
}

/// Relays result records to the chat transport.
///
/// Holds no delivery state: every call re-sends the same content.
pub struct ResultNotifier {
    records: Arc<dyn RecordStore>,
    transport: Arc<dyn ChatTransport>,
    public_image_base_url: String,
}

impl ResultNotifier {
    pub fn new(
        records: Arc<dyn RecordStore>,
        transport: Arc<dyn ChatTransport>,
        public_image_base_url: &str,
    ) -> Self {
        Self {
            records,
            transport,
            public_image_base_url: public_image_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Look up a job's record and send it to the conversation it came from.
    pub async fn deliver(&self, job_id: Uuid) -> Result<(), NotifyError> {
        let record = self
            .records
            .get(job_id)
            .await
            .map_err(NotifyError::StoreUnavailable)?
            .ok_or(NotifyError::NotFound(job_id))?;

        self.notify(&record).await?;
        tracing::info!(job_id = %job_id, origin_id = %record.origin_id, "Result delivered");
        Ok(())
    }

    /// Public location of the annotated image.
    pub fn image_url(&self, record: &ResultRecord) -> String {
        format!("{}/{}", self.public_image_base_url, record.annotated_image_key)
    }
}

#[async_trait]
impl JobNotifier for ResultNotifier {
    async fn notify(&self, record: &ResultRecord) -> Result<(), NotifyError> {
        self.transport
            .send_text(&record.origin_id, &record.summary())
            .await?;
        self.transport
            .send_image(&record.origin_id, &ImageRef::Url(self.image_url(record)))
            .await?;
        Ok(())
    }
}

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Notifies the ingress service's pull endpoint, which performs the delivery.
pub struct CallbackNotifier {
    http: Client,
    results_url: String,
}

impl CallbackNotifier {
    pub fn new(results_url: &str) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .map_err(NotifyError::Callback)?;
        Ok(Self {
            http,
            results_url: results_url.to_string(),
        })
    }
}

#[async_trait]
impl JobNotifier for CallbackNotifier {
    async fn notify(&self, record: &ResultRecord) -> Result<(), NotifyError> {
        self.http
            .post(&self.results_url)
            .query(&[("predictionId", record.job_id.to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(NotifyError::Callback)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("No result record for job {0}")]
    NotFound(Uuid),

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] RecordStoreError),

    #[error("Chat delivery failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Result callback failed: {0}")]
    Callback(#[source] reqwest::Error),
}
