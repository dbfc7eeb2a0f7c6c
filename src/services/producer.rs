use std::sync::Arc;
use uuid::Uuid;

use crate::models::chat::Photo;
use crate::models::job::{JobRequest, OriginId};
use crate::services::annotate;
use crate::services::chat::TransportError;
use crate::services::queue::{JobQueue, QueueError};
use crate::services::storage::{BlobError, BlobStore};

/// Turns submitted photos into queued jobs.
///
/// The photo is written to the blob store before the job is enqueued, so a
/// queued job never references a missing image. A failed enqueue leaves the
/// blob behind; it is overwritten if the same attachment is submitted again.
pub struct JobProducer {
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
}

impl JobProducer {
    pub fn new(blobs: Arc<dyn BlobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { blobs, queue }
    }

    pub async fn submit(
        &self,
        origin_id: &OriginId,
        photo: Option<Photo>,
    ) -> Result<Uuid, SubmitError> {
        let photo = photo.ok_or(SubmitError::NotAPhoto)?;
        let (content_type, extension) =
            annotate::sniff(&photo.bytes).ok_or(SubmitError::UnsupportedImage)?;

        let image_key = photo_key(&photo.attachment_id, extension);
        self.blobs
            .put(&image_key, &photo.bytes, content_type)
            .await
            .map_err(SubmitError::StoreUnavailable)?;

        tracing::debug!(image_key = %image_key, bytes = photo.bytes.len(), "Photo stored");

        let request = JobRequest {
            image_key,
            origin_id: origin_id.clone(),
        };
        let job_id = self.queue.enqueue(&request).await.map_err(|e| {
            tracing::warn!(
                image_key = %request.image_key,
                "Enqueue failed, stored photo left orphaned"
            );
            SubmitError::QueueUnavailable(e)
        })?;

        metrics::counter!("detection_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job_id,
            origin_id = %origin_id,
            image_key = %request.image_key,
            "Detection job enqueued"
        );

        Ok(job_id)
    }
}

/// Blob key for a raw photo, derived from its stable attachment identifier.
pub fn photo_key(attachment_id: &str, extension: &str) -> String {
    let safe: String = attachment_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("photos/{safe}.{extension}")
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid input: message carries no photo")]
    NotAPhoto,

    #[error("Invalid input: unsupported image format")]
    UnsupportedImage,

    #[error("Could not fetch photo from chat: {0}")]
    PhotoUnavailable(#[source] TransportError),

    #[error("Image storage unavailable: {0}")]
    StoreUnavailable(#[source] BlobError),

    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(#[source] QueueError),
}

impl SubmitError {
    /// Rejections caused by the message itself rather than by a dependency.
    pub fn is_input_invalid(&self) -> bool {
        matches!(self, SubmitError::NotAPhoto | SubmitError::UnsupportedImage)
    }

    /// Reply sent to the user in place of the acceptance message.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::NotAPhoto => "Please send a photo for object detection.",
            SubmitError::UnsupportedImage => {
                "Sorry, that image format is not supported. Please send a JPEG, PNG or WebP photo."
            }
            SubmitError::PhotoUnavailable(_) => {
                "Could not download your photo. Please try sending it again."
            }
            SubmitError::StoreUnavailable(_) => {
                "Failed to upload your image. Please try again later."
            }
            SubmitError::QueueUnavailable(_) => {
                "Your image could not be queued for processing. Please try again later."
            }
        }
    }
}
