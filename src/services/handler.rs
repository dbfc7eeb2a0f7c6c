use std::sync::Arc;
use uuid::Uuid;

use crate::models::chat::{IncomingMessage, Photo};
use crate::services::chat::ChatTransport;
use crate::services::producer::{JobProducer, SubmitError};

pub const ACCEPTED_REPLY: &str = "Your image has been received and is being processed.";

/// Handles inbound chat messages by submitting their photo as a detection job.
///
/// Every message gets exactly one reply: the acceptance notice or the reason
/// it was rejected.
pub struct ChatHandler {
    transport: Arc<dyn ChatTransport>,
    producer: JobProducer,
}

impl ChatHandler {
    pub fn new(transport: Arc<dyn ChatTransport>, producer: JobProducer) -> Self {
        Self { transport, producer }
    }

    pub async fn handle(&self, message: IncomingMessage) -> Result<Uuid, SubmitError> {
        tracing::info!(
            origin_id = %message.origin_id,
            has_photo = message.photo.is_some(),
            "Incoming message"
        );

        let outcome = self.submit(&message).await;

        let reply = match &outcome {
            Ok(_) => ACCEPTED_REPLY,
            Err(e) if e.is_input_invalid() => {
                tracing::info!(origin_id = %message.origin_id, reason = %e, "Message rejected");
                e.user_message()
            }
            Err(e) => {
                tracing::error!(
                    origin_id = %message.origin_id,
                    error = %e,
                    "Job submission failed"
                );
                e.user_message()
            }
        };

        if let Err(e) = self.transport.send_text(&message.origin_id, reply).await {
            tracing::warn!(
                origin_id = %message.origin_id,
                error = %e,
                "Failed to acknowledge message"
            );
        }

        outcome
    }

    async fn submit(&self, message: &IncomingMessage) -> Result<Uuid, SubmitError> {
        let photo = match &message.photo {
            Some(attachment) => {
                let bytes = self
                    .transport
                    .download_attachment(attachment)
                    .await
                    .map_err(SubmitError::PhotoUnavailable)?;
                Some(Photo {
                    attachment_id: attachment.unique_id.clone(),
                    bytes,
                })
            }
            None => None,
        };

        self.producer.submit(&message.origin_id, photo).await
    }
}
