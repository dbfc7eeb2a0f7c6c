use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Identifier of the conversation that receives the final result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(String);

impl OriginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for OriginId {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

/// Job descriptor as handed to the queue. The queue assigns the `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub image_key: String,
    pub origin_id: OriginId,
}

/// A unit of submitted-image work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub image_key: String,
    pub origin_id: OriginId,
}

/// Proof of a claim on a queued message. Only the holder of the current
/// lease can delete or dead-letter the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub message_id: Uuid,
    pub lease: Uuid,
}

/// A job claimed from the queue for the duration of its visibility timeout.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: Job,
    pub receipt: Receipt,
    /// Number of times this message has been handed out, including this one.
    pub receive_count: u32,
}

/// Progress of a single job through the worker pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Received,
    Fetched,
    Detected,
    Published,
    Persisted,
    Notified,
    NotifyFailed,
}

impl JobStage {
    /// Terminal stages are those reachable only after the record exists.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStage::Persisted | JobStage::Notified | JobStage::NotifyFailed
        )
    }
}
