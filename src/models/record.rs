use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::OriginId;
use crate::models::label::DetectionLabel;

/// Durable outcome of one completed job, keyed by `job_id`.
///
/// Written once by the worker after annotation; rewritten only if the job is
/// redelivered, in which case the new write replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub job_id: Uuid,
    pub origin_id: OriginId,
    pub original_image_key: String,
    pub annotated_image_key: String,
    pub labels: Vec<DetectionLabel>,
    pub completed_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Human-readable label summary, one line per detected object.
    pub fn summary(&self) -> String {
        let mut text = format!("Prediction results for image {}:\n", self.original_image_key);
        if self.labels.is_empty() {
            text.push_str("No objects detected.\n");
        }
        for label in &self.labels {
            text.push_str(&format!(
                "- {} at ({:.2}, {:.2}) size ({:.2}, {:.2})\n",
                label.class, label.cx, label.cy, label.width, label.height
            ));
        }
        text
    }
}
