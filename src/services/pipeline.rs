use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::models::job::{Delivery, Job, JobStage};
use crate::models::label::{self, LabelError};
use crate::models::record::ResultRecord;
use crate::services::annotate::{self, AnnotateError};
use crate::services::detector::{Detector, DetectorError};
use crate::services::notifier::{JobNotifier, NotifyError};
use crate::services::queue::{JobQueue, QueueError};
use crate::services::records::{RecordStore, RecordStoreError};
use crate::services::storage::{BlobError, BlobStore};

/// Back-off after a failed queue poll.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Longest a single poll waits for a job.
    pub poll_wait: Duration,
    /// Deliveries beyond this count are dead-lettered unprocessed.
    pub max_receive_count: u32,
    /// Notification attempts before recording `NotifyFailed`.
    pub notify_attempts: u32,
    pub notify_retry_delay: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_wait: Duration::from_secs(5),
            max_receive_count: 5,
            notify_attempts: 1,
            notify_retry_delay: Duration::from_millis(500),
        }
    }
}

impl From<&AppConfig> for WorkerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_wait: config.poll_wait(),
            max_receive_count: config.max_receive_count,
            notify_attempts: config.notify_attempts.max(1),
            ..Self::default()
        }
    }
}

/// What one queue poll amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing to claim within the poll wait.
    Idle,
    /// Pipeline reached a terminal stage; the message was released.
    Completed(JobStage),
    /// Pipeline stopped after the given stage; the message stays queued.
    Failed(JobStage),
    /// Receive count exceeded; the message was moved to the dead-letter list.
    DeadLettered,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image storage unavailable: {0}")]
    StoreUnavailable(#[from] BlobError),

    #[error("Detection failed: {0}")]
    Detector(#[from] DetectorError),

    #[error("Annotation failed: {0}")]
    Annotate(#[from] AnnotateError),

    #[error("Detector output corrupted: {0}")]
    DataCorruption(#[from] LabelError),

    #[error("Record store unavailable: {0}")]
    RecordStore(#[from] RecordStoreError),

    #[error("Worker task failed: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::StoreUnavailable(_) => "store_unavailable",
            PipelineError::Detector(_) => "detector",
            PipelineError::Annotate(_) => "annotate",
            PipelineError::DataCorruption(_) => "data_corruption",
            PipelineError::RecordStore(_) => "record_store",
            PipelineError::Internal(_) => "internal",
        }
    }
}

/// A pipeline failure together with the last stage the job reached.
#[derive(Debug, thiserror::Error)]
#[error("job failed after stage {reached}: {error}")]
pub struct PipelineFailure {
    pub reached: JobStage,
    #[source]
    pub error: PipelineError,
}

trait AtStage<T> {
    fn at(self, reached: JobStage) -> Result<T, PipelineFailure>;
}

impl<T, E: Into<PipelineError>> AtStage<T> for Result<T, E> {
    fn at(self, reached: JobStage) -> Result<T, PipelineFailure> {
        self.map_err(|e| PipelineFailure {
            reached,
            error: e.into(),
        })
    }
}

/// Blob key of the annotated copy of an image. Reprocessing the same image
/// yields the same key.
pub fn annotated_key(image_key: &str) -> String {
    format!("predicted/{image_key}")
}

/// Queue consumer running the fetch → detect → publish → persist → notify
/// pipeline for one job at a time.
///
/// A message is deleted only once the result record is persisted. Any earlier
/// failure leaves it queued for redelivery after the visibility timeout.
/// Notification is best-effort and never causes redelivery.
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    detector: Arc<dyn Detector>,
    notifier: Arc<dyn JobNotifier>,
    settings: WorkerSettings,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        detector: Arc<dyn Detector>,
        notifier: Arc<dyn JobNotifier>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            blobs,
            records,
            detector,
            notifier,
            settings,
        }
    }

    /// Consume jobs until `shutdown` resolves. A job already in progress is
    /// finished before the loop observes the shutdown.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, worker stopping");
                    break;
                }
                polled = self.queue.poll(self.settings.poll_wait) => polled,
            };

            match polled {
                Ok(Some(delivery)) => {
                    self.handle(delivery).await;
                }
                Ok(None) => {
                    tracing::trace!("No jobs available");
                    if let Ok(depth) = self.queue.depth().await {
                        metrics::gauge!("detection_queue_depth").set(depth as f64);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Queue poll failed, backing off");
                    sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Poll once and handle whatever was claimed.
    pub async fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        match self.queue.poll(self.settings.poll_wait).await? {
            Some(delivery) => Ok(self.handle(delivery).await),
            None => Ok(PollOutcome::Idle),
        }
    }

    /// Run the pipeline for a claimed job and settle its queue message.
    pub async fn handle(&self, delivery: Delivery) -> PollOutcome {
        let job = &delivery.job;

        if delivery.receive_count > self.settings.max_receive_count {
            return self.dead_letter(&delivery).await;
        }

        tracing::info!(
            job_id = %job.job_id,
            image_key = %job.image_key,
            receive_count = delivery.receive_count,
            "Processing detection job"
        );

        let start = Instant::now();
        match self.process(job).await {
            Ok(stage) => {
                metrics::histogram!("detection_processing_seconds")
                    .record(start.elapsed().as_secs_f64());
                metrics::counter!("detection_jobs_completed_total").increment(1);

                match self.queue.delete(&delivery.receipt).await {
                    Ok(true) => {
                        tracing::info!(
                            job_id = %job.job_id,
                            stage = %stage,
                            "Job completed, message deleted"
                        );
                    }
                    Ok(false) => {
                        tracing::warn!(
                            job_id = %job.job_id,
                            "Visibility timeout lapsed before delete, job may be processed again"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            job_id = %job.job_id,
                            error = %e,
                            "Failed to delete message, job will be redelivered"
                        );
                    }
                }
                PollOutcome::Completed(stage)
            }
            Err(failure) => {
                metrics::counter!(
                    "detection_jobs_failed_total",
                    "stage" => failure.reached.to_string(),
                    "reason" => failure.error.kind()
                )
                .increment(1);
                if matches!(failure.error, PipelineError::DataCorruption(_)) {
                    tracing::error!(
                        alert = true,
                        job_id = %job.job_id,
                        receive_count = delivery.receive_count,
                        error = %failure.error,
                        "Detector produced corrupt output, job left for redelivery"
                    );
                } else {
                    tracing::error!(
                        job_id = %job.job_id,
                        stage = %failure.reached,
                        error = %failure.error,
                        "Job processing failed, message left for redelivery"
                    );
                }
                PollOutcome::Failed(failure.reached)
            }
        }
    }

    /// Move a poison job to the dead-letter list. The job only counts as
    /// dead-lettered once the queue confirms it still held our lease.
    async fn dead_letter(&self, delivery: &Delivery) -> PollOutcome {
        let job = &delivery.job;
        let reason = format!("exceeded {} deliveries", self.settings.max_receive_count);

        match self.queue.dead_letter(&delivery.receipt, &reason).await {
            Ok(true) => {
                tracing::error!(
                    alert = true,
                    job_id = %job.job_id,
                    image_key = %job.image_key,
                    receive_count = delivery.receive_count,
                    "Poison job moved to dead-letter list"
                );
                metrics::counter!("detection_jobs_dead_lettered_total").increment(1);
                PollOutcome::DeadLettered
            }
            Ok(false) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    receive_count = delivery.receive_count,
                    "Lease lapsed before dead-lettering, job stays queued"
                );
                PollOutcome::Failed(JobStage::Received)
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Failed to dead-letter job");
                PollOutcome::Failed(JobStage::Received)
            }
        }
    }

    /// The pipeline proper. Returns the terminal stage reached.
    pub async fn process(&self, job: &Job) -> Result<JobStage, PipelineFailure> {
        // Fetch
        let image = self.blobs.get(&job.image_key).await.at(JobStage::Received)?;
        tracing::debug!(job_id = %job.job_id, bytes = image.len(), "Image fetched");

        // Detect, then draw the boxes
        let detections = self.detector.detect(&image).await.at(JobStage::Fetched)?;
        tracing::debug!(job_id = %job.job_id, detections = detections.len(), "Detection complete");

        let boxes = detections.clone();
        let annotated = tokio::task::spawn_blocking(move || annotate::annotate(&image, &boxes))
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))
            .at(JobStage::Fetched)?
            .at(JobStage::Fetched)?;

        // Translate
        let labels = label::translate(&detections).at(JobStage::Detected)?;
        tracing::info!(job_id = %job.job_id, labels = ?labels, "Prediction summary");

        // Publish annotated image
        let annotated_image_key = annotated_key(&job.image_key);
        self.blobs
            .put(&annotated_image_key, &annotated.bytes, annotated.content_type)
            .await
            .at(JobStage::Detected)?;
        tracing::debug!(
            job_id = %job.job_id,
            key = %annotated_image_key,
            "Annotated image uploaded"
        );

        // Persist
        let record = ResultRecord {
            job_id: job.job_id,
            origin_id: job.origin_id.clone(),
            original_image_key: job.image_key.clone(),
            annotated_image_key,
            labels,
            completed_at: Utc::now(),
        };
        self.records.put(&record).await.at(JobStage::Published)?;
        tracing::info!(job_id = %job.job_id, "Result record stored");

        // Notify
        match self.notify_with_retry(&record).await {
            Ok(()) => {
                tracing::info!(job_id = %job.job_id, origin_id = %job.origin_id, "User notified");
                Ok(JobStage::Notified)
            }
            Err(e) => {
                metrics::counter!("detection_notify_failures_total").increment(1);
                tracing::error!(
                    job_id = %job.job_id,
                    error = %e,
                    "Notification failed, result remains available through the results endpoint"
                );
                Ok(JobStage::NotifyFailed)
            }
        }
    }

    async fn notify_with_retry(&self, record: &ResultRecord) -> Result<(), NotifyError> {
        let attempts = self.settings.notify_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.notifier.notify(record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        job_id = %record.job_id,
                        attempt,
                        error = %e,
                        "Notification attempt failed, retrying"
                    );
                    attempt += 1;
                    sleep(self.settings.notify_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotated_key_is_deterministic() {
        assert_eq!(annotated_key("photos/A1.jpg"), "predicted/photos/A1.jpg");
        assert_eq!(annotated_key("photos/A1.jpg"), annotated_key("photos/A1.jpg"));
    }

    #[test]
    fn test_corrupt_output_is_distinguished_from_detector_outage() {
        let corrupt: Result<(), PipelineFailure> =
            Err(LabelError::UnknownClass(91)).at(JobStage::Detected);
        let outage: Result<(), PipelineFailure> =
            Err(DetectorError::Status(503, "loading".into())).at(JobStage::Fetched);

        let corrupt = corrupt.unwrap_err();
        let outage = outage.unwrap_err();
        assert_eq!(corrupt.error.kind(), "data_corruption");
        assert_eq!(outage.error.kind(), "detector");
        assert_ne!(corrupt.reached, outage.reached);
    }

    #[test]
    fn test_failure_display_names_stage() {
        let failure: Result<(), PipelineFailure> =
            Err(BlobError::NotFound("photos/x.jpg".into())).at(JobStage::Received);
        let message = failure.unwrap_err().to_string();
        assert!(message.contains("after stage received"));
        assert!(message.contains("photos/x.jpg"));
    }
}
