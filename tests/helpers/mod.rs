//! Test doubles for the external services and a harness wiring them together

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use detect_relay::app_state::AppState;
use detect_relay::models::chat::{ImageRef, PhotoAttachment};
use detect_relay::models::job::{Delivery, JobRequest, OriginId, Receipt};
use detect_relay::models::label::RawDetection;
use detect_relay::models::record::ResultRecord;
use detect_relay::services::chat::{ChatTransport, TransportError};
use detect_relay::services::detector::{Detector, DetectorError};
use detect_relay::services::memory::{MemoryBlobStore, MemoryJobQueue, MemoryRecordStore};
use detect_relay::services::notifier::ResultNotifier;
use detect_relay::services::pipeline::{JobWorker, WorkerSettings};
use detect_relay::services::queue::{JobQueue, QueueError};
use detect_relay::services::records::{RecordStore, RecordStoreError};
use detect_relay::services::storage::{BlobError, BlobStore};

pub const PUBLIC_BASE: &str = "https://images.example.test";

/// Something sent to a conversation through the chat transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String, String),
    Image(String, String),
}

/// Chat transport that records outgoing messages and serves canned downloads.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_sends: AtomicBool,
    pub fail_downloads: AtomicBool,
}

impl RecordingTransport {
    pub fn with_file(self, file_id: &str, bytes: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
        self
    }

    pub fn add_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, origin: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(o, text) if o == origin => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn images_to(&self, origin: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Image(o, url) if o == origin => Some(url),
                _ => None,
            })
            .collect()
    }

    fn api_error(method: &str) -> TransportError {
        TransportError::Api {
            method: method.to_string(),
            description: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, origin: &OriginId, text: &str) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::api_error("sendMessage"));
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Text(origin.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_image(&self, origin: &OriginId, image: &ImageRef) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::api_error("sendPhoto"));
        }
        let ImageRef::Url(url) = image;
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Image(origin.to_string(), url.clone()));
        Ok(())
    }

    async fn download_attachment(
        &self,
        photo: &PhotoAttachment,
    ) -> Result<Vec<u8>, TransportError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(Self::api_error("getFile"));
        }
        self.files
            .lock()
            .unwrap()
            .get(&photo.file_id)
            .cloned()
            .ok_or_else(|| Self::api_error("getFile"))
    }
}

/// Detector serving queued responses first, then its default response.
pub struct ScriptedDetector {
    responses: Mutex<VecDeque<Vec<RawDetection>>>,
    last: Mutex<Vec<RawDetection>>,
    pub calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl ScriptedDetector {
    pub fn returning(detections: Vec<RawDetection>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(detections),
            calls: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Queue a one-off response served before the default one.
    pub fn then(self, detections: Vec<RawDetection>) -> Self {
        self.responses.lock().unwrap().push_back(detections);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _image: &[u8]) -> Result<Vec<RawDetection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DetectorError::Status(503, "model loading".to_string()));
        }
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return Ok(next);
        }
        Ok(self.last.lock().unwrap().clone())
    }
}

/// Record store whose first `failures` writes fail.
pub struct FlakyRecordStore {
    inner: MemoryRecordStore,
    failures: AtomicUsize,
    pub puts: AtomicUsize,
}

impl FlakyRecordStore {
    pub fn failing(failures: usize) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            failures: AtomicUsize::new(failures),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn put(&self, record: &ResultRecord) -> Result<(), RecordStoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RecordStoreError::Unavailable("scripted outage".to_string()));
        }
        self.inner.put(record).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>, RecordStoreError> {
        self.inner.get(job_id).await
    }

    async fn health_check(&self) -> Result<(), RecordStoreError> {
        Ok(())
    }
}

/// Record store that is unreachable.
pub struct DownRecordStore;

#[async_trait]
impl RecordStore for DownRecordStore {
    async fn put(&self, _record: &ResultRecord) -> Result<(), RecordStoreError> {
        Err(RecordStoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _job_id: Uuid) -> Result<Option<ResultRecord>, RecordStoreError> {
        Err(RecordStoreError::Unavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<(), RecordStoreError> {
        Err(RecordStoreError::Unavailable("connection refused".to_string()))
    }
}

/// Shared, ordered log of store and queue writes.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Blob store that logs writes and can be switched into failure.
pub struct LoggingBlobStore {
    pub inner: MemoryBlobStore,
    log: EventLog,
    pub fail_puts: AtomicBool,
}

impl LoggingBlobStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            log,
            fail_puts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BlobStore for LoggingBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BlobError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("scripted outage".to_string()));
        }
        self.inner.put(key, data, content_type).await?;
        self.log.lock().unwrap().push(format!("blob:{key}"));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.inner.get(key).await
    }
}

/// Queue that logs enqueues and can be switched into failure.
pub struct LoggingQueue {
    pub inner: MemoryJobQueue,
    log: EventLog,
    pub fail_enqueue: AtomicBool,
}

impl LoggingQueue {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryJobQueue::new(Duration::from_secs(30)),
            log,
            fail_enqueue: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl JobQueue for LoggingQueue {
    async fn enqueue(&self, request: &JobRequest) -> Result<Uuid, QueueError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("scripted outage".to_string()));
        }
        let job_id = self.inner.enqueue(request).await?;
        self.log
            .lock()
            .unwrap()
            .push(format!("enqueue:{}", request.image_key));
        Ok(job_id)
    }

    async fn poll(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        self.inner.poll(wait).await
    }

    async fn delete(&self, receipt: &Receipt) -> Result<bool, QueueError> {
        self.inner.delete(receipt).await
    }

    async fn dead_letter(&self, receipt: &Receipt, reason: &str) -> Result<bool, QueueError> {
        self.inner.dead_letter(receipt, reason).await
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        self.inner.depth().await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.inner.health_check().await
    }
}

pub fn test_settings() -> WorkerSettings {
    WorkerSettings {
        poll_wait: Duration::from_millis(50),
        max_receive_count: 3,
        notify_attempts: 1,
        notify_retry_delay: Duration::ZERO,
    }
}

/// Ingress and worker wired to in-memory services, as two processes would be
/// wired to the shared queue and stores.
pub struct Harness {
    pub blobs: Arc<MemoryBlobStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub records: Arc<FlakyRecordStore>,
    pub detector: Arc<ScriptedDetector>,
    pub transport: Arc<RecordingTransport>,
    pub state: AppState,
    pub worker: JobWorker,
}

impl Harness {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self::build(
            ScriptedDetector::returning(detections),
            0,
            Duration::from_secs(30),
            test_settings(),
        )
    }

    pub fn build(
        detector: ScriptedDetector,
        record_failures: usize,
        visibility_timeout: Duration,
        settings: WorkerSettings,
    ) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let queue = Arc::new(MemoryJobQueue::new(visibility_timeout));
        let records = Arc::new(FlakyRecordStore::failing(record_failures));
        let detector = Arc::new(detector);
        let transport = Arc::new(RecordingTransport::default());

        let state = AppState::new(
            transport.clone(),
            blobs.clone(),
            queue.clone(),
            records.clone(),
            PUBLIC_BASE,
        );

        let notifier = Arc::new(ResultNotifier::new(
            records.clone(),
            transport.clone(),
            PUBLIC_BASE,
        ));
        let worker = JobWorker::new(
            queue.clone(),
            blobs.clone(),
            records.clone(),
            detector.clone(),
            notifier,
            settings,
        );

        Self {
            blobs,
            queue,
            records,
            detector,
            transport,
            state,
            worker,
        }
    }
}
