//! In-process implementations of the external services.
//!
//! They keep the same observable contracts as the production adapters
//! (overwrite-by-key writes, visibility-timeout redelivery) so the pipeline
//! can run inside a single process and under test.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::models::job::{Delivery, Job, JobRequest, Receipt};
use crate::models::record::ResultRecord;
use crate::services::queue::{JobQueue, QueueError};
use crate::services::records::{RecordStore, RecordStoreError};
use crate::services::storage::{BlobError, BlobStore};

const CLAIM_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, String)>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), BlobError> {
        self.lock()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.lock()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Uuid, ResultRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ResultRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record: &ResultRecord) -> Result<(), RecordStoreError> {
        self.lock().insert(record.job_id, record.clone());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultRecord>, RecordStoreError> {
        Ok(self.lock().get(&job_id).cloned())
    }

    async fn health_check(&self) -> Result<(), RecordStoreError> {
        Ok(())
    }
}

struct StoredMessage {
    request: JobRequest,
    receive_count: u32,
    lease: Option<(Uuid, Instant)>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Uuid>,
    messages: HashMap<Uuid, StoredMessage>,
    dead: Vec<(Job, String)>,
}

impl QueueState {
    fn requeue_expired(&mut self, now: Instant) {
        let mut expired: Vec<Uuid> = self
            .messages
            .iter()
            .filter(|(_, m)| matches!(m.lease, Some((_, deadline)) if deadline <= now))
            .map(|(id, _)| *id)
            .collect();
        expired.sort();
        for id in expired {
            if let Some(message) = self.messages.get_mut(&id) {
                message.lease = None;
            }
            // Claims pop from the back, so expired messages go ahead of fresh ones
            self.pending.push_back(id);
        }
    }

    fn holds_lease(&self, receipt: &Receipt) -> bool {
        self.messages
            .get(&receipt.message_id)
            .and_then(|m| m.lease)
            .is_some_and(|(lease, _)| lease == receipt.lease)
    }
}

/// In-process queue with visibility-timeout redelivery.
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
}

impl MemoryJobQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
        }
    }

    /// Messages not yet deleted, claimed or not.
    pub fn outstanding(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn dead_letters(&self) -> Vec<(Job, String)> {
        self.lock().dead.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_claim(&self) -> Option<Delivery> {
        let now = Instant::now();
        let mut state = self.lock();
        state.requeue_expired(now);

        let id = state.pending.pop_back()?;
        let lease = Uuid::new_v4();
        let message = state.messages.get_mut(&id)?;
        message.receive_count += 1;
        message.lease = Some((lease, now + self.visibility_timeout));

        Some(Delivery {
            job: Job {
                job_id: id,
                image_key: message.request.image_key.clone(),
                origin_id: message.request.origin_id.clone(),
            },
            receipt: Receipt {
                message_id: id,
                lease,
            },
            receive_count: message.receive_count,
        })
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, request: &JobRequest) -> Result<Uuid, QueueError> {
        let job_id = Uuid::new_v4();
        let mut state = self.lock();
        state.messages.insert(
            job_id,
            StoredMessage {
                request: request.clone(),
                receive_count: 0,
                lease: None,
            },
        );
        state.pending.push_front(job_id);
        Ok(job_id)
    }

    async fn poll(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_claim() {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(CLAIM_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn delete(&self, receipt: &Receipt) -> Result<bool, QueueError> {
        let mut state = self.lock();
        if !state.holds_lease(receipt) {
            return Ok(false);
        }
        state.messages.remove(&receipt.message_id);
        Ok(true)
    }

    async fn dead_letter(&self, receipt: &Receipt, reason: &str) -> Result<bool, QueueError> {
        let mut state = self.lock();
        if !state.holds_lease(receipt) {
            return Ok(false);
        }
        if let Some(message) = state.messages.remove(&receipt.message_id) {
            let job = Job {
                job_id: receipt.message_id,
                image_key: message.request.image_key,
                origin_id: message.request.origin_id,
            };
            state.dead.push((job, reason.to_string()));
        }
        Ok(true)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.lock().pending.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
