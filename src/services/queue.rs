use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::models::job::{Delivery, Job, JobRequest, Receipt};

/// Interval between claim attempts while a poll is waiting for work.
const CLAIM_INTERVAL: Duration = Duration::from_millis(250);

/// Durable at-least-once job queue with visibility-timeout semantics.
///
/// A polled message stays hidden from other consumers until its visibility
/// timeout expires. Deleting it with the current receipt completes it; letting
/// the timeout lapse makes it eligible for redelivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job and return the identifier assigned to it.
    async fn enqueue(&self, request: &JobRequest) -> Result<Uuid, QueueError>;

    /// Claim at most one job, waiting up to `wait` for one to become available.
    async fn poll(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Remove a claimed message. Returns `false` when the receipt no longer
    /// holds the lease (the message was already redelivered or removed).
    async fn delete(&self, receipt: &Receipt) -> Result<bool, QueueError>;

    /// Move a claimed message to the dead-letter list.
    async fn dead_letter(&self, receipt: &Receipt, reason: &str) -> Result<bool, QueueError>;

    /// Number of messages waiting to be claimed.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

// KEYS: inflight, pending, leases. ARGV: now_ms.
const REQUEUE_EXPIRED: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(expired) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('HDEL', KEYS[3], id)
  redis.call('RPUSH', KEYS[2], id)
end
return #expired
"#;

// KEYS: pending, inflight, receives, messages, leases. ARGV: deadline_ms, lease.
const CLAIM: &str = r#"
local id = redis.call('RPOP', KEYS[1])
if not id then return false end
local body = redis.call('HGET', KEYS[4], id)
if not body then
  redis.call('HDEL', KEYS[3], id)
  return false
end
redis.call('ZADD', KEYS[2], ARGV[1], id)
redis.call('HSET', KEYS[5], id, ARGV[2])
local count = redis.call('HINCRBY', KEYS[3], id, 1)
return {id, body, count}
"#;

// KEYS: inflight, messages, receives, leases, dead. ARGV: id, lease, reason ('' = plain delete).
const RELEASE: &str = r#"
if redis.call('HGET', KEYS[4], ARGV[1]) ~= ARGV[2] then return 0 end
if ARGV[3] ~= '' then
  local body = redis.call('HGET', KEYS[2], ARGV[1])
  redis.call('LPUSH', KEYS[5], cjson.encode({id = ARGV[1], body = body, reason = ARGV[3]}))
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
return 1
"#;

struct QueueKeys {
    pending: String,
    inflight: String,
    messages: String,
    receives: String,
    leases: String,
    dead: String,
}

impl QueueKeys {
    fn new(name: &str) -> Self {
        Self {
            pending: format!("{name}:pending"),
            inflight: format!("{name}:inflight"),
            messages: format!("{name}:messages"),
            receives: format!("{name}:receives"),
            leases: format!("{name}:leases"),
            dead: format!("{name}:dead"),
        }
    }
}

/// Redis-backed job queue.
///
/// Message bodies live in a hash keyed by message id; the pending list and the
/// in-flight sorted set (scored by lease deadline) only carry ids.
pub struct RedisJobQueue {
    client: redis::Client,
    keys: QueueKeys,
    visibility_timeout: Duration,
    requeue_script: Script,
    claim_script: Script,
    release_script: Script,
}

impl RedisJobQueue {
    pub fn new(
        redis_url: &str,
        name: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            keys: QueueKeys::new(name),
            visibility_timeout,
            requeue_script: Script::new(REQUEUE_EXPIRED),
            claim_script: Script::new(CLAIM),
            release_script: Script::new(RELEASE),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Return expired in-flight messages to the head of the pending list.
    async fn requeue_expired(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<u64, QueueError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let requeued: u64 = self
            .requeue_script
            .key(&self.keys.inflight)
            .key(&self.keys.pending)
            .key(&self.keys.leases)
            .arg(now_ms)
            .invoke_async(conn)
            .await?;
        if requeued > 0 {
            tracing::info!(requeued, "Visibility timeout expired, messages returned to queue");
        }
        Ok(requeued)
    }

    async fn try_claim(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        self.requeue_expired(&mut conn).await?;

        let lease = Uuid::new_v4();
        let deadline_ms = chrono::Utc::now().timestamp_millis()
            + i64::try_from(self.visibility_timeout.as_millis()).unwrap_or(i64::MAX / 2);

        let claimed: Option<(String, String, u32)> = self
            .claim_script
            .key(&self.keys.pending)
            .key(&self.keys.inflight)
            .key(&self.keys.receives)
            .key(&self.keys.messages)
            .key(&self.keys.leases)
            .arg(deadline_ms)
            .arg(lease.to_string())
            .invoke_async(&mut conn)
            .await?;

        let Some((id, body, receive_count)) = claimed else {
            return Ok(None);
        };

        let message_id = match Uuid::parse_str(&id) {
            Ok(message_id) => message_id,
            Err(e) => {
                tracing::error!(message_id = %id, error = %e, "Dropping message with invalid id");
                self.release(&mut conn, &id, lease, "invalid message id").await?;
                return Ok(None);
            }
        };
        let receipt = Receipt { message_id, lease };

        match serde_json::from_str::<JobRequest>(&body) {
            Ok(request) => Ok(Some(Delivery {
                job: Job {
                    job_id: message_id,
                    image_key: request.image_key,
                    origin_id: request.origin_id,
                },
                receipt,
                receive_count,
            })),
            Err(e) => {
                tracing::error!(
                    alert = true,
                    job_id = %message_id,
                    error = %e,
                    "Malformed job body, moving to dead-letter list"
                );
                self.release(&mut conn, &id, lease, "malformed job body").await?;
                Ok(None)
            }
        }
    }

    async fn release(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str,
        lease: Uuid,
        reason: &str,
    ) -> Result<bool, QueueError> {
        let released: i64 = self
            .release_script
            .key(&self.keys.inflight)
            .key(&self.keys.messages)
            .key(&self.keys.receives)
            .key(&self.keys.leases)
            .key(&self.keys.dead)
            .arg(id)
            .arg(lease.to_string())
            .arg(reason)
            .invoke_async(conn)
            .await?;
        Ok(released == 1)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, request: &JobRequest) -> Result<Uuid, QueueError> {
        let mut conn = self.connection().await?;
        let job_id = Uuid::new_v4();
        let payload = serde_json::to_string(request)?;

        let _: () = redis::pipe()
            .atomic()
            .hset(&self.keys.messages, job_id.to_string(), &payload)
            .ignore()
            .lpush(&self.keys.pending, job_id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(job_id)
    }

    async fn poll(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_claim().await? {
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
        let mut conn = self.connection().await?;
        self.release(&mut conn, &receipt.message_id.to_string(), receipt.lease, "")
            .await
    }

    async fn dead_letter(&self, receipt: &Receipt, reason: &str) -> Result<bool, QueueError> {
        let mut conn = self.connection().await?;
        // An empty reason means "delete" to the release script.
        let reason = if reason.is_empty() { "unspecified" } else { reason };
        self.release(&mut conn, &receipt.message_id.to_string(), receipt.lease, reason)
            .await
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(&self.keys.pending).await?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}
