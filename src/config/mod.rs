use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8443"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string (result records)
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// Telegram bot token
    pub telegram_token: String,

    /// Telegram Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    /// Public base URL of the ingress service. When set, the webhook is
    /// registered at startup.
    #[serde(default)]
    pub telegram_app_url: Option<String>,

    /// Secret expected in the `X-Telegram-Bot-Api-Secret-Token` header
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Bucket holding raw and annotated images
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// Prefix under which annotated images are reachable by chat users
    pub public_image_base_url: String,

    /// Base URL of the object detection inference service
    pub detector_url: String,

    /// Ingress pull endpoint. When set, the worker notifies through it
    /// instead of pushing to the chat transport directly.
    #[serde(default)]
    pub results_callback_url: Option<String>,

    /// Namespace for the Redis queue keys
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Upper bound on one inference request; must stay below the visibility
    /// timeout so a stalled detector cannot outlive the lease.
    #[serde(default = "default_detector_timeout_secs")]
    pub detector_timeout_secs: u64,

    #[serde(default = "default_poll_wait_secs")]
    pub poll_wait_secs: u64,

    /// Deliveries beyond this count are dead-lettered
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Attempts at direct notification before giving up (1 = no retry)
    #[serde(default = "default_notify_attempts")]
    pub notify_attempts: u32,

    #[serde(default)]
    pub enable_load_test: bool,

    /// Prometheus listener for the worker process
    #[serde(default)]
    pub worker_metrics_addr: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_queue_name() -> String {
    "detect".to_string()
}

fn default_visibility_timeout_secs() -> u64 {
    120
}

fn default_detector_timeout_secs() -> u64 {
    60
}

fn default_poll_wait_secs() -> u64 {
    5
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_notify_attempts() -> u32 {
    1
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Self>()?.validated()
    }

    fn validated(self) -> Result<Self, envy::Error> {
        if self.detector_timeout_secs == 0
            || self.detector_timeout_secs >= self.visibility_timeout_secs
        {
            return Err(envy::Error::Custom(format!(
                "detector timeout ({}s) must be positive and below the visibility timeout ({}s)",
                self.detector_timeout_secs, self.visibility_timeout_secs
            )));
        }
        Ok(self)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_secs)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }
}
