use detect_relay::{
    config::AppConfig,
    db,
    services::{
        chat::TelegramClient,
        detector::HttpDetector,
        notifier::{CallbackNotifier, JobNotifier, ResultNotifier},
        pipeline::{JobWorker, WorkerSettings},
        queue::RedisJobQueue,
        records::PgRecordStore,
        storage::S3BlobStore,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting detection worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = &config.worker_metrics_addr {
        let addr: SocketAddr = addr.parse().expect("Invalid WORKER_METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    metrics::describe_histogram!(
        "detection_processing_seconds",
        "Time to process a detection job end to end"
    );
    metrics::describe_counter!(
        "detection_jobs_completed_total",
        "Detection jobs that reached a terminal stage"
    );
    metrics::describe_counter!(
        "detection_jobs_failed_total",
        "Detection jobs that failed before their record was persisted"
    );
    metrics::describe_counter!(
        "detection_jobs_dead_lettered_total",
        "Detection jobs moved to the dead-letter list"
    );
    metrics::describe_counter!(
        "detection_notify_failures_total",
        "Completed jobs whose direct notification failed"
    );
    metrics::describe_gauge!(
        "detection_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    tracing::info!("Initializing services");
    let blobs = S3BlobStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize object storage client");

    let queue = RedisJobQueue::new(
        &config.redis_url,
        &config.queue_name,
        config.visibility_timeout(),
    )
    .expect("Failed to initialize job queue");

    let records = Arc::new(PgRecordStore::new(db_pool));
    let detector = HttpDetector::new(&config.detector_url, config.detector_timeout())
        .expect("Failed to initialize detector client");

    let notifier: Arc<dyn JobNotifier> = match &config.results_callback_url {
        Some(url) => {
            tracing::info!(url = %url, "Notifying through the ingress results endpoint");
            Arc::new(CallbackNotifier::new(url).expect("Failed to initialize callback client"))
        }
        None => {
            let telegram = TelegramClient::new(&config.telegram_api_url, &config.telegram_token)
                .expect("Failed to initialize Telegram client");
            Arc::new(ResultNotifier::new(
                records.clone(),
                Arc::new(telegram),
                &config.public_image_base_url,
            ))
        }
    };

    let worker = JobWorker::new(
        Arc::new(queue),
        Arc::new(blobs),
        records,
        Arc::new(detector),
        notifier,
        WorkerSettings::from(&config),
    );

    tracing::info!(
        visibility_timeout_secs = config.visibility_timeout_secs,
        detector_timeout_secs = config.detector_timeout_secs,
        max_receive_count = config.max_receive_count,
        "Worker ready, starting job processing loop"
    );

    worker.run(shutdown_signal()).await;

    tracing::info!("Worker stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
