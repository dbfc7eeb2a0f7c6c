use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use detect_relay::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        chat::TelegramClient, queue::RedisJobQueue, records::PgRecordStore, storage::S3BlobStore,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing detect-relay ingress");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "detection_jobs_submitted_total",
        "Total detection jobs enqueued"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing object storage client");
    let blobs = S3BlobStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize object storage client");

    tracing::info!("Connecting to Redis job queue");
    let queue = RedisJobQueue::new(
        &config.redis_url,
        &config.queue_name,
        config.visibility_timeout(),
    )
    .expect("Failed to initialize job queue");

    let telegram = Arc::new(
        TelegramClient::new(&config.telegram_api_url, &config.telegram_token)
            .expect("Failed to initialize Telegram client"),
    );

    if let Some(app_url) = &config.telegram_app_url {
        let webhook_url = format!("{}/telegram/webhook", app_url.trim_end_matches('/'));
        telegram
            .set_webhook(&webhook_url, config.webhook_secret.as_deref())
            .await
            .expect("Failed to register Telegram webhook");
    }

    let state = AppState::new(
        telegram,
        Arc::new(blobs),
        Arc::new(queue),
        Arc::new(PgRecordStore::new(db_pool)),
        &config.public_image_base_url,
    )
    .with_webhook_secret(config.webhook_secret.clone())
    .with_load_test(config.enable_load_test);

    let app = Router::new()
        .route("/", get(routes::health::index))
        .route("/health", get(routes::health::health_check))
        .route("/telegram/webhook", post(routes::webhook::telegram_webhook))
        .route("/load-test", post(routes::webhook::load_test))
        .route("/results", post(routes::results::deliver_results))
        .route("/api/v1/results/{job_id}", get(routes::results::get_result))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
