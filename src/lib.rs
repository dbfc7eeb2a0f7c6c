//! Chat-driven object detection pipeline
//!
//! A chat-facing ingress service stores submitted photos and enqueues
//! detection jobs; a separate worker consumes the queue, runs detection,
//! publishes the annotated image, persists a result record and notifies the
//! originating conversation. The two processes share nothing but the queue
//! and the stores.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
