pub mod annotate;
pub mod chat;
pub mod detector;
pub mod handler;
pub mod memory;
pub mod notifier;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod records;
pub mod storage;
