use std::sync::Arc;

use crate::services::{
    chat::ChatTransport, handler::ChatHandler, notifier::ResultNotifier, producer::JobProducer,
    queue::JobQueue, records::RecordStore, storage::BlobStore,
};

/// Shared application state passed to all route handlers of the ingress service.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ChatHandler>,
    pub notifier: Arc<ResultNotifier>,
    pub queue: Arc<dyn JobQueue>,
    pub records: Arc<dyn RecordStore>,
    pub webhook_secret: Option<Arc<str>>,
    pub enable_load_test: bool,
}

impl AppState {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
        records: Arc<dyn RecordStore>,
        public_image_base_url: &str,
    ) -> Self {
        let producer = JobProducer::new(blobs, queue.clone());
        let handler = ChatHandler::new(transport.clone(), producer);
        let notifier = ResultNotifier::new(records.clone(), transport, public_image_base_url);

        Self {
            handler: Arc::new(handler),
            notifier: Arc::new(notifier),
            queue,
            records,
            webhook_secret: None,
            enable_load_test: false,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.map(Arc::from);
        self
    }

    pub fn with_load_test(mut self, enabled: bool) -> Self {
        self.enable_load_test = enabled;
        self
    }
}
