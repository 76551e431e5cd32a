use std::sync::Arc;

use crate::orchestration::IngestService;

/// Shared state of the webhook handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
}

impl AppState {
    pub fn new(service: Arc<IngestService>) -> Self {
        Self { service }
    }
}
