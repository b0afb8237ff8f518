//! API shared state

use std::sync::Arc;

use cadence_core::ReviewService;

/// Shared application state for the HTTP API
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReviewService>,
}

impl AppState {
    pub fn new(service: Arc<ReviewService>) -> Self {
        Self { service }
    }
}
