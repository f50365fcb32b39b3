//! Application state for the API server.

use podsmith_pipeline::PodcastService;
use std::sync::Arc;

/// Shared state handed to every handler.
pub struct AppState {
    /// The transport-agnostic job service.
    pub service: Arc<PodcastService>,

    /// Server start time, for health checks.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(service: Arc<PodcastService>) -> Self {
        Self {
            service,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
