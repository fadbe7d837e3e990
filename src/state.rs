//! Shared handler state.

use crate::services::record_service::RecordService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub records: RecordService,
    /// Deployment identity, passed through untouched.
    pub server_number: Arc<str>,
    pub port: u16,
}

impl AppState {
    pub fn new(records: RecordService, server_number: impl Into<Arc<str>>, port: u16) -> Self {
        Self {
            records,
            server_number: server_number.into(),
            port,
        }
    }
}
