//! HTTP application state

use std::sync::Arc;

use crate::audit::AuditLog;

/// Shared state for every request handler
pub struct AppState {
    pub audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self { audit }
    }

    pub fn version_count(&self) -> usize {
        self.audit.store().len()
    }
}
