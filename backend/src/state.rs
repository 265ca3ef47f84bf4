//! Shared handler state
//!
//! Holds the injected repository; cloned into every request.

use crate::repository::Repository;
use std::sync::Arc;

/// Application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    /// Storage for services and subscriptions
    pub repository: Arc<dyn Repository>,
    /// Name reported by the health check
    pub app_name: String,
}

impl AppState {
    /// Create application state around a repository
    pub fn new(repository: Arc<dyn Repository>, app_name: impl Into<String>) -> Self {
        Self {
            repository,
            app_name: app_name.into(),
        }
    }
}
