//! HTTP application state: wraps `ServiceState` with HTTP-specific fields.
//!
//! `AppState` derefs to `ServiceState`, so handlers reach the pipeline,
//! admission controller and metrics directly.

use std::ops::Deref;
use std::sync::Arc;

use speech_gateway_service::ServiceState;

/// Shared HTTP application state, cloneable across handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    service: ServiceState,
    cors_origins: Vec<String>,
    upload_limit: usize,
}

impl Deref for AppState {
    type Target = ServiceState;

    fn deref(&self) -> &ServiceState {
        &self.inner.service
    }
}

impl AppState {
    pub fn new(service: ServiceState, cors_origins: Vec<String>, upload_limit: usize) -> Self {
        Self {
            inner: Arc::new(AppInner {
                service,
                cors_origins,
                upload_limit,
            }),
        }
    }

    /// Returns the configured CORS allowed origins.
    pub fn cors_origins(&self) -> &[String] {
        &self.inner.cors_origins
    }

    /// Maximum accepted request body size for uploads, in bytes.
    pub fn upload_limit(&self) -> usize {
        self.inner.upload_limit
    }

    pub fn service(&self) -> &ServiceState {
        &self.inner.service
    }
}
