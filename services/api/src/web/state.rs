//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use crate::pipeline::{JobContext, ProviderRegistry};
use mock_exam_core::ports::{DatabaseService, DocumentRenderer, IdentityProvider, ObjectStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub store: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub providers: Arc<ProviderRegistry>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

impl AppState {
    /// The subset of collaborators a generation job runs with.
    pub fn job_context(&self) -> JobContext {
        JobContext {
            db: self.db.clone(),
            store: self.store.clone(),
            providers: self.providers.clone(),
            renderer: self.renderer.clone(),
        }
    }
}
