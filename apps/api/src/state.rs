use std::sync::Arc;

use crate::interview::registry::SessionRegistry;
use crate::interview::session::InterviewEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Live interviews keyed by session id.
    pub sessions: SessionRegistry,
    pub engine: Arc<InterviewEngine>,
}
