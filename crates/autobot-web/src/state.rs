//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use car_search::SearchPipeline;
use database::Database;

use crate::session::SessionStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Accounts and chat logs.
    pub db: Database,
    /// Search pipeline over the listings table.
    pub pipeline: Arc<SearchPipeline>,
    /// Browser sessions.
    pub sessions: SessionStore,
    /// Prior messages sent with each search.
    pub history_turns: usize,
}

impl AppState {
    /// Create new application state.
    pub fn new(db: Database, pipeline: SearchPipeline, history_turns: usize) -> Self {
        Self {
            db,
            pipeline: Arc::new(pipeline),
            sessions: SessionStore::new(),
            history_turns,
        }
    }

    /// Forget browser sessions idle for longer than `timeout`.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.sessions = SessionStore::with_idle_timeout(timeout);
        self
    }
}
