//! Application state for API handlers

use std::sync::Arc;

use invite_tracker::InviteTracker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Attribution tracker
    pub tracker: Arc<InviteTracker>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// Bearer token required on `/api/v1`
    pub api_token: Arc<str>,
}

impl AppState {
    /// Create new application state
    pub fn new(tracker: Arc<InviteTracker>, api_token: &str) -> Self {
        Self {
            tracker,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
            api_token: Arc::from(api_token.trim()),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
