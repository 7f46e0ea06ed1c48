//! Health handler

use axum::{extract::State, Json};
use invite_tracker::RoleMapping;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub communities: usize,
    pub mappings: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        communities: state.tracker.communities().len(),
        mappings: state.tracker.mapping().entries().len(),
    })
}
