//! Per-community cache inspection and maintenance

use axum::{
    extract::{Path, State},
    Json,
};
use invite_tracker::InviteDiagnostics;
use invite_types::{CommunityId, Snapshot};

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};

/// List communities with a cached snapshot
pub async fn list_communities(State(state): State<AppState>) -> Json<Vec<CommunityId>> {
    Json(state.tracker.communities())
}

/// Get the cached snapshot of a community
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Snapshot>> {
    let community = CommunityId::new(id);
    let snapshot = state
        .tracker
        .current_snapshot(&community)
        .ok_or_else(|| ApiError::NotFound(format!("Community {} not observed", community)))?;

    Ok(Json(snapshot))
}

/// Refetch a community's invites and replace its snapshot
pub async fn resync_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Snapshot>> {
    let community = CommunityId::new(id);
    let snapshot = state.tracker.force_resync(&community).await?;

    tracing::info!(community = %community, invites = snapshot.len(), "Refreshed invite cache");

    Ok(Json(snapshot))
}

/// Compare cached and live invite usage without changing anything
pub async fn diagnose_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InviteDiagnostics>> {
    let community = CommunityId::new(id);
    Ok(Json(state.tracker.diagnose(&community).await?))
}
