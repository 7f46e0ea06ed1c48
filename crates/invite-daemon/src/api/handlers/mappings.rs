//! Invite-to-role mapping administration

use axum::{
    extract::{Path, State},
    Json,
};
use invite_tracker::{parse_invite_code, RoleMapping};
use invite_types::{InviteCode, RoleId};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};

/// One mapping entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub code: InviteCode,
    pub role: RoleId,
}

/// Set mapping request
#[derive(Debug, Deserialize)]
pub struct SetMappingRequest {
    pub role: RoleId,
}

/// Set mapping response
#[derive(Debug, Serialize, Deserialize)]
pub struct SetMappingResponse {
    pub code: InviteCode,
    pub role: RoleId,
    pub previous: Option<RoleId>,
}

/// List all mappings
pub async fn list_mappings(State(state): State<AppState>) -> Json<Vec<MappingEntry>> {
    let entries = state
        .tracker
        .mapping()
        .entries()
        .into_iter()
        .map(|(code, role)| MappingEntry { code, role })
        .collect();
    Json(entries)
}

/// Add or replace a mapping
pub async fn set_mapping(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<SetMappingRequest>,
) -> ApiResult<Json<SetMappingResponse>> {
    let code = parse_code(&code)?;
    if request.role.as_str().trim().is_empty() {
        return Err(ApiError::BadRequest("role must not be empty".to_string()));
    }

    let previous = state
        .tracker
        .mapping()
        .set(code.clone(), request.role.clone());

    tracing::info!(code = %code, role = %request.role, "Set role mapping");

    Ok(Json(SetMappingResponse {
        code,
        role: request.role,
        previous,
    }))
}

/// Remove a mapping
pub async fn delete_mapping(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<MappingEntry>> {
    let code = parse_code(&code)?;
    let role = state
        .tracker
        .mapping()
        .remove(&code)
        .ok_or_else(|| ApiError::NotFound(format!("No mapping for invite {}", code)))?;

    tracing::info!(code = %code, role = %role, "Removed role mapping");

    Ok(Json(MappingEntry { code, role }))
}

fn parse_code(raw: &str) -> ApiResult<InviteCode> {
    parse_invite_code(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid invite code or link: {}", raw)))
}
