//! Webhook ingestion of transport events

use axum::{extract::State, http::StatusCode, Json};
use invite_types::TransportEnvelope;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::error::ApiResult;

/// Event acceptance response
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub community: String,
    pub kind: String,
}

/// Queue one transport notification.
///
/// Returns once the event is queued, not once it is processed. Callers must
/// post a community's events one at a time, in the order they occurred.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(envelope): Json<TransportEnvelope>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let response = AcceptedResponse {
        accepted: true,
        community: envelope.community.to_string(),
        kind: envelope.event.kind().to_string(),
    };

    state.tracker.ingest(envelope).await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}
