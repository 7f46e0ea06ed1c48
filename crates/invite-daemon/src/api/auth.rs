//! Bearer-token check for the administrative API

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::state::AppState;
use crate::error::ApiError;

/// Reject requests that do not carry `Authorization: Bearer <api token>`.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = matches!(
        bearer_token(request.headers()),
        Some(token) if !state.api_token.is_empty() && token == &*state.api_token
    );

    if authorized {
        next.run(request).await
    } else {
        ApiError::Unauthorized("missing or invalid bearer token".to_string()).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim)
}
