//! Error types for invite-tracker crate.
//!
//! Only fetch failures cross the resolver boundary as errors; ambiguity,
//! unknown communities and missing role mappings are ordinary outcomes.

use invite_types::{CommunityId, FetchFailureKind, RoleId};
use thiserror::Error;

/// Failure of an upstream invite fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Missing permission to list invites (e.g. "Manage Server" revoked).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Network or upstream failure that may succeed on retry.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// No response within the configured timeout.
    #[error("fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl FetchError {
    /// Classification carried into an unattributed result.
    pub fn kind(&self) -> FetchFailureKind {
        match self {
            FetchError::PermissionDenied(_) => FetchFailureKind::PermissionDenied,
            FetchError::Transient(_) => FetchFailureKind::Transient,
            FetchError::Timeout { .. } => FetchFailureKind::Timeout,
        }
    }
}

/// Errors surfaced by tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Fresh invite view could not be obtained; no state was changed.
    #[error("invite fetch failed for community {community}: {source}")]
    FetchFailed {
        community: CommunityId,
        source: FetchError,
    },

    /// The startup community listing failed.
    #[error("failed to list communities: {0}")]
    Enumeration(FetchError),

    /// The community's event queue is no longer accepting events.
    #[error("event queue closed for community {0}")]
    IngestorClosed(CommunityId),

    /// Invalid tracker configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TrackerError {
    pub fn fetch_failed(community: &CommunityId, source: FetchError) -> Self {
        TrackerError::FetchFailed {
            community: community.clone(),
            source,
        }
    }
}

/// Failure reported by a role granter. Never rolls back a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    /// The mapped role does not exist in the community.
    #[error("role not found: {0}")]
    RoleNotFound(RoleId),

    /// The platform refused the grant (hierarchy, permissions).
    #[error("grant denied: {0}")]
    Denied(String),

    /// Transport failure while granting.
    #[error("grant transport error: {0}")]
    Transport(String),
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
