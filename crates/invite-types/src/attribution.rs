//! Attribution outcomes for a processed join

use crate::InviteCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of processing one member join
///
/// Never persisted; handed once to the attribution sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttributionResult {
    /// A counted invite's usage increased between snapshot and fetch
    Attributed {
        code: InviteCode,
        previous_uses: u64,
        new_uses: u64,
    },

    /// No counter moved, but the community's vanity entry point is role-mapped
    AttributedByFallback { vanity_code: InviteCode },

    /// The join could not be tied to an invite
    Unattributed { reason: UnattributedReason },
}

impl AttributionResult {
    pub fn attributed(code: InviteCode, previous_uses: u64, new_uses: u64) -> Self {
        Self::Attributed {
            code,
            previous_uses,
            new_uses,
        }
    }

    pub fn no_increment() -> Self {
        Self::Unattributed {
            reason: UnattributedReason::NoIncrement,
        }
    }

    pub fn fetch_failed(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self::Unattributed {
            reason: UnattributedReason::FetchFailed {
                kind,
                message: message.into(),
            },
        }
    }

    /// The invite or vanity code the join was attributed to, if any
    pub fn attributed_code(&self) -> Option<&InviteCode> {
        match self {
            Self::Attributed { code, .. } => Some(code),
            Self::AttributedByFallback { vanity_code } => Some(vanity_code),
            Self::Unattributed { .. } => None,
        }
    }

    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Unattributed {
                reason: UnattributedReason::FetchFailed { .. }
            }
        )
    }
}

impl fmt::Display for AttributionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attributed {
                code,
                previous_uses,
                new_uses,
            } => write!(f, "attributed to {} ({} -> {})", code, previous_uses, new_uses),
            Self::AttributedByFallback { vanity_code } => {
                write!(f, "attributed to vanity code {}", vanity_code)
            }
            Self::Unattributed { reason } => write!(f, "unattributed: {}", reason),
        }
    }
}

/// Why a join was left unattributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnattributedReason {
    /// The fresh fetch showed no usage increase and no mapped vanity code applied
    NoIncrement,

    /// The fresh fetch failed; the snapshot was left untouched
    FetchFailed {
        kind: FetchFailureKind,
        message: String,
    },
}

impl fmt::Display for UnattributedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIncrement => write!(f, "no invite usage increased"),
            Self::FetchFailed { kind, message } => {
                write!(f, "invite fetch failed ({}): {}", kind, message)
            }
        }
    }
}

/// Classification of an upstream fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    /// Missing permission to list invites
    PermissionDenied,
    /// Network or upstream error that may succeed on retry
    Transient,
    /// No response within the configured fetch timeout
    Timeout,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailureKind::PermissionDenied => write!(f, "permission denied"),
            FetchFailureKind::Transient => write!(f, "transient"),
            FetchFailureKind::Timeout => write!(f, "timeout"),
        }
    }
}
