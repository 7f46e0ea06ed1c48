//! Invite code to role mapping.
//!
//! The mapping is external configuration: administrators edit it, the
//! attribution core only reads it. Lookups are keyed by code and need no
//! community-level exclusivity.

use std::collections::BTreeMap;

use invite_types::{AttributionResult, InviteCode, RoleId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Read/write access to the invite-to-role table.
pub trait RoleMapping: Send + Sync {
    /// Role configured for a code, if any.
    fn role_for(&self, code: &InviteCode) -> Option<RoleId>;

    /// Add or replace a mapping, returning the previous role.
    fn set(&self, code: InviteCode, role: RoleId) -> Option<RoleId>;

    /// Remove a mapping, returning the removed role.
    fn remove(&self, code: &InviteCode) -> Option<RoleId>;

    /// All mappings, ordered by code.
    fn entries(&self) -> Vec<(InviteCode, RoleId)>;

    /// Decide what the role-granting collaborator should do with a result.
    fn decide(&self, result: &AttributionResult) -> RoleDecision {
        match result.attributed_code() {
            Some(code) => match self.role_for(code) {
                Some(role) => RoleDecision::Grant {
                    code: code.clone(),
                    role,
                },
                None => RoleDecision::NoMappingConfigured { code: code.clone() },
            },
            None => RoleDecision::NoAttribution,
        }
    }
}

/// What to do with an attributed join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoleDecision {
    /// Grant `role` because the member joined through `code`.
    Grant { code: InviteCode, role: RoleId },

    /// Attribution succeeded but `code` has no role configured.
    NoMappingConfigured { code: InviteCode },

    /// The join was not attributed; nothing to grant.
    NoAttribution,
}

/// In-memory role mapping.
#[derive(Debug, Default)]
pub struct InMemoryRoleMapping {
    entries: RwLock<BTreeMap<InviteCode, RoleId>>,
}

impl InMemoryRoleMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (InviteCode, RoleId)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl RoleMapping for InMemoryRoleMapping {
    fn role_for(&self, code: &InviteCode) -> Option<RoleId> {
        self.entries.read().get(code).cloned()
    }

    fn set(&self, code: InviteCode, role: RoleId) -> Option<RoleId> {
        self.entries.write().insert(code, role)
    }

    fn remove(&self, code: &InviteCode) -> Option<RoleId> {
        self.entries.write().remove(code)
    }

    fn entries(&self) -> Vec<(InviteCode, RoleId)> {
        self.entries
            .read()
            .iter()
            .map(|(code, role)| (code.clone(), role.clone()))
            .collect()
    }
}

/// Extract an invite code from a bare code or an invite link.
///
/// Accepts `abc123`, `host.tld/abc123`, `https://host.tld/abc123` and
/// `https://host.tld/invite/abc123`, ignoring query strings and fragments.
/// Codes are ASCII alphanumeric plus `-`.
pub fn parse_invite_code(input: &str) -> Option<InviteCode> {
    let trimmed = input.trim();
    let (has_scheme, without_scheme) = match trimmed.split_once("://") {
        Some((_, rest)) => (true, rest),
        None => (false, trimmed),
    };
    let path = without_scheme.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let candidate = match segments.as_slice() {
        [] => return None,
        // A lone segment is a host when written as a link
        [_] if has_scheme || path.contains('/') => return None,
        [single] => *single,
        [.., last] => *last,
    };

    if !candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return None;
    }

    Some(InviteCode::new(candidate))
}
