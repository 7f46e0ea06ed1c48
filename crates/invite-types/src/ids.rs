//! Strongly-typed identifiers for communities, invites, members and roles
//!
//! The upstream platform hands out opaque identifiers (snowflakes, slugs).
//! They are kept as strings but wrapped in newtypes so a member id can never
//! be passed where an invite code is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a community (server, workspace) within which invite codes are unique
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(String);

impl CommunityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CommunityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque token identifying one shareable join link
///
/// Codes order lexicographically; attribution relies on this ordering to
/// break ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InviteCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InviteCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a member joining a community
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a role (permission bundle) granted on attribution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
