//! Invite records and usage snapshots

use crate::{InviteCode, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// One invite as reported by the upstream platform at fetch time
///
/// Records are transient: only the `(code, uses)` pair survives into a
/// [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
    /// Invite code
    pub code: InviteCode,

    /// Cumulative number of joins through this invite
    pub uses: u64,

    /// Maximum number of uses, if limited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u64>,

    /// Expiry time, if the invite is temporary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Member who created the invite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inviter: Option<MemberId>,
}

impl InviteRecord {
    /// Create a record with only a code and a usage count
    pub fn new(code: impl Into<InviteCode>, uses: u64) -> Self {
        Self {
            code: code.into(),
            uses,
            max_uses: None,
            expires_at: None,
            inviter: None,
        }
    }

    pub fn with_max_uses(mut self, max_uses: u64) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_inviter(mut self, inviter: MemberId) -> Self {
        self.inviter = Some(inviter);
        self
    }

    /// Whether the invite is past its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Whether the invite has reached its use limit (0 means unlimited)
    pub fn is_exhausted(&self) -> bool {
        match self.max_uses {
            Some(0) | None => false,
            Some(max) => self.uses >= max,
        }
    }
}

/// Last-observed `{code: uses}` view of one community
///
/// A code present here was observed at least once; absence means it was
/// never observed or has since been removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    uses: BTreeMap<InviteCode, u64>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a fetched invite list
    pub fn from_records(records: &[InviteRecord]) -> Self {
        records
            .iter()
            .map(|record| (record.code.clone(), record.uses))
            .collect()
    }

    /// Last observed uses for `code`, or 0 if never observed
    pub fn uses_of(&self, code: &InviteCode) -> u64 {
        self.uses.get(code).copied().unwrap_or(0)
    }

    pub fn get(&self, code: &InviteCode) -> Option<u64> {
        self.uses.get(code).copied()
    }

    pub fn contains(&self, code: &InviteCode) -> bool {
        self.uses.contains_key(code)
    }

    /// Set the observed uses for a code, returning the previous value
    pub fn insert(&mut self, code: InviteCode, uses: u64) -> Option<u64> {
        self.uses.insert(code, uses)
    }

    pub fn remove(&mut self, code: &InviteCode) -> Option<u64> {
        self.uses.remove(code)
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }

    /// Iterate entries in code order
    pub fn iter(&self) -> btree_map::Iter<'_, InviteCode, u64> {
        self.uses.iter()
    }

    pub fn codes(&self) -> impl Iterator<Item = &InviteCode> {
        self.uses.keys()
    }
}

impl FromIterator<(InviteCode, u64)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (InviteCode, u64)>>(iter: T) -> Self {
        Self {
            uses: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a InviteCode, &'a u64);
    type IntoIter = btree_map::Iter<'a, InviteCode, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.uses.iter()
    }
}
