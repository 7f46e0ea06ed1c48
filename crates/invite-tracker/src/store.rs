//! Per-community snapshot storage.
//!
//! The store is a plain keyed map. Mutations for a community are only made
//! while that community's [`SerializationGate`](crate::gate::SerializationGate)
//! is held, so each entry has a single writer at a time. Whole-snapshot
//! replacement is a single map insert, so readers never see a half-applied
//! fetch.

use dashmap::DashMap;
use invite_types::{CommunityId, InviteCode, Snapshot};
use tracing::debug;

/// In-memory `{community: snapshot}` map.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: DashMap<CommunityId, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: DashMap::new(),
        }
    }

    /// Copy of the community's snapshot, or `None` if never observed.
    pub fn get(&self, community: &CommunityId) -> Option<Snapshot> {
        self.snapshots.get(community).map(|s| s.clone())
    }

    pub fn contains(&self, community: &CommunityId) -> bool {
        self.snapshots.contains_key(community)
    }

    /// Swap in a whole new snapshot, returning the old one.
    pub fn replace(&self, community: &CommunityId, snapshot: Snapshot) -> Option<Snapshot> {
        debug!(community = %community, invites = snapshot.len(), "Replacing snapshot");
        self.snapshots.insert(community.clone(), snapshot)
    }

    /// Record uses for one code.
    ///
    /// Returns `false` when the community has no snapshot yet; the entry will
    /// arrive with the community's first full fetch instead.
    pub fn upsert(&self, community: &CommunityId, code: InviteCode, uses: u64) -> bool {
        match self.snapshots.get_mut(community) {
            Some(mut snapshot) => {
                snapshot.insert(code, uses);
                true
            }
            None => false,
        }
    }

    /// Drop one code, returning its last observed uses.
    pub fn remove(&self, community: &CommunityId, code: &InviteCode) -> Option<u64> {
        self.snapshots
            .get_mut(community)
            .and_then(|mut snapshot| snapshot.remove(code))
    }

    /// Drop a community's snapshot entirely.
    pub fn forget(&self, community: &CommunityId) -> Option<Snapshot> {
        self.snapshots.remove(community).map(|(_, snapshot)| snapshot)
    }

    /// Communities with a snapshot, in no particular order.
    pub fn communities(&self) -> Vec<CommunityId> {
        self.snapshots.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
