//! Upstream invite data source.
//!
//! The transport layer implements [`InviteSource`]. [`StaticInviteSource`] is
//! an in-memory implementation with scriptable counters, failures and latency,
//! suitable for development and testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use invite_types::{CommunityId, InviteCode, InviteRecord};

use crate::error::FetchError;

/// Fetch operations exposed by the upstream platform.
#[async_trait]
pub trait InviteSource: Send + Sync {
    /// Full live invite list for a community.
    async fn list_invites(&self, community: &CommunityId) -> Result<Vec<InviteRecord>, FetchError>;

    /// Communities visible at startup.
    async fn list_communities(&self) -> Result<Vec<CommunityId>, FetchError>;

    /// The community's permanent vanity code, if it has one.
    async fn vanity_code(&self, community: &CommunityId) -> Result<Option<InviteCode>, FetchError>;
}

/// In-memory invite source.
#[derive(Debug, Default)]
pub struct StaticInviteSource {
    invites: DashMap<CommunityId, BTreeMap<InviteCode, InviteRecord>>,
    vanity: DashMap<CommunityId, InviteCode>,
    failures: DashMap<CommunityId, FetchError>,
    latency: DashMap<CommunityId, Duration>,
    fetches: AtomicU64,
}

impl StaticInviteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a community's invite list.
    pub fn set_invites(&self, community: &CommunityId, records: Vec<InviteRecord>) {
        let invites = records
            .into_iter()
            .map(|record| (record.code.clone(), record))
            .collect();
        self.invites.insert(community.clone(), invites);
    }

    /// Set the use count of one invite, creating it if needed.
    pub fn set_uses(&self, community: &CommunityId, code: &str, uses: u64) {
        let code = InviteCode::new(code);
        let mut invites = self.invites.entry(community.clone()).or_default();
        invites
            .entry(code.clone())
            .and_modify(|record| record.uses = uses)
            .or_insert_with(|| InviteRecord::new(code, uses));
    }

    /// Simulate a member joining through `code`.
    pub fn record_join(&self, community: &CommunityId, code: &str) {
        let code = InviteCode::new(code);
        let mut invites = self.invites.entry(community.clone()).or_default();
        invites
            .entry(code.clone())
            .and_modify(|record| record.uses += 1)
            .or_insert_with(|| InviteRecord::new(code, 1));
    }

    pub fn remove_invite(&self, community: &CommunityId, code: &str) {
        if let Some(mut invites) = self.invites.get_mut(community) {
            invites.remove(&InviteCode::new(code));
        }
    }

    pub fn set_vanity(&self, community: &CommunityId, code: &str) {
        self.vanity.insert(community.clone(), InviteCode::new(code));
    }

    /// Make every fetch for `community` fail until [`clear_failure`](Self::clear_failure).
    pub fn fail_with(&self, community: &CommunityId, error: FetchError) {
        self.failures.insert(community.clone(), error);
    }

    pub fn clear_failure(&self, community: &CommunityId) {
        self.failures.remove(community);
    }

    /// Delay every fetch for `community`.
    pub fn set_latency(&self, community: &CommunityId, latency: Duration) {
        self.latency.insert(community.clone(), latency);
    }

    /// Number of invite list fetches served (including failed ones).
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn simulate(&self, community: &CommunityId) -> Result<(), FetchError> {
        let latency = self.latency.get(community).map(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.get(community) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InviteSource for StaticInviteSource {
    async fn list_invites(&self, community: &CommunityId) -> Result<Vec<InviteRecord>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate(community).await?;
        Ok(self
            .invites
            .get(community)
            .map(|invites| invites.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_communities(&self) -> Result<Vec<CommunityId>, FetchError> {
        let mut communities: Vec<CommunityId> =
            self.invites.iter().map(|r| r.key().clone()).collect();
        communities.sort();
        Ok(communities)
    }

    async fn vanity_code(&self, community: &CommunityId) -> Result<Option<InviteCode>, FetchError> {
        self.simulate(community).await?;
        Ok(self.vanity.get(community).map(|code| code.clone()))
    }
}
