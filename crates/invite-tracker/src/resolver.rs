//! Join attribution.
//!
//! For each join the resolver fetches the live invite list, diffs it against
//! the cached snapshot, picks the invite whose counter moved, and then
//! replaces the snapshot with the live view. Replacing on every successful
//! fetch means an increment is consumed by exactly one join.
//!
//! Callers must hold the community's gate around [`AttributionResolver::resolve`]
//! and [`AttributionResolver::resync`].

use std::sync::Arc;
use std::time::Duration;

use invite_types::{
    AttributionResult, CommunityId, InviteCode, InviteRecord, MemberId, Snapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::TrackerConfig;
use crate::error::FetchError;
use crate::mapping::RoleMapping;
use crate::source::InviteSource;
use crate::store::SnapshotStore;

/// An invite whose usage counter increased since the cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: InviteCode,
    pub previous_uses: u64,
    pub new_uses: u64,
}

impl Candidate {
    pub fn delta(&self) -> u64 {
        self.new_uses - self.previous_uses
    }
}

/// Every code whose live uses exceed its cached uses.
///
/// Codes missing from `cached` count from zero. Codes only present in
/// `cached` are ignored.
pub fn find_candidates(cached: &Snapshot, live: &Snapshot) -> Vec<Candidate> {
    live.iter()
        .filter_map(|(code, &new_uses)| {
            let previous_uses = cached.uses_of(code);
            (new_uses > previous_uses).then(|| Candidate {
                code: code.clone(),
                previous_uses,
                new_uses,
            })
        })
        .collect()
}

/// Largest delta wins; equal deltas go to the lexicographically smallest code.
pub fn select_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| {
        b.delta()
            .cmp(&a.delta())
            .then_with(|| a.code.cmp(&b.code))
    })
}

/// Diffs fresh invite views against cached snapshots.
pub struct AttributionResolver {
    source: Arc<dyn InviteSource>,
    store: Arc<SnapshotStore>,
    mapping: Arc<dyn RoleMapping>,
    fetch_timeout: Duration,
    fallback_to_vanity: bool,
}

impl AttributionResolver {
    pub fn new(
        config: &TrackerConfig,
        source: Arc<dyn InviteSource>,
        store: Arc<SnapshotStore>,
        mapping: Arc<dyn RoleMapping>,
    ) -> Self {
        Self {
            source,
            store,
            mapping,
            fetch_timeout: config.fetch_timeout(),
            fallback_to_vanity: config.fallback_to_vanity,
        }
    }

    /// Fetch the live invite list, failing fast after the configured timeout.
    pub async fn fetch_invites(
        &self,
        community: &CommunityId,
    ) -> Result<Vec<InviteRecord>, FetchError> {
        match tokio::time::timeout(self.fetch_timeout, self.source.list_invites(community)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    /// Fetch the community's vanity code under the same timeout.
    pub async fn vanity_code(
        &self,
        community: &CommunityId,
    ) -> Result<Option<InviteCode>, FetchError> {
        match tokio::time::timeout(self.fetch_timeout, self.source.vanity_code(community)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    /// Attribute one join.
    ///
    /// On fetch failure the snapshot is left untouched and the result is
    /// `Unattributed` with a fetch-failed reason.
    #[instrument(skip(self), fields(community = %community, member = %member))]
    pub async fn resolve(&self, community: &CommunityId, member: &MemberId) -> AttributionResult {
        let cached = self.store.get(community).unwrap_or_else(|| {
            debug!("No cached invites for community; treating as empty");
            Snapshot::new()
        });

        let live = match self.fetch_invites(community).await {
            Ok(records) => Snapshot::from_records(&records),
            Err(e) => {
                error!(error = %e, "Failed to fetch invites; snapshot left unchanged");
                return AttributionResult::fetch_failed(e.kind(), e.to_string());
            }
        };

        debug!(cached = cached.len(), current = live.len(), "Checking invite usage");
        for (code, uses) in &live {
            debug!(code = %code, cached = cached.uses_of(code), current = uses, "Invite usage");
        }

        let candidates = find_candidates(&cached, &live);
        let chosen = select_candidate(&candidates).cloned();

        if candidates.len() > 1 {
            let all: Vec<String> = candidates
                .iter()
                .map(|c| format!("{}(+{})", c.code, c.delta()))
                .collect();
            warn!(
                candidates = ?all,
                chosen = %chosen.as_ref().map(|c| c.code.as_str()).unwrap_or_default(),
                "Multiple invite counters increased; attributing by largest delta"
            );
        }

        self.store.replace(community, live);

        match chosen {
            Some(candidate) => {
                info!(
                    code = %candidate.code,
                    previous_uses = candidate.previous_uses,
                    new_uses = candidate.new_uses,
                    "Found used invite"
                );
                AttributionResult::attributed(
                    candidate.code,
                    candidate.previous_uses,
                    candidate.new_uses,
                )
            }
            None => self.fallback(community).await,
        }
    }

    /// Refetch and replace the snapshot without attributing anything.
    #[instrument(skip(self), fields(community = %community))]
    pub async fn resync(&self, community: &CommunityId) -> Result<Snapshot, FetchError> {
        let records = self.fetch_invites(community).await?;
        let snapshot = Snapshot::from_records(&records);
        self.store.replace(community, snapshot.clone());
        info!(invites = snapshot.len(), "Cached invites");
        Ok(snapshot)
    }

    async fn fallback(&self, community: &CommunityId) -> AttributionResult {
        if !self.fallback_to_vanity {
            info!("Could not determine which invite was used");
            return AttributionResult::no_increment();
        }

        match self.vanity_code(community).await {
            Ok(Some(vanity_code)) => {
                if self.mapping.role_for(&vanity_code).is_some() {
                    info!(vanity_code = %vanity_code, "Member likely joined via vanity code");
                    AttributionResult::AttributedByFallback { vanity_code }
                } else {
                    info!(
                        vanity_code = %vanity_code,
                        "Could not determine which invite was used; vanity code has no role mapping"
                    );
                    AttributionResult::no_increment()
                }
            }
            Ok(None) => {
                info!("Could not determine which invite was used");
                AttributionResult::no_increment()
            }
            Err(e) => {
                warn!(error = %e, "Failed to look up vanity code");
                AttributionResult::no_increment()
            }
        }
    }

    fn timeout_error(&self) -> FetchError {
        FetchError::Timeout {
            timeout_ms: self.fetch_timeout.as_millis() as u64,
        }
    }
}
