//! The tracker facade.
//!
//! [`InviteTracker`] wires the snapshot store, serialization gate, resolver,
//! event ingestor and attribution sink together. Every snapshot read-modify-write
//! for a community runs inside that community's gate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use invite_types::{
    AttributionResult, CommunityId, InviteCode, MemberId, RoleId, Snapshot, TransportEnvelope,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::gate::SerializationGate;
use crate::ingestor::{EventHandler, EventIngestor, InviteEvent};
use crate::mapping::RoleMapping;
use crate::queue::CommunityQueues;
use crate::resolver::AttributionResolver;
use crate::sink::{AttributionSink, Delivery, SinkWorker};
use crate::source::InviteSource;
use crate::store::SnapshotStore;

/// Outcome of startup enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub observed: Vec<CommunityId>,
    pub failed: Vec<(CommunityId, String)>,
}

/// Cached versus live state of one invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteDiagnostic {
    pub code: InviteCode,
    pub cached_uses: Option<u64>,
    pub live_uses: u64,
    pub max_uses: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub inviter: Option<MemberId>,
    pub role: Option<RoleId>,
    pub expired: bool,
    pub exhausted: bool,
}

/// Read-only report comparing a community's cache with the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteDiagnostics {
    pub community: CommunityId,
    pub generated_at: DateTime<Utc>,
    pub observed: bool,
    pub invites: Vec<InviteDiagnostic>,
    /// Codes still cached but no longer listed upstream.
    pub stale: Vec<InviteCode>,
    pub vanity_code: Option<InviteCode>,
    pub vanity_role: Option<RoleId>,
}

struct TrackerCore {
    store: Arc<SnapshotStore>,
    gate: SerializationGate,
    resolver: AttributionResolver,
    deliveries: CommunityQueues<Delivery>,
}

impl TrackerCore {
    async fn observe(&self, community: &CommunityId) -> TrackerResult<Snapshot> {
        self.gate
            .run(community, || async {
                self.resolver
                    .resync(community)
                    .await
                    .map_err(|e| TrackerError::fetch_failed(community, e))
            })
            .await
    }

    /// Attribute under the gate, then queue the result for the sink without
    /// waiting for it.
    async fn process_join(
        &self,
        community: &CommunityId,
        member: &MemberId,
        done: Option<oneshot::Sender<()>>,
    ) -> AttributionResult {
        let result = self
            .gate
            .run(community, || self.resolver.resolve(community, member))
            .await;

        let delivery = Delivery {
            member: member.clone(),
            result: result.clone(),
            done,
        };
        if let Err(e) = self.deliveries.push(community, delivery).await {
            warn!(community = %community, member = %member, error = %e, "Result not delivered to sink");
        }
        result
    }
}

#[async_trait]
impl EventHandler for TrackerCore {
    async fn handle(&self, event: InviteEvent) {
        match event {
            InviteEvent::CommunityObserved { community } => {
                if let Err(e) = self.observe(&community).await {
                    error!(community = %community, error = %e, "Failed to cache invites");
                }
            }
            InviteEvent::CommunityRemoved { community } => {
                let dropped = self
                    .gate
                    .run(&community, || async { self.store.forget(&community) })
                    .await;
                info!(
                    community = %community,
                    invites = dropped.map(|s| s.len()).unwrap_or(0),
                    "Dropped cached invites"
                );
            }
            InviteEvent::InviteAdded {
                community,
                code,
                uses,
            } => {
                let applied = self
                    .gate
                    .run(&community, || async {
                        self.store.upsert(&community, code.clone(), uses)
                    })
                    .await;
                if applied {
                    info!(community = %community, code = %code, uses, "Cached new invite");
                } else {
                    debug!(community = %community, code = %code, "Ignoring invite for unobserved community");
                }
            }
            InviteEvent::InviteRemoved { community, code } => {
                let removed = self
                    .gate
                    .run(&community, || async { self.store.remove(&community, &code) })
                    .await;
                if removed.is_some() {
                    info!(community = %community, code = %code, "Removed invite from cache");
                }
            }
            InviteEvent::MemberJoined { community, member } => {
                self.process_join(&community, &member, None).await;
            }
        }
    }
}

/// Invite attribution service.
pub struct InviteTracker {
    core: Arc<TrackerCore>,
    ingestor: EventIngestor,
    source: Arc<dyn InviteSource>,
    mapping: Arc<dyn RoleMapping>,
}

impl InviteTracker {
    /// Build a tracker. Fails on invalid configuration.
    pub fn new(
        config: TrackerConfig,
        source: Arc<dyn InviteSource>,
        mapping: Arc<dyn RoleMapping>,
        sink: Arc<dyn AttributionSink>,
    ) -> TrackerResult<Self> {
        config.validate()?;

        let store = Arc::new(SnapshotStore::new());
        let resolver =
            AttributionResolver::new(&config, source.clone(), store.clone(), mapping.clone());
        let deliveries = CommunityQueues::new(
            "attributions",
            Arc::new(SinkWorker(sink)),
            config.queue_capacity,
            config.worker_idle_timeout(),
        );
        let core = Arc::new(TrackerCore {
            store,
            gate: SerializationGate::new(),
            resolver,
            deliveries,
        });
        let ingestor = EventIngestor::new(
            core.clone(),
            config.queue_capacity,
            config.worker_idle_timeout(),
        );

        Ok(Self {
            core,
            ingestor,
            source,
            mapping,
        })
    }

    /// Observe every community the platform reports at startup.
    ///
    /// Communities are fetched concurrently; a failure for one is logged and
    /// does not prevent the others from being cached.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> TrackerResult<BootstrapReport> {
        let communities = self
            .source
            .list_communities()
            .await
            .map_err(TrackerError::Enumeration)?;

        info!(communities = communities.len(), "Caching invites for known communities");

        let results = join_all(communities.iter().map(|c| self.core.observe(c))).await;

        let mut report = BootstrapReport::default();
        for (community, result) in communities.into_iter().zip(results) {
            match result {
                Ok(snapshot) => {
                    debug!(community = %community, invites = snapshot.len(), "Community observed");
                    report.observed.push(community);
                }
                Err(e) => {
                    warn!(community = %community, error = %e, "Skipping community");
                    report.failed.push((community, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Fetch and cache a community's full invite list.
    #[instrument(skip(self), fields(community = %community))]
    pub async fn observe_community(&self, community: &CommunityId) -> TrackerResult<Snapshot> {
        self.core.observe(community).await
    }

    /// Queue a transport notification for in-order processing.
    pub async fn ingest(&self, envelope: TransportEnvelope) -> TrackerResult<()> {
        self.ingestor.ingest(envelope).await
    }

    /// Attribute one join directly, bypassing the event queue.
    ///
    /// The result goes through the same delivery queue as a queued
    /// `MemberJoined` event; this call returns once the sink has seen it.
    pub async fn process_join(
        &self,
        community: &CommunityId,
        member: &MemberId,
    ) -> AttributionResult {
        let (done_tx, done_rx) = oneshot::channel();
        let result = self.core.process_join(community, member, Some(done_tx)).await;
        let _ = done_rx.await;
        result
    }

    /// Refetch a community's invites and replace its snapshot without
    /// attributing anything. Idempotent when upstream is unchanged.
    #[instrument(skip(self), fields(community = %community))]
    pub async fn force_resync(&self, community: &CommunityId) -> TrackerResult<Snapshot> {
        self.core.observe(community).await
    }

    pub fn current_snapshot(&self, community: &CommunityId) -> Option<Snapshot> {
        self.core.store.get(community)
    }

    /// Compare the cached snapshot with a fresh fetch without changing either.
    #[instrument(skip(self), fields(community = %community))]
    pub async fn diagnose(&self, community: &CommunityId) -> TrackerResult<InviteDiagnostics> {
        let core = &self.core;
        core.gate
            .run(community, || async {
                let cached = core.store.get(community);
                let records = core
                    .resolver
                    .fetch_invites(community)
                    .await
                    .map_err(|e| TrackerError::fetch_failed(community, e))?;
                let vanity_code = match core.resolver.vanity_code(community).await {
                    Ok(code) => code,
                    Err(e) => {
                        warn!(error = %e, "Failed to look up vanity code");
                        None
                    }
                };

                let now = Utc::now();
                let mut invites: Vec<InviteDiagnostic> = records
                    .iter()
                    .map(|record| InviteDiagnostic {
                        code: record.code.clone(),
                        cached_uses: cached.as_ref().and_then(|s| s.get(&record.code)),
                        live_uses: record.uses,
                        max_uses: record.max_uses,
                        expires_at: record.expires_at,
                        inviter: record.inviter.clone(),
                        role: self.mapping.role_for(&record.code),
                        expired: record.is_expired(now),
                        exhausted: record.is_exhausted(),
                    })
                    .collect();
                invites.sort_by(|a, b| a.code.cmp(&b.code));

                let live = Snapshot::from_records(&records);
                let stale = cached
                    .as_ref()
                    .map(|s| s.codes().filter(|c| !live.contains(c)).cloned().collect())
                    .unwrap_or_default();

                Ok::<_, TrackerError>(InviteDiagnostics {
                    community: community.clone(),
                    generated_at: now,
                    observed: cached.is_some(),
                    invites,
                    stale,
                    vanity_role: vanity_code.as_ref().and_then(|c| self.mapping.role_for(c)),
                    vanity_code,
                })
            })
            .await
    }

    /// Communities with a cached snapshot, sorted.
    pub fn communities(&self) -> Vec<CommunityId> {
        let mut communities = self.core.store.communities();
        communities.sort();
        communities
    }

    pub fn mapping(&self) -> &Arc<dyn RoleMapping> {
        &self.mapping
    }

    /// Communities with a running event worker.
    pub fn active_communities(&self) -> Vec<CommunityId> {
        self.ingestor.active_communities()
    }

    /// Stop accepting events, finish queued ones and flush pending results to
    /// the sink.
    pub async fn shutdown(&self) {
        self.ingestor.shutdown().await;
        let flushed = self.core.deliveries.close().await;
        info!(delivery_workers = flushed, "Invite tracker stopped");
    }
}
