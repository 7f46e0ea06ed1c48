//! Event ingestion with per-community ordering.
//!
//! Transport notifications are normalized into [`InviteEvent`]s and queued on
//! a dedicated worker per community. A worker handles its events one at a
//! time in arrival order, so a community's events are never reordered while
//! different communities proceed in parallel.
//!
//! Callers must submit a community's notifications sequentially (in the order
//! the transport emitted them); submissions for different communities may be
//! concurrent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use invite_types::{CommunityId, InviteCode, MemberId, TransportEnvelope, TransportEvent};
use tracing::{debug, info, instrument};

use crate::error::TrackerResult;
use crate::queue::{CommunityQueues, QueueWorker};

/// Internal event kinds derived from transport notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteEvent {
    /// First sight of a community; its snapshot is rebuilt from a full fetch.
    CommunityObserved { community: CommunityId },

    /// The community is gone; its snapshot may be dropped.
    CommunityRemoved { community: CommunityId },

    /// An invite was created.
    InviteAdded {
        community: CommunityId,
        code: InviteCode,
        uses: u64,
    },

    /// An invite was deleted.
    InviteRemoved {
        community: CommunityId,
        code: InviteCode,
    },

    /// A member joined and needs attribution.
    MemberJoined {
        community: CommunityId,
        member: MemberId,
    },
}

impl InviteEvent {
    pub fn community(&self) -> &CommunityId {
        match self {
            InviteEvent::CommunityObserved { community }
            | InviteEvent::CommunityRemoved { community }
            | InviteEvent::InviteAdded { community, .. }
            | InviteEvent::InviteRemoved { community, .. }
            | InviteEvent::MemberJoined { community, .. } => community,
        }
    }
}

impl From<TransportEnvelope> for InviteEvent {
    fn from(envelope: TransportEnvelope) -> Self {
        let community = envelope.community;
        match envelope.event {
            TransportEvent::CommunityJoined => InviteEvent::CommunityObserved { community },
            TransportEvent::CommunityLeft => InviteEvent::CommunityRemoved { community },
            TransportEvent::InviteCreated { code, uses } => InviteEvent::InviteAdded {
                community,
                code,
                uses,
            },
            TransportEvent::InviteDeleted { code } => InviteEvent::InviteRemoved { community, code },
            TransportEvent::MemberJoined { member_id } => InviteEvent::MemberJoined {
                community,
                member: member_id,
            },
        }
    }
}

/// Processes normalized events. Called by one worker per community.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: InviteEvent);
}

struct HandlerWorker(Arc<dyn EventHandler>);

#[async_trait]
impl QueueWorker<InviteEvent> for HandlerWorker {
    async fn process(&self, _community: &CommunityId, event: InviteEvent) {
        self.0.handle(event).await;
    }
}

/// Routes events to per-community workers.
///
/// A worker with nothing to do for `idle_timeout` exits; the community's next
/// event starts a new one.
pub struct EventIngestor {
    queues: CommunityQueues<InviteEvent>,
}

impl EventIngestor {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        queue_capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            queues: CommunityQueues::new(
                "events",
                Arc::new(HandlerWorker(handler)),
                queue_capacity,
                idle_timeout,
            ),
        }
    }

    /// Normalize and enqueue a transport notification.
    pub async fn ingest(&self, envelope: TransportEnvelope) -> TrackerResult<()> {
        debug!(
            community = %envelope.community,
            kind = envelope.event.kind(),
            "Ingesting transport event"
        );
        self.dispatch(InviteEvent::from(envelope)).await
    }

    /// Enqueue an event on its community's worker, waiting if the queue is full.
    ///
    /// Fails with [`crate::TrackerError::IngestorClosed`] once shutdown has begun.
    pub async fn dispatch(&self, event: InviteEvent) -> TrackerResult<()> {
        let community = event.community().clone();
        self.queues.push(&community, event).await
    }

    /// Communities with a running worker.
    pub fn active_communities(&self) -> Vec<CommunityId> {
        self.queues.active()
    }

    pub fn is_closed(&self) -> bool {
        self.queues.is_closed()
    }

    /// Refuse new events and wait for queued ones to drain.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let workers = self.queues.close().await;
        info!(workers, "Drained community workers");
    }
}
