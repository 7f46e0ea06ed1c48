//! Notifications delivered by the upstream transport
//!
//! Every event is tagged with the community it belongs to. Ordering is only
//! meaningful within one community.

use crate::{CommunityId, InviteCode, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope wrapping a transport event with its community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEnvelope {
    /// Community the event belongs to
    pub community: CommunityId,

    /// When the notification reached us
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,

    /// The event itself
    pub event: TransportEvent,
}

impl TransportEnvelope {
    pub fn new(community: CommunityId, event: TransportEvent) -> Self {
        Self {
            community,
            received_at: Utc::now(),
            event,
        }
    }
}

/// Notifications emitted by the upstream platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// We were added to a community
    CommunityJoined,

    /// We were removed from a community
    CommunityLeft,

    /// An invite was created
    InviteCreated {
        code: InviteCode,
        #[serde(default)]
        uses: u64,
    },

    /// An invite was deleted or expired
    InviteDeleted { code: InviteCode },

    /// A member joined the community
    MemberJoined { member_id: MemberId },
}

impl TransportEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::CommunityJoined => "community_joined",
            TransportEvent::CommunityLeft => "community_left",
            TransportEvent::InviteCreated { .. } => "invite_created",
            TransportEvent::InviteDeleted { .. } => "invite_deleted",
            TransportEvent::MemberJoined { .. } => "member_joined",
        }
    }
}
