//! # Invite Tracker - Join Attribution from Invite Usage Counters
//!
//! The upstream platform announces that a member joined, but not which invite
//! they used. It does expose a cumulative usage counter per invite. This crate
//! keeps a snapshot of those counters per community and, on each join,
//! compares a fresh view against the snapshot to find the counter that moved.
//!
//! ## Key Components
//!
//! - [`SnapshotStore`]: Last-observed `{code: uses}` per community
//! - [`SerializationGate`]: FIFO mutual exclusion per community
//! - [`AttributionResolver`]: Fetch, diff, select and replace for one join
//! - [`EventIngestor`]: Ordered per-community event processing
//! - [`InviteTracker`]: Facade composing the above
//!
//! ## Collaborators
//!
//! - [`InviteSource`]: Upstream invite listing (HTTP in the daemon,
//!   [`StaticInviteSource`] in memory)
//! - [`RoleMapping`]: Invite code to role table
//! - [`AttributionSink`]: Receives every attribution result, e.g.
//!   [`RoleGrantingSink`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use invite_tracker::{
//!     InMemoryRoleMapping, InviteTracker, LoggingSink, StaticInviteSource, TrackerConfig,
//! };
//! use invite_types::{CommunityId, MemberId};
//!
//! # async fn example() {
//! let source = Arc::new(StaticInviteSource::new());
//! let community = CommunityId::new("c1");
//! source.set_uses(&community, "A", 5);
//!
//! let tracker = InviteTracker::new(
//!     TrackerConfig::default(),
//!     source.clone(),
//!     Arc::new(InMemoryRoleMapping::new()),
//!     Arc::new(LoggingSink),
//! )
//! .unwrap();
//!
//! tracker.observe_community(&community).await.unwrap();
//!
//! // Someone joins through invite A
//! source.record_join(&community, "A");
//! let result = tracker.process_join(&community, &MemberId::new("m1")).await;
//! println!("Attribution: {}", result);
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Each snapshot read-modify-write for a community runs inside that
//! community's gate, so two joins for one community never diff against the
//! same snapshot. Communities are independent: a slow fetch for one never
//! delays another. Results reach the sink through a separate per-community
//! queue, so a slow sink never holds up attribution. Per-community workers
//! and gate entries are released when the community goes idle.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod gate;
pub mod ingestor;
pub mod mapping;
mod queue;
pub mod resolver;
pub mod sink;
pub mod source;
pub mod store;
pub mod tracker;

// Re-export main types
pub use config::TrackerConfig;
pub use error::{FetchError, GrantError, TrackerError, TrackerResult};
pub use gate::SerializationGate;
pub use ingestor::{EventHandler, EventIngestor, InviteEvent};
pub use mapping::{parse_invite_code, InMemoryRoleMapping, RoleDecision, RoleMapping};
pub use resolver::{find_candidates, select_candidate, AttributionResolver, Candidate};
pub use sink::{
    AttributionRecord, AttributionSink, LoggingSink, RecordingSink, RoleGranter, RoleGrantingSink,
};
pub use source::{InviteSource, StaticInviteSource};
pub use store::SnapshotStore;
pub use tracker::{BootstrapReport, InviteDiagnostic, InviteDiagnostics, InviteTracker};
