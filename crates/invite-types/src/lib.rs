//! Invite Types - Core types for invite usage tracking
//!
//! The upstream platform exposes only cumulative per-invite usage counters.
//! These types describe what is observed (invite records, snapshots), what
//! arrives from the transport (events) and what attribution decides.
//!
//! ## Key Concepts
//!
//! - **Community**: Scope within which invite codes are unique
//! - **Snapshot**: Last-observed `{code: uses}` view of one community
//! - **InviteRecord**: Transient invite as returned by a fetch
//! - **AttributionResult**: Which invite (or vanity fallback) caused a join

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod attribution;
pub mod events;
pub mod ids;
pub mod invite;

// Re-export main types
pub use attribution::{AttributionResult, FetchFailureKind, UnattributedReason};
pub use events::{TransportEnvelope, TransportEvent};
pub use ids::{CommunityId, InviteCode, MemberId, RoleId};
pub use invite::{InviteRecord, Snapshot};
