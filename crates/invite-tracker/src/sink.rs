//! Hand-off of attribution results to the role-granting collaborator.
//!
//! The tracker calls [`AttributionSink::on_attribution`] exactly once per
//! processed join, after the snapshot update is complete. Whatever the sink
//! does afterwards (including failing) never rolls the snapshot back.
//!
//! Results are handed to the sink from a per-community delivery queue, so a
//! slow sink delays neither the next join's attribution nor other
//! communities, and a community's results still arrive in attribution order.

use std::sync::Arc;

use async_trait::async_trait;
use invite_types::{AttributionResult, CommunityId, MemberId, RoleId};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::GrantError;
use crate::mapping::{RoleDecision, RoleMapping};
use crate::queue::QueueWorker;

/// Receiver of attribution results.
#[async_trait]
pub trait AttributionSink: Send + Sync {
    async fn on_attribution(
        &self,
        community: &CommunityId,
        member: &MemberId,
        result: &AttributionResult,
    );
}

/// A result waiting for the sink. `done` fires once the sink has returned.
pub(crate) struct Delivery {
    pub(crate) member: MemberId,
    pub(crate) result: AttributionResult,
    pub(crate) done: Option<oneshot::Sender<()>>,
}

pub(crate) struct SinkWorker(pub(crate) Arc<dyn AttributionSink>);

#[async_trait]
impl QueueWorker<Delivery> for SinkWorker {
    async fn process(&self, community: &CommunityId, delivery: Delivery) {
        self.0
            .on_attribution(community, &delivery.member, &delivery.result)
            .await;
        if let Some(done) = delivery.done {
            let _ = done.send(());
        }
    }
}

/// Applies a role to a member on the upstream platform.
#[async_trait]
pub trait RoleGranter: Send + Sync {
    async fn grant(
        &self,
        community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GrantError>;
}

/// Sink that resolves results through a [`RoleMapping`] and grants the role.
pub struct RoleGrantingSink {
    mapping: Arc<dyn RoleMapping>,
    granter: Arc<dyn RoleGranter>,
}

impl RoleGrantingSink {
    pub fn new(mapping: Arc<dyn RoleMapping>, granter: Arc<dyn RoleGranter>) -> Self {
        Self { mapping, granter }
    }
}

#[async_trait]
impl AttributionSink for RoleGrantingSink {
    async fn on_attribution(
        &self,
        community: &CommunityId,
        member: &MemberId,
        result: &AttributionResult,
    ) {
        match self.mapping.decide(result) {
            RoleDecision::Grant { code, role } => {
                match self.granter.grant(community, member, &role).await {
                    Ok(()) => info!(
                        community = %community,
                        member = %member,
                        code = %code,
                        role = %role,
                        "Granted role"
                    ),
                    Err(e) => error!(
                        community = %community,
                        member = %member,
                        code = %code,
                        role = %role,
                        error = %e,
                        "Failed to grant role"
                    ),
                }
            }
            RoleDecision::NoMappingConfigured { code } => {
                info!(
                    community = %community,
                    member = %member,
                    code = %code,
                    "No role mapping configured for invite"
                );
            }
            RoleDecision::NoAttribution => {
                debug!(community = %community, member = %member, %result, "Nothing to grant");
            }
        }
    }
}

/// Sink that only logs results.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl AttributionSink for LoggingSink {
    async fn on_attribution(
        &self,
        community: &CommunityId,
        member: &MemberId,
        result: &AttributionResult,
    ) {
        info!(community = %community, member = %member, %result, "Join processed");
    }
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRecord {
    pub community: CommunityId,
    pub member: MemberId,
    pub result: AttributionResult,
}

/// Sink that keeps every call in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<AttributionRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AttributionRecord> {
        self.records.lock().clone()
    }

    pub fn results_for(&self, community: &CommunityId) -> Vec<AttributionResult> {
        self.records
            .lock()
            .iter()
            .filter(|r| &r.community == community)
            .map(|r| r.result.clone())
            .collect()
    }
}

#[async_trait]
impl AttributionSink for RecordingSink {
    async fn on_attribution(
        &self,
        community: &CommunityId,
        member: &MemberId,
        result: &AttributionResult,
    ) {
        self.records.lock().push(AttributionRecord {
            community: community.clone(),
            member: member.clone(),
            result: result.clone(),
        });
    }
}
