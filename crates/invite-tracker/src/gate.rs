//! Per-community mutual exclusion.
//!
//! Each community gets its own FIFO async mutex. A second caller for the same
//! community waits until the first caller's future has fully completed; callers
//! for different communities never contend. A community's mutex is dropped
//! once no caller holds or waits on it.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use invite_types::CommunityId;
use tokio::sync::Mutex;
use tracing::trace;

/// Serializes work per community.
#[derive(Debug, Default)]
pub struct SerializationGate {
    locks: DashMap<CommunityId, Arc<Mutex<()>>>,
}

impl SerializationGate {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Run `f` with exclusive access to `community`, queuing behind any
    /// in-flight invocation for the same community.
    pub async fn run<F, Fut, T>(&self, community: &CommunityId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(community);
        let output = {
            let _guard = lock.clone().lock_owned().await;
            trace!(community = %community, "Gate acquired");
            f().await
        };
        drop(lock);
        self.release(community);
        output
    }

    /// Number of communities with a live mutex.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Whether some invocation currently holds the community's gate.
    pub fn is_held(&self, community: &CommunityId) -> bool {
        self.locks
            .get(community)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    // The map guard is dropped before awaiting, so no shard lock is held
    // across a suspension point.
    fn lock_for(&self, community: &CommunityId) -> Arc<Mutex<()>> {
        self.locks.entry(community.clone()).or_default().clone()
    }

    // Clones are only taken under the shard lock, so a count of one here
    // means no holder or waiter remains.
    fn release(&self, community: &CommunityId) {
        self.locks
            .remove_if(community, |_, lock| Arc::strong_count(lock) == 1);
    }
}
