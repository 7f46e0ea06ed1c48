//! Ordered work queues keyed by community.
//!
//! Each community gets a bounded `mpsc` channel drained by one spawned task,
//! so items for a community are processed one at a time in arrival order
//! while different communities proceed in parallel. A task that stays idle
//! for the configured timeout retires itself, and the next push for that
//! community starts a fresh one. Once closed, pushes are refused.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use invite_types::CommunityId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

/// Processes the items queued for one community.
#[async_trait]
pub(crate) trait QueueWorker<T: Send + 'static>: Send + Sync + 'static {
    async fn process(&self, community: &CommunityId, item: T);
}

struct Lane<T> {
    tx: mpsc::Sender<T>,
    handle: JoinHandle<()>,
    generation: u64,
    // Items pushed but not yet processed. Incremented under the map's shard
    // lock, so a lane with zero pending has no sender about to use it.
    pending: Arc<AtomicUsize>,
}

pub(crate) struct CommunityQueues<T: Send + 'static> {
    worker: Arc<dyn QueueWorker<T>>,
    lanes: Arc<DashMap<CommunityId, Lane<T>>>,
    capacity: usize,
    idle_timeout: Duration,
    generations: AtomicU64,
    closed: AtomicBool,
    label: &'static str,
}

impl<T: Send + 'static> CommunityQueues<T> {
    pub(crate) fn new(
        label: &'static str,
        worker: Arc<dyn QueueWorker<T>>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            worker,
            lanes: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            idle_timeout,
            generations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            label,
        }
    }

    /// Queue an item, waiting if the community's channel is full.
    pub(crate) async fn push(&self, community: &CommunityId, item: T) -> TrackerResult<()> {
        let (tx, pending) = {
            let entry = self.lanes.entry(community.clone());
            if self.closed.load(Ordering::SeqCst) {
                return Err(TrackerError::IngestorClosed(community.clone()));
            }
            let lane = entry.or_insert_with(|| self.spawn(community.clone()));
            lane.pending.fetch_add(1, Ordering::SeqCst);
            (lane.tx.clone(), lane.pending.clone())
        };

        if tx.send(item).await.is_err() {
            pending.fetch_sub(1, Ordering::SeqCst);
            return Err(TrackerError::IngestorClosed(community.clone()));
        }
        Ok(())
    }

    pub(crate) fn active(&self) -> Vec<CommunityId> {
        self.lanes.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Refuse further pushes, then wait for every queued item to be processed.
    pub(crate) async fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);

        let mut handles = Vec::new();
        for community in self.active() {
            if let Some((_, lane)) = self.lanes.remove(&community) {
                drop(lane.tx);
                handles.push(lane.handle);
            }
        }

        let drained = handles.len();
        for handle in handles {
            let _ = handle.await;
        }
        drained
    }

    fn spawn(&self, community: CommunityId) -> Lane<T> {
        let (tx, mut rx) = mpsc::channel::<T>(self.capacity);
        let generation = self.generations.fetch_add(1, Ordering::SeqCst);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = self.worker.clone();
        let lanes = self.lanes.clone();
        let idle_timeout = self.idle_timeout;
        let label = self.label;
        let counter = pending.clone();

        debug!(community = %community, queue = label, "Starting community worker");
        let handle = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(item)) => {
                        worker.process(&community, item).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        let retired = lanes.remove_if(&community, |_, lane| {
                            lane.generation == generation
                                && lane.pending.load(Ordering::SeqCst) == 0
                        });
                        if retired.is_some() {
                            debug!(community = %community, queue = label, "Retired idle worker");
                            return;
                        }
                    }
                }
            }
            debug!(community = %community, queue = label, "Community worker stopped");
        });

        Lane {
            tx,
            handle,
            generation,
            pending,
        }
    }
}

impl<T: Send + 'static> Drop for CommunityQueues<T> {
    fn drop(&mut self) {
        for lane in self.lanes.iter() {
            lane.value().handle.abort();
        }
    }
}
