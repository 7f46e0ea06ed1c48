//! End-to-end attribution behaviour through the tracker facade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use invite_tracker::{
    FetchError, InMemoryRoleMapping, InviteTracker, RecordingSink, RoleMapping,
    StaticInviteSource, TrackerConfig,
};
use invite_types::{
    AttributionResult, CommunityId, FetchFailureKind, InviteCode, MemberId, RoleId, Snapshot,
    TransportEnvelope, TransportEvent, UnattributedReason,
};

struct Harness {
    source: Arc<StaticInviteSource>,
    mapping: Arc<InMemoryRoleMapping>,
    sink: Arc<RecordingSink>,
    tracker: Arc<InviteTracker>,
}

fn harness_with(config: TrackerConfig) -> Harness {
    let source = Arc::new(StaticInviteSource::new());
    let mapping = Arc::new(InMemoryRoleMapping::new());
    let sink = Arc::new(RecordingSink::new());
    let tracker = InviteTracker::new(config, source.clone(), mapping.clone(), sink.clone())
        .expect("valid config");
    Harness {
        source,
        mapping,
        sink,
        tracker: Arc::new(tracker),
    }
}

fn harness() -> Harness {
    harness_with(TrackerConfig::default())
}

fn snapshot(entries: &[(&str, u64)]) -> Snapshot {
    entries
        .iter()
        .map(|(code, uses)| (InviteCode::new(*code), *uses))
        .collect()
}

fn member(id: &str) -> MemberId {
    MemberId::new(id)
}

#[tokio::test]
async fn resync_is_idempotent_when_upstream_is_unchanged() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 3);
    h.source.set_uses(&community, "B", 7);

    let first = h.tracker.force_resync(&community).await.unwrap();
    let second = h.tracker.force_resync(&community).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, snapshot(&[("A", 3), ("B", 7)]));
    assert!(h.sink.records().is_empty());
}

#[tokio::test]
async fn an_increment_is_attributed_to_exactly_one_join() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 5);
    h.tracker.observe_community(&community).await.unwrap();

    h.source.set_uses(&community, "A", 6);
    let first = h.tracker.process_join(&community, &member("m1")).await;
    let second = h.tracker.process_join(&community, &member("m2")).await;

    assert_eq!(first, AttributionResult::attributed(InviteCode::new("A"), 5, 6));
    assert_eq!(second, AttributionResult::no_increment());
    assert_eq!(
        h.tracker.current_snapshot(&community),
        Some(snapshot(&[("A", 6)]))
    );
}

#[tokio::test]
async fn concurrent_joins_each_consume_one_increment() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 0);
    h.source.set_uses(&community, "B", 0);
    h.tracker.observe_community(&community).await.unwrap();

    h.source.record_join(&community, "A");
    h.source.record_join(&community, "B");

    let m1 = member("m1");
    let m2 = member("m2");
    let (r1, r2) = tokio::join!(
        h.tracker.process_join(&community, &m1),
        h.tracker.process_join(&community, &m2),
    );

    let attributed: Vec<_> = [&r1, &r2]
        .into_iter()
        .filter_map(|r| r.attributed_code().cloned())
        .collect();
    // Both increments are visible to whichever join runs first; the second
    // join diffs against the replaced snapshot and finds nothing.
    assert_eq!(attributed, vec![InviteCode::new("A")]);
    assert_eq!(
        h.tracker.current_snapshot(&community),
        Some(snapshot(&[("A", 1), ("B", 1)]))
    );
}

#[tokio::test]
async fn ties_go_to_the_smallest_code() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 1);
    h.source.set_uses(&community, "B", 1);
    h.source.set_uses(&community, "C", 1);
    h.tracker.observe_community(&community).await.unwrap();

    h.source.set_uses(&community, "B", 2);
    h.source.set_uses(&community, "C", 2);
    let result = h.tracker.process_join(&community, &member("m1")).await;

    assert_eq!(result, AttributionResult::attributed(InviteCode::new("B"), 1, 2));
}

#[tokio::test]
async fn largest_delta_beats_smaller_code() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 0);
    h.source.set_uses(&community, "Z", 0);
    h.tracker.observe_community(&community).await.unwrap();

    h.source.set_uses(&community, "A", 1);
    h.source.set_uses(&community, "Z", 3);
    let result = h.tracker.process_join(&community, &member("m1")).await;

    assert_eq!(result, AttributionResult::attributed(InviteCode::new("Z"), 0, 3));
}

#[tokio::test]
async fn vanity_fallback_only_for_mapped_vanity_codes() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 4);
    h.source.set_vanity(&community, "rust");
    h.tracker.observe_community(&community).await.unwrap();

    let unmapped = h.tracker.process_join(&community, &member("m1")).await;
    assert_eq!(unmapped, AttributionResult::no_increment());

    h.mapping.set(InviteCode::new("rust"), RoleId::new("rustacean"));
    let mapped = h.tracker.process_join(&community, &member("m2")).await;
    assert_eq!(
        mapped,
        AttributionResult::AttributedByFallback {
            vanity_code: InviteCode::new("rust")
        }
    );
}

#[tokio::test]
async fn fetch_failure_leaves_snapshot_untouched() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 5);
    h.tracker.observe_community(&community).await.unwrap();

    h.source.set_uses(&community, "A", 6);
    h.source.fail_with(
        &community,
        FetchError::PermissionDenied("manage server revoked".into()),
    );

    let result = h.tracker.process_join(&community, &member("m1")).await;
    assert!(matches!(
        result,
        AttributionResult::Unattributed {
            reason: UnattributedReason::FetchFailed {
                kind: FetchFailureKind::PermissionDenied,
                ..
            }
        }
    ));
    assert_eq!(
        h.tracker.current_snapshot(&community),
        Some(snapshot(&[("A", 5)]))
    );

    // The unconsumed increment is still attributable once fetches recover.
    h.source.clear_failure(&community);
    let result = h.tracker.process_join(&community, &member("m2")).await;
    assert_eq!(result, AttributionResult::attributed(InviteCode::new("A"), 5, 6));
}

#[tokio::test]
async fn unobserved_community_diffs_against_empty_snapshot() {
    let h = harness();
    let community = CommunityId::new("late");
    h.source.set_uses(&community, "A", 1);
    h.source.set_uses(&community, "B", 0);

    let result = h.tracker.process_join(&community, &member("m1")).await;

    assert_eq!(result, AttributionResult::attributed(InviteCode::new("A"), 0, 1));
    assert_eq!(
        h.tracker.current_snapshot(&community),
        Some(snapshot(&[("A", 1), ("B", 0)]))
    );
}

#[tokio::test]
async fn slow_fetch_does_not_block_other_communities() {
    let h = harness_with(TrackerConfig::default().with_fetch_timeout(Duration::from_secs(5)));
    let slow = CommunityId::new("slow");
    let fast = CommunityId::new("fast");
    h.source.set_uses(&slow, "S", 0);
    h.source.set_uses(&fast, "F", 0);
    h.tracker.observe_community(&slow).await.unwrap();
    h.tracker.observe_community(&fast).await.unwrap();

    h.source.set_latency(&slow, Duration::from_millis(500));
    h.source.record_join(&slow, "S");
    h.source.record_join(&fast, "F");

    let tracker = h.tracker.clone();
    let slow_join = {
        let slow = slow.clone();
        tokio::spawn(async move { tracker.process_join(&slow, &MemberId::new("m1")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let fast_result = tokio::time::timeout(
        Duration::from_millis(250),
        h.tracker.process_join(&fast, &member("m2")),
    )
    .await
    .expect("fast community must not wait behind slow fetch");

    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(
        fast_result,
        AttributionResult::attributed(InviteCode::new("F"), 0, 1)
    );
    assert_eq!(
        slow_join.await.unwrap(),
        AttributionResult::attributed(InviteCode::new("S"), 0, 1)
    );
}

#[tokio::test]
async fn timed_out_fetch_is_unattributed() {
    let h = harness_with(TrackerConfig::default().with_fetch_timeout(Duration::from_millis(50)));
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 0);
    h.tracker.observe_community(&community).await.unwrap();

    h.source.set_latency(&community, Duration::from_millis(500));
    h.source.record_join(&community, "A");

    let result = h.tracker.process_join(&community, &member("m1")).await;
    assert!(matches!(
        result,
        AttributionResult::Unattributed {
            reason: UnattributedReason::FetchFailed {
                kind: FetchFailureKind::Timeout,
                ..
            }
        }
    ));
    assert_eq!(
        h.tracker.current_snapshot(&community),
        Some(snapshot(&[("A", 0)]))
    );
}

#[tokio::test]
async fn ingested_events_apply_in_order() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 0);

    let send = |event: TransportEvent| TransportEnvelope::new(community.clone(), event);

    h.tracker.ingest(send(TransportEvent::CommunityJoined)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.tracker.current_snapshot(&community).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("community should be observed");

    h.source.record_join(&community, "A");
    h.tracker
        .ingest(send(TransportEvent::MemberJoined {
            member_id: member("m1"),
        }))
        .await
        .unwrap();

    h.source.set_uses(&community, "B", 0);
    h.tracker
        .ingest(send(TransportEvent::InviteCreated {
            code: InviteCode::new("B"),
            uses: 0,
        }))
        .await
        .unwrap();
    h.tracker
        .ingest(send(TransportEvent::MemberJoined {
            member_id: member("m2"),
        }))
        .await
        .unwrap();

    h.tracker.shutdown().await;

    let records = h.sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].member, member("m1"));
    assert_eq!(
        records[0].result,
        AttributionResult::attributed(InviteCode::new("A"), 0, 1)
    );
    assert_eq!(records[1].member, member("m2"));
    assert_eq!(
        records[1].result,
        AttributionResult::Unattributed {
            reason: UnattributedReason::NoIncrement
        }
    );

    assert_eq!(
        h.tracker.current_snapshot(&community),
        Some(snapshot(&[("A", 1), ("B", 0)]))
    );
}

#[tokio::test]
async fn mapping_edits_are_visible_to_later_joins() {
    let h = harness();
    let community = CommunityId::new("c1");
    h.source.set_uses(&community, "A", 0);
    h.source.set_vanity(&community, "vanity");
    h.tracker.observe_community(&community).await.unwrap();

    assert!(h.tracker.mapping().entries().is_empty());
    h.tracker
        .mapping()
        .set(InviteCode::new("vanity"), RoleId::new("r"));

    let result = h.tracker.process_join(&community, &member("m1")).await;
    assert!(matches!(result, AttributionResult::AttributedByFallback { .. }));
}
