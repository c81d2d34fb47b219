//! End-to-end console scenarios against the simulated cluster.
//!
//! Each test drives the public [`Console`] facade the way a UI would and
//! checks both the response and the broker state left behind.

#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

use kestrel_console::{
    ClusterEntry, Console, ConsoleSettings, FetchRequest, GroupState, OffsetSpec, ResetRequest,
    SimulatedCluster, StaticClusterRegistry, TailRequest,
};
use kestrel_core::{ClusterId, ConsoleError, PartitionKey, Position, TailCursor};

const PROD: ClusterId = ClusterId::new(1);

type TestConsole = Console<SimulatedCluster, StaticClusterRegistry>;

fn console(cluster: &SimulatedCluster) -> TestConsole {
    let registry =
        StaticClusterRegistry::new(vec![ClusterEntry::new(PROD, "prod", "10.0.0.1:9092")]);
    Console::new(cluster.clone(), registry, ConsoleSettings::default())
}

fn fetch(topic: &str, position: Position, max_messages: u32) -> FetchRequest {
    FetchRequest {
        cluster_name: "prod".to_string(),
        topic_name: topic.to_string(),
        position: Some(position),
        max_messages: Some(max_messages),
        poll_timeout_ms: Some(100),
        ..FetchRequest::default()
    }
}

fn tail(topic: &str, cursor: Option<TailCursor>) -> TailRequest {
    TailRequest {
        cluster_name: "prod".to_string(),
        topic_name: topic.to_string(),
        poll_timeout_ms: Some(100),
        last_seen: cursor,
        ..TailRequest::default()
    }
}

/// `orders` with 3 partitions of `per_partition` records each.
fn orders(per_partition: i64) -> SimulatedCluster {
    let cluster = SimulatedCluster::new();
    cluster.create_topic("orders", 3);
    for partition in 0..3 {
        for i in 0..per_partition {
            cluster.append("orders", partition, 1_000 + i, Some(b"k".as_slice()), b"v");
        }
    }
    cluster
}

/// Group `g1` committed at 100 on `orders-0`, whose records carry
/// timestamps 1000, 1010, 1020, ...
fn reset_cluster() -> SimulatedCluster {
    let cluster = SimulatedCluster::new();
    cluster.create_topic("orders", 1);
    for i in 0..150 {
        cluster.append("orders", 0, 1_000 + i * 10, None, b"v");
    }
    cluster.commit("g1", "orders", 0, 100);
    cluster
}

// -----------------------------------------------------------------------------
// Concrete Scenarios
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_earliest_spans_partitions() {
    let cluster = orders(5);
    let console = console(&cluster);

    let response = console
        .fetch(fetch("orders", Position::Earliest, 10))
        .await
        .unwrap();

    assert!(response.count <= 10);
    assert_eq!(response.count, response.records.len());
    assert!(response.records.iter().all(|r| r.offset >= 0));
    assert_eq!(response.cluster_name, "prod");
    assert_eq!(response.topic_name, "orders");
}

#[tokio::test]
async fn test_tail_is_forward_only_from_connection() {
    let cluster = SimulatedCluster::new();
    cluster.create_topic("orders", 1);
    let console = console(&cluster);

    let first = console.tail(tail("orders", None)).await.unwrap();
    assert_eq!(first.fetched, 0);
    assert_eq!(first.next_cursor, None);

    cluster.set_log_start("orders", 0, 42);
    assert_eq!(cluster.append("orders", 0, 5_000, None, b"new"), Some(42));

    let second = console.tail(tail("orders", first.next_cursor)).await.unwrap();
    assert_eq!(second.fetched, 0);
    assert_eq!(second.next_cursor, None);
}

#[tokio::test]
async fn test_lag_of_committed_partition() {
    let cluster = SimulatedCluster::new();
    cluster.create_topic("orders", 1);
    for i in 0..150 {
        cluster.append("orders", 0, i, None, b"v");
    }
    cluster.commit("g1", "orders", 0, 100);
    let console = console(&cluster);

    let detail = console.group_detail(PROD, "g1").await.unwrap();
    assert_eq!(detail.partitions.len(), 1);
    let row = &detail.partitions[0];
    assert_eq!(row.committed_offset, 100);
    assert_eq!(row.end_offset, 150);
    assert_eq!(row.lag, 50);
    assert_eq!(detail.total_lag, 50);
    assert_eq!(detail.topics_count, 1);
}

#[tokio::test]
async fn test_dry_run_reset_leaves_offsets() {
    let cluster = reset_cluster();
    let console = console(&cluster);

    let mut request = ResetRequest::new(PROD, "g1", 1_800);
    request.dry_run = true;
    let response = console.reset_offsets(request).await.unwrap();

    assert_eq!(response.changes.len(), 1);
    let change = &response.changes[0];
    assert_eq!(change.before_offset, 100);
    assert_eq!(change.after_offset, 80);
    assert_eq!(change.delta, 20);
    assert!(change.changed);
    assert!(!response.applied);
    assert!(response.dry_run);
    assert_eq!(response.error, None);
    assert_eq!(cluster.committed("g1", "orders", 0), Some(100));
    assert_eq!(cluster.call_count("alter_group_offsets"), 0);
}

#[tokio::test]
async fn test_reset_refused_for_active_group() {
    let cluster = reset_cluster();
    cluster.join_group("g1", "m-1", "worker-a");
    cluster.join_group("g1", "m-2", "worker-b");
    let console = console(&cluster);

    let err = console
        .reset_offsets(ResetRequest::new(PROD, "g1", 1_800))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ConsoleError::GroupActive {
            group_id: "g1".to_string(),
            members: 2,
        }
    );
    assert_eq!(cluster.call_count("committed_offsets"), 0);
    assert_eq!(cluster.call_count("list_offsets"), 0);
    assert_eq!(cluster.call_count("alter_group_offsets"), 0);
    assert_eq!(cluster.committed("g1", "orders", 0), Some(100));
}

// -----------------------------------------------------------------------------
// Properties
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_count_bounded_and_ordered() {
    for (max_messages, poll_batch) in [(1, 1), (7, 2), (10, 3), (50, 4), (500, 500)] {
        let cluster = orders(20);
        cluster.set_poll_batch(poll_batch);
        let console = console(&cluster);

        let response = console
            .fetch(fetch("orders", Position::Earliest, max_messages))
            .await
            .unwrap();

        assert_eq!(response.count, response.records.len());
        assert!(response.count <= max_messages as usize);

        let mut last: HashMap<i32, i64> = HashMap::new();
        for record in &response.records {
            if let Some(previous) = last.insert(record.partition, record.offset) {
                assert!(
                    record.offset > previous,
                    "partition {} went from {previous} to {}",
                    record.partition,
                    record.offset
                );
            }
        }
    }
}

#[tokio::test]
async fn test_tail_cursor_is_monotonic() {
    let cluster = SimulatedCluster::new();
    cluster.create_topic("orders", 2);
    let console = console(&cluster);

    // Seed the cursor on both partitions.
    cluster.append("orders", 0, 1, None, b"a");
    cluster.append("orders", 1, 1, None, b"a");
    let mut cursor = TailCursor::single(0, 0);
    cursor.observe(1, 0);

    for round in 0..5_i64 {
        for i in 0..round {
            cluster.append("orders", (i % 2) as i32, 10 + i, None, b"b");
        }

        let response = console.tail(tail("orders", Some(cursor.clone()))).await.unwrap();
        let next = response.next_cursor.clone().unwrap();
        for (partition, offset) in cursor.iter() {
            assert!(next.last_seen(partition).unwrap() >= offset);
        }
        if response.fetched == 0 {
            assert_eq!(next, cursor);
        }

        // Replaying the same cursor with no new data is idempotent.
        let again = console.tail(tail("orders", Some(next.clone()))).await.unwrap();
        assert_eq!(again.fetched, 0);
        assert_eq!(again.next_cursor, Some(next.clone()));
        cursor = next;
    }
}

#[tokio::test]
async fn test_unknown_partition_has_no_side_effects() {
    let cluster = orders(3);
    let console = console(&cluster);

    let mut request = fetch("orders", Position::Earliest, 10);
    request.partitions = Some(vec![0, 7]);
    let err = console.fetch(request).await.unwrap_err();

    assert_eq!(
        err,
        ConsoleError::InvalidPartition {
            topic: "orders".to_string(),
            partition: 7,
        }
    );
    assert_eq!(cluster.call_count("assign"), 0);
    assert_eq!(cluster.call_count("poll"), 0);
    assert_eq!(cluster.open_sessions(), 0);

    let mut request = tail("orders", None);
    request.partitions = Some(vec![7]);
    let err = console.tail(request).await.unwrap_err();
    assert!(matches!(err, ConsoleError::InvalidPartition { partition: 7, .. }));
    assert_eq!(cluster.call_count("poll"), 0);
}

#[tokio::test]
async fn test_lag_never_negative() {
    let cluster = orders(10);
    cluster.commit("ahead", "orders", 0, 500);
    cluster.commit("ahead", "orders", 1, 3);
    cluster.commit("ahead", "orders", 2, -1);
    cluster.override_offset(PartitionKey::new("orders", 1), OffsetSpec::Latest, Some(-1));
    let console = console(&cluster);

    let summaries = console.list_groups(PROD).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].total_lag, 0);

    let detail = console.group_detail(PROD, "ahead").await.unwrap();
    assert!(detail.partitions.iter().all(|row| row.lag >= 0));
    assert_eq!(detail.state, GroupState::Empty);
}

#[tokio::test]
async fn test_dry_run_matches_apply() {
    let setup = || {
        let cluster = reset_cluster();
        cluster.create_topic("audit", 2);
        for i in 0..20 {
            cluster.append("audit", 0, 5_000 + i, None, b"v");
        }
        cluster.commit("g1", "audit", 0, 20);
        cluster.commit("g1", "audit", 1, 0);
        cluster
    };

    let dry_cluster = setup();
    let mut request = ResetRequest::new(PROD, "g1", 1_800);
    request.dry_run = true;
    let dry = console(&dry_cluster).reset_offsets(request).await.unwrap();

    let live_cluster = setup();
    let live = console(&live_cluster)
        .reset_offsets(ResetRequest::new(PROD, "g1", 1_800))
        .await
        .unwrap();

    assert_eq!(dry.changes, live.changes);
    assert_eq!(
        serde_json::to_string(&dry.changes).unwrap(),
        serde_json::to_string(&live.changes).unwrap()
    );
    assert!(!dry.applied);
    assert!(live.applied);
    assert_eq!(live_cluster.committed("g1", "orders", 0), Some(80));
    assert_eq!(live_cluster.committed("g1", "audit", 0), Some(0));
    assert_eq!(dry_cluster.committed("g1", "orders", 0), Some(100));
}

#[tokio::test]
async fn test_sessions_closed_on_every_path() {
    let cluster = reset_cluster();
    let console = console(&cluster);

    for operation in ["partitions_for", "assign", "poll"] {
        cluster.fail_next(operation);
        let err = console
            .fetch(fetch("orders", Position::Earliest, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::FetchFailed { .. }), "{operation}");
        assert_eq!(cluster.open_sessions(), 0, "{operation}");
    }

    cluster.fail_next("poll");
    let err = console.tail(tail("orders", None)).await.unwrap_err();
    assert!(matches!(err, ConsoleError::FetchFailed { .. }));

    for operation in ["describe_group", "committed_offsets", "list_offsets", "alter_group_offsets"]
    {
        cluster.fail_next(operation);
        let response = console
            .reset_offsets(ResetRequest::new(PROD, "g1", 1_800))
            .await
            .unwrap();
        assert!(!response.applied, "{operation}");
        assert!(response.error.is_some(), "{operation}");
        assert_eq!(cluster.open_sessions(), 0, "{operation}");
    }

    console.fetch(fetch("orders", Position::Latest, 5)).await.unwrap();
    assert_eq!(cluster.open_sessions(), 0);
    assert!(cluster.sessions_opened() >= 9);
    assert_eq!(cluster.committed("g1", "orders", 0), Some(100));
}

#[tokio::test]
async fn test_reset_timestamp_past_end_falls_back() {
    let cluster = reset_cluster();
    let console = console(&cluster);

    let mut request = ResetRequest::new(PROD, "g1", 999_999);
    request.dry_run = true;
    let response = console.reset_offsets(request.clone()).await.unwrap();
    let change = &response.changes[0];
    assert_eq!(change.after_offset, 0);
    assert_eq!(change.delta, 100);
    assert!(change.note.as_deref().unwrap().contains("used earliest"));

    request.fallback_to_earliest = false;
    let response = console.reset_offsets(request).await.unwrap();
    let change = &response.changes[0];
    assert!(!change.changed);
    assert_eq!(change.after_offset, 100);
    assert_eq!(response.partitions_unchanged, 1);
    assert_eq!(response.warnings.len(), 1);
}

#[tokio::test]
async fn test_unknown_group_is_not_found() {
    let cluster = reset_cluster();
    let console = console(&cluster);

    let err = console.group_detail(PROD, "ghost").await.unwrap_err();
    assert!(matches!(err, ConsoleError::GroupNotFound { .. }));

    let err = console
        .reset_offsets(ResetRequest::new(PROD, "ghost", 1_800))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::GroupNotFound { .. }));
}
