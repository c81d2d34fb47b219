//! Tests against a running broker.
//!
//! Ignored by default. Run with a broker that auto-creates topics:
//!
//! ```text
//! KESTREL_BOOTSTRAP=localhost:9092 cargo test -p kestrel-kafka -- --ignored
//! ```

use kestrel_console::{
    ClusterEntry, Console, ConsoleSettings, FetchRequest, HeaderView, PublishRequest,
    StaticClusterRegistry, TailRequest,
};
use kestrel_core::{ClusterId, ConsoleError, Position};
use kestrel_kafka::{KafkaClientConfig, KafkaSessionFactory};

const CLUSTER: &str = "live";

fn console() -> Console<KafkaSessionFactory, StaticClusterRegistry> {
    let bootstrap =
        std::env::var("KESTREL_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".to_string());
    let registry =
        StaticClusterRegistry::new(vec![ClusterEntry::new(ClusterId::new(1), CLUSTER, bootstrap)]);
    let factory = KafkaSessionFactory::new(KafkaClientConfig::default()).unwrap();
    Console::new(factory, registry, ConsoleSettings::default())
}

fn topic(suffix: &str) -> String {
    format!("kestrel-live-{suffix}-{}", kestrel_core::now_millis())
}

#[tokio::test]
#[ignore = "requires a running broker"]
async fn test_publish_then_fetch_earliest() {
    let console = console();
    let topic = topic("fetch");

    let receipt = console
        .publish(PublishRequest {
            cluster_name: CLUSTER.to_string(),
            topic_name: topic.clone(),
            key: Some("order-1".to_string()),
            payload: "{\"amount\":10}".to_string(),
            headers: vec![HeaderView {
                key: "source".to_string(),
                value: "live-test".to_string(),
            }],
        })
        .await
        .unwrap();
    assert!(receipt.offset >= 0);

    let response = console
        .fetch(FetchRequest {
            cluster_name: CLUSTER.to_string(),
            topic_name: topic.clone(),
            position: Some(Position::Earliest),
            max_messages: Some(10),
            poll_timeout_ms: Some(5_000),
            ..FetchRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(response.count, 1);
    let record = &response.records[0];
    assert_eq!(record.partition, receipt.partition);
    assert_eq!(record.offset, receipt.offset);
    assert_eq!(record.headers.as_deref(), Some("source=live-test"));
}

#[tokio::test]
#[ignore = "requires a running broker"]
async fn test_tail_resumes_after_cursor() {
    let console = console();
    let topic = topic("tail");

    let publish = |payload: &str| PublishRequest {
        cluster_name: CLUSTER.to_string(),
        topic_name: topic.clone(),
        payload: payload.to_string(),
        ..PublishRequest::default()
    };

    let first = console.publish(publish("one")).await.unwrap();

    // Latest on an unseen topic starts at the end, so seed the cursor from
    // the first delivery.
    let mut cursor = kestrel_core::TailCursor::single(first.partition, first.offset);

    console.publish(publish("two")).await.unwrap();
    let response = console
        .tail(TailRequest {
            cluster_name: CLUSTER.to_string(),
            topic_name: topic.clone(),
            poll_timeout_ms: Some(5_000),
            last_seen: Some(cursor.clone()),
            ..TailRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(response.fetched, 1);
    assert_eq!(response.records[0].offset, first.offset + 1);
    cursor = response.next_cursor.unwrap();
    assert_eq!(cursor.last_seen(first.partition), Some(first.offset + 1));
}

#[tokio::test]
#[ignore = "requires a running broker"]
async fn test_unknown_group() {
    let console = console();
    let err = console
        .group_detail(ClusterId::new(1), "kestrel-live-no-such-group")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::GroupNotFound { .. }));
}
