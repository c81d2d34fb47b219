//! Bounded fetch.
//!
//! A one-shot read: resolve partitions, seek, then poll until the record
//! target is met, a poll comes back empty, or the wall-clock budget runs out.

use std::time::Duration;

use kestrel_core::{ConsoleError, ConsoleResult, ConsumedRecord, SeekPolicy};
use tokio::time::Instant;
use tracing::debug;

use crate::partitions::resolve_partitions;
use crate::seek::plan_seek;
use crate::session::ConsumerSession;

/// Parameters of a bounded fetch, already validated and clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Partition subset; empty means all.
    pub partitions: Vec<i32>,
    /// Start position.
    pub policy: SeekPolicy,
    /// Record target; the result never exceeds it.
    pub max_messages: usize,
    /// Timeout of each poll.
    pub poll_timeout: Duration,
    /// Wall-clock budget for the whole poll loop.
    pub budget: Duration,
}

/// Why the poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchExit {
    /// The record target was reached.
    Filled,
    /// A poll returned nothing.
    CaughtUp,
    /// The wall-clock budget ran out.
    Deadline,
    /// The topic has no partitions; nothing was polled.
    NoPartitions,
}

/// Runs a bounded fetch against `topic`.
///
/// Records within a partition come back in offset order. A topic without
/// partitions yields an empty result rather than an error.
///
/// # Errors
///
/// Returns `InvalidPartition` for an unknown requested partition, or the
/// session's error if any broker call fails. No partial result is returned.
pub async fn fetch_records<C>(
    session: &mut C,
    topic: &str,
    options: &FetchOptions,
) -> ConsoleResult<(Vec<ConsumedRecord>, FetchExit)>
where
    C: ConsumerSession + ?Sized,
{
    let partitions = match resolve_partitions(session, topic, &options.partitions).await {
        Ok(partitions) => partitions,
        Err(ConsoleError::TopicNotFound { .. }) => return Ok((Vec::new(), FetchExit::NoPartitions)),
        Err(err) => return Err(err),
    };

    let plan = plan_seek(session, &partitions, options.policy).await?;
    session.assign(&plan).await?;

    let mut records = Vec::with_capacity(options.max_messages.min(200));
    let deadline = Instant::now() + options.budget;

    let exit = loop {
        if records.len() >= options.max_messages {
            break FetchExit::Filled;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break FetchExit::Deadline;
        }

        let wanted = options.max_messages - records.len();
        let batch = session
            .poll(options.poll_timeout.min(remaining), wanted)
            .await?;
        if batch.is_empty() {
            break FetchExit::CaughtUp;
        }

        records.extend(batch.into_iter().take(wanted));
    };

    debug!(
        topic,
        partitions = partitions.len(),
        records = records.len(),
        ?exit,
        "Fetch finished"
    );
    Ok((records, exit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionFactory, SessionSettings};
    use crate::simulated::SimulatedCluster;

    fn settings() -> SessionSettings {
        SessionSettings {
            client_id: "fetch-test".to_string(),
            api_timeout: Duration::from_secs(15),
            max_poll_records: 500,
            max_poll_interval: Duration::from_secs(30),
        }
    }

    fn options(policy: SeekPolicy, max_messages: usize) -> FetchOptions {
        FetchOptions {
            partitions: Vec::new(),
            policy,
            max_messages,
            poll_timeout: Duration::from_millis(100),
            budget: Duration::from_secs(15),
        }
    }

    fn seeded(records_per_partition: i64) -> SimulatedCluster {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 3);
        for partition in 0..3 {
            for i in 0..records_per_partition {
                cluster.append("orders", partition, 1_000 + i, None, b"v");
            }
        }
        cluster
    }

    #[tokio::test]
    async fn test_fetch_caps_at_target_across_polls() {
        let cluster = seeded(10);
        cluster.set_poll_batch(4);
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();

        let (records, exit) = fetch_records(&mut consumer, "orders", &options(SeekPolicy::Earliest, 10))
            .await
            .unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(exit, FetchExit::Filled);
        assert_eq!(cluster.call_count("poll"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_deadline_returns_partial_batch() {
        let cluster = seeded(10);
        cluster.set_poll_batch(2);
        cluster.set_poll_latency(Duration::from_millis(400));
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();

        let mut options = options(SeekPolicy::Earliest, 50);
        options.budget = Duration::from_secs(1);
        let (records, exit) = fetch_records(&mut consumer, "orders", &options).await.unwrap();

        // Three polls of 400 ms overrun the one second budget.
        assert_eq!(exit, FetchExit::Deadline);
        assert_eq!(records.len(), 6);
        assert_eq!(cluster.call_count("poll"), 3);
    }

    #[tokio::test]
    async fn test_fetch_stops_on_empty_poll() {
        let cluster = seeded(2);
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();

        let (records, exit) = fetch_records(&mut consumer, "orders", &options(SeekPolicy::Earliest, 50))
            .await
            .unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(exit, FetchExit::CaughtUp);
    }

    #[tokio::test]
    async fn test_fetch_latest_reads_nothing_old() {
        let cluster = seeded(5);
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();

        let (records, _) = fetch_records(&mut consumer, "orders", &options(SeekPolicy::Latest, 50))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unknown_topic_is_empty() {
        let cluster = SimulatedCluster::new();
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();

        let (records, exit) = fetch_records(&mut consumer, "ghost", &options(SeekPolicy::Earliest, 5))
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(exit, FetchExit::NoPartitions);
        assert_eq!(cluster.call_count("assign"), 0);
    }

    #[tokio::test]
    async fn test_fetch_poll_failure_aborts() {
        let cluster = seeded(3);
        cluster.fail_next("poll");
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();

        let err = fetch_records(&mut consumer, "orders", &options(SeekPolicy::Earliest, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::BrokerUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_zero_budget_never_polls() {
        let cluster = seeded(3);
        let mut consumer = cluster.open_consumer("sim", &settings()).unwrap();
        let mut opts = options(SeekPolicy::Earliest, 5);
        opts.budget = Duration::ZERO;

        let (records, exit) = fetch_records(&mut consumer, "orders", &opts).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(exit, FetchExit::Deadline);
        assert_eq!(cluster.call_count("poll"), 0);
    }
}
