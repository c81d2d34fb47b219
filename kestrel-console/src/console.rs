//! Console facade.
//!
//! The `Console` validates requests, resolves connection info through the
//! cluster registry, opens one session per call from its `SessionFactory`,
//! and runs the engine against it. Sessions are locals of each method, so
//! they are closed on every return path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use kestrel_core::{now_millis, ClusterId, ConsoleError, ConsoleResult, Limits, SeekPolicy};
use tracing::{debug, info};

use crate::api::{
    required, FetchRequest, FetchResponse, PublishRequest, PublishResponse, ResetRequest,
    ResetResponse, TailRequest, TailResponse,
};
use crate::cluster::{BootstrapResolver, ClusterDirectory};
use crate::fetch::{fetch_records, FetchOptions};
use crate::lag::{describe_group_detail, summarize_groups, GroupDetail, GroupSummary};
use crate::publish::publish_record;
use crate::reset::{reset_offsets, ResetOptions, ResetPlan, ResetReport};
use crate::session::{SessionFactory, SessionSettings};
use crate::tail::{tail_once, TailOptions};

/// Client settings shared by every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    /// Configured API timeout; unset or too small falls back per [`Limits`].
    pub api_timeout_ms: Option<u32>,
    /// Prefix of every client ID this console opens sessions with.
    pub client_id_prefix: String,
    /// Request bounds.
    pub limits: Limits,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            api_timeout_ms: None,
            client_id_prefix: "kestrel-console".to_string(),
            limits: Limits::new(),
        }
    }
}

/// Entry point for every console operation.
pub struct Console<F, R> {
    factory: F,
    registry: R,
    settings: ConsoleSettings,
    sequence: AtomicU64,
}

impl<F, R> Console<F, R>
where
    F: SessionFactory,
    R: BootstrapResolver + ClusterDirectory,
{
    /// Creates a console.
    #[must_use]
    pub const fn new(factory: F, registry: R, settings: ConsoleSettings) -> Self {
        Self {
            factory,
            registry,
            settings,
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the session factory.
    #[must_use]
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Runs a bounded fetch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument`, `UnknownCluster` or `InvalidPartition` for
    /// bad requests, and `FetchFailed` if the broker fails mid-call.
    pub async fn fetch(&self, request: FetchRequest) -> ConsoleResult<FetchResponse> {
        let cluster = required("clusterName", &request.cluster_name)?;
        let topic = required("topicName", &request.topic_name)?;
        let policy =
            SeekPolicy::from_parts(request.position, request.offset, request.timestamp_ms)?;

        let limits = &self.settings.limits;
        let max_messages = limits.clamp_messages(request.max_messages);
        let poll_timeout = limits.clamp_poll_timeout(request.poll_timeout_ms);
        let api_timeout = self.api_timeout();
        let budget = limits.fetch_budget(poll_timeout, api_timeout);

        let bootstrap = self.registry.resolve(&cluster)?;
        let settings = self.session_settings("fetch", api_timeout, max_messages, budget);
        let mut consumer = self
            .factory
            .open_consumer(&bootstrap, &settings)
            .map_err(|err| err.into_fetch_failed(&cluster, &topic))?;

        let options = FetchOptions {
            partitions: request.partitions.unwrap_or_default(),
            policy,
            max_messages: max_messages as usize,
            poll_timeout,
            budget,
        };
        let (records, exit) = fetch_records(&mut consumer, &topic, &options)
            .await
            .map_err(|err| err.into_fetch_failed(&cluster, &topic))?;

        info!(
            cluster = %cluster,
            topic = %topic,
            position = ?policy.position(),
            count = records.len(),
            ?exit,
            "Fetch completed"
        );
        Ok(FetchResponse::new(cluster, topic, &records))
    }

    /// Runs one tail step.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument`, `UnknownCluster` or `InvalidPartition` for
    /// bad requests, and `FetchFailed` if the broker fails mid-call. A cursor
    /// with a negative partition or offset is an `InvalidArgument`.
    pub async fn tail(&self, request: TailRequest) -> ConsoleResult<TailResponse> {
        let cluster = required("clusterName", &request.cluster_name)?;
        let topic = required("topicName", &request.topic_name)?;
        if let Some(cursor) = &request.last_seen {
            cursor.validate()?;
        }

        let limits = &self.settings.limits;
        let max_messages = limits.clamp_messages(request.max_messages);
        let poll_timeout = limits.clamp_poll_timeout(request.poll_timeout_ms);
        let api_timeout = self.api_timeout();

        let bootstrap = self.registry.resolve(&cluster)?;
        let settings = self.session_settings("tail", api_timeout, max_messages, poll_timeout);
        let mut consumer = self
            .factory
            .open_consumer(&bootstrap, &settings)
            .map_err(|err| err.into_fetch_failed(&cluster, &topic))?;

        let options = TailOptions {
            partitions: request.partitions.unwrap_or_default(),
            max_messages: max_messages as usize,
            poll_timeout,
        };
        let batch = tail_once(&mut consumer, &topic, &options, request.last_seen.as_ref())
            .await
            .map_err(|err| err.into_fetch_failed(&cluster, &topic))?;

        debug!(
            cluster = %cluster,
            topic = %topic,
            fetched = batch.records.len(),
            warnings = batch.warnings.len(),
            "Tail completed"
        );
        Ok(TailResponse::new(
            cluster,
            topic,
            batch,
            request.include_key,
            request.include_headers,
        ))
    }

    // -------------------------------------------------------------------------
    // Produce
    // -------------------------------------------------------------------------

    /// Publishes one record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` or `UnknownCluster` for bad requests, and
    /// `PublishFailed` if the broker rejects or times out the send.
    pub async fn publish(&self, request: PublishRequest) -> ConsoleResult<PublishResponse> {
        let (cluster, record) = request.into_record()?;
        let topic = record.topic.clone();

        let bootstrap = self.registry.resolve(&cluster)?;
        let api_timeout = self.api_timeout();
        let settings = self.session_settings("producer", api_timeout, 1, api_timeout);
        let mut producer = self
            .factory
            .open_producer(&bootstrap, &settings)
            .map_err(|err| err.into_publish_failed(&cluster, &topic))?;

        let receipt = publish_record(&mut producer, record)
            .await
            .map_err(|err| err.into_publish_failed(&cluster, &topic))?;

        info!(
            cluster = %cluster,
            topic = %topic,
            partition = receipt.partition,
            offset = receipt.offset,
            "Published record"
        );
        Ok(receipt)
    }

    // -------------------------------------------------------------------------
    // Consumer Groups
    // -------------------------------------------------------------------------

    /// Lists the cluster's consumer groups with their lag.
    ///
    /// # Errors
    ///
    /// Returns `ClusterNotFound`, `ClusterDisabled` or `ClusterMisconfigured`
    /// for unusable clusters, or the session's error if a broker call fails.
    pub async fn list_groups(&self, cluster_id: ClusterId) -> ConsoleResult<Vec<GroupSummary>> {
        let mut admin = self.open_admin(cluster_id, "groups")?;
        let summaries = summarize_groups(&mut admin).await?;

        info!(cluster_id = %cluster_id, groups = summaries.len(), "Listed consumer groups");
        Ok(summaries)
    }

    /// Describes one consumer group with per-partition lag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank group ID, `GroupNotFound` for an
    /// unknown group, cluster errors as for [`Console::list_groups`], or the
    /// session's error if a broker call fails.
    pub async fn group_detail(
        &self,
        cluster_id: ClusterId,
        group_id: &str,
    ) -> ConsoleResult<GroupDetail> {
        let group_id = required("groupId", group_id)?;
        let mut admin = self.open_admin(cluster_id, "group-detail")?;
        let detail = describe_group_detail(&mut admin, &group_id).await?;

        info!(
            cluster_id = %cluster_id,
            group_id = %group_id,
            state = %detail.state,
            total_lag = detail.total_lag,
            "Described consumer group"
        );
        Ok(detail)
    }

    /// Resets a group's committed offsets to a timestamp.
    ///
    /// Broker failures are reported in [`ResetResponse::error`] together
    /// with the plan computed so far.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank group ID or non-positive
    /// timestamp, cluster errors as for [`Console::list_groups`],
    /// `GroupNotFound`, or `GroupActive`.
    pub async fn reset_offsets(&self, request: ResetRequest) -> ConsoleResult<ResetResponse> {
        let group_id = required("groupId", &request.group_id)?;
        if request.timestamp <= 0 {
            return Err(ConsoleError::invalid_argument(
                "timestamp",
                "timestamp must be > 0 (epoch millis)",
            ));
        }

        let options = ResetOptions {
            timestamp_ms: request.timestamp,
            fallback_to_earliest: request.fallback_to_earliest,
            dry_run: request.dry_run,
            require_inactive_group: request.require_inactive_group,
        };

        let report = match self.open_admin(request.cluster_id, "reset") {
            Ok(mut admin) => reset_offsets(&mut admin, &group_id, &options).await?,
            Err(err) if err.is_scope_error() => return Err(err),
            Err(err) => ResetReport {
                plan: ResetPlan::default(),
                error: Some(err),
            },
        };

        info!(
            cluster_id = %request.cluster_id,
            group_id = %group_id,
            dry_run = request.dry_run,
            applied = report.plan.applied,
            affected = report.plan.partitions_affected,
            failed = report.error.is_some(),
            "Offset reset finished"
        );
        Ok(ResetResponse::from_report(&request, group_id, report))
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    fn api_timeout(&self) -> Duration {
        self.settings.limits.api_timeout(self.settings.api_timeout_ms)
    }

    fn open_admin(&self, cluster_id: ClusterId, kind: &str) -> ConsoleResult<F::Admin> {
        let entry = self.registry.find_cluster(cluster_id)?;
        let bootstrap = entry.usable_bootstrap()?;

        let timeout = self.settings.limits.admin_timeout(self.api_timeout());
        let settings = self.session_settings(kind, timeout, 1, timeout);
        self.factory.open_admin(&bootstrap, &settings)
    }

    /// Settings for a new session. `busy_for` is how long the caller may go
    /// without polling; the poll interval is never below the configured floor.
    fn session_settings(
        &self,
        kind: &str,
        api_timeout: Duration,
        max_poll_records: u32,
        busy_for: Duration,
    ) -> SessionSettings {
        let limits = &self.settings.limits;
        let floor = Duration::from_millis(u64::from(limits.min_poll_interval_ms));
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        SessionSettings {
            client_id: format!(
                "{}-{kind}-{}-{sequence}",
                self.settings.client_id_prefix,
                now_millis()
            ),
            api_timeout,
            max_poll_records: max_poll_records.min(limits.max_messages),
            max_poll_interval: busy_for.max(floor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterEntry, StaticClusterRegistry};
    use crate::simulated::SimulatedCluster;
    use kestrel_core::Position;

    fn console(cluster: &SimulatedCluster) -> Console<SimulatedCluster, StaticClusterRegistry> {
        let mut disabled = ClusterEntry::new(ClusterId::new(2), "old", "10.0.0.2:9092");
        disabled.enabled = false;
        let registry = StaticClusterRegistry::new(vec![
            ClusterEntry::new(ClusterId::new(1), "prod", "10.0.0.1:9092"),
            disabled,
        ]);
        Console::new(cluster.clone(), registry, ConsoleSettings::default())
    }

    fn fetch_request(topic: &str) -> FetchRequest {
        FetchRequest {
            cluster_name: "prod".to_string(),
            topic_name: topic.to_string(),
            position: Some(Position::Earliest),
            ..FetchRequest::default()
        }
    }

    #[tokio::test]
    async fn test_session_settings_are_clamped() {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 1);
        let console = console(&cluster);

        let mut request = fetch_request("orders");
        request.max_messages = Some(10_000);
        request.poll_timeout_ms = Some(1);
        console.fetch(request).await.unwrap();

        let settings = cluster.last_settings().unwrap();
        assert_eq!(settings.max_poll_records, 500);
        assert_eq!(settings.api_timeout, Duration::from_secs(15));
        assert_eq!(settings.max_poll_interval, Duration::from_secs(30));
        assert!(settings.client_id.starts_with("kestrel-console-fetch-"));
    }

    #[tokio::test]
    async fn test_client_ids_are_unique() {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 1);
        let console = console(&cluster);

        console.fetch(fetch_request("orders")).await.unwrap();
        let first = cluster.last_settings().unwrap().client_id;
        console.fetch(fetch_request("orders")).await.unwrap();
        let second = cluster.last_settings().unwrap().client_id;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_admin_timeout_is_clamped() {
        let cluster = SimulatedCluster::new();
        let mut settings = ConsoleSettings::default();
        settings.api_timeout_ms = Some(2_000);
        let registry = StaticClusterRegistry::new(vec![ClusterEntry::new(
            ClusterId::new(1),
            "prod",
            "10.0.0.1:9092",
        )]);
        let console = Console::new(cluster.clone(), registry, settings);

        console.list_groups(ClusterId::new(1)).await.unwrap();
        let opened = cluster.last_settings().unwrap();
        assert_eq!(opened.api_timeout, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_validation_precedes_session() {
        let cluster = SimulatedCluster::new();
        let console = console(&cluster);

        let mut request = fetch_request("orders");
        request.topic_name = "  ".to_string();
        let err = console.fetch(request).await.unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidArgument { name: "topicName", .. }));

        let mut request = fetch_request("orders");
        request.position = Some(Position::Offset);
        let err = console.fetch(request).await.unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidArgument { name: "offset", .. }));

        let mut request = fetch_request("orders");
        request.cluster_name = "staging".to_string();
        let err = console.fetch(request).await.unwrap_err();
        assert!(matches!(err, ConsoleError::UnknownCluster { .. }));

        assert_eq!(cluster.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_negative_tail_cursor_rejected_before_session() {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 1);
        let console = console(&cluster);

        let err = console
            .tail(TailRequest {
                cluster_name: "prod".to_string(),
                topic_name: "orders".to_string(),
                last_seen: Some(kestrel_core::TailCursor::single(0, -3)),
                ..TailRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidArgument { name: "lastSeen", .. }));
        assert_eq!(cluster.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cluster_is_refused() {
        let cluster = SimulatedCluster::new();
        let console = console(&cluster);

        let err = console.list_groups(ClusterId::new(2)).await.unwrap_err();
        assert!(matches!(err, ConsoleError::ClusterDisabled { .. }));
        let err = console
            .reset_offsets(ResetRequest::new(ClusterId::new(9), "g1", 1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::ClusterNotFound { .. }));
        assert_eq!(cluster.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_broker_failure_becomes_fetch_failed() {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 1);
        cluster.fail_next("poll");
        let console = console(&cluster);

        let err = console.fetch(fetch_request("orders")).await.unwrap_err();
        match err {
            ConsoleError::FetchFailed { cluster, topic, .. } => {
                assert_eq!(cluster, "prod");
                assert_eq!(topic, "orders");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cluster.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_carries_context() {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 1);
        cluster.fail_next("send");
        let console = console(&cluster);

        let request = PublishRequest {
            cluster_name: "prod".to_string(),
            topic_name: "orders".to_string(),
            payload: "hello".to_string(),
            ..PublishRequest::default()
        };
        let err = console.publish(request.clone()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::PublishFailed { .. }));

        let receipt = console.publish(request).await.unwrap();
        assert_eq!(receipt.topic, "orders");
        assert_eq!(receipt.offset, 0);
        assert_eq!(cluster.end_offset("orders", 0), Some(1));
    }

    #[tokio::test]
    async fn test_reset_rejects_bad_timestamp() {
        let cluster = SimulatedCluster::new();
        let console = console(&cluster);

        let err = console
            .reset_offsets(ResetRequest::new(ClusterId::new(1), "g1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidArgument { name: "timestamp", .. }));
    }

    #[tokio::test]
    async fn test_reset_open_failure_is_reported() {
        let cluster = SimulatedCluster::new();
        cluster.fail_next("open_admin");
        let console = console(&cluster);

        let response = console
            .reset_offsets(ResetRequest::new(ClusterId::new(1), "g1", 1_000))
            .await
            .unwrap();
        assert!(!response.applied);
        assert_eq!(response.group_id, "g1");
        assert!(response.error.is_some());
    }
}
