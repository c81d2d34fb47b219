//! In-memory simulated cluster for deterministic tests.
//!
//! `SimulatedCluster` is a [`SessionFactory`] whose sessions read and write a
//! shared in-memory model of topics, partition logs and consumer groups.
//! Clones share state, so a test can keep a handle for setup and assertions
//! while the console drives sessions opened from another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kestrel_core::{
    now_millis, ConsoleError, ConsoleResult, ConsumedRecord, PartitionKey, RecordHeader,
};

use crate::seek::{SeekPlan, StartOffset};
use crate::session::{
    AdminSession, ConsumerSession, DeliveryReport, GroupDescription, GroupMember, GroupState,
    ListedOffset, ListedOffsets, OffsetSpec, OutgoingRecord, ProducerSession, SessionFactory,
    SessionSettings,
};

// -----------------------------------------------------------------------------
// Cluster State
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredRecord {
    timestamp: i64,
    key: Option<Bytes>,
    value: Option<Bytes>,
    headers: Vec<RecordHeader>,
}

#[derive(Debug, Clone, Default)]
struct PartitionLog {
    log_start: i64,
    records: Vec<StoredRecord>,
}

impl PartitionLog {
    #[allow(clippy::cast_possible_wrap)]
    fn end(&self) -> i64 {
        self.log_start + self.records.len() as i64
    }

    fn get(&self, offset: i64) -> Option<&StoredRecord> {
        let index = usize::try_from(offset - self.log_start).ok()?;
        self.records.get(index)
    }

    fn first_at_or_after(&self, timestamp_ms: i64) -> Option<ListedOffset> {
        (self.log_start..self.end()).find_map(|offset| {
            self.get(offset)
                .filter(|record| record.timestamp >= timestamp_ms)
                .map(|record| ListedOffset {
                    offset,
                    timestamp: Some(record.timestamp),
                })
        })
    }
}

#[derive(Debug, Clone)]
struct SimulatedGroup {
    state: GroupState,
    members: Vec<GroupMember>,
    committed: BTreeMap<PartitionKey, i64>,
}

#[derive(Debug, Default)]
struct ClusterState {
    topics: BTreeMap<String, Vec<PartitionLog>>,
    groups: BTreeMap<String, SimulatedGroup>,
    /// Operations whose next call fails (one-shot).
    fail_next: HashSet<&'static str>,
    /// Offset lookup overrides: `None` makes the lookup unresolvable.
    offset_overrides: HashMap<(PartitionKey, &'static str), Option<i64>>,
    /// Records returned per poll, at most.
    poll_batch: Option<usize>,
    /// Time every poll takes before returning.
    poll_latency: Option<Duration>,
    calls: HashMap<&'static str, u64>,
    sessions_opened: u64,
    sessions_closed: u64,
    last_settings: Option<SessionSettings>,
}

impl ClusterState {
    /// Counts a call and consumes a forced failure for it.
    fn enter(&mut self, operation: &'static str) -> ConsoleResult<()> {
        *self.calls.entry(operation).or_insert(0) += 1;
        if self.fail_next.remove(operation) {
            return Err(ConsoleError::broker(operation, "simulated failure (forced)"));
        }
        Ok(())
    }

    fn log(&self, key: &PartitionKey) -> Option<&PartitionLog> {
        self.topics
            .get(&key.topic)
            .and_then(|logs| usize::try_from(key.partition).ok().and_then(|i| logs.get(i)))
    }

    fn log_mut(&mut self, key: &PartitionKey) -> Option<&mut PartitionLog> {
        self.topics
            .get_mut(&key.topic)
            .and_then(|logs| usize::try_from(key.partition).ok().and_then(|i| logs.get_mut(i)))
    }

    fn list_offsets(&self, partitions: &[PartitionKey], spec: OffsetSpec) -> ListedOffsets {
        let mut listed = ListedOffsets::new();
        for key in partitions {
            let Some(log) = self.log(key) else {
                continue;
            };

            let found = match self.offset_overrides.get(&(key.clone(), spec.kind())) {
                Some(&forced) => forced.map(ListedOffset::at),
                None => match spec {
                    OffsetSpec::Earliest => Some(ListedOffset::at(log.log_start)),
                    OffsetSpec::Latest => Some(ListedOffset::at(log.end())),
                    OffsetSpec::ForTimestamp(timestamp_ms) => log.first_at_or_after(timestamp_ms),
                },
            };

            if let Some(found) = found {
                listed.insert(key.clone(), found);
            }
        }
        listed
    }
}

// -----------------------------------------------------------------------------
// Simulated Cluster
// -----------------------------------------------------------------------------

/// In-memory simulated cluster.
///
/// Supports one-shot forced failures per operation name (see
/// [`SimulatedCluster::fail_next`]) and offset lookup overrides for testing
/// resolution fallbacks.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------

    /// Creates a topic with empty partitions. Replaces an existing topic.
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        self.state()
            .topics
            .insert(topic.to_string(), vec![PartitionLog::default(); partitions]);
    }

    /// Moves the start of an empty partition log, as retention would.
    ///
    /// No-op if the partition does not exist or already holds records.
    pub fn set_log_start(&self, topic: &str, partition: i32, offset: i64) {
        let mut state = self.state();
        if let Some(log) = state.log_mut(&PartitionKey::new(topic, partition)) {
            if log.records.is_empty() {
                log.log_start = offset;
            }
        }
    }

    /// Appends a record and returns its offset, or `None` for an unknown partition.
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        timestamp: i64,
        key: Option<&[u8]>,
        value: &[u8],
    ) -> Option<i64> {
        self.append_record(
            topic,
            partition,
            timestamp,
            key.map(Bytes::copy_from_slice),
            Some(Bytes::copy_from_slice(value)),
            Vec::new(),
        )
    }

    /// Appends a record with full control over payload and headers.
    pub fn append_record(
        &self,
        topic: &str,
        partition: i32,
        timestamp: i64,
        key: Option<Bytes>,
        value: Option<Bytes>,
        headers: Vec<RecordHeader>,
    ) -> Option<i64> {
        let mut state = self.state();
        let log = state.log_mut(&PartitionKey::new(topic, partition))?;
        let offset = log.end();
        log.records.push(StoredRecord {
            timestamp,
            key,
            value,
            headers,
        });
        Some(offset)
    }

    /// Registers a group with the given state and no members.
    pub fn create_group(&self, group_id: &str, state: GroupState) {
        self.state().groups.insert(
            group_id.to_string(),
            SimulatedGroup {
                state,
                members: Vec::new(),
                committed: BTreeMap::new(),
            },
        );
    }

    /// Adds a member to an existing group and marks it `STABLE`.
    pub fn join_group(&self, group_id: &str, member_id: &str, client_id: &str) {
        if let Some(group) = self.state().groups.get_mut(group_id) {
            group.members.push(GroupMember {
                member_id: member_id.to_string(),
                client_id: client_id.to_string(),
            });
            group.state = GroupState::Stable;
        }
    }

    /// Sets a committed offset, creating an `EMPTY` group if needed.
    pub fn commit(&self, group_id: &str, topic: &str, partition: i32, offset: i64) {
        self.state()
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| SimulatedGroup {
                state: GroupState::Empty,
                members: Vec::new(),
                committed: BTreeMap::new(),
            })
            .committed
            .insert(PartitionKey::new(topic, partition), offset);
    }

    /// Forces the result of an offset lookup for one partition.
    ///
    /// `None` makes the lookup unresolvable; `Some(offset)` is returned verbatim,
    /// negative values included.
    pub fn override_offset(&self, key: PartitionKey, spec: OffsetSpec, offset: Option<i64>) {
        self.state()
            .offset_overrides
            .insert((key, spec.kind()), offset);
    }

    /// Makes the next call of `operation` fail with `BrokerUnavailable`.
    ///
    /// Operation names are the session method names, e.g. `"poll"`,
    /// `"describe_group"`, `"alter_group_offsets"`, `"send"`.
    pub fn fail_next(&self, operation: &'static str) {
        self.state().fail_next.insert(operation);
    }

    /// Caps the records a single poll returns.
    pub fn set_poll_batch(&self, records: usize) {
        self.state().poll_batch = Some(records);
    }

    /// Makes every poll take this long.
    pub fn set_poll_latency(&self, latency: Duration) {
        self.state().poll_latency = Some(latency);
    }

    // -------------------------------------------------------------------------
    // Inspection (bypasses faults)
    // -------------------------------------------------------------------------

    /// Returns a group's committed offset for a partition.
    #[must_use]
    pub fn committed(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        self.state()
            .groups
            .get(group_id)
            .and_then(|g| g.committed.get(&PartitionKey::new(topic, partition)).copied())
    }

    /// Returns the end offset of a partition.
    #[must_use]
    pub fn end_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state()
            .log(&PartitionKey::new(topic, partition))
            .map(PartitionLog::end)
    }

    /// Number of times a session operation was invoked.
    #[must_use]
    pub fn call_count(&self, operation: &str) -> u64 {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    /// Sessions opened so far.
    #[must_use]
    pub fn sessions_opened(&self) -> u64 {
        self.state().sessions_opened
    }

    /// Sessions opened but not yet dropped.
    #[must_use]
    pub fn open_sessions(&self) -> u64 {
        let state = self.state();
        state.sessions_opened - state.sessions_closed
    }

    /// Settings of the most recently opened session.
    #[must_use]
    pub fn last_settings(&self) -> Option<SessionSettings> {
        self.state().last_settings.clone()
    }

    fn open(&self, operation: &'static str, settings: &SessionSettings) -> ConsoleResult<()> {
        let mut state = self.state();
        state.enter(operation)?;
        state.sessions_opened += 1;
        state.last_settings = Some(settings.clone());
        Ok(())
    }

    fn close(&self) {
        self.state().sessions_closed += 1;
    }
}

impl SessionFactory for SimulatedCluster {
    type Consumer = SimulatedConsumer;
    type Admin = SimulatedAdmin;
    type Producer = SimulatedProducer;

    fn open_consumer(
        &self,
        _bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<SimulatedConsumer> {
        self.open("open_consumer", settings)?;
        Ok(SimulatedConsumer {
            cluster: self.clone(),
            positions: BTreeMap::new(),
        })
    }

    fn open_admin(
        &self,
        _bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<SimulatedAdmin> {
        self.open("open_admin", settings)?;
        Ok(SimulatedAdmin {
            cluster: self.clone(),
        })
    }

    fn open_producer(
        &self,
        _bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<SimulatedProducer> {
        self.open("open_producer", settings)?;
        Ok(SimulatedProducer {
            cluster: self.clone(),
        })
    }
}

// -----------------------------------------------------------------------------
// Simulated Consumer
// -----------------------------------------------------------------------------

/// Consumer session over a [`SimulatedCluster`].
#[derive(Debug)]
pub struct SimulatedConsumer {
    cluster: SimulatedCluster,
    /// Next offset to read per assigned partition.
    positions: BTreeMap<PartitionKey, i64>,
}

#[async_trait]
impl ConsumerSession for SimulatedConsumer {
    async fn partitions_for(&mut self, topic: &str) -> ConsoleResult<Vec<i32>> {
        let mut state = self.cluster.state();
        state.enter("partitions_for")?;
        let count = state.topics.get(topic).map_or(0, Vec::len);
        Ok((0..count).filter_map(|p| i32::try_from(p).ok()).collect())
    }

    async fn list_offsets(
        &mut self,
        partitions: &[PartitionKey],
        spec: OffsetSpec,
    ) -> ConsoleResult<ListedOffsets> {
        let mut state = self.cluster.state();
        state.enter("list_offsets")?;
        Ok(state.list_offsets(partitions, spec))
    }

    async fn assign(&mut self, plan: &SeekPlan) -> ConsoleResult<()> {
        let mut state = self.cluster.state();
        state.enter("assign")?;

        let mut positions = BTreeMap::new();
        for (key, start) in plan.iter() {
            let Some(log) = state.log(key) else {
                return Err(ConsoleError::broker(
                    "assign",
                    format!("unknown topic or partition: {key}"),
                ));
            };
            // Out-of-range offsets reset to the end, as auto.offset.reset=latest does.
            let position = match start {
                StartOffset::Beginning => log.log_start,
                StartOffset::End => log.end(),
                StartOffset::At(offset) if (log.log_start..=log.end()).contains(&offset) => offset,
                StartOffset::At(_) => log.end(),
            };
            positions.insert(key.clone(), position);
        }

        self.positions = positions;
        Ok(())
    }

    async fn poll(
        &mut self,
        _timeout: Duration,
        max_records: usize,
    ) -> ConsoleResult<Vec<ConsumedRecord>> {
        let latency = {
            let mut state = self.cluster.state();
            state.enter("poll")?;
            state.poll_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.cluster.state();
        let limit = state.poll_batch.map_or(max_records, |batch| batch.min(max_records));
        let mut records = Vec::new();

        for (key, position) in &mut self.positions {
            let Some(log) = state.log(key) else {
                continue;
            };
            while records.len() < limit {
                let Some(stored) = log.get(*position) else {
                    break;
                };
                records.push(ConsumedRecord {
                    topic: key.topic.clone(),
                    partition: key.partition,
                    offset: *position,
                    timestamp: stored.timestamp,
                    key: stored.key.clone(),
                    value: stored.value.clone(),
                    headers: stored.headers.clone(),
                });
                *position += 1;
            }
        }

        Ok(records)
    }
}

impl Drop for SimulatedConsumer {
    fn drop(&mut self) {
        self.cluster.close();
    }
}

// -----------------------------------------------------------------------------
// Simulated Admin
// -----------------------------------------------------------------------------

/// Admin session over a [`SimulatedCluster`].
#[derive(Debug)]
pub struct SimulatedAdmin {
    cluster: SimulatedCluster,
}

#[async_trait]
impl AdminSession for SimulatedAdmin {
    async fn list_groups(&mut self) -> ConsoleResult<Vec<String>> {
        let mut state = self.cluster.state();
        state.enter("list_groups")?;
        Ok(state.groups.keys().cloned().collect())
    }

    async fn describe_group(&mut self, group_id: &str) -> ConsoleResult<Option<GroupDescription>> {
        let mut state = self.cluster.state();
        state.enter("describe_group")?;
        // Unknown groups come back as DEAD with no members, as brokers do.
        let description = state.groups.get(group_id).map_or_else(
            || GroupDescription {
                group_id: group_id.to_string(),
                state: GroupState::Dead,
                members: Vec::new(),
            },
            |group| GroupDescription {
                group_id: group_id.to_string(),
                state: group.state,
                members: group.members.clone(),
            },
        );
        Ok(Some(description))
    }

    async fn committed_offsets(
        &mut self,
        group_id: &str,
    ) -> ConsoleResult<BTreeMap<PartitionKey, i64>> {
        let mut state = self.cluster.state();
        state.enter("committed_offsets")?;
        Ok(state
            .groups
            .get(group_id)
            .map(|group| group.committed.clone())
            .unwrap_or_default())
    }

    async fn list_offsets(
        &mut self,
        partitions: &[PartitionKey],
        spec: OffsetSpec,
    ) -> ConsoleResult<ListedOffsets> {
        let mut state = self.cluster.state();
        state.enter("list_offsets")?;
        Ok(state.list_offsets(partitions, spec))
    }

    async fn alter_group_offsets(
        &mut self,
        group_id: &str,
        offsets: &BTreeMap<PartitionKey, i64>,
    ) -> ConsoleResult<()> {
        let mut state = self.cluster.state();
        state.enter("alter_group_offsets")?;
        let group = state.groups.get_mut(group_id).ok_or_else(|| {
            ConsoleError::broker("alter_group_offsets", format!("unknown group: {group_id}"))
        })?;
        for (key, offset) in offsets {
            group.committed.insert(key.clone(), *offset);
        }
        Ok(())
    }
}

impl Drop for SimulatedAdmin {
    fn drop(&mut self) {
        self.cluster.close();
    }
}

// -----------------------------------------------------------------------------
// Simulated Producer
// -----------------------------------------------------------------------------

/// Producer session over a [`SimulatedCluster`].
#[derive(Debug)]
pub struct SimulatedProducer {
    cluster: SimulatedCluster,
}

#[async_trait]
impl ProducerSession for SimulatedProducer {
    async fn send(&mut self, record: OutgoingRecord) -> ConsoleResult<DeliveryReport> {
        let mut state = self.cluster.state();
        state.enter("send")?;

        let partitions = state.topics.get(&record.topic).map_or(0, Vec::len);
        if partitions == 0 {
            return Err(ConsoleError::broker(
                "send",
                format!("unknown topic or partition: {}", record.topic),
            ));
        }

        // Keyed records hash to a stable partition; keyless records go to 0.
        let index = record.key.as_ref().map_or(0, |key| {
            key.iter()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(*b)))
                % partitions
        });
        let partition = i32::try_from(index)
            .map_err(|_| ConsoleError::broker("send", "partition index out of range"))?;

        let timestamp = now_millis();
        let key = PartitionKey::new(record.topic, partition);
        let log = state
            .log_mut(&key)
            .ok_or_else(|| ConsoleError::broker("send", format!("unknown partition: {key}")))?;
        let offset = log.end();
        log.records.push(StoredRecord {
            timestamp,
            key: record.key,
            value: Some(record.value),
            headers: record.headers,
        });

        Ok(DeliveryReport {
            partition,
            offset,
            timestamp: Some(timestamp),
        })
    }
}

impl Drop for SimulatedProducer {
    fn drop(&mut self) {
        self.cluster.close();
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
