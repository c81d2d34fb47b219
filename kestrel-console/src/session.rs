//! Broker session abstraction.
//!
//! Provides the session traits the console engine is written against, and the
//! `SessionFactory` that opens them. A session is owned by exactly one console
//! call and is closed when dropped, so every exit path releases it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kestrel_core::{ConsoleResult, ConsumedRecord, PartitionKey, RecordHeader};
use serde::{Deserialize, Serialize};

use crate::seek::SeekPlan;

// -----------------------------------------------------------------------------
// Offset Lookup
// -----------------------------------------------------------------------------

/// Which offset to look up for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSpec {
    /// Oldest retained offset.
    Earliest,
    /// Next offset to be written.
    Latest,
    /// First offset whose record timestamp is at or after the given epoch ms.
    ForTimestamp(i64),
}

impl OffsetSpec {
    /// Short name used in logs and fault injection.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
            Self::ForTimestamp(_) => "for_timestamp",
        }
    }
}

/// A resolved offset lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedOffset {
    /// The offset; may be negative when the broker returns a sentinel.
    pub offset: i64,
    /// Timestamp of the record at `offset`, when the broker reports it.
    pub timestamp: Option<i64>,
}

impl ListedOffset {
    /// A listed offset without a record timestamp.
    #[must_use]
    pub const fn at(offset: i64) -> Self {
        Self {
            offset,
            timestamp: None,
        }
    }
}

/// Offset lookup results. A partition missing from the map is unresolvable.
pub type ListedOffsets = HashMap<PartitionKey, ListedOffset>;

// -----------------------------------------------------------------------------
// Group Description
// -----------------------------------------------------------------------------

/// Consumer group state as reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupState {
    /// Members are consuming with a settled assignment.
    Stable,
    /// No members, but the group still has committed offsets.
    Empty,
    /// A rebalance is starting.
    PreparingRebalance,
    /// A rebalance is finishing.
    CompletingRebalance,
    /// The group has no members and no metadata.
    Dead,
    /// Anything the client did not recognise.
    Unknown,
}

impl GroupState {
    /// Parses a broker state name, case- and separator-insensitively.
    #[must_use]
    pub fn from_broker(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "stable" => Self::Stable,
            "empty" => Self::Empty,
            "preparingrebalance" => Self::PreparingRebalance,
            "completingrebalance" | "awaitingsync" => Self::CompletingRebalance,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Empty => "EMPTY",
            Self::PreparingRebalance => "PREPARING_REBALANCE",
            Self::CompletingRebalance => "COMPLETING_REBALANCE",
            Self::Dead => "DEAD",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live member of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    /// Coordinator-assigned member ID.
    pub member_id: String,
    /// Client ID the member connected with (may be empty).
    pub client_id: String,
}

/// A consumer group as described by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    /// Group ID.
    pub group_id: String,
    /// Current state.
    pub state: GroupState,
    /// Current members.
    pub members: Vec<GroupMember>,
}

impl GroupDescription {
    /// Number of live members.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn member_count(&self) -> u32 {
        self.members.len() as u32
    }

    /// Returns true when the coordinator knows nothing about the group.
    ///
    /// Brokers answer a describe for an unknown group with `DEAD` and no
    /// members rather than an error.
    #[must_use]
    pub fn is_vacant(&self) -> bool {
        self.state == GroupState::Dead && self.members.is_empty()
    }
}

// -----------------------------------------------------------------------------
// Produce
// -----------------------------------------------------------------------------

/// A record to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRecord {
    /// Destination topic.
    pub topic: String,
    /// Optional key; `None` lets the partitioner choose.
    pub key: Option<Bytes>,
    /// Payload.
    pub value: Bytes,
    /// Headers in wire order.
    pub headers: Vec<RecordHeader>,
}

/// Broker acknowledgement for a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Partition the record landed on.
    pub partition: i32,
    /// Offset assigned by the broker.
    pub offset: i64,
    /// Record timestamp, if the broker reported one.
    pub timestamp: Option<i64>,
}

// -----------------------------------------------------------------------------
// Session Settings
// -----------------------------------------------------------------------------

/// Per-call client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Client ID presented to the broker; unique per session.
    pub client_id: String,
    /// Request and default API timeout.
    pub api_timeout: Duration,
    /// Upper bound on records returned by a single poll.
    pub max_poll_records: u32,
    /// Maximum time between polls before the client gives up its assignment.
    pub max_poll_interval: Duration,
}

// -----------------------------------------------------------------------------
// Session Traits
// -----------------------------------------------------------------------------

/// A group-less consumer: manual assignment, no offset commits.
#[async_trait]
pub trait ConsumerSession: Send {
    /// Lists partition indexes of a topic.
    ///
    /// Returns an empty list when the topic does not exist.
    async fn partitions_for(&mut self, topic: &str) -> ConsoleResult<Vec<i32>>;

    /// Looks up offsets for the given partitions.
    async fn list_offsets(
        &mut self,
        partitions: &[PartitionKey],
        spec: OffsetSpec,
    ) -> ConsoleResult<ListedOffsets>;

    /// Assigns exactly the planned partitions at their planned start offsets.
    async fn assign(&mut self, plan: &SeekPlan) -> ConsoleResult<()>;

    /// Polls once, returning at most `max_records` records.
    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> ConsoleResult<Vec<ConsumedRecord>>;
}

/// Consumer-group administration.
#[async_trait]
pub trait AdminSession: Send {
    /// Lists all consumer group IDs.
    async fn list_groups(&mut self) -> ConsoleResult<Vec<String>>;

    /// Describes a group.
    ///
    /// Returns `None` if the coordinator does not report the group at all.
    async fn describe_group(&mut self, group_id: &str) -> ConsoleResult<Option<GroupDescription>>;

    /// Returns the group's committed offsets, ordered by partition.
    async fn committed_offsets(&mut self, group_id: &str)
        -> ConsoleResult<BTreeMap<PartitionKey, i64>>;

    /// Looks up offsets for the given partitions.
    async fn list_offsets(
        &mut self,
        partitions: &[PartitionKey],
        spec: OffsetSpec,
    ) -> ConsoleResult<ListedOffsets>;

    /// Commits new offsets for the group in a single call.
    async fn alter_group_offsets(
        &mut self,
        group_id: &str,
        offsets: &BTreeMap<PartitionKey, i64>,
    ) -> ConsoleResult<()>;
}

/// A transient producer.
#[async_trait]
pub trait ProducerSession: Send {
    /// Publishes one record and waits for the acknowledgement.
    async fn send(&mut self, record: OutgoingRecord) -> ConsoleResult<DeliveryReport>;
}

/// Opens broker sessions.
///
/// Opening is a pure function of the bootstrap string and the settings; the
/// factory holds only static client configuration such as TLS material.
pub trait SessionFactory: Send + Sync {
    /// Consumer session type.
    type Consumer: ConsumerSession;
    /// Admin session type.
    type Admin: AdminSession;
    /// Producer session type.
    type Producer: ProducerSession;

    /// Opens a group-less consumer.
    ///
    /// # Errors
    ///
    /// Returns `BrokerUnavailable` if the client cannot be created.
    fn open_consumer(
        &self,
        bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<Self::Consumer>;

    /// Opens an admin session.
    ///
    /// # Errors
    ///
    /// Returns `BrokerUnavailable` if the client cannot be created.
    fn open_admin(&self, bootstrap: &str, settings: &SessionSettings)
        -> ConsoleResult<Self::Admin>;

    /// Opens a producer.
    ///
    /// # Errors
    ///
    /// Returns `BrokerUnavailable` if the client cannot be created.
    fn open_producer(
        &self,
        bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<Self::Producer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_state_parsing() {
        assert_eq!(GroupState::from_broker("Stable"), GroupState::Stable);
        assert_eq!(GroupState::from_broker("EMPTY"), GroupState::Empty);
        assert_eq!(
            GroupState::from_broker("PreparingRebalance"),
            GroupState::PreparingRebalance
        );
        assert_eq!(
            GroupState::from_broker("COMPLETING_REBALANCE"),
            GroupState::CompletingRebalance
        );
        assert_eq!(
            GroupState::from_broker("AwaitingSync"),
            GroupState::CompletingRebalance
        );
        assert_eq!(GroupState::from_broker("Dead"), GroupState::Dead);
        assert_eq!(GroupState::from_broker(""), GroupState::Unknown);
        assert_eq!(GroupState::PreparingRebalance.to_string(), "PREPARING_REBALANCE");
    }

    #[test]
    fn test_vacant_group() {
        let mut desc = GroupDescription {
            group_id: "g1".to_string(),
            state: GroupState::Dead,
            members: Vec::new(),
        };
        assert!(desc.is_vacant());

        desc.state = GroupState::Empty;
        assert!(!desc.is_vacant());
        assert_eq!(desc.member_count(), 0);
    }
}
