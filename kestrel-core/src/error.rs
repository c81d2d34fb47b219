//! Console error taxonomy.
//!
//! Scope errors (bad arguments, unknown cluster/topic/partition/group, a
//! refused reset) are the sole outcome of the call that raised them. Broker
//! and transport failures carry enough context to tell which cluster and
//! topic the caller was talking to. Per-partition resolution problems during
//! an offset reset are NOT errors; they become notes on the plan.

use thiserror::Error;

use crate::types::ClusterId;

/// Result type for console operations.
pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Errors that can occur during console operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// Malformed request: missing field or out-of-range value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// The offending field.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// No cluster is registered under this name.
    #[error("unknown cluster: {name}")]
    UnknownCluster {
        /// The cluster name that was looked up.
        name: String,
    },

    /// No cluster is registered under this ID.
    #[error("cluster not found: {cluster_id}")]
    ClusterNotFound {
        /// The cluster ID that was looked up.
        cluster_id: ClusterId,
    },

    /// The cluster exists but is disabled for console operations.
    #[error("cluster is disabled: {name} ({cluster_id})")]
    ClusterDisabled {
        /// The cluster ID.
        cluster_id: ClusterId,
        /// The cluster name.
        name: String,
    },

    /// The cluster exists but has no usable connection info.
    #[error("bootstrap servers are empty for cluster: {name} ({cluster_id})")]
    ClusterMisconfigured {
        /// The cluster ID.
        cluster_id: ClusterId,
        /// The cluster name.
        name: String,
    },

    /// The topic has no partitions (absent, or the broker is unreachable).
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// The topic that was looked up.
        topic: String,
    },

    /// A requested partition index does not exist on the topic.
    #[error("invalid partition: {partition} for topic: {topic}")]
    InvalidPartition {
        /// The topic.
        topic: String,
        /// The first offending partition index.
        partition: i32,
    },

    /// The consumer group does not exist.
    #[error("group not found: {group_id}")]
    GroupNotFound {
        /// The group that was looked up.
        group_id: String,
    },

    /// The consumer group has live members, so its offsets may not be reset.
    #[error(
        "group is ACTIVE (members={members}); stop consumers before resetting offsets. groupId={group_id}"
    )]
    GroupActive {
        /// The group.
        group_id: String,
        /// Current member count.
        members: u32,
    },

    /// A broker call failed or timed out.
    #[error("broker unavailable during {operation}: {message}")]
    BrokerUnavailable {
        /// The broker operation that failed.
        operation: &'static str,
        /// Underlying client message.
        message: String,
    },

    /// A fetch or tail call failed after it reached the broker.
    #[error("fetch failed cluster={cluster} topic={topic}: {message}")]
    FetchFailed {
        /// The cluster name.
        cluster: String,
        /// The topic.
        topic: String,
        /// Underlying failure.
        message: String,
    },

    /// A publish call failed after it reached the broker.
    #[error("publish failed cluster={cluster} topic={topic}: {message}")]
    PublishFailed {
        /// The cluster name.
        cluster: String,
        /// The topic.
        topic: String,
        /// Underlying failure.
        message: String,
    },
}

/// Longest client message carried inside an error.
const MAX_MESSAGE_LEN: usize = 500;

impl ConsoleError {
    /// Builds an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Builds a `BrokerUnavailable` error, truncating long client messages.
    #[must_use]
    pub fn broker(operation: &'static str, message: impl Into<String>) -> Self {
        Self::BrokerUnavailable {
            operation,
            message: truncate(message.into()),
        }
    }

    /// Wraps transport failures as `FetchFailed` for the given cluster/topic.
    ///
    /// Scope errors pass through untouched.
    #[must_use]
    pub fn into_fetch_failed(self, cluster: &str, topic: &str) -> Self {
        match self {
            Self::BrokerUnavailable { operation, message } => Self::FetchFailed {
                cluster: cluster.to_string(),
                topic: topic.to_string(),
                message: format!("{operation}: {message}"),
            },
            other => other,
        }
    }

    /// Wraps transport failures as `PublishFailed` for the given cluster/topic.
    ///
    /// Scope errors pass through untouched.
    #[must_use]
    pub fn into_publish_failed(self, cluster: &str, topic: &str) -> Self {
        match self {
            Self::BrokerUnavailable { operation, message } => Self::PublishFailed {
                cluster: cluster.to_string(),
                topic: topic.to_string(),
                message: format!("{operation}: {message}"),
            },
            other => other,
        }
    }

    /// Returns true for argument and scope errors: the request itself was
    /// wrong, so reissuing it unchanged cannot succeed.
    #[must_use]
    pub const fn is_scope_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::UnknownCluster { .. }
                | Self::ClusterNotFound { .. }
                | Self::ClusterDisabled { .. }
                | Self::ClusterMisconfigured { .. }
                | Self::TopicNotFound { .. }
                | Self::InvalidPartition { .. }
                | Self::GroupNotFound { .. }
                | Self::GroupActive { .. }
        )
    }

    /// Returns a stable numeric code for reporting.
    #[must_use]
    pub const fn error_code(&self) -> i16 {
        match self {
            Self::InvalidArgument { .. } => 1,
            Self::UnknownCluster { .. } => 2,
            Self::ClusterNotFound { .. } => 3,
            Self::ClusterDisabled { .. } => 4,
            Self::ClusterMisconfigured { .. } => 5,
            Self::TopicNotFound { .. } => 6,
            Self::InvalidPartition { .. } => 7,
            Self::GroupNotFound { .. } => 8,
            Self::GroupActive { .. } => 9,
            Self::BrokerUnavailable { .. } => -1,
            Self::FetchFailed { .. } => -2,
            Self::PublishFailed { .. } => -3,
        }
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}
