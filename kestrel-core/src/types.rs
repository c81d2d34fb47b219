//! Strongly-typed identifiers and seek policies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, ConsoleResult};

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix a cluster ID with a raw offset)
/// - Debug/Display formatting
/// - Transparent serde representation (a plain number on the wire)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(ClusterId, "cluster", "Identifier of a registered Kafka cluster.");

// -----------------------------------------------------------------------------
// Partition Key
// -----------------------------------------------------------------------------

/// A (topic, partition index) pair.
///
/// Ordering is by topic name, then partition index, which is also the order
/// every plan and report is emitted in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Topic name.
    pub topic: String,
    /// Partition index within the topic.
    pub partition: i32,
}

impl PartitionKey {
    /// Creates a new partition key.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

// -----------------------------------------------------------------------------
// Seek Policy
// -----------------------------------------------------------------------------

/// Start position requested by a fetch caller, as it arrives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    /// Oldest retained record of each partition.
    Earliest,
    /// Current end of each partition.
    #[default]
    Latest,
    /// An explicit offset, applied to every selected partition.
    Offset,
    /// The first record at or after a wall-clock timestamp.
    Timestamp,
}

/// Validated start position for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPolicy {
    /// Seek every partition to its beginning.
    Earliest,
    /// Seek every partition to its end.
    Latest,
    /// Seek every partition to the same literal offset (non-negative).
    Offset(i64),
    /// Seek every partition to the first offset at or after this epoch-millisecond
    /// timestamp (positive).
    Timestamp(i64),
}

impl SeekPolicy {
    /// Builds a policy from the loose request shape.
    ///
    /// An absent position means [`Position::Latest`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `OFFSET` lacks a non-negative offset or
    /// `TIMESTAMP` lacks a positive timestamp.
    pub fn from_parts(
        position: Option<Position>,
        offset: Option<i64>,
        timestamp_ms: Option<i64>,
    ) -> ConsoleResult<Self> {
        match position.unwrap_or_default() {
            Position::Earliest => Ok(Self::Earliest),
            Position::Latest => Ok(Self::Latest),
            Position::Offset => match offset {
                Some(value) if value >= 0 => Ok(Self::Offset(value)),
                _ => Err(ConsoleError::invalid_argument(
                    "offset",
                    "offset is required and must be >= 0 when position=OFFSET",
                )),
            },
            Position::Timestamp => match timestamp_ms {
                Some(value) if value > 0 => Ok(Self::Timestamp(value)),
                _ => Err(ConsoleError::invalid_argument(
                    "timestampMs",
                    "timestampMs is required and must be > 0 when position=TIMESTAMP",
                )),
            },
        }
    }

    /// Returns the wire position this policy corresponds to.
    #[must_use]
    pub const fn position(self) -> Position {
        match self {
            Self::Earliest => Position::Earliest,
            Self::Latest => Position::Latest,
            Self::Offset(_) => Position::Offset,
            Self::Timestamp(_) => Position::Timestamp,
        }
    }
}
