//! Offset-bearing value types: tail cursors, lag rows and reset changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, ConsoleResult};
use crate::types::PartitionKey;

/// Sentinel for an offset the broker did not report.
pub const UNKNOWN_OFFSET: i64 = -1;

// -----------------------------------------------------------------------------
// Tail Cursor
// -----------------------------------------------------------------------------

/// One cursor entry on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Partition index.
    pub partition: i32,
    /// Last offset actually observed on that partition.
    pub offset: i64,
}

/// Caller-owned tail position: partition to last-seen offset.
///
/// The server never stores a cursor. An offset in a cursor is always the
/// last offset observed, never the next one to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CursorPosition>", into = "Vec<CursorPosition>")]
pub struct TailCursor {
    last_seen: BTreeMap<i32, i64>,
}

impl TailCursor {
    /// Creates an empty cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cursor naming a single partition.
    #[must_use]
    pub fn single(partition: i32, offset: i64) -> Self {
        let mut cursor = Self::new();
        cursor.observe(partition, offset);
        cursor
    }

    /// Returns the last-seen offset for a partition.
    #[must_use]
    pub fn last_seen(&self, partition: i32) -> Option<i64> {
        self.last_seen.get(&partition).copied()
    }

    /// Records an observed offset. Never moves a partition backwards.
    pub fn observe(&mut self, partition: i32, offset: i64) {
        self.last_seen
            .entry(partition)
            .and_modify(|seen| *seen = (*seen).max(offset))
            .or_insert(offset);
    }

    /// Checks that every entry is an offset that could have been observed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first partition with a negative
    /// partition index or offset.
    pub fn validate(&self) -> ConsoleResult<()> {
        match self.iter().find(|&(partition, offset)| partition < 0 || offset < 0) {
            Some((partition, offset)) => Err(ConsoleError::invalid_argument(
                "lastSeen",
                format!("cursor entry {partition}@{offset} is not an observed offset"),
            )),
            None => Ok(()),
        }
    }

    /// Returns true if the cursor names no partition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// Iterates `(partition, last_seen_offset)` in partition order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.last_seen.iter().map(|(p, o)| (*p, *o))
    }
}

impl From<Vec<CursorPosition>> for TailCursor {
    fn from(positions: Vec<CursorPosition>) -> Self {
        let mut cursor = Self::new();
        for position in positions {
            cursor.observe(position.partition, position.offset);
        }
        cursor
    }
}

impl From<TailCursor> for Vec<CursorPosition> {
    fn from(cursor: TailCursor) -> Self {
        cursor
            .iter()
            .map(|(partition, offset)| CursorPosition { partition, offset })
            .collect()
    }
}

// -----------------------------------------------------------------------------
// Group Lag
// -----------------------------------------------------------------------------

/// Per-partition lag of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLagRow {
    /// Topic name.
    pub topic: String,
    /// Partition index.
    pub partition: i32,
    /// Committed offset, or [`UNKNOWN_OFFSET`].
    pub committed_offset: i64,
    /// Latest offset, or [`UNKNOWN_OFFSET`].
    pub end_offset: i64,
    /// `max(0, end - committed)`; 0 if either side is unknown.
    pub lag: i64,
}

impl GroupLagRow {
    /// Builds a row, clamping lag to zero.
    ///
    /// An unknown (negative) committed or end offset yields a lag of 0 rather
    /// than propagating the sentinel.
    #[must_use]
    pub fn new(key: &PartitionKey, committed_offset: i64, end_offset: i64) -> Self {
        let lag = if committed_offset >= 0 && end_offset >= 0 {
            end_offset.saturating_sub(committed_offset).max(0)
        } else {
            0
        };

        Self {
            topic: key.topic.clone(),
            partition: key.partition,
            committed_offset,
            end_offset,
            lag,
        }
    }
}

// -----------------------------------------------------------------------------
// Reset Change
// -----------------------------------------------------------------------------

/// Planned effect of an offset reset on one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionChange {
    /// Topic name.
    pub topic: String,
    /// Partition index.
    pub partition: i32,
    /// Committed offset before the reset.
    pub before_offset: i64,
    /// Target offset (equal to `before_offset` when unchanged).
    pub after_offset: i64,
    /// Timestamp of the record the target offset was resolved from, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_offset_timestamp: Option<i64>,
    /// `before - after`; positive means the group is rewound.
    pub delta: i64,
    /// Whether the committed offset moves.
    pub changed: bool,
    /// Human-readable explanation for fallbacks and skips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PartitionChange {
    /// A partition the reset leaves where it is.
    #[must_use]
    pub fn unchanged(
        key: &PartitionKey,
        before_offset: i64,
        resolved_offset_timestamp: Option<i64>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            topic: key.topic.clone(),
            partition: key.partition,
            before_offset,
            after_offset: before_offset,
            resolved_offset_timestamp,
            delta: 0,
            changed: false,
            note: Some(note.into()),
        }
    }

    /// A partition with a resolved, non-negative target offset.
    ///
    /// `changed` is derived from the offsets; `delta` is 0 when the committed
    /// offset itself was unknown.
    #[must_use]
    pub fn resolved(
        key: &PartitionKey,
        before_offset: i64,
        after_offset: i64,
        resolved_offset_timestamp: Option<i64>,
        note: Option<String>,
    ) -> Self {
        let delta = if before_offset >= 0 {
            before_offset - after_offset
        } else {
            0
        };

        Self {
            topic: key.topic.clone(),
            partition: key.partition,
            before_offset,
            after_offset,
            resolved_offset_timestamp,
            delta,
            changed: before_offset != after_offset,
            note,
        }
    }

    /// Returns the partition this change applies to.
    #[must_use]
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }
}
