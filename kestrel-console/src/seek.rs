//! Seek planning.
//!
//! Computes the starting read position of every partition from a
//! [`SeekPolicy`]. The plan is applied by a single `assign` before the first
//! poll.

use std::collections::BTreeMap;

use kestrel_core::{ConsoleResult, PartitionKey, SeekPolicy};
use tracing::debug;

use crate::session::{ConsumerSession, OffsetSpec};

/// Where a partition starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Oldest retained record.
    Beginning,
    /// Current end; only records written after the seek are read.
    End,
    /// A literal offset.
    At(i64),
}

/// Starting position per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekPlan {
    starts: BTreeMap<PartitionKey, StartOffset>,
}

impl SeekPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts every partition at the same position.
    #[must_use]
    pub fn uniform(partitions: &[PartitionKey], start: StartOffset) -> Self {
        Self {
            starts: partitions.iter().map(|key| (key.clone(), start)).collect(),
        }
    }

    /// Sets the start position of one partition.
    pub fn set(&mut self, key: PartitionKey, start: StartOffset) {
        self.starts.insert(key, start);
    }

    /// Returns the start position of a partition.
    #[must_use]
    pub fn get(&self, key: &PartitionKey) -> Option<StartOffset> {
        self.starts.get(key).copied()
    }

    /// Number of planned partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Returns true if no partition is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Iterates planned partitions in order.
    pub fn iter(&self) -> impl Iterator<Item = (&PartitionKey, StartOffset)> + '_ {
        self.starts.iter().map(|(key, start)| (key, *start))
    }
}

/// Plans where each partition starts reading.
///
/// `Timestamp` resolves "first offset at or after" per partition; a partition
/// with no match starts at its end, so nothing older than requested is read.
///
/// # Errors
///
/// Returns the session's error if the timestamp lookup fails.
pub async fn plan_seek<C>(
    session: &mut C,
    partitions: &[PartitionKey],
    policy: SeekPolicy,
) -> ConsoleResult<SeekPlan>
where
    C: ConsumerSession + ?Sized,
{
    let plan = match policy {
        SeekPolicy::Earliest => SeekPlan::uniform(partitions, StartOffset::Beginning),
        SeekPolicy::Latest => SeekPlan::uniform(partitions, StartOffset::End),
        SeekPolicy::Offset(offset) => SeekPlan::uniform(partitions, StartOffset::At(offset)),
        SeekPolicy::Timestamp(timestamp_ms) => {
            let listed = session
                .list_offsets(partitions, OffsetSpec::ForTimestamp(timestamp_ms))
                .await?;

            let mut plan = SeekPlan::new();
            for key in partitions {
                match listed.get(key) {
                    Some(found) if found.offset >= 0 => {
                        plan.set(key.clone(), StartOffset::At(found.offset));
                    }
                    _ => {
                        debug!(partition = %key, timestamp_ms, "No offset for timestamp, seeking to end");
                        plan.set(key.clone(), StartOffset::End);
                    }
                }
            }
            plan
        }
    };

    Ok(plan)
}
