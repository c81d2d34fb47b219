//! Stateless tail.
//!
//! Each call performs exactly one poll. The caller owns the position: it sends
//! back the cursor from the previous response, and partitions the cursor names
//! resume just past their last-seen offset. Every other partition starts at
//! its current end, so a tail only ever sees records written after it first
//! looked.

use std::time::Duration;

use kestrel_core::{ConsoleError, ConsoleResult, ConsumedRecord, PartitionKey, TailCursor};
use tracing::debug;

use crate::partitions::resolve_partitions;
use crate::seek::{SeekPlan, StartOffset};
use crate::session::ConsumerSession;

/// Parameters of one tail call, already validated and clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    /// Partition subset; empty means all.
    pub partitions: Vec<i32>,
    /// Cap on records returned.
    pub max_messages: usize,
    /// Timeout of the single poll.
    pub poll_timeout: Duration,
}

/// Result of one tail call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailBatch {
    /// Records read, in broker order.
    pub records: Vec<ConsumedRecord>,
    /// Cursor to send back on the next call.
    pub next_cursor: Option<TailCursor>,
    /// Non-fatal notes about how the call was positioned.
    pub warnings: Vec<String>,
}

/// Performs one tail step on `topic`.
///
/// The next cursor is the input cursor, minus partitions the topic does not
/// have, advanced to the highest offset seen per partition in this batch.
///
/// # Errors
///
/// Returns `InvalidArgument` for a cursor with negative entries,
/// `InvalidPartition` for an unknown requested partition, or the session's
/// error if any broker call fails.
pub async fn tail_once<C>(
    session: &mut C,
    topic: &str,
    options: &TailOptions,
    cursor: Option<&TailCursor>,
) -> ConsoleResult<TailBatch>
where
    C: ConsumerSession + ?Sized,
{
    if let Some(cursor) = cursor {
        cursor.validate()?;
    }

    let partitions = match resolve_partitions(session, topic, &options.partitions).await {
        Ok(partitions) => partitions,
        Err(ConsoleError::TopicNotFound { .. }) => {
            return Ok(TailBatch {
                records: Vec::new(),
                next_cursor: cursor.cloned(),
                warnings: vec![format!("No partitions found for topic {topic}")],
            });
        }
        Err(err) => return Err(err),
    };

    let mut warnings = Vec::new();
    let plan = position_from_cursor(topic, &partitions, cursor, &mut warnings);
    session.assign(&plan).await?;

    let mut records = session.poll(options.poll_timeout, options.max_messages).await?;
    records.truncate(options.max_messages);

    let next_cursor = next_cursor(topic, &plan, cursor, &records);

    debug!(
        topic,
        partitions = partitions.len(),
        fetched = records.len(),
        resumed = plan.iter().filter(|(_, s)| matches!(s, StartOffset::At(_))).count(),
        "Tail poll finished"
    );

    Ok(TailBatch {
        records,
        next_cursor,
        warnings,
    })
}

/// Seeks cursor partitions just past their last-seen offset and everything
/// else to the end.
fn position_from_cursor(
    topic: &str,
    partitions: &[PartitionKey],
    cursor: Option<&TailCursor>,
    warnings: &mut Vec<String>,
) -> SeekPlan {
    let mut plan = SeekPlan::uniform(partitions, StartOffset::End);

    for (partition, last_seen) in cursor.into_iter().flat_map(|c| c.iter()) {
        let key = PartitionKey::new(topic, partition);
        if plan.get(&key).is_some() {
            plan.set(key, StartOffset::At(last_seen.saturating_add(1)));
        } else {
            warnings.push(format!(
                "Cursor partition {partition} is not valid for this topic. Tailing from end."
            ));
        }
    }

    plan
}

/// Keeps the cursor entries that positioned a partition and advances them
/// past this batch. `None` until something has been seen.
fn next_cursor(
    topic: &str,
    plan: &SeekPlan,
    cursor: Option<&TailCursor>,
    records: &[ConsumedRecord],
) -> Option<TailCursor> {
    let mut next = TailCursor::new();
    for (partition, last_seen) in cursor.into_iter().flat_map(TailCursor::iter) {
        if plan.get(&PartitionKey::new(topic, partition)).is_some() {
            next.observe(partition, last_seen);
        }
    }
    for record in records {
        next.observe(record.partition, record.offset);
    }

    (cursor.is_some() || !next.is_empty()).then_some(next)
}
