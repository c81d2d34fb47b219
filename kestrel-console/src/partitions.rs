//! Partition resolution.
//!
//! Turns a topic and an optional partition subset into the validated set of
//! partitions a read operates on.

use std::collections::BTreeSet;

use kestrel_core::{ConsoleError, ConsoleResult, PartitionKey};
use tracing::debug;

use crate::session::ConsumerSession;

/// Resolves the partitions to read from the broker's view of `topic`.
///
/// An empty `requested` slice selects every partition.
///
/// # Errors
///
/// Returns `TopicNotFound` if the topic reports no partitions,
/// `InvalidPartition` if any requested index is unknown, or the session's
/// error if the metadata lookup fails.
pub async fn resolve_partitions<C>(
    session: &mut C,
    topic: &str,
    requested: &[i32],
) -> ConsoleResult<Vec<PartitionKey>>
where
    C: ConsumerSession + ?Sized,
{
    let available = session.partitions_for(topic).await?;
    let resolved = select_partitions(topic, &available, requested)?;

    debug!(
        topic,
        available = available.len(),
        selected = resolved.len(),
        "Resolved partitions"
    );
    Ok(resolved)
}

/// Selects partitions from a known partition list.
///
/// The result is sorted and free of duplicates. Validation is all-or-nothing:
/// the first unknown index fails the whole selection.
///
/// # Errors
///
/// Returns `TopicNotFound` if `available` is empty, or `InvalidPartition`
/// naming the first requested index (in ascending order) that is not available.
pub fn select_partitions(
    topic: &str,
    available: &[i32],
    requested: &[i32],
) -> ConsoleResult<Vec<PartitionKey>> {
    let available: BTreeSet<i32> = available.iter().copied().collect();
    if available.is_empty() {
        return Err(ConsoleError::TopicNotFound {
            topic: topic.to_string(),
        });
    }

    if requested.is_empty() {
        return Ok(available
            .into_iter()
            .map(|partition| PartitionKey::new(topic, partition))
            .collect());
    }

    let requested: BTreeSet<i32> = requested.iter().copied().collect();
    if let Some(&partition) = requested.iter().find(|p| !available.contains(p)) {
        return Err(ConsoleError::InvalidPartition {
            topic: topic.to_string(),
            partition,
        });
    }

    Ok(requested
        .into_iter()
        .map(|partition| PartitionKey::new(topic, partition))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_partitions_when_none_requested() {
        let keys = select_partitions("orders", &[2, 0, 1], &[]).unwrap();
        let partitions: Vec<i32> = keys.iter().map(|k| k.partition).collect();
        assert_eq!(partitions, vec![0, 1, 2]);
        assert!(keys.iter().all(|k| k.topic == "orders"));
    }

    #[test]
    fn test_subset_is_sorted_and_deduplicated() {
        let keys = select_partitions("orders", &[0, 1, 2], &[2, 0, 2]).unwrap();
        assert_eq!(
            keys,
            vec![PartitionKey::new("orders", 0), PartitionKey::new("orders", 2)]
        );
    }

    #[test]
    fn test_unknown_partition_fails_whole_selection() {
        let err = select_partitions("orders", &[0, 1, 2], &[1, 7]).unwrap_err();
        assert_eq!(
            err,
            ConsoleError::InvalidPartition {
                topic: "orders".to_string(),
                partition: 7,
            }
        );
    }

    #[test]
    fn test_empty_topic_is_not_found() {
        let err = select_partitions("ghost", &[], &[]).unwrap_err();
        assert!(matches!(err, ConsoleError::TopicNotFound { .. }));

        let err = select_partitions("ghost", &[], &[0]).unwrap_err();
        assert!(matches!(err, ConsoleError::TopicNotFound { .. }));
    }
}
