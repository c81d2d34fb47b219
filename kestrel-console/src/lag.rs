//! Consumer group lag.
//!
//! Lag is computed over exactly the partitions a group has committed to:
//! committed offsets first, then the latest offsets of that same set.

use std::collections::BTreeSet;

use kestrel_core::{ConsoleError, ConsoleResult, GroupLagRow, PartitionKey, UNKNOWN_OFFSET};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{AdminSession, GroupDescription, GroupState, OffsetSpec};

/// Lag of one consumer group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupLag {
    /// Distinct topics among the committed partitions.
    pub topics_count: usize,
    /// Sum of per-partition lag.
    pub total_lag: i64,
    /// Per-partition rows, highest lag first.
    pub partitions: Vec<GroupLagRow>,
}

/// One line of a group listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Group ID.
    pub group_id: String,
    /// Coordinator state.
    pub state: GroupState,
    /// Live members.
    pub members_count: u32,
    /// Distinct committed topics.
    pub topics_count: usize,
    /// Total lag.
    pub total_lag: i64,
}

/// Full view of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    /// Group ID.
    pub group_id: String,
    /// Coordinator state.
    pub state: GroupState,
    /// Live members.
    pub members_count: u32,
    /// Distinct, non-blank member client IDs, sorted.
    pub member_client_ids: Vec<String>,
    /// Distinct committed topics.
    pub topics_count: usize,
    /// Total lag.
    pub total_lag: i64,
    /// Per-partition lag, highest first.
    pub partitions: Vec<GroupLagRow>,
}

/// Computes per-partition and total lag of a group.
///
/// A group with no committed offsets has zero lag and no rows. A partition
/// whose committed or latest offset is unknown contributes zero lag.
///
/// # Errors
///
/// Returns the session's error if an offset lookup fails.
pub async fn compute_lag<A>(admin: &mut A, group_id: &str) -> ConsoleResult<GroupLag>
where
    A: AdminSession + ?Sized,
{
    let committed = admin.committed_offsets(group_id).await?;
    if committed.is_empty() {
        return Ok(GroupLag::default());
    }

    let partitions: Vec<PartitionKey> = committed.keys().cloned().collect();
    let latest = admin.list_offsets(&partitions, OffsetSpec::Latest).await?;

    let mut rows: Vec<GroupLagRow> = committed
        .iter()
        .map(|(key, &committed_offset)| {
            let end_offset = latest.get(key).map_or(UNKNOWN_OFFSET, |listed| listed.offset);
            GroupLagRow::new(key, committed_offset, end_offset)
        })
        .collect();

    // Highest lag first; ties keep partition order.
    rows.sort_by(|a, b| b.lag.cmp(&a.lag));

    let topics: BTreeSet<&str> = committed.keys().map(|key| key.topic.as_str()).collect();
    let lag = GroupLag {
        topics_count: topics.len(),
        total_lag: rows.iter().map(|row| row.lag).sum(),
        partitions: rows,
    };

    debug!(
        group_id,
        partitions = lag.partitions.len(),
        topics = lag.topics_count,
        total_lag = lag.total_lag,
        "Computed group lag"
    );
    Ok(lag)
}

/// Describes a group, treating a vacant `DEAD` group as absent.
///
/// # Errors
///
/// Returns `GroupNotFound` if the coordinator does not know the group, or the
/// session's error if the describe fails.
pub async fn require_group<A>(admin: &mut A, group_id: &str) -> ConsoleResult<GroupDescription>
where
    A: AdminSession + ?Sized,
{
    match admin.describe_group(group_id).await? {
        Some(description) if !description.is_vacant() => Ok(description),
        _ => Err(ConsoleError::GroupNotFound {
            group_id: group_id.to_string(),
        }),
    }
}

/// Lists every group of the cluster with its lag, sorted by group ID.
///
/// Groups the coordinator can no longer describe are left out.
///
/// # Errors
///
/// Returns the session's error if any broker call fails.
pub async fn summarize_groups<A>(admin: &mut A) -> ConsoleResult<Vec<GroupSummary>>
where
    A: AdminSession + ?Sized,
{
    let mut group_ids = admin.list_groups().await?;
    group_ids.sort();
    group_ids.dedup();

    let mut summaries = Vec::with_capacity(group_ids.len());
    for group_id in group_ids {
        let Some(description) = admin.describe_group(&group_id).await? else {
            continue;
        };
        if description.is_vacant() {
            continue;
        }

        let lag = compute_lag(admin, &group_id).await?;
        summaries.push(GroupSummary {
            members_count: description.member_count(),
            state: description.state,
            group_id,
            topics_count: lag.topics_count,
            total_lag: lag.total_lag,
        });
    }

    Ok(summaries)
}

/// Builds the detail view of one group.
///
/// # Errors
///
/// Returns `GroupNotFound` if the group does not exist, or the session's
/// error if any broker call fails.
pub async fn describe_group_detail<A>(admin: &mut A, group_id: &str) -> ConsoleResult<GroupDetail>
where
    A: AdminSession + ?Sized,
{
    let description = require_group(admin, group_id).await?;
    let lag = compute_lag(admin, group_id).await?;

    let client_ids: BTreeSet<String> = description
        .members
        .iter()
        .map(|member| member.client_id.trim())
        .filter(|client_id| !client_id.is_empty())
        .map(str::to_string)
        .collect();

    Ok(GroupDetail {
        group_id: group_id.to_string(),
        state: description.state,
        members_count: description.member_count(),
        member_client_ids: client_ids.into_iter().collect(),
        topics_count: lag.topics_count,
        total_lag: lag.total_lag,
        partitions: lag.partitions,
    })
}
