//! Timestamp-based offset reset.
//!
//! Plans a new committed offset per partition from a wall-clock timestamp,
//! diffs it against the group's current commits, and applies the changed
//! partitions in one call unless the run is a dry run.
//!
//! Argument and scope errors (`GroupNotFound`, `GroupActive`) are returned as
//! errors. A broker failure after validation is captured in the report
//! together with whatever part of the plan was computed.

use std::collections::BTreeMap;

use kestrel_core::{ConsoleError, ConsoleResult, PartitionChange, PartitionKey};
use tracing::{debug, info, warn};

use crate::lag::require_group;
use crate::session::{AdminSession, ListedOffset, ListedOffsets, OffsetSpec};

const SKIPPED: &str = "Skipped.";
const NOTE_SKIPPED_NO_FALLBACK: &str = "No offset for timestamp (no fallback). Skipped.";
const NOTE_SKIPPED_NO_EARLIEST: &str = "No offset for timestamp AND earliest not resolved. Skipped.";
const NOTE_USED_EARLIEST: &str = "No offset for timestamp -> used earliest.";
const NOTE_NEGATIVE: &str = "Resolved offset was <0. Skipped.";

/// Parameters of a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOptions {
    /// Target wall-clock time in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Use the earliest offset where the timestamp does not resolve.
    pub fallback_to_earliest: bool,
    /// Compute the plan without committing anything.
    pub dry_run: bool,
    /// Refuse to reset a group that has live members.
    pub require_inactive_group: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            fallback_to_earliest: true,
            dry_run: false,
            require_inactive_group: true,
        }
    }
}

/// The computed reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetPlan {
    /// Per-partition changes, ordered by partition.
    pub changes: Vec<PartitionChange>,
    /// Partitions whose committed offset moves.
    pub partitions_affected: usize,
    /// Partitions left where they are.
    pub partitions_unchanged: usize,
    /// Non-fatal notes.
    pub warnings: Vec<String>,
    /// True only if new offsets were committed.
    pub applied: bool,
}

impl ResetPlan {
    /// Offsets to commit: the target of every changed partition.
    #[must_use]
    pub fn target_offsets(&self) -> BTreeMap<PartitionKey, i64> {
        self.changes
            .iter()
            .filter(|change| change.changed)
            .map(|change| (change.key(), change.after_offset))
            .collect()
    }
}

/// Outcome of a reset call that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    /// The plan, complete or as far as it got.
    pub plan: ResetPlan,
    /// The broker failure that aborted the reset, if any.
    pub error: Option<ConsoleError>,
}

/// Plans and, unless dry-running, applies a reset of `group_id`.
///
/// # Errors
///
/// Returns `GroupNotFound` if the group does not exist, or `GroupActive` if
/// the group has members and `require_inactive_group` is set; in the latter
/// case no offsets are read. Broker failures are reported in
/// [`ResetReport::error`], never returned.
pub async fn reset_offsets<A>(
    admin: &mut A,
    group_id: &str,
    options: &ResetOptions,
) -> ConsoleResult<ResetReport>
where
    A: AdminSession + ?Sized,
{
    let mut plan = ResetPlan::default();
    match run_reset(admin, group_id, options, &mut plan).await {
        Ok(()) => Ok(ResetReport { plan, error: None }),
        Err(err) if err.is_scope_error() => Err(err),
        Err(err) => {
            warn!(group_id, error = %err, "Offset reset failed");
            plan.applied = false;
            Ok(ResetReport {
                plan,
                error: Some(err),
            })
        }
    }
}

async fn run_reset<A>(
    admin: &mut A,
    group_id: &str,
    options: &ResetOptions,
    plan: &mut ResetPlan,
) -> ConsoleResult<()>
where
    A: AdminSession + ?Sized,
{
    let description = require_group(admin, group_id).await?;
    let members = description.member_count();
    if options.require_inactive_group && members > 0 {
        return Err(ConsoleError::GroupActive {
            group_id: group_id.to_string(),
            members,
        });
    }

    let committed = admin.committed_offsets(group_id).await?;
    if committed.is_empty() {
        plan.warnings
            .push("No committed offsets found for this group. Nothing to reset.".to_string());
        return Ok(());
    }

    let partitions: Vec<PartitionKey> = committed.keys().cloned().collect();
    let by_timestamp = admin
        .list_offsets(&partitions, OffsetSpec::ForTimestamp(options.timestamp_ms))
        .await?;

    let unresolved: Vec<PartitionKey> = partitions
        .iter()
        .filter(|key| !by_timestamp.contains_key(*key))
        .cloned()
        .collect();
    let earliest = if options.fallback_to_earliest && !unresolved.is_empty() {
        admin.list_offsets(&unresolved, OffsetSpec::Earliest).await?
    } else {
        ListedOffsets::new()
    };

    for (key, &before) in &committed {
        let change = match by_timestamp.get(key) {
            Some(found) => plan_change(key, before, *found, None),
            None if !options.fallback_to_earliest => {
                PartitionChange::unchanged(key, before, None, NOTE_SKIPPED_NO_FALLBACK)
            }
            None => match earliest.get(key) {
                Some(found) => plan_change(key, before, *found, Some(NOTE_USED_EARLIEST)),
                None => PartitionChange::unchanged(key, before, None, NOTE_SKIPPED_NO_EARLIEST),
            },
        };
        plan.changes.push(change);
    }

    plan.partitions_affected = plan.changes.iter().filter(|c| c.changed).count();
    plan.partitions_unchanged = plan.changes.len() - plan.partitions_affected;

    let skipped = plan
        .changes
        .iter()
        .filter(|c| !c.changed && c.note.as_deref().is_some_and(|n| n.ends_with(SKIPPED)))
        .count();
    if skipped > 0 {
        plan.warnings.push(format!(
            "{skipped} partition(s) could not be resolved and were left unchanged."
        ));
    }

    debug!(
        group_id,
        timestamp_ms = options.timestamp_ms,
        affected = plan.partitions_affected,
        unchanged = plan.partitions_unchanged,
        "Planned offset reset"
    );

    if options.dry_run {
        return Ok(());
    }

    let targets = plan.target_offsets();
    if targets.is_empty() {
        plan.warnings
            .push("No partitions required a change (already at target offsets).".to_string());
        return Ok(());
    }

    admin.alter_group_offsets(group_id, &targets).await?;
    plan.applied = true;

    info!(
        group_id,
        partitions = targets.len(),
        timestamp_ms = options.timestamp_ms,
        "Applied offset reset"
    );
    Ok(())
}

/// Builds the change for a partition whose target resolved.
///
/// A negative target is treated as unresolved.
fn plan_change(
    key: &PartitionKey,
    before: i64,
    found: ListedOffset,
    note: Option<&str>,
) -> PartitionChange {
    if found.offset < 0 {
        let note = note.map_or_else(
            || NOTE_NEGATIVE.to_string(),
            |n| format!("{n} {NOTE_NEGATIVE}"),
        );
        return PartitionChange::unchanged(key, before, found.timestamp, note);
    }

    PartitionChange::resolved(
        key,
        before,
        found.offset,
        found.timestamp,
        note.map(str::to_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{GroupState, SessionFactory, SessionSettings};
    use crate::simulated::SimulatedCluster;
    use std::time::Duration;

    fn settings() -> SessionSettings {
        SessionSettings {
            client_id: "reset-test".to_string(),
            api_timeout: Duration::from_secs(15),
            max_poll_records: 500,
            max_poll_interval: Duration::from_secs(30),
        }
    }

    /// `orders` partition 0 has 10 records at timestamps 1000, 1100, ...
    fn cluster() -> SimulatedCluster {
        let cluster = SimulatedCluster::new();
        cluster.create_topic("orders", 2);
        for i in 0..10 {
            cluster.append("orders", 0, 1_000 + i * 100, None, b"v");
        }
        cluster.commit("g1", "orders", 0, 9);
        cluster
    }

    fn options(timestamp_ms: i64) -> ResetOptions {
        ResetOptions {
            timestamp_ms,
            ..ResetOptions::default()
        }
    }

    #[tokio::test]
    async fn test_apply_moves_committed_offset() {
        let cluster = cluster();
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "g1", &options(1_250)).await.unwrap();
        assert!(report.error.is_none());
        assert!(report.plan.applied);
        assert_eq!(report.plan.partitions_affected, 1);

        let change = &report.plan.changes[0];
        assert_eq!(change.before_offset, 9);
        assert_eq!(change.after_offset, 3);
        assert_eq!(change.delta, 6);
        assert_eq!(change.resolved_offset_timestamp, Some(1_300));
        assert_eq!(cluster.committed("g1", "orders", 0), Some(3));
    }

    #[tokio::test]
    async fn test_no_fallback_skips_partition() {
        let cluster = cluster();
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();
        let mut opts = options(99_999);
        opts.fallback_to_earliest = false;

        let report = reset_offsets(&mut admin, "g1", &opts).await.unwrap();
        let change = &report.plan.changes[0];
        assert!(!change.changed);
        assert_eq!(change.after_offset, 9);
        assert_eq!(change.note.as_deref(), Some(NOTE_SKIPPED_NO_FALLBACK));
        assert!(!report.plan.applied);
        assert_eq!(cluster.call_count("alter_group_offsets"), 0);
    }

    #[tokio::test]
    async fn test_fallback_to_earliest() {
        let cluster = cluster();
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "g1", &options(99_999)).await.unwrap();
        let change = &report.plan.changes[0];
        assert_eq!(change.after_offset, 0);
        assert_eq!(change.note.as_deref(), Some(NOTE_USED_EARLIEST));
        assert!(report.plan.applied);
    }

    #[tokio::test]
    async fn test_earliest_unresolvable_is_noted() {
        let cluster = cluster();
        cluster.override_offset(PartitionKey::new("orders", 0), OffsetSpec::Earliest, None);
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "g1", &options(99_999)).await.unwrap();
        assert!(report.error.is_none());
        let change = &report.plan.changes[0];
        assert!(!change.changed);
        assert_eq!(change.note.as_deref(), Some(NOTE_SKIPPED_NO_EARLIEST));
        assert_eq!(report.plan.partitions_unchanged, 1);
        assert!(report.plan.warnings.iter().any(|w| w.contains("1 partition(s)")));
    }

    #[tokio::test]
    async fn test_negative_resolved_offset_is_skipped() {
        let cluster = cluster();
        cluster.override_offset(PartitionKey::new("orders", 0), OffsetSpec::Earliest, Some(-1));
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "g1", &options(99_999)).await.unwrap();
        let change = &report.plan.changes[0];
        assert!(!change.changed);
        assert_eq!(
            change.note.as_deref(),
            Some("No offset for timestamp -> used earliest. Resolved offset was <0. Skipped.")
        );
    }

    #[tokio::test]
    async fn test_already_at_target() {
        let cluster = cluster();
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "g1", &options(1_900)).await.unwrap();
        assert_eq!(report.plan.partitions_affected, 0);
        assert!(!report.plan.applied);
        assert!(report.plan.warnings[0].starts_with("No partitions required a change"));
    }

    #[tokio::test]
    async fn test_no_commits_is_empty_plan() {
        let cluster = cluster();
        cluster.create_group("fresh", GroupState::Empty);
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "fresh", &options(1_000)).await.unwrap();
        assert!(report.plan.changes.is_empty());
        assert_eq!(report.plan.warnings.len(), 1);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_active_group_is_refused_unless_allowed() {
        let cluster = cluster();
        cluster.join_group("g1", "m-1", "worker");
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let err = reset_offsets(&mut admin, "g1", &options(1_250)).await.unwrap_err();
        assert!(matches!(err, ConsoleError::GroupActive { members: 1, .. }));

        let mut opts = options(1_250);
        opts.require_inactive_group = false;
        let report = reset_offsets(&mut admin, "g1", &opts).await.unwrap();
        assert!(report.plan.applied);
    }

    #[tokio::test]
    async fn test_alter_failure_keeps_plan() {
        let cluster = cluster();
        cluster.fail_next("alter_group_offsets");
        let mut admin = cluster.open_admin("sim", &settings()).unwrap();

        let report = reset_offsets(&mut admin, "g1", &options(1_250)).await.unwrap();
        assert!(!report.plan.applied);
        assert_eq!(report.plan.changes.len(), 1);
        assert!(matches!(
            report.error,
            Some(ConsoleError::BrokerUnavailable {
                operation: "alter_group_offsets",
                ..
            })
        ));
        assert_eq!(cluster.committed("g1", "orders", 0), Some(9));
    }
}
