//! Request and response shapes.
//!
//! These are the transport-agnostic DTOs the console accepts and returns.
//! Field names are camelCase on the wire. Record keys and values are base64
//! encoded; header values are rendered as lossy UTF-8.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use kestrel_core::{
    ClusterId, ConsoleError, ConsoleResult, ConsumedRecord, PartitionChange, Position,
    RecordHeader, TailCursor,
};
use serde::{Deserialize, Serialize};

use crate::publish::PublishReceipt;
use crate::reset::ResetReport;
use crate::session::OutgoingRecord;
use crate::tail::TailBatch;

/// Trims a required text field, rejecting blank values.
///
/// # Errors
///
/// Returns `InvalidArgument` naming `name` if the value is blank.
pub fn required(name: &'static str, value: &str) -> ConsoleResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConsoleError::invalid_argument(name, format!("{name} is required")));
    }
    Ok(trimmed.to_string())
}

fn encode(bytes: Option<&Bytes>) -> Option<String> {
    bytes.map(|b| STANDARD.encode(b))
}

const fn default_true() -> bool {
    true
}

// -----------------------------------------------------------------------------
// Fetch
// -----------------------------------------------------------------------------

/// A bounded read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchRequest {
    /// Cluster name.
    pub cluster_name: String,
    /// Topic name.
    pub topic_name: String,
    /// Partition subset; absent or empty means all.
    pub partitions: Option<Vec<i32>>,
    /// Start position; absent means `LATEST`.
    pub position: Option<Position>,
    /// Offset for `OFFSET`.
    pub offset: Option<i64>,
    /// Epoch milliseconds for `TIMESTAMP`.
    pub timestamp_ms: Option<i64>,
    /// Record cap.
    pub max_messages: Option<u32>,
    /// Per-poll timeout.
    pub poll_timeout_ms: Option<u32>,
}

/// A fetched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    /// Partition.
    pub partition: i32,
    /// Offset.
    pub offset: i64,
    /// Record timestamp in epoch ms.
    pub timestamp: i64,
    /// Base64 key.
    pub key: Option<String>,
    /// Base64 value.
    pub value: Option<String>,
    /// Headers as `k=v; k2=v2`; absent when the record has none.
    pub headers: Option<String>,
    /// Key plus value size in bytes.
    pub size_bytes: Option<usize>,
}

impl From<&ConsumedRecord> for RecordView {
    fn from(record: &ConsumedRecord) -> Self {
        let headers = (!record.headers.is_empty()).then(|| {
            record
                .headers
                .iter()
                .map(|header| format!("{}={}", header.key, header.value_text()))
                .collect::<Vec<_>>()
                .join("; ")
        });

        Self {
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp,
            key: encode(record.key.as_ref()),
            value: encode(record.value.as_ref()),
            headers,
            size_bytes: record.size_bytes(),
        }
    }
}

/// Result of a bounded read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// Cluster name.
    pub cluster_name: String,
    /// Topic name.
    pub topic_name: String,
    /// Number of records; always `records.len()`.
    pub count: usize,
    /// Records, per-partition offset order.
    pub records: Vec<RecordView>,
}

impl FetchResponse {
    /// Builds the response from consumed records.
    #[must_use]
    pub fn new(cluster_name: String, topic_name: String, records: &[ConsumedRecord]) -> Self {
        let records: Vec<RecordView> = records.iter().map(RecordView::from).collect();
        Self {
            cluster_name,
            topic_name,
            count: records.len(),
            records,
        }
    }
}

// -----------------------------------------------------------------------------
// Tail
// -----------------------------------------------------------------------------

/// One step of a tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailRequest {
    /// Cluster name.
    #[serde(default)]
    pub cluster_name: String,
    /// Topic name.
    #[serde(default)]
    pub topic_name: String,
    /// Partition subset; absent or empty means all.
    #[serde(default)]
    pub partitions: Option<Vec<i32>>,
    /// Timeout of the single poll.
    #[serde(default)]
    pub poll_timeout_ms: Option<u32>,
    /// Record cap.
    #[serde(default)]
    pub max_messages: Option<u32>,
    /// Cursor returned by the previous call.
    #[serde(default)]
    pub last_seen: Option<TailCursor>,
    /// Include record headers.
    #[serde(default = "default_true")]
    pub include_headers: bool,
    /// Include record keys.
    #[serde(default = "default_true")]
    pub include_key: bool,
}

impl Default for TailRequest {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            topic_name: String::new(),
            partitions: None,
            poll_timeout_ms: None,
            max_messages: None,
            last_seen: None,
            include_headers: true,
            include_key: true,
        }
    }
}

/// A header in a tail record or publish request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderView {
    /// Header key.
    pub key: String,
    /// Header value as text.
    #[serde(default)]
    pub value: String,
}

impl From<&RecordHeader> for HeaderView {
    fn from(header: &RecordHeader) -> Self {
        Self {
            key: header.key.clone(),
            value: header.value_text(),
        }
    }
}

/// A tailed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailRecordView {
    /// Topic.
    pub topic: String,
    /// Partition.
    pub partition: i32,
    /// Offset.
    pub offset: i64,
    /// Record timestamp in epoch ms.
    pub timestamp: i64,
    /// Base64 key; absent when keys are excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Base64 value.
    pub value: Option<String>,
    /// Headers; absent when headers are excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderView>>,
}

impl TailRecordView {
    fn new(record: &ConsumedRecord, include_key: bool, include_headers: bool) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp,
            key: if include_key {
                encode(record.key.as_ref())
            } else {
                None
            },
            value: encode(record.value.as_ref()),
            headers: include_headers
                .then(|| record.headers.iter().map(HeaderView::from).collect()),
        }
    }
}

/// Result of one tail step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailResponse {
    /// Cluster name.
    pub cluster_name: String,
    /// Topic name.
    pub topic_name: String,
    /// Number of records.
    pub fetched: usize,
    /// Records in broker order.
    pub records: Vec<TailRecordView>,
    /// Cursor for the next call; `null` until something has been seen.
    pub next_cursor: Option<TailCursor>,
    /// Positioning notes.
    pub warnings: Vec<String>,
}

impl TailResponse {
    /// Builds the response from a tail batch.
    #[must_use]
    pub fn new(
        cluster_name: String,
        topic_name: String,
        batch: TailBatch,
        include_key: bool,
        include_headers: bool,
    ) -> Self {
        let records: Vec<TailRecordView> = batch
            .records
            .iter()
            .map(|record| TailRecordView::new(record, include_key, include_headers))
            .collect();
        Self {
            cluster_name,
            topic_name,
            fetched: records.len(),
            records,
            next_cursor: batch.next_cursor,
            warnings: batch.warnings,
        }
    }
}

// -----------------------------------------------------------------------------
// Publish
// -----------------------------------------------------------------------------

/// A record to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishRequest {
    /// Cluster name.
    pub cluster_name: String,
    /// Topic name.
    pub topic_name: String,
    /// Optional key; blank publishes without a key.
    pub key: Option<String>,
    /// Payload text.
    pub payload: String,
    /// Headers.
    pub headers: Vec<HeaderView>,
}

impl PublishRequest {
    /// Validates the request and builds the outgoing record.
    ///
    /// Returns the trimmed cluster name with the record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the cluster, topic or payload is blank.
    pub fn into_record(self) -> ConsoleResult<(String, OutgoingRecord)> {
        let cluster = required("clusterName", &self.cluster_name)?;
        let topic = required("topicName", &self.topic_name)?;
        if self.payload.trim().is_empty() {
            return Err(ConsoleError::invalid_argument(
                "payload",
                "payload is required",
            ));
        }

        let key = self
            .key
            .filter(|key| !key.trim().is_empty())
            .map(Bytes::from);
        let headers = self
            .headers
            .into_iter()
            .filter(|header| !header.key.trim().is_empty())
            .map(|header| RecordHeader::new(header.key, Some(Bytes::from(header.value))))
            .collect();

        Ok((
            cluster,
            OutgoingRecord {
                topic,
                key,
                value: Bytes::from(self.payload),
                headers,
            },
        ))
    }
}

/// Where a published record landed.
pub type PublishResponse = PublishReceipt;

// -----------------------------------------------------------------------------
// Offset Reset
// -----------------------------------------------------------------------------

/// A timestamp-based reset of a group's committed offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    /// Cluster ID.
    pub cluster_id: ClusterId,
    /// Group ID.
    #[serde(default)]
    pub group_id: String,
    /// Target time in epoch milliseconds.
    pub timestamp: i64,
    /// Use earliest where the timestamp does not resolve.
    #[serde(default = "default_true")]
    pub fallback_to_earliest: bool,
    /// Plan only.
    #[serde(default)]
    pub dry_run: bool,
    /// Refuse groups with live members.
    #[serde(default = "default_true")]
    pub require_inactive_group: bool,
}

impl ResetRequest {
    /// A request with the default flags.
    #[must_use]
    pub fn new(cluster_id: ClusterId, group_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            cluster_id,
            group_id: group_id.into(),
            timestamp,
            fallback_to_earliest: true,
            dry_run: false,
            require_inactive_group: true,
        }
    }
}

/// Outcome of a reset.
///
/// Always carries the request identity, even when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    /// Cluster ID.
    pub cluster_id: ClusterId,
    /// Group ID.
    pub group_id: String,
    /// Target time in epoch milliseconds.
    pub timestamp: i64,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// True only if offsets were committed.
    pub applied: bool,
    /// Partitions that move.
    pub partitions_affected: usize,
    /// Partitions left in place.
    pub partitions_unchanged: usize,
    /// Non-fatal notes.
    pub warnings: Vec<String>,
    /// Per-partition plan.
    pub changes: Vec<PartitionChange>,
    /// Failure message if the reset aborted.
    pub error: Option<String>,
}

impl ResetResponse {
    /// Builds the response for `request` from a reset report.
    #[must_use]
    pub fn from_report(request: &ResetRequest, group_id: String, report: ResetReport) -> Self {
        let plan = report.plan;
        Self {
            cluster_id: request.cluster_id,
            group_id,
            timestamp: request.timestamp,
            dry_run: request.dry_run,
            applied: plan.applied,
            partitions_affected: plan.partitions_affected,
            partitions_unchanged: plan.partitions_unchanged,
            warnings: plan.warnings,
            changes: plan.changes,
            error: report
                .error
                .map(|err| format!("Failed to reset offsets by timestamp: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reset::ResetPlan;

    fn record() -> ConsumedRecord {
        ConsumedRecord {
            topic: "orders".to_string(),
            partition: 1,
            offset: 9,
            timestamp: 1_000,
            key: Some(Bytes::from_static(b"k1")),
            value: Some(Bytes::from_static(b"hello")),
            headers: vec![
                RecordHeader::new("trace", Some(Bytes::from_static(b"abc"))),
                RecordHeader::new("empty", None),
            ],
        }
    }

    #[test]
    fn test_required_trims() {
        assert_eq!(required("topicName", "  orders ").unwrap(), "orders");
        let err = required("topicName", "   ").unwrap_err();
        assert!(matches!(
            err,
            ConsoleError::InvalidArgument {
                name: "topicName",
                ..
            }
        ));
    }

    #[test]
    fn test_record_view() {
        let view = RecordView::from(&record());
        assert_eq!(view.key.as_deref(), Some("azE="));
        assert_eq!(view.value.as_deref(), Some("aGVsbG8="));
        assert_eq!(view.headers.as_deref(), Some("trace=abc; empty="));
        assert_eq!(view.size_bytes, Some(7));

        let mut bare = record();
        bare.headers.clear();
        assert_eq!(RecordView::from(&bare).headers, None);
    }

    #[test]
    fn test_tail_view_respects_inclusion_flags() {
        let full = TailRecordView::new(&record(), true, true);
        assert_eq!(full.headers.as_ref().map(Vec::len), Some(2));
        assert!(full.key.is_some());

        let bare = TailRecordView::new(&record(), false, false);
        assert_eq!(bare.key, None);
        assert_eq!(bare.headers, None);
        assert_eq!(bare.offset, full.offset);
        assert_eq!(bare.partition, full.partition);

        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("key").is_none());
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn test_tail_request_defaults() {
        let request: TailRequest =
            serde_json::from_str(r#"{"clusterName":"prod","topicName":"orders"}"#).unwrap();
        assert!(request.include_headers);
        assert!(request.include_key);
        assert_eq!(request.last_seen, None);

        let request: TailRequest = serde_json::from_str(
            r#"{"clusterName":"prod","topicName":"orders",
                "lastSeen":[{"partition":0,"offset":41}],"includeKey":false}"#,
        )
        .unwrap();
        assert!(!request.include_key);
        assert_eq!(request.last_seen.unwrap().last_seen(0), Some(41));
    }

    #[test]
    fn test_fetch_request_wire_names() {
        let request: FetchRequest = serde_json::from_str(
            r#"{"clusterName":"prod","topicName":"orders","position":"TIMESTAMP",
                "timestampMs":1700000000000,"maxMessages":10}"#,
        )
        .unwrap();
        assert_eq!(request.position, Some(Position::Timestamp));
        assert_eq!(request.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(request.max_messages, Some(10));
        assert_eq!(request.partitions, None);
    }

    #[test]
    fn test_publish_request_validation() {
        let request = PublishRequest {
            cluster_name: " prod ".to_string(),
            topic_name: "orders".to_string(),
            key: Some("  ".to_string()),
            payload: "{}".to_string(),
            headers: vec![HeaderView {
                key: "source".to_string(),
                value: "ui".to_string(),
            }],
        };
        let (cluster, record) = request.clone().into_record().unwrap();
        assert_eq!(cluster, "prod");
        assert_eq!(record.key, None);
        assert_eq!(record.headers.len(), 1);

        let mut blank = request;
        blank.payload = " ".to_string();
        assert!(matches!(
            blank.into_record().unwrap_err(),
            ConsoleError::InvalidArgument { name: "payload", .. }
        ));
    }

    #[test]
    fn test_reset_response_carries_identity_on_error() {
        let request = ResetRequest::new(ClusterId::new(4), "g1", 1_700_000_000_000);
        let report = ResetReport {
            plan: ResetPlan::default(),
            error: Some(ConsoleError::broker("committed_offsets", "timed out")),
        };

        let response = ResetResponse::from_report(&request, "g1".to_string(), report);
        assert_eq!(response.cluster_id, ClusterId::new(4));
        assert_eq!(response.group_id, "g1");
        assert!(!response.applied);
        assert!(response
            .error
            .unwrap()
            .starts_with("Failed to reset offsets by timestamp: "));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["clusterId"], 4);
        assert_eq!(json["requireInactiveGroup"], true);
    }
}
