//! Producer console: publish a single record.

use kestrel_core::{now_millis, ConsoleResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{OutgoingRecord, ProducerSession};

/// Where a published record landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    /// Topic.
    pub topic: String,
    /// Partition.
    pub partition: i32,
    /// Assigned offset.
    pub offset: i64,
    /// Broker timestamp, or the local clock when the broker sent none.
    pub timestamp: i64,
}

/// Publishes one record and waits for its acknowledgement.
///
/// # Errors
///
/// Returns the session's error if the send fails or times out.
pub async fn publish_record<P>(
    producer: &mut P,
    record: OutgoingRecord,
) -> ConsoleResult<PublishReceipt>
where
    P: ProducerSession + ?Sized,
{
    let topic = record.topic.clone();
    let report = producer.send(record).await?;

    let timestamp = report
        .timestamp
        .filter(|ts| *ts > 0)
        .unwrap_or_else(now_millis);

    debug!(
        topic = %topic,
        partition = report.partition,
        offset = report.offset,
        "Published record"
    );

    Ok(PublishReceipt {
        topic,
        partition: report.partition,
        offset: report.offset,
        timestamp,
    })
}
