//! Group-less consumer session.
//!
//! rdkafka's consumer calls block the calling thread, so each one runs on the
//! blocking pool with its own handle to the shared client. The client is
//! destroyed when the session and any in-flight call have dropped it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kestrel_console::{
    ConsumerSession, ListedOffset, ListedOffsets, OffsetSpec, SeekPlan, StartOffset,
};
use kestrel_core::{ConsoleError, ConsoleResult, ConsumedRecord, PartitionKey, RecordHeader};
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use tracing::debug;

// -----------------------------------------------------------------------------
// Shared Helpers
// -----------------------------------------------------------------------------

/// Wraps a client error as `BrokerUnavailable`.
pub(crate) fn kafka_error(operation: &'static str, err: &KafkaError) -> ConsoleError {
    ConsoleError::broker(operation, err.to_string())
}

/// Runs a blocking client call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(operation: &'static str, call: F) -> ConsoleResult<T>
where
    F: FnOnce() -> ConsoleResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| ConsoleError::broker(operation, format!("blocking task failed: {err}")))?
}

/// Returns true if the error concerns one partition rather than the cluster.
fn is_partition_error(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::UnknownTopicOrPartition
                | RDKafkaErrorCode::UnknownPartition
                | RDKafkaErrorCode::UnknownTopic
                | RDKafkaErrorCode::NotLeaderForPartition
                | RDKafkaErrorCode::LeaderNotAvailable
        )
    )
}

/// Looks up offsets with a blocking client.
///
/// Partitions whose lookup fails on their own (unknown partition, no leader)
/// or that have no offset at or after the timestamp are left out of the
/// result. Cluster-level failures abort the lookup.
pub(crate) fn list_offsets_blocking(
    consumer: &BaseConsumer,
    partitions: &[PartitionKey],
    spec: OffsetSpec,
    timeout: Duration,
) -> ConsoleResult<ListedOffsets> {
    let mut listed = ListedOffsets::with_capacity(partitions.len());

    match spec {
        OffsetSpec::Earliest | OffsetSpec::Latest => {
            for key in partitions {
                match consumer.fetch_watermarks(&key.topic, key.partition, timeout) {
                    Ok((low, high)) => {
                        let offset = if spec == OffsetSpec::Earliest { low } else { high };
                        listed.insert(key.clone(), ListedOffset::at(offset));
                    }
                    Err(err) if is_partition_error(&err) => {
                        debug!(partition = %key, error = %err, "Offset lookup skipped");
                    }
                    Err(err) => return Err(kafka_error("list_offsets", &err)),
                }
            }
        }
        OffsetSpec::ForTimestamp(timestamp_ms) => {
            let mut request = TopicPartitionList::with_capacity(partitions.len());
            for key in partitions {
                request
                    .add_partition_offset(&key.topic, key.partition, Offset::Offset(timestamp_ms))
                    .map_err(|err| kafka_error("list_offsets", &err))?;
            }

            let resolved = consumer
                .offsets_for_times(request, timeout)
                .map_err(|err| kafka_error("list_offsets", &err))?;
            for element in resolved.elements() {
                if element.error().is_err() {
                    continue;
                }
                // End means no record at or after the timestamp.
                if let Offset::Offset(offset) = element.offset() {
                    listed.insert(
                        PartitionKey::new(element.topic(), element.partition()),
                        ListedOffset::at(offset),
                    );
                }
            }
        }
    }

    Ok(listed)
}

/// Copies a broker message into an owned record.
pub(crate) fn to_record(message: &BorrowedMessage<'_>) -> ConsumedRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| {
                    RecordHeader::new(header.key, header.value.map(Bytes::copy_from_slice))
                })
                .collect()
        })
        .unwrap_or_default();

    ConsumedRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        timestamp: message.timestamp().to_millis().unwrap_or(-1),
        key: message.key().map(Bytes::copy_from_slice),
        value: message.payload().map(Bytes::copy_from_slice),
        headers,
    }
}

/// Maps a planned start to an rdkafka offset.
pub(crate) const fn to_offset(start: StartOffset) -> Offset {
    match start {
        StartOffset::Beginning => Offset::Beginning,
        StartOffset::End => Offset::End,
        StartOffset::At(offset) => Offset::Offset(offset),
    }
}

// -----------------------------------------------------------------------------
// Consumer Session
// -----------------------------------------------------------------------------

/// rdkafka-backed [`ConsumerSession`].
pub struct KafkaConsumer {
    consumer: Arc<BaseConsumer>,
    api_timeout: Duration,
}

impl KafkaConsumer {
    pub(crate) fn new(consumer: BaseConsumer, api_timeout: Duration) -> Self {
        Self {
            consumer: Arc::new(consumer),
            api_timeout,
        }
    }
}

#[async_trait]
impl ConsumerSession for KafkaConsumer {
    async fn partitions_for(&mut self, topic: &str) -> ConsoleResult<Vec<i32>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.api_timeout;
        let topic = topic.to_string();

        run_blocking("partitions_for", move || {
            let metadata = consumer
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|err| kafka_error("partitions_for", &err))?;
            Ok(metadata
                .topics()
                .iter()
                .filter(|t| t.name() == topic && t.error().is_none())
                .flat_map(|t| t.partitions().iter().map(|p| p.id()))
                .collect())
        })
        .await
    }

    async fn list_offsets(
        &mut self,
        partitions: &[PartitionKey],
        spec: OffsetSpec,
    ) -> ConsoleResult<ListedOffsets> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.api_timeout;
        let partitions = partitions.to_vec();

        run_blocking("list_offsets", move || {
            list_offsets_blocking(&consumer, &partitions, spec, timeout)
        })
        .await
    }

    async fn assign(&mut self, plan: &SeekPlan) -> ConsoleResult<()> {
        let mut assignment = TopicPartitionList::with_capacity(plan.len());
        for (key, start) in plan.iter() {
            assignment
                .add_partition_offset(&key.topic, key.partition, to_offset(start))
                .map_err(|err| kafka_error("assign", &err))?;
        }

        self.consumer
            .assign(&assignment)
            .map_err(|err| kafka_error("assign", &err))
    }

    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> ConsoleResult<Vec<ConsumedRecord>> {
        let consumer = Arc::clone(&self.consumer);

        run_blocking("poll", move || {
            let mut records = Vec::new();
            let mut wait = timeout;
            while records.len() < max_records {
                match consumer.poll(wait) {
                    Some(Ok(message)) => records.push(to_record(&message)),
                    Some(Err(err)) => return Err(kafka_error("poll", &err)),
                    None => break,
                }
                // Drain what is already fetched without waiting again.
                wait = Duration::ZERO;
            }
            Ok(records)
        })
        .await
    }
}
