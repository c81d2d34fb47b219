//! Transient producer session.

use std::time::Duration;

use async_trait::async_trait;
use kestrel_console::{DeliveryReport, OutgoingRecord, ProducerSession};
use kestrel_core::ConsoleResult;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::debug;

use crate::consumer::kafka_error;

/// rdkafka-backed [`ProducerSession`].
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaProducer {
    pub(crate) const fn new(producer: FutureProducer, timeout: Duration) -> Self {
        Self { producer, timeout }
    }
}

fn to_headers(record: &OutgoingRecord) -> OwnedHeaders {
    record
        .headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(record.headers.len()), |headers, header| {
            headers.insert(Header {
                key: &header.key,
                value: header.value.as_deref(),
            })
        })
}

#[async_trait]
impl ProducerSession for KafkaProducer {
    async fn send(&mut self, record: OutgoingRecord) -> ConsoleResult<DeliveryReport> {
        let mut outgoing: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&record.topic)
            .payload(&record.value[..])
            .headers(to_headers(&record));
        if let Some(key) = &record.key {
            outgoing = outgoing.key(&key[..]);
        }

        let (partition, offset) = self
            .producer
            .send(outgoing, self.timeout)
            .await
            .map_err(|(err, _)| kafka_error("send", &err))?;

        debug!(topic = %record.topic, partition, offset, "Record delivered");

        Ok(DeliveryReport {
            partition,
            offset,
            timestamp: None,
        })
    }
}
