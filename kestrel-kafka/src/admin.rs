//! Consumer group administration.
//!
//! Group listing and description go through the coordinator's group list.
//! Committed offsets are read and written by a consumer configured with the
//! group's ID that never subscribes, so it never joins the group.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kestrel_console::{
    AdminSession, GroupDescription, GroupMember, GroupState, ListedOffsets, OffsetSpec,
    SessionSettings,
};
use kestrel_core::{ConsoleResult, PartitionKey};
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::groups::GroupInfo;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use tracing::debug;

use crate::config::KafkaClientConfig;
use crate::consumer::{kafka_error, list_offsets_blocking, run_blocking};

/// Protocol type of consumer groups; connect and other groups use their own.
const CONSUMER_PROTOCOL: &str = "consumer";

/// Broker-managed topics that never hold group offsets.
const INTERNAL_TOPICS: &[&str] = &["__consumer_offsets", "__transaction_state"];

fn is_internal_topic(topic: &str) -> bool {
    INTERNAL_TOPICS.contains(&topic)
}

/// rdkafka-backed [`AdminSession`].
pub struct KafkaAdmin {
    consumer: Arc<BaseConsumer>,
    client: KafkaClientConfig,
    bootstrap: String,
    settings: SessionSettings,
}

impl KafkaAdmin {
    pub(crate) fn new(
        consumer: BaseConsumer,
        client: KafkaClientConfig,
        bootstrap: &str,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            consumer: Arc::new(consumer),
            client,
            bootstrap: bootstrap.to_string(),
            settings: settings.clone(),
        }
    }

    fn timeout(&self) -> Duration {
        self.settings.api_timeout
    }

    /// Creates a consumer that acts for `group_id` without joining it.
    fn group_consumer(&self, group_id: &str) -> ConsoleResult<BaseConsumer> {
        self.client
            .group_config(&self.bootstrap, &self.settings, group_id)
            .create()
            .map_err(|err| kafka_error("open_admin", &err))
    }
}

fn describe(info: &GroupInfo) -> GroupDescription {
    GroupDescription {
        group_id: info.name().to_string(),
        state: GroupState::from_broker(info.state()),
        members: info
            .members()
            .iter()
            .map(|member| GroupMember {
                member_id: member.id().to_string(),
                client_id: member.client_id().to_string(),
            })
            .collect(),
    }
}

fn is_consumer_group(info: &GroupInfo) -> bool {
    let protocol_type = info.protocol_type();
    protocol_type.is_empty() || protocol_type == CONSUMER_PROTOCOL
}

#[async_trait]
impl AdminSession for KafkaAdmin {
    async fn list_groups(&mut self) -> ConsoleResult<Vec<String>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout();

        run_blocking("list_groups", move || {
            let groups = consumer
                .fetch_group_list(None, timeout)
                .map_err(|err| kafka_error("list_groups", &err))?;
            Ok(groups
                .groups()
                .iter()
                .filter(|info| is_consumer_group(info))
                .map(|info| info.name().to_string())
                .collect())
        })
        .await
    }

    async fn describe_group(&mut self, group_id: &str) -> ConsoleResult<Option<GroupDescription>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout();
        let group_id = group_id.to_string();

        run_blocking("describe_group", move || {
            let groups = consumer
                .fetch_group_list(Some(&group_id), timeout)
                .map_err(|err| kafka_error("describe_group", &err))?;
            Ok(groups
                .groups()
                .iter()
                .find(|info| info.name() == group_id)
                .map(describe))
        })
        .await
    }

    async fn committed_offsets(
        &mut self,
        group_id: &str,
    ) -> ConsoleResult<BTreeMap<PartitionKey, i64>> {
        let consumer = self.group_consumer(group_id)?;
        let timeout = self.timeout();

        run_blocking("committed_offsets", move || {
            let metadata = consumer
                .fetch_metadata(None, timeout)
                .map_err(|err| kafka_error("committed_offsets", &err))?;

            // Ask for every user partition; only committed ones come back as offsets.
            let mut request = TopicPartitionList::new();
            for topic in metadata.topics() {
                if is_internal_topic(topic.name()) || topic.error().is_some() {
                    continue;
                }
                for partition in topic.partitions() {
                    request.add_partition(topic.name(), partition.id());
                }
            }
            if request.count() == 0 {
                return Ok(BTreeMap::new());
            }

            let committed = consumer
                .committed_offsets(request, timeout)
                .map_err(|err| kafka_error("committed_offsets", &err))?;
            Ok(committed
                .elements()
                .iter()
                .filter_map(|element| match element.offset() {
                    Offset::Offset(offset) => Some((
                        PartitionKey::new(element.topic(), element.partition()),
                        offset,
                    )),
                    _ => None,
                })
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
        let timeout = self.timeout();
        let partitions = partitions.to_vec();

        run_blocking("list_offsets", move || {
            list_offsets_blocking(&consumer, &partitions, spec, timeout)
        })
        .await
    }

    async fn alter_group_offsets(
        &mut self,
        group_id: &str,
        offsets: &BTreeMap<PartitionKey, i64>,
    ) -> ConsoleResult<()> {
        let mut request = TopicPartitionList::with_capacity(offsets.len());
        for (key, offset) in offsets {
            request
                .add_partition_offset(&key.topic, key.partition, Offset::Offset(*offset))
                .map_err(|err| kafka_error("alter_group_offsets", &err))?;
        }

        let consumer = self.group_consumer(group_id)?;
        let partitions = offsets.len();
        let group = group_id.to_string();

        run_blocking("alter_group_offsets", move || {
            consumer
                .commit(&request, CommitMode::Sync)
                .map_err(|err| kafka_error("alter_group_offsets", &err))?;
            debug!(group_id = %group, partitions, "Committed group offsets");
            Ok(())
        })
        .await
    }
}
