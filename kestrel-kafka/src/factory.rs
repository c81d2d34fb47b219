//! Session factory.

use kestrel_console::{SessionFactory, SessionSettings};
use kestrel_core::ConsoleResult;
use rdkafka::consumer::BaseConsumer;
use rdkafka::producer::FutureProducer;
use tracing::debug;

use crate::admin::KafkaAdmin;
use crate::config::KafkaClientConfig;
use crate::consumer::{kafka_error, KafkaConsumer};
use crate::producer::KafkaProducer;

/// Opens rdkafka sessions against any cluster.
///
/// Holds only the static client configuration; every session gets a fresh
/// client built from the bootstrap string and per-call settings.
#[derive(Debug, Clone)]
pub struct KafkaSessionFactory {
    client: KafkaClientConfig,
}

impl KafkaSessionFactory {
    /// Creates a factory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the security settings are invalid.
    pub fn new(client: KafkaClientConfig) -> ConsoleResult<Self> {
        client.security.validate()?;
        Ok(Self { client })
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn client(&self) -> &KafkaClientConfig {
        &self.client
    }
}

impl SessionFactory for KafkaSessionFactory {
    type Consumer = KafkaConsumer;
    type Admin = KafkaAdmin;
    type Producer = KafkaProducer;

    fn open_consumer(
        &self,
        bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<Self::Consumer> {
        let consumer: BaseConsumer = self
            .client
            .consumer_config(bootstrap, settings)
            .create()
            .map_err(|err| kafka_error("open_consumer", &err))?;

        debug!(client_id = %settings.client_id, bootstrap, "Opened consumer");
        Ok(KafkaConsumer::new(consumer, settings.api_timeout))
    }

    fn open_admin(
        &self,
        bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<Self::Admin> {
        let consumer: BaseConsumer = self
            .client
            .consumer_config(bootstrap, settings)
            .create()
            .map_err(|err| kafka_error("open_admin", &err))?;

        debug!(client_id = %settings.client_id, bootstrap, "Opened admin session");
        Ok(KafkaAdmin::new(consumer, self.client.clone(), bootstrap, settings))
    }

    fn open_producer(
        &self,
        bootstrap: &str,
        settings: &SessionSettings,
    ) -> ConsoleResult<Self::Producer> {
        let producer: FutureProducer = self
            .client
            .producer_config(bootstrap, settings)
            .create()
            .map_err(|err| kafka_error("open_producer", &err))?;

        debug!(client_id = %settings.client_id, bootstrap, "Opened producer");
        Ok(KafkaProducer::new(producer, settings.api_timeout))
    }
}
