//! Client configuration.
//!
//! Every session starts from [`KafkaClientConfig::client_config`]: bootstrap
//! servers, a unique client ID, timeouts and the cluster-wide security
//! settings. Each session kind then adds its own keys.

use std::time::Duration;

use kestrel_console::SessionSettings;
use kestrel_core::{ConsoleError, ConsoleResult};
use rdkafka::config::ClientConfig;
use serde::{Deserialize, Serialize};

/// Accepted values of `security.protocol`.
const SECURITY_PROTOCOLS: &[&str] = &["plaintext", "ssl", "sasl_plaintext", "sasl_ssl"];

/// `session.timeout.ms` for consumers; below the smallest poll interval.
const SESSION_TIMEOUT_MS: &str = "10000";

/// Accepted values of `ssl.endpoint.identification.algorithm`.
const ENDPOINT_ALGORITHMS: &[&str] = &["https", "none"];

// -----------------------------------------------------------------------------
// Security
// -----------------------------------------------------------------------------

/// TLS settings shared by every cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// `security.protocol`, e.g. `PLAINTEXT` or `SSL`.
    pub protocol: String,
    /// CA bundle (PEM).
    pub ssl_ca_location: Option<String>,
    /// Client certificate (PEM).
    pub ssl_certificate_location: Option<String>,
    /// Client private key (PEM).
    pub ssl_key_location: Option<String>,
    /// Password of the private key.
    pub ssl_key_password: Option<String>,
    /// `https` to verify broker hostnames, `none` to skip.
    pub ssl_endpoint_identification_algorithm: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            protocol: "PLAINTEXT".to_string(),
            ssl_ca_location: None,
            ssl_certificate_location: None,
            ssl_key_location: None,
            ssl_key_password: None,
            ssl_endpoint_identification_algorithm: None,
        }
    }
}

impl SecurityConfig {
    /// Returns true if the protocol uses TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.protocol.to_ascii_lowercase().contains("ssl")
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown protocol or endpoint
    /// algorithm, or a certificate without its key.
    pub fn validate(&self) -> ConsoleResult<()> {
        let protocol = self.protocol.trim().to_ascii_lowercase();
        if !SECURITY_PROTOCOLS.contains(&protocol.as_str()) {
            return Err(ConsoleError::invalid_argument(
                "security.protocol",
                format!(
                    "unknown protocol '{}'; expected one of: {}",
                    self.protocol,
                    SECURITY_PROTOCOLS.join(", ")
                ),
            ));
        }

        if self.ssl_certificate_location.is_some() != self.ssl_key_location.is_some() {
            return Err(ConsoleError::invalid_argument(
                "ssl_certificate_location",
                "ssl_certificate_location and ssl_key_location must be set together",
            ));
        }

        if let Some(algorithm) = &self.ssl_endpoint_identification_algorithm {
            if !ENDPOINT_ALGORITHMS.contains(&algorithm.as_str()) {
                return Err(ConsoleError::invalid_argument(
                    "ssl_endpoint_identification_algorithm",
                    format!("unknown algorithm '{algorithm}'; expected https or none"),
                ));
            }
        }

        Ok(())
    }

    /// Writes the settings into `config`.
    pub fn apply(&self, config: &mut ClientConfig) {
        config.set("security.protocol", self.protocol.trim());

        let locations = [
            ("ssl.ca.location", &self.ssl_ca_location),
            ("ssl.certificate.location", &self.ssl_certificate_location),
            ("ssl.key.location", &self.ssl_key_location),
            ("ssl.key.password", &self.ssl_key_password),
        ];
        for (key, value) in locations {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                config.set(key, value);
            }
        }

        if self.is_tls() {
            if let Some(algorithm) = &self.ssl_endpoint_identification_algorithm {
                config.set("ssl.endpoint.identification.algorithm", algorithm);
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------------

/// Static client configuration held by the session factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KafkaClientConfig {
    /// `socket.timeout.ms`; defaults to the session's API timeout.
    pub socket_timeout_ms: Option<u32>,
    /// TLS settings.
    pub security: SecurityConfig,
}

impl KafkaClientConfig {
    /// Creates a config with the given security settings.
    #[must_use]
    pub const fn new(security: SecurityConfig) -> Self {
        Self {
            socket_timeout_ms: None,
            security,
        }
    }

    /// Base client config for one session.
    #[must_use]
    pub fn client_config(&self, bootstrap: &str, settings: &SessionSettings) -> ClientConfig {
        let socket_timeout = self
            .socket_timeout_ms
            .map_or(settings.api_timeout, |ms| Duration::from_millis(u64::from(ms)));

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", bootstrap)
            .set("client.id", &settings.client_id)
            .set("socket.timeout.ms", millis(socket_timeout))
            .set("metadata.max.age.ms", "30000");
        self.security.apply(&mut config);
        config
    }

    /// Config for a group-less consumer: manual assignment, nothing committed.
    #[must_use]
    pub fn consumer_config(&self, bootstrap: &str, settings: &SessionSettings) -> ClientConfig {
        let mut config = self.client_config(bootstrap, settings);
        config
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "latest")
            // Must not exceed max.poll.interval.ms.
            .set("session.timeout.ms", SESSION_TIMEOUT_MS)
            .set("max.poll.interval.ms", millis(settings.max_poll_interval));
        config
    }

    /// Config for a consumer acting on behalf of `group_id` without joining it.
    #[must_use]
    pub fn group_config(
        &self,
        bootstrap: &str,
        settings: &SessionSettings,
        group_id: &str,
    ) -> ClientConfig {
        let mut config = self.consumer_config(bootstrap, settings);
        config.set("group.id", group_id);
        config
    }

    /// Config for a transient, idempotent producer.
    #[must_use]
    pub fn producer_config(&self, bootstrap: &str, settings: &SessionSettings) -> ClientConfig {
        let mut config = self.client_config(bootstrap, settings);
        config
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            .set("message.timeout.ms", millis(settings.api_timeout))
            .set("request.timeout.ms", millis(settings.api_timeout));
        config
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}
