//! Configuration file.
//!
//! ```toml
//! [client]
//! default_api_timeout_ms = 15000
//! client_id_prefix = "kestrel-console"
//!
//! [security]
//! protocol = "SSL"
//! ssl_ca_location = "/etc/kafka/ca.pem"
//!
//! [[clusters]]
//! id = 1
//! name = "prod"
//! bootstrap_servers = "broker-1:9093,broker-2:9093"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kestrel_console::{ClusterEntry, ConsoleSettings, StaticClusterRegistry};
use kestrel_core::{ClusterId, Limits};
use kestrel_kafka::{KafkaClientConfig, SecurityConfig};
use serde::{Deserialize, Serialize};

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Client settings.
    pub client: ClientSection,
    /// TLS settings shared by every cluster.
    pub security: SecurityConfig,
    /// Registered clusters.
    pub clusters: Vec<ClusterSection>,
}

/// `[client]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// API timeout; below 1000 ms falls back to the default.
    pub default_api_timeout_ms: Option<u32>,
    /// `socket.timeout.ms`; defaults to the API timeout.
    pub socket_timeout_ms: Option<u32>,
    /// Prefix of every client ID.
    pub client_id_prefix: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            default_api_timeout_ms: None,
            socket_timeout_ms: None,
            client_id_prefix: "kestrel-console".to_string(),
        }
    }
}

/// One `[[clusters]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSection {
    /// Cluster ID used by group commands.
    pub id: u64,
    /// Name used by fetch, tail and publish.
    pub name: String,
    /// Comma-separated `host:port` list.
    #[serde(default)]
    pub bootstrap_servers: String,
    /// Disabled clusters are refused for group commands.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// Error loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },
    /// The file parsed but is inconsistent.
    #[error("invalid config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl ConsoleConfig {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or validated.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cluster IDs and names are unique and security settings are valid.
    ///
    /// Blank bootstrap servers are allowed here; calls to such a cluster
    /// fail as misconfigured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for cluster in &self.clusters {
            let name = cluster.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("cluster {} has no name", cluster.id),
                });
            }
            if !ids.insert(cluster.id) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate cluster id {}", cluster.id),
                });
            }
            if !names.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate cluster name '{name}'"),
                });
            }
        }

        self.security
            .validate()
            .map_err(|err| ConfigError::Invalid {
                message: err.to_string(),
            })
    }

    /// Console settings from the `[client]` section.
    #[must_use]
    pub fn console_settings(&self) -> ConsoleSettings {
        ConsoleSettings {
            api_timeout_ms: self.client.default_api_timeout_ms,
            client_id_prefix: self.client.client_id_prefix.clone(),
            limits: Limits::new(),
        }
    }

    /// Client configuration for the session factory.
    #[must_use]
    pub fn client_config(&self) -> KafkaClientConfig {
        KafkaClientConfig {
            socket_timeout_ms: self.client.socket_timeout_ms,
            security: self.security.clone(),
        }
    }

    /// Registry of the configured clusters.
    #[must_use]
    pub fn registry(&self) -> StaticClusterRegistry {
        StaticClusterRegistry::new(
            self.clusters
                .iter()
                .map(|cluster| ClusterEntry {
                    id: ClusterId::new(cluster.id),
                    name: cluster.name.trim().to_string(),
                    bootstrap_servers: cluster.bootstrap_servers.clone(),
                    enabled: cluster.enabled,
                })
                .collect(),
        )
    }
}
