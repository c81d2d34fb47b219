//! Cluster registry.
//!
//! The console does not own cluster inventory. It asks two collaborators for
//! connection info: a [`BootstrapResolver`] for name-addressed calls (fetch,
//! tail, publish) and a [`ClusterDirectory`] for ID-addressed calls (group
//! listing, detail and reset). [`StaticClusterRegistry`] implements both from
//! a fixed list of entries.

use kestrel_core::{ClusterId, ConsoleError, ConsoleResult};
use serde::{Deserialize, Serialize};

/// A registered cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEntry {
    /// Cluster ID.
    pub id: ClusterId,
    /// Display name; lookups by name ignore case.
    pub name: String,
    /// Comma-separated `host:port` list.
    pub bootstrap_servers: String,
    /// Disabled clusters are refused for group operations.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl ClusterEntry {
    /// Creates an enabled entry.
    #[must_use]
    pub fn new(
        id: ClusterId,
        name: impl Into<String>,
        bootstrap_servers: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            bootstrap_servers: bootstrap_servers.into(),
            enabled: true,
        }
    }

    /// Returns the bootstrap string if the cluster may be used.
    ///
    /// # Errors
    ///
    /// Returns `ClusterDisabled` if the cluster is disabled, or
    /// `ClusterMisconfigured` if it has no bootstrap servers.
    pub fn usable_bootstrap(&self) -> ConsoleResult<String> {
        if !self.enabled {
            return Err(ConsoleError::ClusterDisabled {
                cluster_id: self.id,
                name: self.name.clone(),
            });
        }

        let bootstrap = self.bootstrap_servers.trim();
        if bootstrap.is_empty() {
            return Err(ConsoleError::ClusterMisconfigured {
                cluster_id: self.id,
                name: self.name.clone(),
            });
        }
        Ok(bootstrap.to_string())
    }
}

/// Resolves a cluster name to its bootstrap string.
pub trait BootstrapResolver: Send + Sync {
    /// Resolves `cluster_name`.
    ///
    /// Name lookups ignore `enabled`: a disabled cluster still serves fetch,
    /// tail and publish. Only ID-addressed group calls are refused with
    /// `ClusterDisabled`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCluster` if no cluster has this name, or
    /// `ClusterMisconfigured` if its bootstrap string is blank.
    fn resolve(&self, cluster_name: &str) -> ConsoleResult<String>;
}

/// Looks up clusters by ID.
pub trait ClusterDirectory: Send + Sync {
    /// Finds a cluster.
    ///
    /// # Errors
    ///
    /// Returns `ClusterNotFound` if no cluster has this ID.
    fn find_cluster(&self, cluster_id: ClusterId) -> ConsoleResult<ClusterEntry>;
}

/// Fixed, in-memory cluster registry.
#[derive(Debug, Clone, Default)]
pub struct StaticClusterRegistry {
    entries: Vec<ClusterEntry>,
}

impl StaticClusterRegistry {
    /// Creates a registry from entries.
    #[must_use]
    pub fn new(entries: Vec<ClusterEntry>) -> Self {
        Self { entries }
    }

    /// Registered entries.
    #[must_use]
    pub fn entries(&self) -> &[ClusterEntry] {
        &self.entries
    }
}

impl BootstrapResolver for StaticClusterRegistry {
    fn resolve(&self, cluster_name: &str) -> ConsoleResult<String> {
        let name = cluster_name.trim();
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConsoleError::UnknownCluster {
                name: name.to_string(),
            })?;

        let bootstrap = entry.bootstrap_servers.trim();
        if bootstrap.is_empty() {
            return Err(ConsoleError::ClusterMisconfigured {
                cluster_id: entry.id,
                name: entry.name.clone(),
            });
        }
        Ok(bootstrap.to_string())
    }
}

impl ClusterDirectory for StaticClusterRegistry {
    fn find_cluster(&self, cluster_id: ClusterId) -> ConsoleResult<ClusterEntry> {
        self.entries
            .iter()
            .find(|entry| entry.id == cluster_id)
            .cloned()
            .ok_or(ConsoleError::ClusterNotFound { cluster_id })
    }
}
