//! Configuration management for MiniCube

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure for a MiniCube node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Cube engine configuration
    #[serde(default)]
    pub cube: CubeConfig,

    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Row source configuration
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    /// Load configuration from a TOML/JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse(&content, path.as_ref().extension().map_or(false, |ext| ext == "toml"))
    }

    fn parse(content: &str, is_toml: bool) -> Result<Self> {
        let config: Config = if is_toml {
            toml::from_str(content)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str(content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        config.validate()?;
        tracing::debug!("Loaded configuration for node {}", config.node.address);
        Ok(config)
    }

    /// Reject settings that would leave a node unable to publish its identity
    pub fn validate(&self) -> Result<()> {
        if self.node.address.trim().is_empty() {
            return Err(Error::Config("node.address must not be blank".to_string()));
        }
        if self.node.group.trim().is_empty() {
            return Err(Error::Config("node.group must not be blank".to_string()));
        }
        if self.node.group.contains("::") || self.node.group.contains('@') {
            return Err(Error::Config(format!(
                "node.group {} must not contain '::' or '@'",
                self.node.group
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Advertised node address, the owner part of every cube id
    pub address: String,
    /// Cluster group name embedded in cube ids
    pub group: String,
    /// Load-pending window before the node claims a role
    pub join_delay_secs: u64,
}

impl NodeConfig {
    pub fn join_delay(&self) -> Duration {
        Duration::from_secs(self.join_delay_secs)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5701".to_string(),
            group: "minicubes-cluster".to_string(),
            join_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    /// Initial execution mode of new cube engines
    pub parallel: bool,
    /// Number of worker threads for parallel mode (0 = auto)
    pub worker_threads: usize,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            worker_threads: 0, // auto-detect
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Bound on a scatter/gather call, <= 0 waits indefinitely
    pub executor_timeout_secs: i64,
}

impl ClusterConfig {
    /// `None` means wait indefinitely
    pub fn executor_timeout(&self) -> Option<Duration> {
        u64::try_from(self.executor_timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            executor_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path of the tab-separated fact file
    pub path: String,
    /// Column holding the yyyymmdd date used for shard selection
    pub date_column: String,
    /// Index of the first indicator column; unset means split by prefix
    pub split_index: Option<usize>,
    /// Dimension column label prefix used when split_index is unset
    pub dimension_prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/minicube/fact.tsv".to_string(),
            date_column: "dim_date".to_string(),
            split_index: None,
            dimension_prefix: "dim_".to_string(),
        }
    }
}
