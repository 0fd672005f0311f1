//! Naming configuration
//!
//! Loaded from an optional file, then overridden by `IPPAN_IPNS_*`
//! environment variables. Nested fields use `__`, e.g.
//! `IPPAN_IPNS_LOGGING__LEVEL=debug`.

use crate::republisher::RepublisherConfig;
use crate::routing::{BroadcastChannel, DhtClient, RoutingCapabilities};
use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use ippan_crypto::PeerId;
use ippan_storage::{Datastore, MemoryDatastore, SledDatastore, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const ENV_PREFIX: &str = "IPPAN_IPNS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpnsConfig {
    /// Route through the local datastore only
    pub offline: bool,
    /// Experimental IPNS over pubsub
    pub pubsub_enabled: bool,
    pub dht_enabled: bool,
    pub record_lifetime_secs: u64,
    pub record_ttl_secs: u64,
    pub republish_initial_delay_secs: u64,
    pub republish_interval_secs: u64,
    pub max_recursion_depth: usize,
    /// Sled directory; records stay in memory when unset
    pub datastore_path: Option<PathBuf>,
    pub logging: LoggingConfig,
}

impl Default for IpnsConfig {
    fn default() -> Self {
        Self {
            offline: false,
            pubsub_enabled: false,
            dht_enabled: false,
            record_lifetime_secs: 24 * 60 * 60,
            record_ttl_secs: 60,
            republish_initial_delay_secs: 60,
            republish_interval_secs: 4 * 60 * 60,
            max_recursion_depth: 32,
            datastore_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl IpnsConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Configuration file {} not found", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: IpnsConfig = builder
            .build()
            .context("failed to read IPNS configuration")?
            .try_deserialize()
            .context("invalid IPNS configuration")?;

        if config.max_recursion_depth == 0 {
            anyhow::bail!("max_recursion_depth must be at least 1");
        }
        Ok(config)
    }

    pub fn record_lifetime(&self) -> Duration {
        Duration::from_secs(self.record_lifetime_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn republisher_config(&self) -> RepublisherConfig {
        RepublisherConfig {
            initial_delay: Duration::from_secs(self.republish_initial_delay_secs),
            interval: Duration::from_secs(self.republish_interval_secs),
            record_lifetime: self.record_lifetime(),
        }
    }

    /// Routing capabilities from the configured flags and whatever
    /// collaborators the node has running
    pub fn capabilities(
        &self,
        datastore: Arc<dyn Datastore>,
        pubsub: Option<Arc<dyn BroadcastChannel>>,
        identity: Option<PeerId>,
        dht: Option<Arc<dyn DhtClient>>,
    ) -> RoutingCapabilities {
        RoutingCapabilities {
            offline: self.offline,
            datastore,
            pubsub_enabled: self.pubsub_enabled,
            pubsub,
            identity,
            dht_enabled: self.dht_enabled,
            dht,
        }
    }

    /// Datastore at `datastore_path`, or an in-memory one
    pub fn open_datastore(&self) -> std::result::Result<Arc<dyn Datastore>, StorageError> {
        Ok(match &self.datastore_path {
            Some(path) => Arc::new(SledDatastore::new(path)?),
            None => Arc::new(MemoryDatastore::new()),
        })
    }
}
