//! IPNS naming for IPPAN
//!
//! Lets a node publish a mutable, signed pointer under its own identity,
//! resolve pointers published by others, and keep its own pointers alive
//! before they expire.
//!
//! - [`record`]: signed record format and validity rules
//! - [`routing`]: offline, pubsub and DHT backends behind one composite
//! - [`publisher`]: monotonic read-modify-write publishing
//! - [`resolver`]: cached, bounded-recursion resolution
//! - [`republisher`]: periodic refresh of local records
//!
//! [`Ipns`] wires these together for a node.

use ippan_crypto::{KeyError, Keychain, PeerId};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

pub mod config;
pub mod errors;
pub mod keys;
pub mod logging;
pub mod path;
pub mod publisher;
pub mod record;
pub mod republisher;
pub mod resolver;
pub mod routing;

pub use crate::config::{IpnsConfig, LoggingConfig};
pub use errors::*;
pub use path::{name_for, IpnsPath};
pub use publisher::{IpnsPublisher, PublishOptions};
pub use record::{IpnsRecord, ValidityType};
pub use republisher::{IpnsRepublisher, RepublishReport, RepublisherConfig};
pub use resolver::{IpnsResolver, ResolveOptions};
pub use routing::{
    RoutingCapabilities, RoutingComposite, RoutingError, RoutingStore, StoreKind, ValueStore,
};

/// Run `future`, failing with [`IpnsError::Timeout`] once `deadline` passes
pub(crate) async fn with_deadline<T, F>(deadline: Option<Instant>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| IpnsError::Timeout)?,
        None => future.await,
    }
}

/// Naming service of a node
pub struct Ipns {
    config: IpnsConfig,
    keychain: Arc<dyn Keychain>,
    routing: Arc<RoutingComposite>,
    resolver: Arc<IpnsResolver>,
    publisher: Arc<IpnsPublisher>,
    republisher: IpnsRepublisher,
}

impl Ipns {
    pub fn new(
        config: IpnsConfig,
        keychain: Arc<dyn Keychain>,
        capabilities: RoutingCapabilities,
    ) -> Self {
        let datastore = capabilities.datastore.clone();
        let routing = Arc::new(RoutingComposite::build(&capabilities));
        let resolver = Arc::new(
            IpnsResolver::new(routing.clone()).with_max_depth(config.max_recursion_depth),
        );
        let publisher = Arc::new(IpnsPublisher::new(
            datastore,
            routing.clone(),
            resolver.clone(),
        ));
        let republisher = IpnsRepublisher::new(
            publisher.clone(),
            keychain.clone(),
            config.republisher_config(),
        );

        info!(stores = ?routing.kinds(), "IPNS initialized");
        Self {
            config,
            keychain,
            routing,
            resolver,
            publisher,
            republisher,
        }
    }

    /// Options carrying the configured lifetime and ttl
    pub fn default_publish_options(&self) -> PublishOptions {
        PublishOptions {
            lifetime: self.config.record_lifetime(),
            ttl: self.config.record_ttl(),
            ..Default::default()
        }
    }

    /// Publish `value` under the keychain key `key_name`
    pub async fn publish(
        &self,
        key_name: &str,
        value: &str,
        options: &PublishOptions,
    ) -> Result<IpnsRecord> {
        let key = self
            .keychain
            .private_key(key_name)
            .map_err(|err| match err {
                KeyError::KeyNotFound(name) => IpnsError::UnknownKey(name),
                other => IpnsError::InvalidKey(other.to_string()),
            })?;
        self.publisher.publish(&key, value, options).await
    }

    /// Resolve a bare peer id, an `/ipns/` path or an `/ipfs/` path
    pub async fn resolve(&self, name: &str, options: &ResolveOptions) -> Result<String> {
        if name.starts_with('/') {
            return self.resolver.resolve_path(name, options).await;
        }

        let peer_id: PeerId = name
            .parse()
            .map_err(|e| IpnsError::InvalidName(format!("{name}: {e}")))?;
        self.resolver.resolve(&name_for(&peer_id), options).await
    }

    /// `/ipns/` name of a keychain key
    pub fn name_of(&self, key_name: &str) -> Result<String> {
        self.keychain
            .list_keys()
            .map_err(|e| IpnsError::InvalidKey(e.to_string()))?
            .into_iter()
            .find(|info| info.name == key_name)
            .map(|info| name_for(&info.id))
            .ok_or_else(|| IpnsError::UnknownKey(key_name.to_string()))
    }

    pub fn start(&self) -> Result<()> {
        self.republisher.start()
    }

    pub async fn stop(&self) -> Result<()> {
        self.republisher.stop().await
    }

    pub fn clear_cache(&self) {
        self.resolver.clear_cache();
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        self.resolver.cache_stats()
    }

    pub fn config(&self) -> &IpnsConfig {
        &self.config
    }

    pub fn routing(&self) -> &RoutingComposite {
        &self.routing
    }

    pub fn resolver(&self) -> &Arc<IpnsResolver> {
        &self.resolver
    }

    pub fn publisher(&self) -> &Arc<IpnsPublisher> {
        &self.publisher
    }

    pub fn republisher(&self) -> &IpnsRepublisher {
        &self.republisher
    }
}
