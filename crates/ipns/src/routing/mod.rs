//! Routing backends and the composite that fans requests out to them
//!
//! Every backend implements [`ValueStore`] (get/put by routing key) and
//! reports its [`StoreKind`]. [`RoutingComposite`] picks the backends from
//! the node's capabilities once, at startup, and afterwards only sees the
//! trait objects.

use async_trait::async_trait;
use futures::future::join_all;
use ippan_crypto::PeerId;
use ippan_storage::Datastore;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub mod dht;
pub mod offline;
pub mod pubsub;

pub use dht::{DhtClient, DhtStore, MemoryDht};
pub use offline::OfflineStore;
pub use pubsub::{BroadcastChannel, LocalBroadcastChannel, PubsubStore};

/// Errors that can occur while talking to a routing backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("record not found")]
    NotFound,

    #[error("invalid routing key")]
    InvalidKey,

    #[error("record rejected: {0}")]
    InvalidRecord(String),

    #[error("routing backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for RoutingError {
    fn from(value: anyhow::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Get/put contract shared by every backend and by the composite
#[async_trait]
pub trait ValueStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, RoutingError>;

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), RoutingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Offline,
    Pubsub,
    Dht,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            StoreKind::Offline => "offline",
            StoreKind::Pubsub => "pubsub",
            StoreKind::Dht => "dht",
        };
        f.write_str(value)
    }
}

/// A backend the composite can hold
pub trait RoutingStore: ValueStore {
    fn kind(&self) -> StoreKind;
}

/// What the node can route through
#[derive(Clone)]
pub struct RoutingCapabilities {
    /// Explicit offline-only mode
    pub offline: bool,
    /// Local datastore backing the offline store
    pub datastore: Arc<dyn Datastore>,
    /// Experimental IPNS over pubsub
    pub pubsub_enabled: bool,
    pub pubsub: Option<Arc<dyn BroadcastChannel>>,
    /// Own identity, required to take part in pubsub
    pub identity: Option<PeerId>,
    pub dht_enabled: bool,
    pub dht: Option<Arc<dyn DhtClient>>,
}

impl RoutingCapabilities {
    /// Nothing but the local datastore
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            offline: false,
            datastore,
            pubsub_enabled: false,
            pubsub: None,
            identity: None,
            dht_enabled: false,
            dht: None,
        }
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn with_pubsub(mut self, channel: Arc<dyn BroadcastChannel>, identity: PeerId) -> Self {
        self.pubsub_enabled = true;
        self.pubsub = Some(channel);
        self.identity = Some(identity);
        self
    }

    pub fn with_dht(mut self, client: Arc<dyn DhtClient>) -> Self {
        self.dht_enabled = true;
        self.dht = Some(client);
        self
    }

    fn pubsub_parts(&self) -> Option<(Arc<dyn BroadcastChannel>, PeerId)> {
        if !self.pubsub_enabled {
            return None;
        }
        Some((self.pubsub.clone()?, self.identity.clone()?))
    }

    fn dht_client(&self) -> Option<Arc<dyn DhtClient>> {
        if self.dht_enabled {
            self.dht.clone()
        } else {
            None
        }
    }
}

/// Ordered set of routing backends behind one get/put contract
pub struct RoutingComposite {
    stores: Vec<Arc<dyn RoutingStore>>,
}

impl RoutingComposite {
    /// Select the backends for the given capabilities.
    ///
    /// Offline mode, or neither pubsub nor DHT available, gives the offline
    /// store alone. An enabled DHT supersedes everything else. Pubsub is
    /// backed by the offline store as fallback.
    pub fn build(capabilities: &RoutingCapabilities) -> Self {
        let offline =
            || Arc::new(OfflineStore::new(capabilities.datastore.clone())) as Arc<dyn RoutingStore>;

        let pubsub = capabilities.pubsub_parts();
        let dht = capabilities.dht_client();

        let stores: Vec<Arc<dyn RoutingStore>> =
            if capabilities.offline || (pubsub.is_none() && dht.is_none()) {
                vec![offline()]
            } else if let Some(client) = dht {
                vec![Arc::new(DhtStore::new(client)) as Arc<dyn RoutingStore>]
            } else if let Some((channel, identity)) = pubsub {
                vec![
                    Arc::new(PubsubStore::new(channel, identity)) as Arc<dyn RoutingStore>,
                    offline(),
                ]
            } else {
                vec![offline()]
            };

        debug!(
            stores = ?stores.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            "Built IPNS routing"
        );
        Self { stores }
    }

    /// Composite over an explicit list of stores
    pub fn from_stores(stores: Vec<Arc<dyn RoutingStore>>) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &[Arc<dyn RoutingStore>] {
        &self.stores
    }

    pub fn kinds(&self) -> Vec<StoreKind> {
        self.stores.iter().map(|store| store.kind()).collect()
    }
}

#[async_trait]
impl ValueStore for RoutingComposite {
    /// First success in order wins; the last error is surfaced otherwise
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, RoutingError> {
        if key.is_empty() {
            return Err(RoutingError::InvalidKey);
        }

        let mut last_error = RoutingError::NotFound;
        for store in &self.stores {
            match store.get(key).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(store = %store.kind(), error = %err, "Routing get missed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Pushes to every store concurrently. Individual store failures are
    /// logged and do not fail the call.
    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), RoutingError> {
        if key.is_empty() {
            return Err(RoutingError::InvalidKey);
        }

        let puts = self.stores.iter().map(|store| {
            let value = value.clone();
            async move { (store.kind(), store.put(key, value).await) }
        });

        for (kind, result) in join_all(puts).await {
            if let Err(err) = result {
                warn!(store = %kind, error = %err, "Failed to put record to routing store");
            }
        }
        Ok(())
    }
}
