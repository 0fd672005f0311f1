use super::{RoutingError, RoutingStore, StoreKind, ValueStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Distributed hash table the node is connected to.
///
/// `Ok(None)` means the DHT answered and holds no value for the key.
#[async_trait]
pub trait DhtClient: Send + Sync {
    async fn get_value(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;

    async fn put_value(&self, key: &[u8], value: Vec<u8>) -> anyhow::Result<()>;
}

/// In-memory DHT shared by every node holding a clone.
#[derive(Clone, Default)]
pub struct MemoryDht {
    records: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryDht {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DhtClient for MemoryDht {
    async fn get_value(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put_value(&self, key: &[u8], value: Vec<u8>) -> anyhow::Result<()> {
        self.records.write().insert(key.to_vec(), value);
        Ok(())
    }
}

/// Routing store backed by a DHT client
#[derive(Clone)]
pub struct DhtStore {
    client: Arc<dyn DhtClient>,
}

impl DhtStore {
    pub fn new(client: Arc<dyn DhtClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ValueStore for DhtStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, RoutingError> {
        self.client
            .get_value(key)
            .await?
            .ok_or(RoutingError::NotFound)
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), RoutingError> {
        self.client
            .put_value(key, value)
            .await
            .map_err(RoutingError::from)
    }
}

impl RoutingStore for DhtStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Dht
    }
}
