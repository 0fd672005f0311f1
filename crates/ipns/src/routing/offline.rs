use super::{RoutingError, RoutingStore, StoreKind, ValueStore};
use crate::keys::datastore_key;
use async_trait::async_trait;
use ippan_storage::{Datastore, StorageError};
use std::sync::Arc;

/// Routing store answering from the local datastore only
#[derive(Clone)]
pub struct OfflineStore {
    datastore: Arc<dyn Datastore>,
}

impl OfflineStore {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

fn map_storage_error(err: StorageError) -> RoutingError {
    match err {
        StorageError::NotFound(_) => RoutingError::NotFound,
        StorageError::InvalidKey(_) => RoutingError::InvalidKey,
        other => RoutingError::Backend(other.to_string()),
    }
}

#[async_trait]
impl ValueStore for OfflineStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, RoutingError> {
        let key = datastore_key(key).map_err(|_| RoutingError::InvalidKey)?;
        self.datastore.get(&key).await.map_err(map_storage_error)
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), RoutingError> {
        let key = datastore_key(key).map_err(|_| RoutingError::InvalidKey)?;
        self.datastore
            .put(&key, value)
            .await
            .map_err(map_storage_error)
    }
}

impl RoutingStore for OfflineStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Offline
    }
}
