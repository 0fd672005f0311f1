//! Record publishing
//!
//! Builds the next record for a key from the one stored locally, persists
//! it, then pushes it to routing. The local read-modify-write is
//! serialized per key so concurrent publishes never reuse a sequence.

use crate::errors::*;
use crate::keys::{local_key, routing_key};
use crate::path::normalize_value;
use crate::record::IpnsRecord;
use crate::resolver::{IpnsResolver, ResolveOptions};
use crate::routing::ValueStore;
use crate::with_deadline;
use ippan_crypto::{PeerId, PrivateKey};
use ippan_storage::{Datastore, DatastoreKey, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Validity window of a freshly published record
pub const DEFAULT_RECORD_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
/// Caching hint carried by published records
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Check that the value resolves before publishing it
    pub resolve: bool,
    pub lifetime: Duration,
    pub ttl: Duration,
    /// Bounds the resolve check and the routing push
    pub timeout: Option<Duration>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            resolve: true,
            lifetime: DEFAULT_RECORD_LIFETIME,
            ttl: DEFAULT_RECORD_TTL,
            timeout: None,
        }
    }
}

pub struct IpnsPublisher {
    datastore: Arc<dyn Datastore>,
    routing: Arc<dyn ValueStore>,
    resolver: Arc<IpnsResolver>,
    locks: Mutex<HashMap<PeerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IpnsPublisher {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        routing: Arc<dyn ValueStore>,
        resolver: Arc<IpnsResolver>,
    ) -> Self {
        Self {
            datastore,
            routing,
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Publish `value` under the key's name and return the new record
    pub async fn publish(
        &self,
        key: &PrivateKey,
        value: &str,
        options: &PublishOptions,
    ) -> Result<IpnsRecord> {
        let peer_id = peer_id_of(key)?;
        let value = normalize_value(value)?;
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);

        if options.resolve {
            with_deadline(
                deadline,
                self.resolver.resolve_path(&value, &ResolveOptions::default()),
            )
            .await?;
        }

        let record = self
            .locked(&peer_id, self.update_local(key, &peer_id, &value, options))
            .await?;
        self.push(&peer_id, &record, deadline).await?;

        info!(name = %peer_id, value = %record.value, sequence = record.sequence, "Published IPNS record");
        Ok(record)
    }

    /// Re-sign the stored record for `key` with a validity of `lifetime`.
    ///
    /// Value, sequence and ttl are read and rewritten under the key's lock,
    /// so a concurrent publish is never overwritten. Returns `None` when
    /// nothing was published for the key.
    pub async fn republish(
        &self,
        key: &PrivateKey,
        lifetime: Duration,
    ) -> Result<Option<IpnsRecord>> {
        let peer_id = peer_id_of(key)?;

        let refreshed = self
            .locked(&peer_id, async {
                let datastore_key = local_key(&peer_id)
                    .map_err(|e| IpnsError::InvalidDatastoreKey(e.to_string()))?;
                let Some(previous) = self.read_local(&datastore_key).await? else {
                    return Ok(None);
                };
                let record = IpnsRecord::with_lifetime(
                    key,
                    previous.value,
                    previous.sequence,
                    lifetime,
                    previous.ttl,
                )?;
                self.write_local(&datastore_key, &record).await?;
                Ok::<_, IpnsError>(Some(record))
            })
            .await?;

        let Some(record) = refreshed else {
            return Ok(None);
        };
        self.push(&peer_id, &record, None).await?;

        debug!(name = %peer_id, sequence = record.sequence, "Republished IPNS record");
        Ok(Some(record))
    }

    /// Latest record stored locally for `peer_id`
    pub async fn get_published(&self, peer_id: &PeerId) -> Result<Option<IpnsRecord>> {
        let key = local_key(peer_id).map_err(|e| IpnsError::InvalidDatastoreKey(e.to_string()))?;
        self.read_local(&key).await
    }

    async fn update_local(
        &self,
        key: &PrivateKey,
        peer_id: &PeerId,
        value: &str,
        options: &PublishOptions,
    ) -> Result<IpnsRecord> {
        let datastore_key =
            local_key(peer_id).map_err(|e| IpnsError::InvalidDatastoreKey(e.to_string()))?;

        let sequence = match self.read_local(&datastore_key).await? {
            None => 0,
            Some(previous) if previous.value == value => previous.sequence,
            Some(previous) => previous.sequence.saturating_add(1),
        };

        let record =
            IpnsRecord::with_lifetime(key, value, sequence, options.lifetime, options.ttl)?;
        self.write_local(&datastore_key, &record).await?;

        debug!(name = %peer_id, sequence, "Stored IPNS record locally");
        Ok(record)
    }

    async fn write_local(&self, key: &DatastoreKey, record: &IpnsRecord) -> Result<()> {
        self.datastore
            .put(key, record.serialize()?)
            .await
            .map_err(|err| match err {
                StorageError::InvalidKey(msg) => IpnsError::InvalidDatastoreKey(msg),
                other => IpnsError::StoringInDatastore(other.to_string()),
            })
    }

    async fn push(
        &self,
        peer_id: &PeerId,
        record: &IpnsRecord,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let bytes = record.serialize()?;
        with_deadline(deadline, async {
            self.routing
                .put(&routing_key(peer_id), bytes)
                .await
                .map_err(|e| IpnsError::PuttingToRouting(e.to_string()))
        })
        .await
    }

    async fn read_local(&self, key: &DatastoreKey) -> Result<Option<IpnsRecord>> {
        match self.datastore.get(key).await {
            Ok(bytes) => IpnsRecord::deserialize(&bytes).map(Some),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(StorageError::InvalidKey(msg)) => Err(IpnsError::InvalidDatastoreKey(msg)),
            Err(other) => Err(IpnsError::DeterminingPublishedRecord(other.to_string())),
        }
    }

    /// Run `work` holding the per-key lock for `peer_id`
    async fn locked<T>(&self, peer_id: &PeerId, work: impl Future<Output = T>) -> T {
        let lock = self
            .locks
            .lock()
            .entry(peer_id.clone())
            .or_default()
            .clone();

        let output = {
            let _guard = lock.lock().await;
            work.await
        };

        let mut locks = self.locks.lock();
        drop(lock);
        if locks
            .get(peer_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(peer_id);
        }
        output
    }
}

fn peer_id_of(key: &PrivateKey) -> Result<PeerId> {
    if key.is_empty() {
        return Err(IpnsError::InvalidPrivateKey);
    }
    key.to_keypair()
        .map(|keypair| keypair.peer_id())
        .map_err(|e| IpnsError::InvalidKey(e.to_string()))
}
