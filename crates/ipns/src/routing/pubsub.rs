use super::{RoutingError, RoutingStore, StoreKind, ValueStore};
use crate::keys::{peer_id_from_routing_key, pubsub_topic};
use crate::record::IpnsRecord;
use async_trait::async_trait;
use ippan_crypto::PeerId;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Gossip channel carrying the latest record per topic.
///
/// `get` returns the last message retained on the topic, if any.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    async fn get(&self, topic: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn put(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<()>;
}

/// Process-local channel. Clones share the same topics, which lets
/// several nodes in one process gossip to each other.
#[derive(Clone, Default)]
pub struct LocalBroadcastChannel {
    topics: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl LocalBroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }
}

#[async_trait]
impl BroadcastChannel for LocalBroadcastChannel {
    async fn get(&self, topic: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.topics.read().get(topic).cloned())
    }

    async fn put(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.topics.write().insert(topic.to_string(), data);
        Ok(())
    }
}

/// IPNS over pubsub.
///
/// Every routing key maps to its own topic. The store remembers the best
/// record it has seen per topic and never publishes an older one over it.
/// Only records signed by the peer that owns the routing key are taken
/// from the topic.
pub struct PubsubStore {
    channel: Arc<dyn BroadcastChannel>,
    local_id: PeerId,
    seen: RwLock<HashMap<String, (IpnsRecord, Vec<u8>)>>,
}

impl PubsubStore {
    pub fn new(channel: Arc<dyn BroadcastChannel>, local_id: PeerId) -> Self {
        Self {
            channel,
            local_id,
            seen: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Record the candidate if it is signed by `owner` and beats what was
    /// seen on the topic. Returns false for a stale candidate.
    fn remember(
        &self,
        topic: &str,
        owner: &PeerId,
        candidate: &[u8],
    ) -> Result<bool, RoutingError> {
        let record = IpnsRecord::deserialize(candidate)
            .map_err(|e| RoutingError::InvalidRecord(e.to_string()))?;
        record
            .verify_signer(owner)
            .map_err(|e| RoutingError::InvalidRecord(e.to_string()))?;

        let mut seen = self.seen.write();
        if let Some((current, _)) = seen.get(topic) {
            if record.compare(current) == Ordering::Less {
                return Ok(false);
            }
        }
        seen.insert(topic.to_string(), (record, candidate.to_vec()));
        Ok(true)
    }

    /// Take in whatever the channel currently holds for the topic
    async fn pull(&self, topic: &str, owner: &PeerId) -> Result<(), RoutingError> {
        if let Some(message) = self.channel.get(topic).await? {
            if let Err(err) = self.remember(topic, owner, &message) {
                debug!(%topic, error = %err, "Ignoring invalid record on pubsub topic");
            }
        }
        Ok(())
    }
}

fn owner_of(key: &[u8]) -> Result<PeerId, RoutingError> {
    peer_id_from_routing_key(key).ok_or(RoutingError::InvalidKey)
}

#[async_trait]
impl ValueStore for PubsubStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, RoutingError> {
        let owner = owner_of(key)?;
        let topic = pubsub_topic(key);
        self.pull(&topic, &owner).await?;

        self.seen
            .read()
            .get(&topic)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(RoutingError::NotFound)
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), RoutingError> {
        let owner = owner_of(key)?;
        let topic = pubsub_topic(key);
        self.pull(&topic, &owner).await?;

        if !self.remember(&topic, &owner, &value)? {
            debug!(%topic, "Ignoring stale record for pubsub topic");
            return Ok(());
        }

        debug!(%topic, from = %self.local_id, "Broadcasting record");
        self.channel.put(&topic, value).await?;
        Ok(())
    }
}

impl RoutingStore for PubsubStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Pubsub
    }
}
