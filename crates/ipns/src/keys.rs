//! Routing, datastore and topic keys derived from peer ids

use ippan_crypto::PeerId;
use ippan_storage::{DatastoreKey, StorageError};

/// Prefix of every IPNS routing key
pub const ROUTING_KEY_PREFIX: &[u8] = b"/ipns/";

/// Key under which a peer's record is published to routing
pub fn routing_key(peer_id: &PeerId) -> Vec<u8> {
    [ROUTING_KEY_PREFIX, peer_id.as_bytes()].concat()
}

/// Peer id an IPNS routing key was derived from
pub fn peer_id_from_routing_key(routing_key: &[u8]) -> Option<PeerId> {
    routing_key
        .strip_prefix(ROUTING_KEY_PREFIX)
        .and_then(|id| PeerId::from_bytes(id).ok())
}

/// Datastore key for a routing key.
///
/// IPNS routing keys map to `/ipns/<hex id>`, anything else to
/// `/<hex key>`. An empty key or a bare prefix does not form a valid key.
pub fn datastore_key(routing_key: &[u8]) -> Result<DatastoreKey, StorageError> {
    let raw = match routing_key.strip_prefix(ROUTING_KEY_PREFIX) {
        Some(id) => format!("/ipns/{}", hex::encode(id)),
        None => format!("/{}", hex::encode(routing_key)),
    };
    DatastoreKey::new(raw)
}

/// Datastore key holding the latest record published for `peer_id`
pub fn local_key(peer_id: &PeerId) -> Result<DatastoreKey, StorageError> {
    datastore_key(&routing_key(peer_id))
}

/// Pubsub topic a routing key is broadcast on
pub fn pubsub_topic(routing_key: &[u8]) -> String {
    format!("/record/{}", hex::encode(routing_key))
}
