//! Keychain holding the node identity and named sub-keys

use crate::{KeyError, KeyPair, PeerId, PrivateKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name under which the node's own identity is stored
pub const SELF_KEY_NAME: &str = "self";

/// Public description of a locally held key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    pub id: PeerId,
}

/// Source of locally held signing keys
pub trait Keychain: Send + Sync {
    /// All keys held by this node, the node identity included
    fn list_keys(&self) -> Result<Vec<KeyInfo>, KeyError>;

    /// Private material for a named key
    fn private_key(&self, name: &str) -> Result<PrivateKey, KeyError>;
}

/// In-memory keychain
#[derive(Clone)]
pub struct MemoryKeychain {
    self_id: PeerId,
    keys: Arc<RwLock<BTreeMap<String, KeyPair>>>,
}

impl MemoryKeychain {
    /// Create a keychain around the node identity
    pub fn new(identity: KeyPair) -> Self {
        let self_id = identity.peer_id();
        let mut keys = BTreeMap::new();
        keys.insert(SELF_KEY_NAME.to_string(), identity);
        Self {
            self_id,
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    /// Id of the node identity
    pub fn self_id(&self) -> PeerId {
        self.self_id.clone()
    }

    /// Generate and store a new named key
    pub fn generate(&self, name: &str) -> Result<KeyInfo, KeyError> {
        self.import(name, KeyPair::generate())
    }

    /// Store an existing key pair under `name`
    pub fn import(&self, name: &str, keypair: KeyPair) -> Result<KeyInfo, KeyError> {
        let mut keys = self.keys.write();
        if keys.contains_key(name) {
            return Err(KeyError::KeyExists(name.to_string()));
        }
        let info = KeyInfo {
            name: name.to_string(),
            id: keypair.peer_id(),
        };
        keys.insert(name.to_string(), keypair);
        Ok(info)
    }

    /// Remove a named key. The node identity cannot be removed.
    pub fn remove(&self, name: &str) -> Result<KeyInfo, KeyError> {
        if name == SELF_KEY_NAME {
            return Err(KeyError::ProtectedKey(name.to_string()));
        }
        self.keys
            .write()
            .remove(name)
            .map(|keypair| KeyInfo {
                name: name.to_string(),
                id: keypair.peer_id(),
            })
            .ok_or_else(|| KeyError::KeyNotFound(name.to_string()))
    }
}

impl Keychain for MemoryKeychain {
    fn list_keys(&self) -> Result<Vec<KeyInfo>, KeyError> {
        Ok(self
            .keys
            .read()
            .iter()
            .map(|(name, keypair)| KeyInfo {
                name: name.clone(),
                id: keypair.peer_id(),
            })
            .collect())
    }

    fn private_key(&self, name: &str) -> Result<PrivateKey, KeyError> {
        self.keys
            .read()
            .get(name)
            .map(KeyPair::private_key)
            .ok_or_else(|| KeyError::KeyNotFound(name.to_string()))
    }
}
