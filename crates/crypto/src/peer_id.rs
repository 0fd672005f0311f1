//! Peer identities
//!
//! A peer id is the sha2-256 multihash of an Ed25519 public key, rendered
//! in base58btc (`Qm...`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SHA2_256_CODE: u8 = 0x12;
const SHA2_256_LEN: u8 = 0x20;
const MULTIHASH_LEN: usize = 34;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerIdError {
    #[error("peer id is not valid base58: {0}")]
    InvalidEncoding(String),

    #[error("peer id is not a sha2-256 multihash")]
    InvalidMultihash,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut bytes = Vec::with_capacity(MULTIHASH_LEN);
        bytes.push(SHA2_256_CODE);
        bytes.push(SHA2_256_LEN);
        bytes.extend_from_slice(&digest);
        Self(bytes)
    }

    /// Parse raw multihash bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PeerIdError> {
        if bytes.len() != MULTIHASH_LEN || bytes[0] != SHA2_256_CODE || bytes[1] != SHA2_256_LEN
        {
            return Err(PeerIdError::InvalidMultihash);
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Whether `public_key` is the key this id was derived from
    pub fn matches_public_key(&self, public_key: &[u8]) -> bool {
        match <[u8; 32]>::try_from(public_key) {
            Ok(key) => Self::from_public_key(&key) == *self,
            Err(_) => false,
        }
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| PeerIdError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_base58())
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn peer_id_renders_as_qm_multihash() {
        let id = KeyPair::from_seed([1u8; 32]).peer_id();
        let encoded = id.to_base58();
        assert!(encoded.starts_with("Qm"));
        assert_eq!(encoded.parse::<PeerId>().unwrap(), id);
    }

    #[test]
    fn peer_id_matches_only_its_own_key() {
        let keypair = KeyPair::from_seed([2u8; 32]);
        let other = KeyPair::from_seed([3u8; 32]);
        let id = keypair.peer_id();
        assert!(id.matches_public_key(&keypair.public_key()));
        assert!(!id.matches_public_key(&other.public_key()));
        assert!(!id.matches_public_key(&[0u8; 5]));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            "not-base58-0OIl".parse::<PeerId>(),
            Err(PeerIdError::InvalidEncoding(_))
        ));
        assert_eq!(
            "3yZe7d".parse::<PeerId>(),
            Err(PeerIdError::InvalidMultihash)
        );
        assert_eq!(PeerId::from_bytes(&[]), Err(PeerIdError::InvalidMultihash));
    }
}
