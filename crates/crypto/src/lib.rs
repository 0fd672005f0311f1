//! Key material for IPPAN naming
//!
//! Ed25519 key pairs, the raw private key material handed around by
//! keychains, and the peer ids derived from public keys.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use std::fmt;
use thiserror::Error;

pub mod keychain;
pub mod peer_id;

pub use keychain::{KeyInfo, Keychain, MemoryKeychain, SELF_KEY_NAME};
pub use peer_id::{PeerId, PeerIdError};

/// Errors raised while handling key material
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("private key material is missing")]
    MissingKey,

    #[error("invalid private key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature verification failed")]
    BadSignature,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("key cannot be removed: {0}")]
    ProtectedKey(String),
}

/// Ed25519 key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let mut secret_key = [0u8; 32];
        OsRng.fill_bytes(&mut secret_key);
        Self::from_seed(secret_key)
    }

    /// Deterministic key pair from a 32 byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get the public key as bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Export the private key material
    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_bytes(self.signing_key.to_bytes().to_vec())
    }

    /// Peer id derived from the public key
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature made by this key pair
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        verify_signature(&self.public_key(), message, signature)
    }
}

/// Raw private key material as held by a keychain.
///
/// Nothing is validated until [`PrivateKey::to_keypair`] is called, so
/// callers can tell absent material apart from malformed material.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    bytes: Vec<u8>,
}

impl PrivateKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the material into a signing key pair
    pub fn to_keypair(&self) -> Result<KeyPair, KeyError> {
        if self.bytes.is_empty() {
            return Err(KeyError::MissingKey);
        }
        let seed: [u8; 32] = self
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength(self.bytes.len()))?;
        Ok(KeyPair::from_seed(seed))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Verify an Ed25519 signature against raw public key bytes
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
    let public_key: [u8; 32] = public_key
        .try_into()
        .map_err(|_| KeyError::InvalidPublicKey)?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|_| KeyError::InvalidPublicKey)?;
    let signature = Signature::from_slice(signature).map_err(|_| KeyError::MalformedSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| KeyError::BadSignature)
}
