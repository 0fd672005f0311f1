//! `/ipfs/` and `/ipns/` path parsing

use crate::errors::*;
use ippan_crypto::PeerId;
use std::fmt;

pub const IPFS_NAMESPACE: &str = "ipfs";
pub const IPNS_NAMESPACE: &str = "ipns";

/// A parsed content or name path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpnsPath {
    /// Immutable content, `/ipfs/<cid>[/rest]`
    Ipfs { cid: String, rest: String },
    /// Mutable name, `/ipns/<peer id>[/rest]`
    Ipns { peer_id: PeerId, rest: String },
}

impl IpnsPath {
    pub fn parse(path: &str) -> Result<Self> {
        let Some(stripped) = path.strip_prefix('/') else {
            return Err(IpnsError::InvalidPath(path.to_string()));
        };

        let mut segments = stripped.splitn(3, '/');
        let namespace = segments.next().unwrap_or_default();
        let id = segments.next().unwrap_or_default();
        let rest = segments.next().map(|r| format!("/{r}")).unwrap_or_default();

        if id.is_empty() {
            return Err(IpnsError::InvalidPath(path.to_string()));
        }

        match namespace {
            IPFS_NAMESPACE if is_valid_cid(id) => Ok(IpnsPath::Ipfs {
                cid: id.to_string(),
                rest,
            }),
            IPFS_NAMESPACE => Err(IpnsError::InvalidPath(path.to_string())),
            IPNS_NAMESPACE => {
                let peer_id = id
                    .parse()
                    .map_err(|e| IpnsError::InvalidName(format!("{path}: {e}")))?;
                Ok(IpnsPath::Ipns { peer_id, rest })
            }
            _ => Err(IpnsError::InvalidPath(path.to_string())),
        }
    }

    /// Trailing segments after the identifier, with their leading `/`
    pub fn rest(&self) -> &str {
        match self {
            IpnsPath::Ipfs { rest, .. } | IpnsPath::Ipns { rest, .. } => rest,
        }
    }
}

impl fmt::Display for IpnsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpnsPath::Ipfs { cid, rest } => write!(f, "/{IPFS_NAMESPACE}/{cid}{rest}"),
            IpnsPath::Ipns { peer_id, rest } => write!(f, "/{IPNS_NAMESPACE}/{peer_id}{rest}"),
        }
    }
}

/// Parse a strict `/ipns/<peer id>` name
pub fn parse_name(name: &str) -> Result<PeerId> {
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() != 3 || !segments[0].is_empty() || segments[1] != IPNS_NAMESPACE {
        return Err(IpnsError::InvalidName(name.to_string()));
    }
    segments[2]
        .parse()
        .map_err(|e| IpnsError::InvalidName(format!("{name}: {e}")))
}

/// The `/ipns/<peer id>` name of a peer
pub fn name_for(peer_id: &PeerId) -> String {
    format!("/{IPNS_NAMESPACE}/{peer_id}")
}

/// Normalize a value to publish: bare content ids get the `/ipfs/`
/// prefix, paths must be well formed.
pub fn normalize_value(value: &str) -> Result<String> {
    if value.starts_with('/') {
        IpnsPath::parse(value)?;
        Ok(value.to_string())
    } else if is_valid_cid(value) {
        Ok(format!("/{IPFS_NAMESPACE}/{value}"))
    } else {
        Err(IpnsError::InvalidPath(value.to_string()))
    }
}

/// Syntactic check for CIDv0 (`Qm...` base58 sha2-256) and base32 CIDv1
pub fn is_valid_cid(candidate: &str) -> bool {
    if candidate.starts_with("Qm") {
        return bs58::decode(candidate)
            .into_vec()
            .map(|bytes| bytes.len() == 34 && bytes[0] == 0x12 && bytes[1] == 0x20)
            .unwrap_or(false);
    }
    candidate.len() > 8
        && candidate.starts_with('b')
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c))
}
