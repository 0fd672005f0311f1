//! Name resolution with caching and bounded recursion

use crate::errors::*;
use crate::keys::routing_key;
use crate::path::{name_for, parse_name, IpnsPath};
use crate::record::IpnsRecord;
use crate::routing::{RoutingError, ValueStore};
use crate::with_deadline;
use chrono::{DateTime, Utc};
use ippan_crypto::PeerId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Chained names followed before giving up
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Follow values that are themselves `/ipns/` names
    pub recursive: bool,
    /// Skip the cache lookup
    pub nocache: bool,
    pub timeout: Option<Duration>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            nocache: false,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    valid_until: DateTime<Utc>,
}

/// Resolves `/ipns/` names through routing
///
/// Every hop of a chain is cached under its own name until the record's
/// ttl or its validity runs out, whichever comes first.
#[derive(Clone)]
pub struct IpnsResolver {
    routing: Arc<dyn ValueStore>,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_depth: usize,
}

impl IpnsResolver {
    pub fn new(routing: Arc<dyn ValueStore>) -> Self {
        Self {
            routing,
            cache: Arc::new(RwLock::new(HashMap::new())),
            max_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve a strict `/ipns/<peer id>` name to the path it points at
    pub async fn resolve(&self, name: &str, options: &ResolveOptions) -> Result<String> {
        let peer_id = parse_name(name)?;
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        with_deadline(deadline, self.resolve_chain(name, peer_id, options)).await
    }

    /// Resolve any path. `/ipfs/` paths come back unchanged, `/ipns/`
    /// paths resolve their name and keep the trailing segments.
    pub async fn resolve_path(&self, path: &str, options: &ResolveOptions) -> Result<String> {
        match IpnsPath::parse(path)? {
            IpnsPath::Ipfs { .. } => Ok(path.to_string()),
            IpnsPath::Ipns { peer_id, rest } => {
                let resolved = self.resolve(&name_for(&peer_id), options).await?;
                Ok(format!("{resolved}{rest}"))
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Number of cached entries, and how many of them are still fresh
    pub fn cache_stats(&self) -> (usize, usize) {
        let now = Utc::now();
        let cache = self.cache.read();
        let fresh = cache.values().filter(|e| now <= e.valid_until).count();
        (cache.len(), fresh)
    }

    async fn resolve_chain(
        &self,
        name: &str,
        peer_id: PeerId,
        options: &ResolveOptions,
    ) -> Result<String> {
        let mut current_name = name.to_string();
        let mut current_id = peer_id;
        let mut suffix = String::new();

        for hop in 0..self.max_depth {
            let value = self
                .resolve_once(&current_name, &current_id, options.nocache)
                .await?;

            if !options.recursive {
                return Ok(format!("{value}{suffix}"));
            }

            match IpnsPath::parse(&value) {
                Ok(IpnsPath::Ipns { peer_id, rest }) => {
                    debug!(name = %current_name, next = %peer_id, hop, "Following IPNS chain");
                    suffix = format!("{rest}{suffix}");
                    current_name = name_for(&peer_id);
                    current_id = peer_id;
                }
                _ => return Ok(format!("{value}{suffix}")),
            }
        }

        Err(IpnsError::RecursionLimit {
            depth: self.max_depth,
        })
    }

    async fn resolve_once(&self, name: &str, peer_id: &PeerId, nocache: bool) -> Result<String> {
        if !nocache {
            if let Some(value) = self.get_from_cache(name) {
                debug!(%name, "IPNS cache hit");
                return Ok(value);
            }
        }

        let bytes = self
            .routing
            .get(&routing_key(peer_id))
            .await
            .map_err(|err| match err {
                RoutingError::NotFound => IpnsError::NoRecordFound(name.to_string()),
                other => IpnsError::UnexpectedErrorGettingRecord {
                    name: name.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let record = IpnsRecord::deserialize(&bytes)
            .map_err(|_| IpnsError::InvalidRecordReceived(name.to_string()))?;
        record.verify_for_peer(peer_id)?;

        self.store_in_cache(name, &record);
        Ok(record.value)
    }

    /// Expired entries are evicted on read
    fn get_from_cache(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        {
            let cache = self.cache.read();
            match cache.get(name) {
                Some(entry) if now <= entry.valid_until => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.cache.write().remove(name);
        None
    }

    fn store_in_cache(&self, name: &str, record: &IpnsRecord) {
        let now = Utc::now();
        let ttl_end = chrono::Duration::from_std(record.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(record.validity);

        self.cache.write().insert(
            name.to_string(),
            CacheEntry {
                value: record.value.clone(),
                valid_until: ttl_end.min(record.validity),
            },
        );
    }
}
