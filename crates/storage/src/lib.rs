//! Local key-value datastore for published naming records
//!
//! Keys are slash-separated paths (`/ipns/<id>`) validated before any I/O.
//! Values are opaque bytes. Two backends are provided: an in-memory map for
//! tests and ephemeral nodes, and a sled tree for persistent nodes.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Invalid datastore key: {0:?}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Validated datastore key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatastoreKey(String);

impl DatastoreKey {
    /// Parse a raw key. It must start with `/`, must not end with `/`
    /// and must not contain empty segments.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if Self::is_key(&raw) {
            Ok(Self(raw))
        } else {
            Err(StorageError::InvalidKey(raw))
        }
    }

    pub fn is_key(raw: &str) -> bool {
        raw.len() > 1
            && raw.starts_with('/')
            && !raw.ends_with('/')
            && raw[1..].split('/').all(|segment| !segment.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Child key `/<self>/<segment>`
    pub fn child(&self, segment: &str) -> Result<Self> {
        Self::new(format!("{}/{}", self.0, segment))
    }
}

impl fmt::Display for DatastoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Abstract datastore
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get(&self, key: &DatastoreKey) -> Result<Vec<u8>>;
    async fn put(&self, key: &DatastoreKey, value: Vec<u8>) -> Result<()>;
    async fn has(&self, key: &DatastoreKey) -> Result<bool>;
    async fn delete(&self, key: &DatastoreKey) -> Result<()>;
}

/// In-memory datastore
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    entries: Arc<RwLock<HashMap<DatastoreKey, Vec<u8>>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get(&self, key: &DatastoreKey) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &DatastoreKey, value: Vec<u8>) -> Result<()> {
        self.entries.write().insert(key.clone(), value);
        Ok(())
    }

    async fn has(&self, key: &DatastoreKey) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn delete(&self, key: &DatastoreKey) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Sled-backed datastore
#[derive(Clone)]
pub struct SledDatastore {
    db: sled::Db,
    records: sled::Tree,
}

impl SledDatastore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let records = db.open_tree("records")?;
        tracing::debug!(entries = records.len(), "Opened sled datastore");
        Ok(Self { db, records })
    }

    /// Datastore over a throwaway database, removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let records = db.open_tree("records")?;
        Ok(Self { db, records })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl Datastore for SledDatastore {
    async fn get(&self, key: &DatastoreKey) -> Result<Vec<u8>> {
        self.records
            .get(key.as_bytes())?
            .map(|v| v.to_vec())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &DatastoreKey, value: Vec<u8>) -> Result<()> {
        self.records.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn has(&self, key: &DatastoreKey) -> Result<bool> {
        Ok(self.records.contains_key(key.as_bytes())?)
    }

    async fn delete(&self, key: &DatastoreKey) -> Result<()> {
        self.records.remove(key.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(DatastoreKey::is_key("/ipns/abc"));
        assert!(DatastoreKey::is_key("/a"));
        assert!(!DatastoreKey::is_key(""));
        assert!(!DatastoreKey::is_key("/"));
        assert!(!DatastoreKey::is_key("ipns/abc"));
        assert!(!DatastoreKey::is_key("/ipns/"));
        assert!(!DatastoreKey::is_key("/ipns//abc"));

        let err = DatastoreKey::new("no-slash").unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(k) if k == "no-slash"));
    }

    #[test]
    fn child_keys() {
        let root = DatastoreKey::new("/ipns").unwrap();
        assert_eq!(root.child("abc").unwrap().as_str(), "/ipns/abc");
        assert!(root.child("").is_err());
    }

    #[tokio::test]
    async fn memory_put_get_delete() {
        let store = MemoryDatastore::new();
        let key = DatastoreKey::new("/ipns/k1").unwrap();

        let err = store.get(&key).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.has(&key).await.unwrap());

        store.put(&key, b"v1".to_vec()).await.unwrap();
        store.put(&key, b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"v2".to_vec());
        assert_eq!(store.len(), 1);

        store.delete(&key).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sled_put_get_delete() {
        let store = SledDatastore::temporary().unwrap();
        let key = DatastoreKey::new("/ipns/k2").unwrap();

        assert!(store.get(&key).await.unwrap_err().is_not_found());
        store.put(&key, vec![1, 2, 3]).await.unwrap();
        assert!(store.has(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), vec![1, 2, 3]);
        store.delete(&key).await.unwrap();
        assert!(!store.has(&key).await.unwrap());
    }
}
