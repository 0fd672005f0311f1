//! Background refresh of locally published records
//!
//! Records carry an end-of-life, so a node has to re-sign its names before
//! they lapse. The republisher waits an initial delay after start, then
//! republishes every key in the keychain on a fixed interval. At most one
//! loop runs per republisher.

use crate::errors::*;
use crate::publisher::{IpnsPublisher, DEFAULT_RECORD_LIFETIME};
use ippan_crypto::{KeyError, KeyInfo, Keychain};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RepublisherConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Validity window given to republished records
    pub record_lifetime: Duration,
}

impl Default for RepublisherConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            interval: Duration::from_secs(4 * 60 * 60),
            record_lifetime: DEFAULT_RECORD_LIFETIME,
        }
    }
}

/// Outcome of one republish cycle, by key name
#[derive(Debug, Default)]
pub struct RepublishReport {
    pub republished: Vec<String>,
    /// Keys that never published a record
    pub skipped: Vec<String>,
    pub failed: Vec<(String, IpnsError)>,
}

struct Worker {
    publisher: Arc<IpnsPublisher>,
    keychain: Arc<dyn Keychain>,
    config: RepublisherConfig,
    cycles: AtomicU64,
}

pub struct IpnsRepublisher {
    worker: Arc<Worker>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IpnsRepublisher {
    pub fn new(
        publisher: Arc<IpnsPublisher>,
        keychain: Arc<dyn Keychain>,
        config: RepublisherConfig,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                publisher,
                keychain,
                config,
                cycles: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the republish loop. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(IpnsError::RepublishAlreadyRunning);
        }

        let worker = self.worker.clone();
        *task = Some(tokio::spawn(async move {
            let mut delay = worker.config.initial_delay;
            loop {
                tokio::time::sleep(delay).await;
                let report = worker.republish_entries().await;
                worker.cycles.fetch_add(1, Ordering::SeqCst);
                info!(
                    republished = report.republished.len(),
                    skipped = report.skipped.len(),
                    failed = report.failed.len(),
                    "IPNS republish cycle finished"
                );
                delay = worker.config.interval;
            }
        }));

        info!(
            initial_delay = ?self.worker.config.initial_delay,
            interval = ?self.worker.config.interval,
            "IPNS republisher started"
        );
        Ok(())
    }

    /// Stop the loop. Once this returns no further cycle runs, and a cycle
    /// in progress is cancelled.
    pub async fn stop(&self) -> Result<()> {
        let handle = self
            .task
            .lock()
            .take()
            .ok_or(IpnsError::RepublishNotRunning)?;

        handle.abort();
        if let Err(err) = handle.await {
            if !err.is_cancelled() {
                error!(error = %err, "IPNS republish task failed");
            }
        }
        info!("IPNS republisher stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Completed cycles since construction
    pub fn cycles(&self) -> u64 {
        self.worker.cycles.load(Ordering::SeqCst)
    }

    /// Run one cycle now, outside the loop
    pub async fn republish_entries(&self) -> RepublishReport {
        self.worker.republish_entries().await
    }
}

impl Drop for IpnsRepublisher {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl Worker {
    async fn republish_entries(&self) -> RepublishReport {
        let mut report = RepublishReport::default();

        let keys = match self.keychain.list_keys() {
            Ok(keys) => keys,
            Err(err) => {
                error!(error = %err, "Failed to list keys for republishing");
                return report;
            }
        };

        for info in keys {
            match self.republish_key(&info).await {
                Ok(true) => report.republished.push(info.name),
                Ok(false) => {
                    debug!(key = %info.name, "No published record, skipping");
                    report.skipped.push(info.name);
                }
                Err(err) => {
                    warn!(key = %info.name, code = err.code(), error = %err, "Failed to republish IPNS record");
                    report.failed.push((info.name, err));
                }
            }
        }

        report
    }

    /// Re-sign the stored record with a fresh validity. The value and the
    /// sequence stay as they were.
    async fn republish_key(&self, info: &KeyInfo) -> Result<bool> {
        let key = self
            .keychain
            .private_key(&info.name)
            .map_err(|err| match err {
                KeyError::KeyNotFound(name) => IpnsError::UnknownKey(name),
                other => IpnsError::InvalidKey(other.to_string()),
            })?;

        let refreshed = self
            .publisher
            .republish(&key, self.config.record_lifetime)
            .await?;
        Ok(refreshed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishOptions;
    use crate::resolver::IpnsResolver;
    use crate::routing::{RoutingCapabilities, RoutingComposite, ValueStore};
    use async_trait::async_trait;
    use ippan_crypto::{KeyPair, MemoryKeychain, PrivateKey, SELF_KEY_NAME};
    use ippan_storage::{Datastore, DatastoreKey, MemoryDatastore};
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    const CONTENT: &str = "/ipfs/QmPFVLPmp9zv5Z5KUqLhe2EivAGccQW2r7M7jhVJGLZoZU";

    fn publisher() -> Arc<IpnsPublisher> {
        publisher_over(Arc::new(MemoryDatastore::new()))
    }

    fn publisher_over(datastore: Arc<dyn Datastore>) -> Arc<IpnsPublisher> {
        let routing: Arc<dyn ValueStore> = Arc::new(RoutingComposite::build(
            &RoutingCapabilities::new(datastore.clone()),
        ));
        let resolver = Arc::new(IpnsResolver::new(routing.clone()));
        Arc::new(IpnsPublisher::new(datastore, routing, resolver))
    }

    fn short_lived() -> PublishOptions {
        PublishOptions {
            resolve: false,
            lifetime: Duration::from_secs(60),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_start_fails_until_stopped() {
        let keychain = Arc::new(MemoryKeychain::new(KeyPair::from_seed([1u8; 32])));
        let republisher = IpnsRepublisher::new(publisher(), keychain, RepublisherConfig::default());

        assert_eq!(republisher.stop().await, Err(IpnsError::RepublishNotRunning));

        republisher.start().unwrap();
        assert!(republisher.is_running());
        let err = republisher.start().unwrap_err();
        assert_eq!(err.code(), "ERR_REPUBLISH_ALREADY_RUNNING");

        republisher.stop().await.unwrap();
        assert!(!republisher.is_running());
        assert_eq!(
            republisher.stop().await.unwrap_err().code(),
            "ERR_REPUBLISH_NOT_RUNNING"
        );

        republisher.start().unwrap();
        republisher.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_validity_after_the_initial_delay() {
        let identity = KeyPair::from_seed([2u8; 32]);
        let keychain = Arc::new(MemoryKeychain::new(identity.clone()));
        let publisher = publisher();
        let original = publisher
            .publish(&identity.private_key(), CONTENT, &short_lived())
            .await
            .unwrap();

        let republisher =
            IpnsRepublisher::new(publisher.clone(), keychain, RepublisherConfig::default());
        republisher.start().unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(republisher.cycles(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(republisher.cycles(), 1);

        let refreshed = publisher
            .get_published(&identity.peer_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.value, original.value);
        assert_eq!(refreshed.sequence, original.sequence);
        assert!(refreshed.validity > original.validity);

        tokio::time::sleep(Duration::from_secs(4 * 60 * 60)).await;
        assert_eq!(republisher.cycles(), 2);
        republisher.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_cycle_runs_after_stop() {
        let keychain = Arc::new(MemoryKeychain::new(KeyPair::from_seed([3u8; 32])));
        let republisher = IpnsRepublisher::new(publisher(), keychain, RepublisherConfig::default());

        republisher.start().unwrap();
        republisher.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        assert_eq!(republisher.cycles(), 0);
    }

    /// Lists a key whose material has gone missing
    struct LeakyKeychain {
        inner: MemoryKeychain,
        ghost: KeyInfo,
    }

    impl Keychain for LeakyKeychain {
        fn list_keys(&self) -> std::result::Result<Vec<KeyInfo>, KeyError> {
            let mut keys = vec![self.ghost.clone()];
            keys.extend(self.inner.list_keys()?);
            Ok(keys)
        }

        fn private_key(&self, name: &str) -> std::result::Result<PrivateKey, KeyError> {
            self.inner.private_key(name)
        }
    }

    #[tokio::test]
    async fn per_key_failures_do_not_stop_the_cycle() {
        let identity = KeyPair::from_seed([4u8; 32]);
        let ghost = KeyPair::from_seed([5u8; 32]);
        let inner = MemoryKeychain::new(identity.clone());
        inner.generate("unused").unwrap();

        let publisher = publisher();
        publisher
            .publish(&ghost.private_key(), CONTENT, &short_lived())
            .await
            .unwrap();
        publisher
            .publish(&identity.private_key(), CONTENT, &short_lived())
            .await
            .unwrap();

        let keychain = Arc::new(LeakyKeychain {
            inner,
            ghost: KeyInfo {
                name: "ghost".into(),
                id: ghost.peer_id(),
            },
        });
        let republisher = IpnsRepublisher::new(publisher, keychain, RepublisherConfig::default());

        let report = republisher.republish_entries().await;
        assert_eq!(report.republished, vec![SELF_KEY_NAME.to_string()]);
        assert_eq!(report.skipped, vec!["unused".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "ghost");
        assert_eq!(report.failed[0].1, IpnsError::UnknownKey("ghost".into()));
    }

    #[test]
    fn default_schedule() {
        let config = RepublisherConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(60));
        assert_eq!(config.interval, Duration::from_secs(14_400));
        assert_eq!(config.record_lifetime, Duration::from_secs(86_400));
    }

    /// Holds the first read after `hold` is set until released
    #[derive(Default)]
    struct GatedDatastore {
        inner: MemoryDatastore,
        hold: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Datastore for GatedDatastore {
        async fn get(&self, key: &DatastoreKey) -> ippan_storage::Result<Vec<u8>> {
            let value = self.inner.get(key).await;
            if self.hold.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            value
        }

        async fn put(&self, key: &DatastoreKey, value: Vec<u8>) -> ippan_storage::Result<()> {
            self.inner.put(key, value).await
        }

        async fn has(&self, key: &DatastoreKey) -> ippan_storage::Result<bool> {
            self.inner.has(key).await
        }

        async fn delete(&self, key: &DatastoreKey) -> ippan_storage::Result<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn a_publish_during_the_cycle_is_not_reverted() {
        let newer = "/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        let identity = KeyPair::from_seed([6u8; 32]);
        let datastore = Arc::new(GatedDatastore::default());
        let publisher = publisher_over(datastore.clone());
        publisher
            .publish(&identity.private_key(), CONTENT, &short_lived())
            .await
            .unwrap();

        let republisher = Arc::new(IpnsRepublisher::new(
            publisher.clone(),
            Arc::new(MemoryKeychain::new(identity.clone())),
            RepublisherConfig::default(),
        ));

        datastore.hold.store(true, Ordering::SeqCst);
        let cycle = tokio::spawn({
            let republisher = republisher.clone();
            async move { republisher.republish_entries().await }
        });
        datastore.entered.notified().await;

        let update = tokio::spawn({
            let publisher = publisher.clone();
            let key = identity.private_key();
            async move { publisher.publish(&key, newer, &short_lived()).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        datastore.release.notify_one();

        let report = cycle.await.unwrap();
        assert_eq!(report.republished, vec![SELF_KEY_NAME.to_string()]);
        let published = update.await.unwrap().unwrap();
        assert_eq!(published.sequence, 1);

        let stored = publisher
            .get_published(&identity.peer_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, newer);
        assert_eq!(stored.sequence, 1);
    }
}
