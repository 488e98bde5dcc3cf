use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{Acquisition, AsyncAcquisition, InstanceStore, Store, SyncAcquisition};
use crate::dependency::Instance;
use crate::error::Result;
use crate::key::TypeKey;
use crate::provider::Provider;
use crate::resource::Constructed;

type SyncLock = Arc<parking_lot::Mutex<()>>;
type AsyncLock = Arc<tokio::sync::Mutex<()>>;

/// Process-wide store guaranteeing at-most-once construction per key.
///
/// Locks are per key, so unrelated singletons build in parallel and only
/// callers racing on the same key wait for each other. They are created on
/// first request and kept for the life of the store.
///
/// The blocking and the asynchronous paths use separate lock tables: a
/// blocking resolution never waits on an asynchronous one and vice versa.
/// A key resolved concurrently through both paths can therefore be
/// constructed twice; resolve any one type through one path.
pub struct SingletonStore {
    inner: InstanceStore,
    sync_locks: DashMap<TypeKey, SyncLock>,
    async_locks: DashMap<TypeKey, AsyncLock>,
}

impl SingletonStore {
    pub fn new() -> Self {
        Self {
            inner: InstanceStore::labelled("singleton"),
            sync_locks: DashMap::new(),
            async_locks: DashMap::new(),
        }
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn pending_releases(&self) -> usize {
        self.inner.pending_releases()
    }

    /// Number of per-key locks created so far, both tables together.
    pub fn lock_count(&self) -> usize {
        self.sync_locks.len() + self.async_locks.len()
    }

    // The shard guard is released before the caller blocks on the mutex.
    fn sync_lock_for(&self, key: &TypeKey) -> SyncLock {
        self.sync_locks.entry(*key).or_default().value().clone()
    }

    fn async_lock_for(&self, key: &TypeKey) -> AsyncLock {
        self.async_locks.entry(*key).or_default().value().clone()
    }
}

impl Default for SingletonStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonStore")
            .field("cached", &self.inner.len())
            .field("locks", &self.lock_count())
            .field("pending_releases", &self.inner.pending_releases())
            .finish()
    }
}

#[async_trait]
impl Store for SingletonStore {
    fn get(&self, key: &TypeKey) -> Option<Instance> {
        self.inner.get(key)
    }

    fn add(&self, provider: &Provider, instance: Instance) {
        self.inner.add(provider, instance);
    }

    fn lock_sync(&self, key: &TypeKey) -> SyncAcquisition {
        if self.inner.contains(key) {
            return Acquisition::free(false);
        }

        let guard = self.sync_lock_for(key).lock_arc();
        // another caller may have finished while this one waited
        let should_construct = !self.inner.contains(key);
        trace!(key = %key, should_construct, "Singleton lock acquired");
        Acquisition::held(should_construct, guard)
    }

    async fn lock(&self, key: &TypeKey) -> AsyncAcquisition {
        if self.inner.contains(key) {
            return Acquisition::free(false);
        }

        let guard = self.async_lock_for(key).lock_owned().await;
        let should_construct = !self.inner.contains(key);
        trace!(key = %key, should_construct, "Singleton lock acquired");
        Acquisition::held(should_construct, guard)
    }

    fn enter_resource_sync(&self, key: TypeKey, constructed: Constructed) -> Result<Instance> {
        self.inner.enter_resource_sync(key, constructed)
    }

    async fn enter_resource(&self, key: TypeKey, constructed: Constructed) -> Result<Instance> {
        self.inner.enter_resource(key, constructed).await
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    async fn aclose(&self) -> Result<()> {
        self.inner.aclose().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::dependency::Args;
    use crate::error::BoxError;
    use crate::store::testing::{Tracked, journal};

    #[derive(Debug)]
    struct Config(usize);

    fn provider() -> Provider {
        Provider::singleton(|_: &Args| Ok::<_, BoxError>(Config(0)))
    }

    // what the resolver does on the blocking path
    fn construct_sync(store: &SingletonStore, provider: &Provider, calls: &AtomicUsize) -> Instance {
        let key = provider.key();
        if let Some(hit) = store.get(&key) {
            return hit;
        }
        let acquisition = store.lock_sync(&key);
        if !acquisition.should_construct() {
            return store.get(&key).unwrap();
        }
        std::thread::sleep(Duration::from_millis(20));
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let instance: Instance = Arc::new(Config(n));
        store.add(provider, instance.clone());
        instance
    }

    #[test]
    fn racing_threads_construct_once() {
        let store = SingletonStore::new();
        let provider = provider();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(16);

        let results: Vec<Instance> = std::thread::scope(|s| {
            let mut handles = Vec::new();
            for _ in 0..16 {
                handles.push(s.spawn(|| {
                    barrier.wait();
                    construct_sync(&store, &provider, &calls)
                }));
            }
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn recheck_inside_lock_sees_winner() {
        let store = SingletonStore::new();
        let provider = provider();
        let key = provider.key();

        let first = store.lock_sync(&key);
        assert!(first.should_construct());
        assert!(first.is_held());

        std::thread::scope(|s| {
            let waiter = s.spawn(|| store.lock_sync(&key).should_construct());
            std::thread::sleep(Duration::from_millis(20));
            store.add(&provider, Arc::new(Config(1)));
            drop(first);
            assert!(!waiter.join().unwrap());
        });
    }

    #[test]
    fn cached_key_skips_the_mutex() {
        let store = SingletonStore::new();
        let provider = provider();
        store.add(&provider, Arc::new(Config(1)));

        let acquisition = store.lock_sync(&provider.key());
        assert!(!acquisition.should_construct());
        assert!(!acquisition.is_held());
        assert_eq!(store.lock_count(), 0);
    }

    #[test]
    fn unrelated_keys_do_not_contend() {
        let store = SingletonStore::new();
        let held = store.lock_sync(&TypeKey::of::<Config>());

        std::thread::scope(|s| {
            let other = s.spawn(|| store.lock_sync(&TypeKey::of::<String>()).should_construct());
            assert!(other.join().unwrap());
        });
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_tasks_construct_once() {
        let store = Arc::new(SingletonStore::new());
        let provider = Arc::new(provider());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let (store, provider, calls) = (store.clone(), provider.clone(), calls.clone());
                tokio::spawn(async move {
                    let key = provider.key();
                    let acquisition = store.lock(&key).await;
                    if acquisition.should_construct() {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        store.add(&provider, Arc::new(Config(n)));
                    }
                    drop(acquisition);
                    store.get(&key).unwrap()
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_trace() {
        let store = Arc::new(SingletonStore::new());
        let key = TypeKey::of::<Config>();

        let winner = store.lock(&key).await;
        assert!(winner.should_construct());

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let _acquisition = store.lock(&key).await;
            })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        drop(winner);
        let next = tokio::time::timeout(Duration::from_secs(1), store.lock(&key))
            .await
            .expect("lock must be free after the waiter was cancelled");
        assert!(next.should_construct());
        assert!(!store.contains(&key));
    }

    #[tokio::test]
    async fn cancelled_winner_hands_over_construction() {
        let store = Arc::new(SingletonStore::new());
        let key = TypeKey::of::<Config>();

        let winner = {
            let store = store.clone();
            tokio::spawn(async move {
                let _acquisition = store.lock(&key).await;
                // constructing forever
                std::future::pending::<()>().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        winner.abort();
        let _ = winner.await;

        let next = tokio::time::timeout(Duration::from_secs(1), store.lock(&key))
            .await
            .expect("lock must be released by the cancelled winner");
        assert!(next.should_construct());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn blocking_and_async_tables_are_independent() {
        let store = SingletonStore::new();
        let key = TypeKey::of::<Config>();

        let blocking = store.lock_sync(&key);
        let asynchronous = tokio::time::timeout(Duration::from_millis(200), store.lock(&key))
            .await
            .expect("async path must not wait on the blocking table");

        assert!(blocking.should_construct());
        assert!(asynchronous.should_construct());
        assert_eq!(store.lock_count(), 2);
    }

    #[test]
    fn close_unwinds_singleton_resources() {
        let store = SingletonStore::new();
        let journal = journal();
        store
            .enter_resource_sync(TypeKey::of::<String>(), Constructed::resource(Tracked::new("pool", &journal)))
            .unwrap();

        store.close().unwrap();
        store.close().unwrap();
        assert_eq!(*journal.lock(), ["enter pool", "exit pool"]);
    }
}
