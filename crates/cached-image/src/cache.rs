//! Shared cache handle
//!
//! One [`ImageCache`] is built at startup around a [`BlobStore`] and handed to
//! every consumer slot. It owns the codec, the event sink, the runtime that
//! refreshes run on and the refresh policy.

use crate::context::ConsumerContext;
use crate::error::Result;
use crate::fetch::HttpFetcher;
use crate::policy::RefreshPolicy;
use crate::slot::{CachedSlot, Consumer};
use file_blob_cache::{sanitize, BlobStore, CacheEvent, CacheStats, EventSink, SafeKey};
use image_codec::ObjectCodec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::OwnedMutexGuard;

pub struct ImageCache<T> {
    store: BlobStore,
    codec: Arc<dyn ObjectCodec<T>>,
    events: Arc<dyn EventSink>,
    runtime: Handle,
    policy: RefreshPolicy,
    http: HttpFetcher,
    /// Async per-key locks used by [`RefreshPolicy::SerializePerKey`]
    refresh_locks: Mutex<HashMap<SafeKey, Arc<tokio::sync::Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Send + 'static> ImageCache<T> {
    /// Build a cache around `store`, reporting through the store's event sink
    /// and running refreshes on `runtime`.
    pub fn new(store: BlobStore, codec: impl ObjectCodec<T> + 'static, runtime: Handle) -> Self {
        let events = store.events().clone();
        Self {
            store,
            codec: Arc::new(codec),
            events,
            runtime,
            policy: RefreshPolicy::default(),
            http: HttpFetcher::new(),
            refresh_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_http(mut self, http: HttpFetcher) -> Self {
        self.http = http;
        self
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn codec(&self) -> &Arc<dyn ObjectCodec<T>> {
        &self.codec
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn http(&self) -> &HttpFetcher {
        &self.http
    }

    /// Create a consumer slot sharing this cache
    pub fn slot(
        self: &Arc<Self>,
        consumer: impl Consumer<T> + 'static,
        context: impl ConsumerContext + 'static,
    ) -> CachedSlot<T> {
        CachedSlot::new(self.clone(), Arc::new(consumer), Arc::new(context))
    }

    pub fn sanitize(&self, key: &str) -> Option<SafeKey> {
        sanitize(key, self.events.as_ref()).ok()
    }

    /// Read and decode the object under `key`. Unreadable or undecodable
    /// blobs count as misses.
    pub(crate) fn lookup(&self, key: &SafeKey) -> Option<T> {
        let object = self.store.read(key).and_then(|bytes| {
            self.codec
                .decode(&bytes)
                .map_err(|e| {
                    self.events.emit(CacheEvent::DecodeFailed {
                        key: key.to_string(),
                        error: e.to_string(),
                    })
                })
                .ok()
        });

        if object.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.events.emit(CacheEvent::CacheHit {
                key: key.to_string(),
            });
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.events.emit(CacheEvent::CacheMiss {
                key: key.to_string(),
            });
        }
        object
    }

    /// Encode `object` and store it under `key`
    pub(crate) fn persist(&self, key: &SafeKey, object: &T) -> Result<()> {
        let bytes = self.encode(key, object)?;
        self.store.write(key, &bytes)?;
        Ok(())
    }

    pub(crate) fn encode(&self, key: &SafeKey, object: &T) -> Result<Vec<u8>> {
        self.codec.encode(object).map_err(|e| {
            self.events.emit(CacheEvent::EncodeFailed {
                key: key.to_string(),
                error: e.to_string(),
            });
            e.into()
        })
    }

    /// Wait for exclusive refresh rights on `key`, shared by every slot
    pub(crate) async fn lock_refresh(self: &Arc<Self>, key: &SafeKey) -> RefreshPermit<T> {
        let lock = {
            let mut locks = self
                .refresh_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };

        RefreshPermit {
            cache: self.clone(),
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub(crate) fn refresh_lock_count(&self) -> usize {
        self.refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The cached object for `key`, if one is stored and decodes
    pub fn image(&self, key: &str) -> Option<T> {
        let key = self.sanitize(key)?;
        self.lookup(&key)
    }

    /// Store `object` under `key`, replacing what was there
    pub fn set_image(&self, object: &T, key: &str) -> Result<()> {
        let Some(key) = self.sanitize(key) else {
            return Err(file_blob_cache::CacheError::EmptyKey.into());
        };
        self.persist(&key, object)
    }

    /// Remove the object under `key`. Returns whether anything was removed.
    pub fn remove_image(&self, key: &str) -> Result<bool> {
        let Some(key) = self.sanitize(key) else {
            return Err(file_blob_cache::CacheError::EmptyKey.into());
        };
        Ok(self.store.delete(&key)?)
    }

    /// Remove every stored object. Returns how many entries were removed.
    pub fn remove_images(&self) -> Result<usize> {
        Ok(self.store.clear()?)
    }

    /// Stored entries plus hit/miss counters of this cache
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = self.store.stats()?;
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        Ok(stats)
    }
}

/// Refresh rights on one key, held from fetch until the result is stored.
///
/// Dropping it releases the lock and removes the key's entry once no other
/// refresh holds or waits for it.
pub(crate) struct RefreshPermit<T> {
    cache: Arc<ImageCache<T>>,
    key: SafeKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<T> Drop for RefreshPermit<T> {
    fn drop(&mut self) {
        let mut locks = self
            .cache
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
