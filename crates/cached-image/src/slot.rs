//! Load-or-fetch-and-refresh for one consumer
//!
//! A [`CachedSlot`] ties a consumer (anything that displays an object) to a
//! shared [`ImageCache`]. Each load:
//!
//! 1. sanitizes the key; an empty key aborts the load,
//! 2. reads and decodes the cached blob; on a hit the object is assigned to
//!    the consumer right away,
//! 3. fetches when the lookup missed or when updates were requested,
//! 4. on success assigns the fresh object and writes it back to the store,
//! 5. on failure leaves both the consumer and the store untouched.
//!
//! Assignments always go through the slot's [`ConsumerContext`].

use crate::cache::ImageCache;
use crate::context::ConsumerContext;
use crate::error::FetchError;
use crate::fetch::FetchResult;
use crate::policy::RefreshPolicy;
use file_blob_cache::{CacheEvent, SafeKey};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};

/// Receives loaded objects, e.g. an image view
pub trait Consumer<T>: Send + Sync {
    fn assign(&self, object: T);
}

impl<T, F> Consumer<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn assign(&self, object: T) {
        self(object)
    }
}

/// What a load did synchronously
#[derive(Debug)]
pub enum LoadOutcome {
    /// The key was empty; nothing happened
    EmptyKey,
    /// Served from cache, no refresh requested
    Hit,
    /// Served from cache and a refresh is running
    HitRefreshing(RefreshHandle),
    /// Nothing usable in the cache; a fetch is running
    Miss(RefreshHandle),
}

impl LoadOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, LoadOutcome::Hit | LoadOutcome::HitRefreshing(_))
    }

    /// The running refresh, if the load started one
    pub fn refresh(self) -> Option<RefreshHandle> {
        match self {
            LoadOutcome::HitRefreshing(handle) | LoadOutcome::Miss(handle) => Some(handle),
            LoadOutcome::EmptyKey | LoadOutcome::Hit => None,
        }
    }
}

/// How a refresh ended
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The consumer was handed the fresh object; `stored` tells whether it
    /// also made it into the cache
    Updated { stored: bool },
    Failed(FetchError),
    /// A newer load on the same slot replaced this one
    Superseded,
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, RefreshOutcome::Updated { .. })
    }
}

/// A running refresh
#[derive(Debug)]
pub struct RefreshHandle {
    inner: JoinHandle<RefreshOutcome>,
}

impl RefreshHandle {
    /// Wait for the refresh to finish
    pub async fn wait(self) -> RefreshOutcome {
        match self.inner.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => RefreshOutcome::Superseded,
            Err(e) => RefreshOutcome::Failed(FetchError::Other(e.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// State shared between a slot and the refreshes it spawned
struct Delivery<T> {
    cache: Arc<ImageCache<T>>,
    consumer: Arc<dyn Consumer<T>>,
    context: Arc<dyn ConsumerContext>,
    current: Arc<AtomicU64>,
    generation: u64,
    key: SafeKey,
}

impl<T: Send + 'static> Delivery<T> {
    fn superseded(&self) -> bool {
        self.cache.policy() == RefreshPolicy::SupersedePrevious
            && self.current.load(Ordering::SeqCst) != self.generation
    }

    fn emit_superseded(&self) {
        self.cache.events().emit(CacheEvent::Superseded {
            key: self.key.to_string(),
        });
    }

    /// Hand `object` to the consumer on its context. The staleness check is
    /// repeated when the task runs, since the context may run it much later.
    fn assign(&self, object: T) {
        let consumer = self.consumer.clone();
        let cache = self.cache.clone();
        let current = self.current.clone();
        let generation = self.generation;
        let key = self.key.clone();

        self.context.run(Box::new(move || {
            if cache.policy() == RefreshPolicy::SupersedePrevious
                && current.load(Ordering::SeqCst) != generation
            {
                cache.events().emit(CacheEvent::Superseded {
                    key: key.to_string(),
                });
                return;
            }
            consumer.assign(object);
        }));
    }

    /// Assign a fetched object and write it back. Runs on a blocking thread.
    fn deliver(&self, object: T) -> RefreshOutcome {
        let bytes = self.cache.encode(&self.key, &object).ok();

        self.assign(object);

        if self.superseded() {
            self.emit_superseded();
            return RefreshOutcome::Superseded;
        }

        let stored = match bytes {
            Some(bytes) => self.cache.store().write(&self.key, &bytes).is_ok(),
            None => false,
        };
        RefreshOutcome::Updated { stored }
    }
}

/// One consumer fed from the shared cache
pub struct CachedSlot<T> {
    cache: Arc<ImageCache<T>>,
    consumer: Arc<dyn Consumer<T>>,
    context: Arc<dyn ConsumerContext>,
    /// Bumped on every load; used to detect superseded refreshes
    generation: Arc<AtomicU64>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl<T: Send + 'static> CachedSlot<T> {
    pub fn new(
        cache: Arc<ImageCache<T>>,
        consumer: Arc<dyn Consumer<T>>,
        context: Arc<dyn ConsumerContext>,
    ) -> Self {
        Self {
            cache,
            consumer,
            context,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<ImageCache<T>> {
        &self.cache
    }

    fn delivery(&self, key: SafeKey, generation: u64) -> Delivery<T> {
        Delivery {
            cache: self.cache.clone(),
            consumer: self.consumer.clone(),
            context: self.context.clone(),
            current: self.generation.clone(),
            generation,
            key,
        }
    }

    /// Load `key`, using `loader` to fetch a fresh object when the cache
    /// misses or when `check_for_updates` is set.
    ///
    /// The lookup runs on the calling thread and does file I/O. `loader` is
    /// only called when a fetch is needed; its future runs on the cache's
    /// runtime.
    pub fn load_with_key_and_loader<F, Fut>(
        &self,
        key: &str,
        check_for_updates: bool,
        loader: F,
    ) -> LoadOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let Some(key) = self.cache.sanitize(key) else {
            return LoadOutcome::EmptyKey;
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.cache.policy() == RefreshPolicy::SupersedePrevious {
            self.cancel_in_flight();
        }

        let delivery = self.delivery(key, generation);
        let hit = match self.cache.lookup(&delivery.key) {
            Some(object) => {
                delivery.assign(object);
                true
            }
            None => false,
        };

        if hit && !check_for_updates {
            return LoadOutcome::Hit;
        }

        let handle = self.spawn_refresh(delivery, loader());
        if hit {
            LoadOutcome::HitRefreshing(handle)
        } else {
            LoadOutcome::Miss(handle)
        }
    }

    /// Load the object cached under `url`, downloading it from `url` when
    /// the cache misses or when `check_for_updates` is set.
    pub fn load_with_url_key(&self, url: &str, check_for_updates: bool) -> LoadOutcome {
        let http = self.cache.http().clone();
        let codec = self.cache.codec().clone();
        let target = url.to_string();

        self.load_with_key_and_loader(url, check_for_updates, move || async move {
            let bytes = http.fetch(&target).await?;
            Ok(codec.decode(&bytes)?)
        })
    }

    fn cancel_in_flight(&self) {
        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            handle.abort();
        }
    }

    fn spawn_refresh<Fut>(&self, delivery: Delivery<T>, fetch: Fut) -> RefreshHandle
    where
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let events = delivery.cache.events().clone();
        events.emit(CacheEvent::FetchStarted {
            key: delivery.key.to_string(),
        });

        let inner = self.cache.runtime().spawn(async move {
            let _permit = match delivery.cache.policy() {
                RefreshPolicy::SerializePerKey => {
                    Some(delivery.cache.lock_refresh(&delivery.key).await)
                }
                _ => None,
            };

            let object = match fetch.await {
                Ok(object) => object,
                Err(e) => {
                    events.emit(CacheEvent::FetchFailed {
                        key: delivery.key.to_string(),
                        error: e.to_string(),
                    });
                    return RefreshOutcome::Failed(e);
                }
            };

            if delivery.superseded() {
                delivery.emit_superseded();
                return RefreshOutcome::Superseded;
            }

            events.emit(CacheEvent::FetchSucceeded {
                key: delivery.key.to_string(),
            });

            match tokio::task::spawn_blocking(move || delivery.deliver(object)).await {
                Ok(outcome) => outcome,
                Err(e) => RefreshOutcome::Failed(FetchError::Other(e.to_string())),
            }
        });

        if self.cache.policy() == RefreshPolicy::SupersedePrevious {
            *self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(inner.abort_handle());
        }

        RefreshHandle { inner }
    }
}
