use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use cached::Cached;
use cached::stores::SizedCache;

use crate::TokenBucket;

/// Errors a [`LimiterFactory`] may surface during construction.
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Builds the limiter for a key the store has not seen yet.
///
/// Injected into the store so rate/burst policy, including per-key variation,
/// is pluggable without touching the store itself. Closures of the shape
/// `Fn(&str) -> Result<TokenBucket, FactoryError>` implement this directly.
pub trait LimiterFactory: Send + Sync {
    fn build(&self, key: &str) -> Result<TokenBucket, FactoryError>;
}

impl<F> LimiterFactory for F
where
    F: Fn(&str) -> Result<TokenBucket, FactoryError> + Send + Sync,
{
    fn build(&self, key: &str) -> Result<TokenBucket, FactoryError> {
        self(key)
    }
}

/// Errors surfaced by [`LimiterStore::get_or_create`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The factory failed; nothing was cached and the key remains absent.
    #[error("limiter construction for key {key:?} failed")]
    Factory {
        key: String,
        #[source]
        source: FactoryError,
    },
}

/// A capacity-bounded, least-recently-used cache of per-key limiters.
///
/// Holds at most `capacity` distinct keys; inserting into a full store evicts
/// the least recently touched entry. An evicted limiter is discarded for
/// good: if its key reappears, the factory builds a fresh bucket with full
/// burst.
///
/// The factory runs while the store lock is held, which is what makes
/// creation single-flight: concurrent `get_or_create` calls for the same
/// absent key invoke the factory exactly once and all observe the same
/// instance.
pub struct LimiterStore {
    entries: Mutex<SizedCache<String, Arc<TokenBucket>>>,
    factory: Box<dyn LimiterFactory>,
    capacity: usize,
}

impl fmt::Debug for LimiterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterStore")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl LimiterStore {
    pub fn new(capacity: NonZeroUsize, factory: impl LimiterFactory + 'static) -> Self {
        Self {
            entries: Mutex::new(SizedCache::with_size(capacity.get())),
            factory: Box::new(factory),
            capacity: capacity.get(),
        }
    }

    /// Return the limiter for `key`, building it on first access.
    ///
    /// A hit marks the entry most recently used. On a miss the factory runs
    /// under the store lock; an error leaves the key absent so a later call
    /// can retry.
    pub fn get_or_create(&self, key: &str) -> Result<Arc<TokenBucket>, StoreError> {
        let mut entries = self.lock_entries();
        if let Some(limiter) = entries.cache_get(key) {
            return Ok(Arc::clone(limiter));
        }
        let limiter = self
            .factory
            .build(key)
            .map_err(|source| StoreError::Factory {
                key: key.to_owned(),
                source,
            })?;
        let limiter = Arc::new(limiter);
        if entries.cache_size() == self.capacity {
            log::debug!("limiter store at capacity {}, evicting lru entry", self.capacity);
        }
        entries.cache_set(key.to_owned(), Arc::clone(&limiter));
        Ok(limiter)
    }

    /// Pure lookup: never constructs. A hit refreshes recency, matching
    /// standard LRU read-through semantics.
    pub fn get(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.lock_entries().cache_get(key).map(Arc::clone)
    }

    /// Remove `key` immediately. A subsequent `get_or_create` constructs
    /// anew.
    pub fn delete(&self, key: &str) -> bool {
        self.lock_entries().cache_remove(key).is_some()
    }

    /// Number of distinct keys currently held. Never exceeds the capacity.
    pub fn len(&self) -> usize {
        self.lock_entries().cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, SizedCache<String, Arc<TokenBucket>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
