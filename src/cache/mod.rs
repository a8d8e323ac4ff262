//! Generation result cache.
//!
//! A bounded, time-expiring key/value store for finished generations. Expiry
//! is lazy: [`GenerationCache::get`] drops entries whose TTL has elapsed, and
//! the optional [`sweeper`] purges the rest on a timer.
//!
//! Eviction follows insertion order, not recency of use: when the cache is
//! full, the entry inserted earliest goes first.

pub mod fingerprint;
pub mod sweeper;

pub use fingerprint::{normalize_prompt, RequestFingerprint};
pub use sweeper::{spawn_sweeper, Sweepable};

use crate::clock::{system_clock, SharedClock};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached value with its lifetime bounds.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded TTL cache with insertion-order eviction.
///
/// Not internally synchronized. Wrap it in a mutex when it is shared and
/// never hold that lock across an `.await`.
pub struct GenerationCache<K, T> {
    entries: HashMap<K, CacheEntry<T>>,
    order: VecDeque<K>,
    max_size: usize,
    ttl: Duration,
    clock: SharedClock,
}

impl<K, T> GenerationCache<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_clock(max_size, ttl, system_clock())
    }

    pub fn with_clock(max_size: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
            ttl,
            clock,
        }
    }

    /// Look up a live entry, removing it if it has expired.
    pub fn get(&mut self, key: &K) -> Option<T> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.remove(key);
        }
        None
    }

    /// Insert a value with a fresh TTL.
    ///
    /// A new key inserted at capacity evicts exactly one entry, the
    /// earliest inserted. Re-inserting an existing key replaces it and moves
    /// it to the back of the eviction order.
    pub fn put(&mut self, key: K, value: T) {
        if self.entries.contains_key(&key) {
            self.remove(&key);
        } else if self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        let created_at = self.clock.now();
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at,
                expires_at: created_at + self.ttl,
            },
        );
        self.order.push_back(key);
    }

    /// Remove an entry regardless of expiry.
    pub fn remove(&mut self, key: &K) -> Option<T> {
        let entry = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(entry.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        before - self.entries.len()
    }

    /// Keys in eviction order (earliest inserted first), expired ones included.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K, T> Sweepable for Mutex<GenerationCache<K, T>>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    fn name(&self) -> &'static str {
        "generation_cache"
    }

    fn sweep(&self) -> usize {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .purge_expired()
    }
}
