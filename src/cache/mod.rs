//! Shared key/value cache handed to plugins.
//!
//! A single `DashMap` backs the root store and every child; children prefix
//! keys with their namespace so plugins cannot observe each other's entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

/// Cache statistics, shared by a root store and all of its children.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    entries: Arc<DashMap<String, CacheEntry>>,
    counters: Arc<Counters>,
    namespace: Option<String>,
    default_ttl: Option<Duration>,
    disposed: Arc<AtomicBool>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            namespace: None,
            default_ttl: None,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// TTL applied by [`set`](Self::set) when none is given.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn child(&self, namespace: &str) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            counters: Arc::clone(&self.counters),
            namespace: Some(self.qualify(namespace)),
            default_ttl: self.default_ttl,
            disposed: Arc::clone(&self.disposed),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn qualify(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    fn prefix(&self) -> Option<String> {
        self.namespace.as_ref().map(|ns| format!("{}:", ns))
    }

    fn in_scope(&self, key: &str) -> bool {
        match self.prefix() {
            Some(prefix) => key.starts_with(&prefix),
            None => true,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let key = self.qualify(key);
        let now = Instant::now();

        let found = match self.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match found {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                if self
                    .entries
                    .remove_if(&key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value`; ignored once the store has been disposed.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        if self.is_disposed() {
            return;
        }
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(self.qualify(key), CacheEntry { value, expires_at });
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(&self.qualify(key))
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(&self.qualify(key)).is_some()
    }

    /// Live keys in this namespace, without the namespace prefix.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let prefix = self.prefix();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .filter_map(|entry| match &prefix {
                Some(p) => entry.key().strip_prefix(p.as_str()).map(str::to_string),
                None => Some(entry.key().clone()),
            })
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry in this namespace.
    pub fn clear(&self) {
        match self.prefix() {
            Some(prefix) => self.entries.retain(|key, _| !key.starts_with(&prefix)),
            None => self.entries.clear(),
        }
    }

    /// Drops expired entries in this namespace, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|key, entry| !(self.in_scope(key) && entry.is_expired(now)));
        let purged = before.saturating_sub(self.entries.len());
        self.counters
            .evictions
            .fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Clears the whole backing store and rejects further writes.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.entries.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
