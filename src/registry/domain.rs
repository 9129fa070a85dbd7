//! registry::domain
//!
//! Domain-style aliases for site addresses.
//!
//! # Design
//!
//! The registry asks a [`DomainResolver`] whether a query string is a
//! domain and, if so, which address it resolves to. Resolution may be
//! expensive in extended implementations (network lookups), so both answers
//! are memoized per query string for a short time in a [`TtlCache`].
//!
//! The default resolver, [`NoDomains`], treats nothing as a domain.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sitekeeper::registry::domain::{CachedResolver, NoDomains};
//!
//! let resolver = CachedResolver::new(Arc::new(NoDomains), Duration::from_secs(10));
//! assert_eq!(resolver.lookup("1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D"), "1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Hooks for resolving domain names to site addresses.
pub trait DomainResolver: Send + Sync {
    /// Whether `query` looks like a domain this resolver handles.
    fn is_domain(&self, query: &str) -> bool;

    /// Address for `domain`, or `None` if it does not resolve.
    fn resolve_domain(&self, domain: &str) -> Option<String>;
}

/// Resolver that knows no domains.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDomains;

impl DomainResolver for NoDomains {
    fn is_domain(&self, _query: &str) -> bool {
        false
    }

    fn resolve_domain(&self, _domain: &str) -> Option<String> {
        None
    }
}

/// A memoized value and when it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Small keyed cache whose entries expire after a fixed time.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value for `key`, computing and storing it on a miss.
    ///
    /// `compute` runs without the cache locked.
    pub fn get_or_insert_with(&self, key: &str, compute: impl FnOnce() -> V) -> V {
        self.get_or_insert_with_at(key, Instant::now(), compute)
    }

    fn get_or_insert_with_at(&self, key: &str, now: Instant, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get_at(key, now) {
            return value;
        }
        let value = compute();
        let mut entries = self.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: now + self.ttl,
            },
        );
        value
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        self.lock()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`DomainResolver`] with both hooks memoized.
pub struct CachedResolver {
    inner: Arc<dyn DomainResolver>,
    is_domain: TtlCache<bool>,
    resolved: TtlCache<Option<String>>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn DomainResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            is_domain: TtlCache::new(ttl),
            resolved: TtlCache::new(ttl),
        }
    }

    pub fn is_domain(&self, query: &str) -> bool {
        self.is_domain
            .get_or_insert_with(query, || self.inner.is_domain(query))
    }

    pub fn resolve_domain(&self, domain: &str) -> Option<String> {
        self.resolved
            .get_or_insert_with(domain, || self.inner.resolve_domain(domain))
    }

    /// Address to look up for `query`: the resolved address when `query`
    /// is a domain that resolves, otherwise `query` unchanged.
    pub fn lookup(&self, query: &str) -> String {
        if self.is_domain(query) {
            if let Some(address) = self.resolve_domain(query) {
                return address;
            }
        }
        query.to_string()
    }
}

impl std::fmt::Debug for CachedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResolver")
            .field("is_domain", &self.is_domain)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}
