//! Fingerprint cache using moka
//!
//! Maps a [`Fingerprint`] to the [`VerificationResult`] computed for it.
//!
//! - Fixed capacity with least-recently-used eviction
//! - Every entry carries its own TTL and expires regardless of access
//! - An expired entry is never returned; moka drops it on its next
//!   maintenance pass
//! - Inserts publish a fully built entry atomically; readers never see a
//!   partially written verdict
//! - Concurrent puts for the same fingerprint: last writer wins

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use snipverify_core::{Fingerprint, VerificationResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default capacity (10,000 verdicts)
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Default TTL (10 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// A cached verdict
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored result
    pub result: Arc<VerificationResult>,
    /// When the entry was published
    pub inserted_at: DateTime<Utc>,
    /// How long the entry stays visible after `inserted_at`
    pub ttl: Duration,
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Approximate number of live entries
    pub entry_count: u64,
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing (or only an expired entry)
    pub misses: u64,
    /// Entries published
    pub inserts: u64,
}

/// Per-entry TTL policy: each entry expires `ttl` after it was (re)written
struct EntryTtl;

impl Expiry<Fingerprint, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

/// Verdict cache keyed by fingerprint
///
/// Cheap to clone; clones share the same storage.
#[derive(Clone)]
pub struct FingerprintCache {
    inner: Cache<Fingerprint, CacheEntry>,
    default_ttl: Duration,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("entry_count", &self.inner.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl FingerprintCache {
    /// Create cache with max capacity and a default TTL
    #[must_use]
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .eviction_policy(EvictionPolicy::lru())
                .expire_after(EntryTtl)
                .build(),
            default_ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Look up a live verdict
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<VerificationResult> {
        self.get_entry(fingerprint)
            .await
            .map(|entry| VerificationResult::clone(&entry.result))
    }

    /// Look up a live entry with its metadata
    pub async fn get_entry(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.inner.get(fingerprint).await {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(fingerprint = %fingerprint.short(), "cache hit");
                Some(entry)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(fingerprint = %fingerprint.short(), "cache miss");
                None
            }
        }
    }

    /// Publish a verdict that stays visible for `ttl`
    pub async fn put(&self, fingerprint: Fingerprint, result: VerificationResult, ttl: Duration) {
        let entry = CacheEntry {
            result: Arc::new(result),
            inserted_at: Utc::now(),
            ttl,
        };
        self.inner.insert(fingerprint, entry).await;
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish a verdict with the default TTL
    pub async fn put_default(&self, fingerprint: Fingerprint, result: VerificationResult) {
        self.put(fingerprint, result, self.default_ttl).await;
    }

    /// Invalidate one entry
    #[inline]
    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.inner.invalidate(fingerprint).await;
    }

    /// Invalidate all entries (e.g. after a runtime image upgrade)
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Apply pending evictions and expirations now
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// TTL used by [`put_default`](Self::put_default)
    #[inline]
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
        }
    }
}

impl Default for FingerprintCache {
    /// Create cache with default capacity (10,000 entries) and TTL (10 minutes)
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
