//! In-process result cache with absolute TTL.
//!
//! Keys are SHA-256 hex digests of the normalized request parts. Entries expire
//! `ttl` after insertion (no sliding refresh); every insert sweeps expired
//! entries so the map stays bounded by live keys. Lookups and writes take a std
//! mutex that is never held across an `.await`; two identical concurrent misses
//! may both compute, the later write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a basic search: `(term.lower().trim(), niche or "any", budget or "any")`.
    pub fn for_search(search_term: &str, niche: Option<&str>, budget_range: Option<&str>) -> Self {
        let norm = |v: Option<&str>| {
            v.map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "any".to_string())
        };
        Self::from_parts(&[
            &search_term.trim().to_lowercase(),
            &norm(niche),
            &norm(budget_range),
        ])
    }

    /// Digest of already-normalized parts joined with `|`.
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(parts.join("|").as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_secs: u64,
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    /// User the value was personalized for, if any.
    owner: Option<String>,
}

pub struct ResultCache<V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry<V>>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Fresh value for `key`; expired entries are evicted on the way.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut map = self.lock();
        let fresh = match map.get(key) {
            Some(e) if e.inserted.elapsed() < self.ttl => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        };
        drop(map);

        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("research_cache_hits_total", "cache" => self.name).increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("research_cache_misses_total", "cache" => self.name).increment(1);
        }
        fresh
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        self.insert_owned(key, None, value);
    }

    fn insert_owned(&self, key: CacheKey, owner: Option<&str>, value: V) {
        let ttl = self.ttl;
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.inserted.elapsed() < ttl);
        let swept = before - map.len();
        map.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                owner: owner.map(str::to_string),
            },
        );
        drop(map);
        if swept > 0 {
            debug!(target: "cache", cache = self.name, swept, "expired entries evicted");
        }
    }

    /// Return the cached value, or run `compute` and store its `Ok` result.
    /// Errors are passed through and never cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<(V, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.get_or_compute_owned(key, None, compute).await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), recording `owner` on the
    /// stored entry so [`invalidate_owner`](Self::invalidate_owner) can drop it.
    pub async fn get_or_compute_owned<F, Fut, E>(
        &self,
        key: CacheKey,
        owner: Option<&str>,
        compute: F,
    ) -> Result<(V, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(&key) {
            debug!(target: "cache", cache = self.name, key = key.short(), "hit");
            return Ok((v, CacheStatus::Hit));
        }
        debug!(target: "cache", cache = self.name, key = key.short(), "miss");
        let value = compute().await?;
        self.insert_owned(key, owner, value.clone());
        Ok((value, CacheStatus::Miss))
    }

    /// Drop every entry stored for `owner`. Returns how many were removed.
    pub fn invalidate_owner(&self, owner: &str) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.owner.as_deref() != Some(owner));
        before - map.len()
    }

    /// Returns whether an entry was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Returns how many entries were removed.
    pub fn invalidate_all(&self) -> usize {
        let mut map = self.lock();
        let n = map.len();
        map.clear();
        n
    }

    pub fn stats(&self) -> CacheStats {
        let entries = {
            let map = self.lock();
            map.values()
                .filter(|e| e.inserted.elapsed() < self.ttl)
                .count()
        };
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
