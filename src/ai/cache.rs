//! Response Cache
//!
//! In-memory LRU cache of generation results keyed by request fingerprint.
//!
//! ## Bounds
//!
//! - **Entries**: at most `max_entries` results
//! - **Bytes**: serialized size of all results stays within `max_bytes`
//! - **TTL**: entries are invisible once `inserted_at + ttl` has passed
//!
//! Expired entries are dropped lazily on lookup, before any LRU eviction,
//! and periodically by a background sweep when a Tokio runtime is present.
//! All bookkeeping sits behind one mutex, so statistics are always a
//! consistent snapshot.

use lru::LruCache;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::request::{Fingerprint, GenerationRequest, GenerationResult};
use crate::config::CacheSettings;
use crate::constants::cache as cache_constants;
use crate::types::{DoxError, Result};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live applied to new entries
    pub ttl: Duration,
    /// Maximum number of entries (at least 1)
    pub max_entries: usize,
    /// Maximum total entry size in bytes, 0 for unbounded
    pub max_bytes: usize,
    /// Background sweep interval, `None` for lazy expiry only
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(cache_constants::DEFAULT_TTL_SECS),
            max_entries: cache_constants::DEFAULT_MAX_ENTRIES,
            max_bytes: cache_constants::DEFAULT_MAX_BYTES,
            sweep_interval: Some(Duration::from_secs(cache_constants::SWEEP_INTERVAL_SECS)),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_secs),
            max_entries: settings.max_entries,
            max_bytes: settings.max_bytes,
            sweep_interval: (settings.sweep_interval_secs > 0)
                .then(|| Duration::from_secs(settings.sweep_interval_secs)),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Entries dropped to respect the entry or byte ceiling
    pub evictions: u64,
    /// Entries dropped because their TTL passed
    pub expirations: u64,
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl CacheStatistics {
    /// Hit rate as a percentage of all lookups
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        }
    }
}

struct CacheEntry {
    result: GenerationResult,
    inserted_at: Instant,
    ttl: Duration,
    size: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.inserted_at + self.ttl
    }
}

struct CacheState {
    entries: LruCache<Fingerprint, CacheEntry>,
    bytes: usize,
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
    expirations: u64,
}

impl CacheState {
    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.pop(fingerprint)?;
        self.bytes -= entry.size;
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();

        for fingerprint in &expired {
            self.remove(fingerprint);
        }
        self.expirations += expired.len() as u64;
        expired.len()
    }

    fn overflows(&self, incoming: usize, config: &CacheConfig) -> bool {
        self.entries.len() >= config.max_entries
            || (config.max_bytes > 0 && self.bytes + incoming > config.max_bytes)
    }
}

/// Bounded, expiring response cache
pub struct ResponseCache {
    config: CacheConfig,
    state: Arc<Mutex<CacheState>>,
    sweeper: Option<CancellationToken>,
}

impl ResponseCache {
    /// Create a cache. The background sweep only starts when called from
    /// within a Tokio runtime.
    pub fn new(mut config: CacheConfig) -> Self {
        config.max_entries = config.max_entries.max(1);

        let state = Arc::new(Mutex::new(CacheState {
            entries: LruCache::unbounded(),
            bytes: 0,
            hits: 0,
            misses: 0,
            sets: 0,
            evictions: 0,
            expirations: 0,
        }));

        let sweeper = match config.sweep_interval {
            Some(interval)
                if !interval.is_zero() && tokio::runtime::Handle::try_current().is_ok() =>
            {
                let token = CancellationToken::new();
                spawn_sweeper(Arc::downgrade(&state), interval, token.clone());
                Some(token)
            }
            _ => None,
        };

        Self {
            config,
            state,
            sweeper,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a request, promoting it to most recently used on a hit
    pub fn get(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        let fingerprint = request.fingerprint();
        let now = Instant::now();
        let mut state = self.lock();

        let expired = match state.entries.peek(&fingerprint) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.remove(&fingerprint);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        let result = state
            .entries
            .get(&fingerprint)
            .map(|entry| entry.result.clone());
        state.hits += 1;
        result
    }

    /// Store a result under the configured TTL
    pub fn set(&self, request: &GenerationRequest, result: GenerationResult) -> Result<()> {
        self.set_with_ttl(request, result, self.config.ttl)
    }

    /// Store a result, evicting least recently used entries as needed.
    ///
    /// A result larger than the whole byte budget is rejected with
    /// [`DoxError::Cache`] and leaves the cache untouched.
    pub fn set_with_ttl(
        &self,
        request: &GenerationRequest,
        result: GenerationResult,
        ttl: Duration,
    ) -> Result<()> {
        let fingerprint = request.fingerprint();
        let size = fingerprint.as_str().len() + serde_json::to_vec(&result)?.len();

        if self.config.max_bytes > 0 && size > self.config.max_bytes {
            return Err(DoxError::Cache(format!(
                "entry of {} bytes exceeds cache budget of {} bytes",
                size, self.config.max_bytes
            )));
        }

        let now = Instant::now();
        let mut state = self.lock();
        state.remove(&fingerprint);

        if state.overflows(size, &self.config) {
            state.purge_expired(now);
        }
        while state.overflows(size, &self.config) {
            let Some((_, evicted)) = state.entries.pop_lru() else {
                break;
            };
            state.bytes -= evicted.size;
            state.evictions += 1;
        }

        state.entries.push(
            fingerprint,
            CacheEntry {
                result,
                inserted_at: now,
                ttl,
                size,
            },
        );
        state.bytes += size;
        state.sets += 1;
        Ok(())
    }

    /// Drop one request's entry, returning whether it existed
    pub fn remove(&self, request: &GenerationRequest) -> bool {
        self.lock().remove(&request.fingerprint()).is_some()
    }

    /// Drop all entries, keeping the counters
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.bytes = 0;
    }

    /// Drop every expired entry now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatistics {
        let state = self.lock();
        CacheStatistics {
            hits: state.hits,
            misses: state.misses,
            sets: state.sets,
            evictions: state.evictions,
            expirations: state.expirations,
            entries: state.entries.len(),
            bytes: state.bytes,
            max_entries: self.config.max_entries,
            max_bytes: self.config.max_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        if let Some(token) = &self.sweeper {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_sweeper(state: Weak<Mutex<CacheState>>, interval: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(state) = state.upgrade() else { break };
                    let removed = state
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .purge_expired(Instant::now());
                    if removed > 0 {
                        debug!(removed, "Swept expired cache entries");
                    }
                }
            }
        }
    });
}
