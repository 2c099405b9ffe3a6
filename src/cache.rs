//! Rate-aware cache with stale-while-revalidate and provider backoff
//!
//! Every remote call in the pipeline is routed through this cache. A lookup
//! resolves in one of four ways, in order:
//!
//! 1. Fresh entry - returned immediately, no fetch.
//! 2. Rate-limit cooldown active and *any* entry exists (even one past its
//!    stale window) - the cached value is returned rather than burning a call.
//! 3. Entry within its stale window - returned immediately while exactly one
//!    deduplicated background refresh runs for that key.
//! 4. Nothing usable - synchronous fetch. A 429-classified failure doubles the
//!    process-wide backoff (2 min seed, 4 h ceiling), starts the cooldown, and
//!    falls back to whatever cached value exists; other failures propagate
//!    unchanged.
//!
//! The outcome enum makes the freshness class explicit so callers branch on it
//! instead of on exception side channels.

use crate::errors::{CacheError, ProviderError};
use crate::logger::{self, LogTag};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// First backoff applied on a rate-limit hit is twice this seed
pub const BACKOFF_SEED: Duration = Duration::from_secs(120);

/// Backoff never grows past this ceiling
pub const BACKOFF_CEILING: Duration = Duration::from_secs(4 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fresh_until: Instant,
    stale_until: Instant,
    created_at: Instant,
    #[allow(dead_code)]
    last_fetch_duration: Duration,
}

/// How a cached value was resolved; `value()` gives uniform access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome<V> {
    /// Entry within its fresh window, or just fetched synchronously
    Fresh(V),
    /// Entry within its stale window; a background refresh was triggered
    Stale(V),
    /// Returned because a rate-limit cooldown suppressed the fetch
    CooldownStale(V),
}

impl<V> CacheOutcome<V> {
    pub fn value(&self) -> &V {
        match self {
            CacheOutcome::Fresh(v) | CacheOutcome::Stale(v) | CacheOutcome::CooldownStale(v) => v,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            CacheOutcome::Fresh(v) | CacheOutcome::Stale(v) | CacheOutcome::CooldownStale(v) => v,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheOutcome::Fresh(_))
    }
}

/// Process-wide rate-limit state shared by all keys of a cache
///
/// Backoff only ever grows (doubling per consecutive rate-limit failure, up to
/// the ceiling); it is never reset, matching the upstream contract that a
/// provider which throttled once deserves lasting caution.
#[derive(Debug, Clone, Copy, Default)]
struct RateLimitState {
    backoff: Option<Duration>,
    cooldown_until: Option<Instant>,
}

impl RateLimitState {
    fn register_rate_limit(&mut self, now: Instant) -> Duration {
        let next = self
            .backoff
            .unwrap_or(BACKOFF_SEED)
            .saturating_mul(2)
            .min(BACKOFF_CEILING);
        self.backoff = Some(next);
        self.cooldown_until = Some(now + next);
        next
    }

    fn cooldown_active(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }
}

/// Cache counters for monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub rate_limit_fallbacks: u64,
    pub background_refreshes: u64,
    pub evictions: u64,
    pub errors: u64,
}

struct CacheShared<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    in_flight: Mutex<HashSet<String>>,
    rate_limit: Mutex<RateLimitState>,
    stats: Mutex<CacheStats>,
    max_entries: usize,
}

impl<V: Clone> CacheShared<V> {
    /// Replace the entry for `key` atomically; TTLs run from completion time.
    /// `preserve_created_at` keeps the original creation time on refresh so
    /// size-ceiling eviction stays ordered by first appearance.
    fn store(
        &self,
        key: &str,
        value: V,
        fresh_ttl: Duration,
        stale_ttl: Duration,
        fetch_duration: Duration,
        preserve_created_at: Option<Instant>,
    ) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            fresh_until: now + fresh_ttl,
            // stale window must contain the fresh window
            stale_until: now + stale_ttl.max(fresh_ttl),
            created_at: preserve_created_at.unwrap_or(now),
            last_fetch_duration: fetch_duration,
        };
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), entry);

        if entries.len() > self.max_entries {
            // Evict the oldest 20% by creation time
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.created_at))
                .collect();
            by_age.sort_by_key(|(_, created)| *created);
            let to_remove = (by_age.len() + 4) / 5;
            for (old_key, _) in by_age.into_iter().take(to_remove) {
                entries.remove(&old_key);
                self.stats.lock().evictions += 1;
            }
            logger::debug(
                LogTag::Cache,
                &format!("evicted {} oldest entries (ceiling {})", to_remove, self.max_entries),
            );
        }
    }
}

pub struct RateAwareCache<V> {
    shared: Arc<CacheShared<V>>,
}

impl<V> Clone for RateAwareCache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> RateAwareCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                rate_limit: Mutex::new(RateLimitState::default()),
                stats: Mutex::new(CacheStats::default()),
                max_entries,
            }),
        }
    }

    /// Look up `key`, fetching through `fetch` only when no cached value can
    /// answer. See the module docs for the resolution order.
    pub async fn get<F, Fut>(
        &self,
        key: &str,
        fresh_ttl: Duration,
        stale_ttl: Duration,
        fetch: F,
    ) -> Result<CacheOutcome<V>, CacheError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ProviderError>> + Send + 'static,
    {
        let now = Instant::now();
        let snapshot = self.shared.entries.read().get(key).cloned();

        if let Some(entry) = &snapshot {
            if now < entry.fresh_until {
                self.shared.stats.lock().hits += 1;
                logger::debug(LogTag::Cache, &format!("fresh hit for {}", key));
                return Ok(CacheOutcome::Fresh(entry.value.clone()));
            }

            // Cooldown: any cached value, however old, beats a blocked call
            if self.shared.rate_limit.lock().cooldown_active(now) {
                self.shared.stats.lock().rate_limit_fallbacks += 1;
                logger::debug(
                    LogTag::Cache,
                    &format!("serving {} from cache during rate-limit cooldown", key),
                );
                return Ok(CacheOutcome::CooldownStale(entry.value.clone()));
            }

            if now < entry.stale_until {
                self.shared.stats.lock().stale_hits += 1;
                logger::debug(LogTag::Cache, &format!("stale hit for {}, refreshing in background", key));
                self.spawn_refresh(key, fresh_ttl, stale_ttl, fetch);
                return Ok(CacheOutcome::Stale(entry.value.clone()));
            }
        }

        // No usable cached value: fetch synchronously
        self.shared.stats.lock().misses += 1;
        let started = Instant::now();
        match fetch().await {
            Ok(value) => {
                self.shared
                    .store(key, value.clone(), fresh_ttl, stale_ttl, started.elapsed(), None);
                Ok(CacheOutcome::Fresh(value))
            }
            Err(err) if err.is_rate_limit() => {
                self.shared.stats.lock().errors += 1;
                let retry_after = self
                    .shared
                    .rate_limit
                    .lock()
                    .register_rate_limit(Instant::now());
                logger::warning(
                    LogTag::Cache,
                    &format!(
                        "rate limit hit for {}; cooling down for {}s",
                        key,
                        retry_after.as_secs()
                    ),
                );
                match snapshot {
                    Some(entry) => {
                        self.shared.stats.lock().rate_limit_fallbacks += 1;
                        Ok(CacheOutcome::CooldownStale(entry.value))
                    }
                    None => Err(CacheError::RateLimited { retry_after }),
                }
            }
            Err(err) => {
                self.shared.stats.lock().errors += 1;
                Err(CacheError::Fetch(err))
            }
        }
    }

    /// Start a background refresh for `key` unless one is already in flight
    fn spawn_refresh<F, Fut>(&self, key: &str, fresh_ttl: Duration, stale_ttl: Duration, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ProviderError>> + Send + 'static,
    {
        {
            let mut in_flight = self.shared.in_flight.lock();
            if !in_flight.insert(key.to_string()) {
                logger::debug(LogTag::Cache, &format!("refresh already in flight for {}", key));
                return;
            }
        }

        let shared = Arc::clone(&self.shared);
        let key = key.to_string();
        tokio::spawn(async move {
            let started = Instant::now();
            match fetch().await {
                Ok(value) => {
                    let original_created = shared.entries.read().get(&key).map(|e| e.created_at);
                    shared.store(&key, value, fresh_ttl, stale_ttl, started.elapsed(), original_created);
                    shared.stats.lock().background_refreshes += 1;
                    logger::debug(LogTag::Cache, &format!("background refresh completed for {}", key));
                }
                Err(err) => {
                    // Never surfaces to the caller that already got stale data
                    shared.stats.lock().errors += 1;
                    logger::warning(
                        LogTag::Cache,
                        &format!("background refresh failed for {}: {}", key, err),
                    );
                    if err.is_rate_limit() {
                        shared
                            .rate_limit
                            .lock()
                            .register_rate_limit(Instant::now());
                    }
                }
            }
            shared.in_flight.lock().remove(&key);
        });
    }

    pub fn stats(&self) -> CacheStats {
        *self.shared.stats.lock()
    }

    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shared.entries.read().contains_key(key)
    }

    /// Current global backoff, if any rate limit has been registered
    pub fn rate_limit_backoff(&self) -> Option<Duration> {
        self.shared.rate_limit.lock().backoff
    }

    pub fn cooldown_active(&self) -> bool {
        self.shared.rate_limit.lock().cooldown_active(Instant::now())
    }

    pub fn clear(&self) {
        self.shared.entries.write().clear();
    }
}
