//! Whale movement aggregation across chains
//!
//! One monitor instance owns the transfer cache, the price resolver, and the
//! bounded in-memory buffers of recent movements and alerts. Each poll fans
//! out one task per (chain, network) pair; a failing pair degrades to an empty
//! result so the remaining chains still report.

use crate::cache::RateAwareCache;
use crate::config::MonitorConfig;
use crate::errors::ConfigError;
use crate::events::{EventConsumer, EventKind, EventQueue, QueuedEvent};
use crate::logger::{self, LogTag};
use crate::normalize::{normalize, Transfer};
use crate::pricing::PriceResolver;
use crate::provider::TransferProvider;
use crate::utils::floor_to_minute_ms;
use crate::whales::{filter_whales, WhaleTransfer};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Most events returned from `recent_events`
const MAX_REPORTED_EVENTS: usize = 50;

/// USD cutoffs for event impact classification
const HIGH_IMPACT_USD: f64 = 1_000_000.0;
const MEDIUM_IMPACT_USD: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    fn classify(usd_value: f64) -> Self {
        if usd_value >= HIGH_IMPACT_USD {
            Impact::High
        } else if usd_value >= MEDIUM_IMPACT_USD {
            Impact::Medium
        } else {
            Impact::Low
        }
    }
}

/// Compact movement summary for reporting surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementEvent {
    pub id: String,
    pub chain: String,
    pub network: String,
    pub token_symbol: String,
    pub from: String,
    pub to: String,
    pub usd_value: f64,
    pub impact: Impact,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleAlert {
    pub id: String,
    pub chain: String,
    pub token_symbol: String,
    pub usd_value: f64,
    pub timestamp_ms: i64,
    pub message: String,
}

pub struct WhaleMonitor {
    config: RwLock<MonitorConfig>,
    threshold_wei: RwLock<U256>,
    provider: Arc<dyn TransferProvider>,
    transfer_cache: RateAwareCache<Vec<Transfer>>,
    prices: PriceResolver,
    movements: RwLock<VecDeque<WhaleTransfer>>,
    alerts: Arc<RwLock<VecDeque<WhaleAlert>>>,
    queue: Arc<EventQueue>,
    /// Published movement ids mapped to their transfer timestamps; pruned to
    /// the aggregation window each publish so it cannot grow without bound
    seen_ids: Mutex<HashMap<String, i64>>,
    /// Bumped on every config swap; a publish whose cycle started under an
    /// older generation is discarded instead of repopulating reset buffers
    generation: AtomicU64,
}

impl WhaleMonitor {
    pub fn new(
        config: MonitorConfig,
        provider: Arc<dyn TransferProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let threshold_wei = config.whale_threshold_wei();
        let prices = PriceResolver::new(
            Arc::clone(&provider),
            config.price_ttl(),
            config.max_cache_entries,
        );
        let queue = Arc::new(EventQueue::new(config.max_queue_size));
        let transfer_cache = RateAwareCache::new(config.max_cache_entries);
        Ok(Self {
            config: RwLock::new(config),
            threshold_wei: RwLock::new(threshold_wei),
            provider,
            transfer_cache,
            prices,
            movements: RwLock::new(VecDeque::new()),
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            queue,
            seen_ids: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    pub fn config(&self) -> MonitorConfig {
        self.config.read().clone()
    }

    /// Shared alert buffer, also written by the event consumer
    pub fn alerts_buffer(&self) -> Arc<RwLock<VecDeque<WhaleAlert>>> {
        Arc::clone(&self.alerts)
    }

    /// Fetch, normalize, and filter whale movements over the trailing
    /// `window`, across all configured chain pairs concurrently. Results are
    /// merged and sorted by USD value, largest first.
    pub async fn recent_movements(self: &Arc<Self>, window: Duration) -> Vec<WhaleTransfer> {
        let pairs = self.config.read().chain_pairs();
        let to_ms = floor_to_minute_ms(Utc::now().timestamp_millis());
        let from_ms = to_ms - window.as_millis() as i64;

        let tasks: Vec<_> = pairs
            .into_iter()
            .map(|(chain, network)| {
                let monitor = Arc::clone(self);
                tokio::spawn(async move {
                    monitor
                        .movements_for_pair(&chain, &network, from_ms, to_ms)
                        .await
                })
            })
            .collect();

        let mut merged: Vec<WhaleTransfer> = Vec::new();
        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(movements) => merged.extend(movements),
                Err(err) => {
                    logger::error(LogTag::Monitor, &format!("pair task panicked: {}", err));
                }
            }
        }
        merged.sort_by(|a, b| {
            b.usd_value
                .partial_cmp(&a.usd_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged
    }

    /// One chain pair's movements; any failure degrades to an empty list so
    /// the other pairs are unaffected
    async fn movements_for_pair(
        &self,
        chain: &str,
        network: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Vec<WhaleTransfer> {
        let (fresh_ttl, stale_ttl, min_value) = {
            let cfg = self.config.read();
            (cfg.fresh_ttl(), cfg.stale_ttl(), cfg.min_transfer_value.clone())
        };
        let key = format!("transfers:{}:{}:{}:{}", chain, network, from_ms, to_ms);

        let provider = Arc::clone(&self.provider);
        let chain_owned = chain.to_string();
        let network_owned = network.to_string();
        let fetch = move || {
            let provider = Arc::clone(&provider);
            let chain = chain_owned.clone();
            let network = network_owned.clone();
            let min_value = min_value.clone();
            async move {
                let from = ms_to_datetime(from_ms);
                let to = ms_to_datetime(to_ms);
                let raw = provider
                    .token_transfers(&chain, &network, from, to, &min_value)
                    .await?;
                let mut transfers = Vec::with_capacity(raw.len());
                for item in &raw {
                    match normalize(item, &chain, &network) {
                        Ok(t) => transfers.push(t),
                        Err(err) => {
                            logger::warning(
                                LogTag::Monitor,
                                &format!("dropping malformed transfer on {}: {}", chain, err),
                            );
                        }
                    }
                }
                Ok(transfers)
            }
        };

        let transfers = match self
            .transfer_cache
            .get(&key, fresh_ttl, stale_ttl, fetch)
            .await
        {
            Ok(outcome) => outcome.into_value(),
            Err(err) => {
                logger::warning(
                    LogTag::Monitor,
                    &format!("transfer fetch failed for {}/{}: {}", chain, network, err),
                );
                return Vec::new();
            }
        };

        let threshold = *self.threshold_wei.read();
        filter_whales(&transfers, threshold, &self.prices, chain, network).await
    }

    /// Store new movements and enqueue one event per previously unseen id.
    /// `generation` must be the value read before the cycle's fetch started;
    /// a mismatch means the config was swapped mid-cycle and the results are
    /// discarded. Returns how many events were enqueued.
    pub fn publish_movements(&self, movements: &[WhaleTransfer], generation: u64) -> usize {
        let (analysis_threshold, max_stored, window_ms) = {
            let cfg = self.config.read();
            (
                cfg.analysis_threshold_usd,
                cfg.max_stored_movements,
                cfg.window_ms,
            )
        };
        // minute of slack for the bucketed window endpoints
        let cutoff_ms = Utc::now().timestamp_millis() - window_ms as i64 - 60_000;

        let mut published = 0;
        {
            let mut seen = self.seen_ids.lock();
            let mut stored = self.movements.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                logger::debug(
                    LogTag::Monitor,
                    "discarding cycle results: configuration changed mid-cycle",
                );
                return 0;
            }
            // ids that aged out of the fetch window can never reappear
            seen.retain(|_, ts| *ts >= cutoff_ms);
            for movement in movements {
                if seen.contains_key(&movement.transfer.id) {
                    continue;
                }
                seen.insert(movement.transfer.id.clone(), movement.transfer.timestamp_ms);
                stored.push_front(movement.clone());
                match serde_json::to_value(movement) {
                    Ok(payload) => {
                        self.queue.push(QueuedEvent {
                            kind: EventKind::WhaleMovement,
                            payload,
                            timestamp_ms: movement.transfer.timestamp_ms,
                            trigger_analysis: movement.usd_value >= analysis_threshold,
                        });
                        published += 1;
                    }
                    Err(err) => {
                        logger::error(
                            LogTag::Monitor,
                            &format!("failed to serialize movement {}: {}", movement.transfer.id, err),
                        );
                    }
                }
            }
            stored.truncate(max_stored);
        }
        if published > 0 {
            logger::info(
                LogTag::Monitor,
                &format!("published {} new whale movements", published),
            );
        }
        published
    }

    /// One full poll: aggregate the configured window, then publish
    pub async fn poll_once(self: &Arc<Self>) -> usize {
        let generation = self.generation.load(Ordering::SeqCst);
        let window = self.config.read().window();
        let movements = self.recent_movements(window).await;
        self.publish_movements(&movements, generation)
    }

    /// Current config generation; taken before a cycle, handed back to
    /// `publish_movements`
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// How many movement ids the dedup set currently tracks
    pub fn tracked_ids(&self) -> usize {
        self.seen_ids.lock().len()
    }

    pub fn stored_movements(&self) -> Vec<WhaleTransfer> {
        self.movements.read().iter().cloned().collect()
    }

    /// Impact-classified summaries of the stored movements, newest first
    pub fn recent_events(&self) -> Vec<MovementEvent> {
        self.movements
            .read()
            .iter()
            .take(MAX_REPORTED_EVENTS)
            .map(|m| MovementEvent {
                id: m.transfer.id.clone(),
                chain: m.transfer.chain.clone(),
                network: m.transfer.network.clone(),
                token_symbol: m.transfer.token_symbol.clone(),
                from: m.transfer.from.clone(),
                to: m.transfer.to.clone(),
                usd_value: m.usd_value,
                impact: Impact::classify(m.usd_value),
                timestamp_ms: m.transfer.timestamp_ms,
            })
            .collect()
    }

    pub fn recent_alerts(&self) -> Vec<WhaleAlert> {
        self.alerts.read().iter().cloned().collect()
    }

    /// Swap in a new configuration and reset derived state. Movement and
    /// alert buffers are cleared because the old threshold no longer applies.
    pub fn update_config(&self, new_config: MonitorConfig) -> Result<(), ConfigError> {
        new_config.validate()?;
        let threshold = new_config.whale_threshold_wei();
        {
            // same lock order as publish_movements; the generation bump and
            // the buffer reset must be one atomic step from its point of view
            let mut seen = self.seen_ids.lock();
            let mut stored = self.movements.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *self.threshold_wei.write() = threshold;
            *self.config.write() = new_config;
            stored.clear();
            seen.clear();
        }
        self.alerts.write().clear();
        self.transfer_cache.clear();
        logger::info(LogTag::Monitor, "configuration updated, buffers reset");
        Ok(())
    }
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

// ===== EVENT CONSUMER =====

/// Default consumer wired by the runtime: raises alerts for movements over
/// the alert threshold and logs analysis-worthy ones
pub struct MovementConsumer {
    alerts: Arc<RwLock<VecDeque<WhaleAlert>>>,
    alert_threshold_usd: f64,
    max_stored_alerts: usize,
}

impl MovementConsumer {
    pub fn new(
        alerts: Arc<RwLock<VecDeque<WhaleAlert>>>,
        alert_threshold_usd: f64,
        max_stored_alerts: usize,
    ) -> Self {
        Self {
            alerts,
            alert_threshold_usd,
            max_stored_alerts,
        }
    }
}

#[async_trait]
impl EventConsumer for MovementConsumer {
    async fn handle(&self, event: &QueuedEvent) -> Result<(), anyhow::Error> {
        let movement: WhaleTransfer = serde_json::from_value(event.payload.clone())?;

        if event.trigger_analysis {
            logger::info(
                LogTag::Events,
                &format!(
                    "analysis candidate: {} {} moved ~${:.0} on {}",
                    movement.transfer.token_symbol,
                    movement.transfer.id,
                    movement.usd_value,
                    movement.transfer.chain
                ),
            );
        }

        if movement.usd_value >= self.alert_threshold_usd {
            let alert = WhaleAlert {
                id: movement.transfer.id.clone(),
                chain: movement.transfer.chain.clone(),
                token_symbol: movement.transfer.token_symbol.clone(),
                usd_value: movement.usd_value,
                timestamp_ms: movement.transfer.timestamp_ms,
                message: format!(
                    "whale moved ~${:.0} of {} on {}",
                    movement.usd_value, movement.transfer.token_symbol, movement.transfer.chain
                ),
            };
            logger::warning(LogTag::Events, &alert.message);
            let mut alerts = self.alerts.write();
            alerts.push_front(alert);
            alerts.truncate(self.max_stored_alerts);
        }
        Ok(())
    }
}
