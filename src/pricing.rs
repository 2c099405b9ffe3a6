//! USD price resolution for token contracts and native coins
//!
//! Quotes are cached per (chain, network, contract address), so a shifting
//! token population only costs upstream calls for the addresses not seen
//! within the TTL. Addresses the provider declines to quote are cached at 0.0
//! rather than re-requested every poll, and a failed batch falls back to
//! expired quotes where they exist. Native coins have no contract of their
//! own; the resolver substitutes the chain's canonical wrapped-native
//! contract and maps its quote back to the native symbol.

use crate::chains::{looks_like_contract_address, native_symbol, wrapped_native_contract};
use crate::logger::{self, LogTag};
use crate::provider::TransferProvider;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct CachedQuote {
    price: f64,
    cached_at: Instant,
}

pub struct PriceResolver {
    provider: Arc<dyn TransferProvider>,
    quotes: RwLock<HashMap<String, CachedQuote>>,
    ttl: Duration,
    max_entries: usize,
}

impl PriceResolver {
    pub fn new(provider: Arc<dyn TransferProvider>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            provider,
            quotes: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    fn quote_key(chain: &str, network: &str, address: &str) -> String {
        format!("{}:{}:{}", chain, network, address)
    }

    /// Resolve USD prices for a mixed list of identifiers: contract addresses
    /// and/or the chain's native symbol. Every requested identifier appears in
    /// the result; anything unresolvable maps to 0.0 so callers can filter on
    /// price without special-casing failures.
    pub async fn prices_for(
        &self,
        chain: &str,
        network: &str,
        identifiers: &[String],
    ) -> HashMap<String, f64> {
        let native = native_symbol(chain);
        let wrapped = wrapped_native_contract(chain);

        let mut contracts: BTreeSet<String> = BTreeSet::new();
        let mut native_requested = false;
        for ident in identifiers {
            if looks_like_contract_address(ident) {
                contracts.insert(ident.to_lowercase());
            } else if ident.eq_ignore_ascii_case(native) {
                native_requested = true;
                if let Some(addr) = wrapped {
                    contracts.insert(addr.to_string());
                }
            }
            // anything else stays unpriced
        }

        let quotes = self.resolve_contracts(chain, network, &contracts).await;

        let mut result = HashMap::with_capacity(identifiers.len());
        for ident in identifiers {
            let price = if looks_like_contract_address(ident) {
                quotes.get(&ident.to_lowercase()).copied().unwrap_or(0.0)
            } else if native_requested && ident.eq_ignore_ascii_case(native) {
                wrapped
                    .and_then(|addr| quotes.get(addr).copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            result.insert(ident.clone(), price);
        }
        result
    }

    /// Serve each contract from its own cached quote, batch-fetching only the
    /// addresses with no quote inside the TTL
    async fn resolve_contracts(
        &self,
        chain: &str,
        network: &str,
        contracts: &BTreeSet<String>,
    ) -> HashMap<String, f64> {
        let now = Instant::now();
        let mut resolved: HashMap<String, f64> = HashMap::with_capacity(contracts.len());
        let mut missing: Vec<String> = Vec::new();
        {
            let cache = self.quotes.read();
            for address in contracts {
                match cache.get(&Self::quote_key(chain, network, address)) {
                    Some(quote) if now.duration_since(quote.cached_at) < self.ttl => {
                        resolved.insert(address.clone(), quote.price);
                    }
                    _ => missing.push(address.clone()),
                }
            }
        }
        if missing.is_empty() {
            return resolved;
        }

        match self.provider.token_prices(chain, network, &missing).await {
            Ok(raw) => {
                let mut fetched: HashMap<String, f64> = HashMap::with_capacity(raw.len());
                for entry in raw {
                    let address = entry
                        .contract
                        .as_ref()
                        .and_then(|c| c.address.as_ref())
                        .map(|a| a.to_lowercase());
                    if let (Some(address), Some(price)) = (address, entry.price_f64()) {
                        if price.is_finite() && price > 0.0 {
                            fetched.insert(address, price);
                        }
                    }
                }

                let mut cache = self.quotes.write();
                let cached_at = Instant::now();
                for address in &missing {
                    // unquoted addresses cache at 0.0 so the next poll does
                    // not re-request them
                    let price = fetched.get(address).copied().unwrap_or(0.0);
                    cache.insert(
                        Self::quote_key(chain, network, address),
                        CachedQuote { price, cached_at },
                    );
                    resolved.insert(address.clone(), price);
                }
                Self::evict_if_needed(&mut cache, self.max_entries);
            }
            Err(err) => {
                logger::warning(
                    LogTag::Prices,
                    &format!("price lookup failed for {}/{}: {}", chain, network, err),
                );
                // a quote past its TTL still beats no quote at all
                let cache = self.quotes.read();
                for address in &missing {
                    let price = cache
                        .get(&Self::quote_key(chain, network, address))
                        .map(|q| q.price)
                        .unwrap_or(0.0);
                    resolved.insert(address.clone(), price);
                }
            }
        }
        resolved
    }

    /// Drop the oldest 20% of quotes once the ceiling is exceeded
    fn evict_if_needed(cache: &mut HashMap<String, CachedQuote>, max_entries: usize) {
        if cache.len() <= max_entries {
            return;
        }
        let mut by_age: Vec<(String, Instant)> = cache
            .iter()
            .map(|(k, q)| (k.clone(), q.cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);
        let to_remove = (by_age.len() + 4) / 5;
        for (key, _) in by_age.into_iter().take(to_remove) {
            cache.remove(&key);
        }
    }

    pub fn cached_quote_count(&self) -> usize {
        self.quotes.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::types::{PriceContract, RawTokenPrice, RawTransfer};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticPrices {
        prices: HashMap<String, f64>,
        requests: Mutex<Vec<Vec<String>>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl TransferProvider for StaticPrices {
        async fn token_transfers(
            &self,
            _chain: &str,
            _network: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _min_value: &str,
        ) -> Result<Vec<RawTransfer>, ProviderError> {
            Ok(Vec::new())
        }

        async fn token_prices(
            &self,
            _chain: &str,
            _network: &str,
            contracts: &[String],
        ) -> Result<Vec<RawTokenPrice>, ProviderError> {
            self.requests.lock().push(contracts.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Transient {
                    endpoint: "/prices".to_string(),
                    message: "unavailable".to_string(),
                });
            }
            Ok(contracts
                .iter()
                .filter_map(|addr| {
                    self.prices.get(addr).map(|p| RawTokenPrice {
                        contract: Some(PriceContract {
                            address: Some(addr.clone()),
                        }),
                        price: Some(serde_json::json!(p)),
                    })
                })
                .collect())
        }
    }

    fn resolver_with(prices: &[(&str, f64)], fail: bool) -> (PriceResolver, Arc<StaticPrices>) {
        let provider = Arc::new(StaticPrices {
            prices: prices
                .iter()
                .map(|(a, p)| (a.to_string(), *p))
                .collect(),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(fail),
        });
        let resolver = PriceResolver::new(provider.clone(), Duration::from_secs(3600), 100);
        (resolver, provider)
    }

    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    #[tokio::test]
    async fn test_native_symbol_priced_via_wrapped_contract() {
        let (resolver, _) = resolver_with(&[(WETH, 4000.0)], false);
        let prices = resolver
            .prices_for("ethereum", "mainnet", &["ETH".to_string()])
            .await;
        assert_eq!(prices.get("ETH"), Some(&4000.0));
    }

    #[tokio::test]
    async fn test_contract_addresses_matched_case_insensitively() {
        let (resolver, _) = resolver_with(&[(WETH, 4000.0)], false);
        let mixed_case = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string();
        let prices = resolver
            .prices_for("ethereum", "mainnet", &[mixed_case.clone()])
            .await;
        assert_eq!(prices.get(&mixed_case), Some(&4000.0));
    }

    #[tokio::test]
    async fn test_unknown_identifiers_price_at_zero() {
        let (resolver, provider) = resolver_with(&[], false);
        let idents = vec!["BANANA".to_string(), "0xdead".to_string()];
        let prices = resolver.prices_for("ethereum", "mainnet", &idents).await;
        assert_eq!(prices.get("BANANA"), Some(&0.0));
        assert_eq!(prices.get("0xdead"), Some(&0.0));
        // nothing resolvable, so no provider round-trip at all
        assert!(provider.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_lookup_served_from_cache() {
        let (resolver, provider) = resolver_with(&[(WETH, 4000.0)], false);
        let idents = vec![WETH.to_string()];
        resolver.prices_for("ethereum", "mainnet", &idents).await;
        resolver.prices_for("ethereum", "mainnet", &idents).await;
        assert_eq!(provider.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_growing_token_set_only_fetches_new_addresses() {
        let (resolver, provider) = resolver_with(&[(WETH, 4000.0), (USDC, 1.0)], false);

        resolver
            .prices_for("ethereum", "mainnet", &[WETH.to_string()])
            .await;
        let prices = resolver
            .prices_for(
                "ethereum",
                "mainnet",
                &[WETH.to_string(), USDC.to_string()],
            )
            .await;

        assert_eq!(prices.get(WETH), Some(&4000.0));
        assert_eq!(prices.get(USDC), Some(&1.0));
        // the second batch must not re-request the already-cached WETH
        let requests = provider.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], vec![WETH.to_string()]);
        assert_eq!(requests[1], vec![USDC.to_string()]);
    }

    #[tokio::test]
    async fn test_unquoted_address_cached_as_zero() {
        let (resolver, provider) = resolver_with(&[], false);
        let idents = vec![USDC.to_string()];

        let prices = resolver.prices_for("ethereum", "mainnet", &idents).await;
        assert_eq!(prices.get(USDC), Some(&0.0));
        resolver.prices_for("ethereum", "mainnet", &idents).await;
        // the zero quote is cached, not re-requested each poll
        assert_eq!(provider.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_zero_prices() {
        let (resolver, _) = resolver_with(&[], true);
        let prices = resolver
            .prices_for("ethereum", "mainnet", &[WETH.to_string()])
            .await;
        assert_eq!(prices.get(WETH), Some(&0.0));
        // failures are not cached; recovery retries the address
        assert_eq!(resolver.cached_quote_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_expired_quote() {
        let (resolver, provider) = resolver_with(&[(WETH, 4000.0)], false);
        let idents = vec![WETH.to_string()];
        resolver.prices_for("ethereum", "mainnet", &idents).await;

        tokio::time::advance(Duration::from_secs(3601)).await;
        provider.fail.store(true, Ordering::SeqCst);
        let prices = resolver.prices_for("ethereum", "mainnet", &idents).await;
        assert_eq!(prices.get(WETH), Some(&4000.0));
    }

    #[tokio::test]
    async fn test_quote_ceiling_evicts_oldest() {
        let provider = Arc::new(StaticPrices {
            prices: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        });
        let resolver = PriceResolver::new(provider, Duration::from_secs(3600), 5);

        for i in 0..6 {
            let addr = format!("0x{:040x}", i);
            resolver.prices_for("ethereum", "mainnet", &[addr]).await;
        }
        assert!(resolver.cached_quote_count() <= 5);
    }
}
