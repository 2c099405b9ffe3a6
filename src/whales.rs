//! Whale filtering and USD enrichment
//!
//! The threshold comparison is done entirely in integers: transfer value in
//! wei-equivalent against the configured threshold, with the USD price carried
//! as picodollars. A transfer one base unit below the line is excluded exactly;
//! the f64 `usd_value` on the result exists for display only.

use crate::logger::{self, LogTag};
use crate::normalize::Transfer;
use crate::pricing::PriceResolver;
use crate::units::{meets_threshold, price_to_pico_usd, scale_to_wei, wei_to_f64};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A transfer that cleared the whale threshold, enriched with USD context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhaleTransfer {
    #[serde(flatten)]
    pub transfer: Transfer,
    /// Token-decimal-adjusted value normalized to 18 decimals, as a string
    pub value_wei: String,
    pub token_price_usd: f64,
    /// Approximate USD value, for display and event payloads
    pub usd_value: f64,
}

/// Identifier the price resolver should quote for this transfer
fn price_identifier(transfer: &Transfer) -> String {
    match &transfer.contract_address {
        Some(address) => address.clone(),
        None => transfer.token_symbol.clone(),
    }
}

/// Keep only transfers worth at least `threshold_wei` (18-decimal USD-value
/// base units). Transfers with no resolvable price or a malformed value are
/// dropped with a warning rather than failing the batch.
pub async fn filter_whales(
    transfers: &[Transfer],
    threshold_wei: U256,
    resolver: &PriceResolver,
    chain: &str,
    network: &str,
) -> Vec<WhaleTransfer> {
    if transfers.is_empty() {
        return Vec::new();
    }

    let identifiers: Vec<String> = transfers
        .iter()
        .map(price_identifier)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let prices = resolver.prices_for(chain, network, &identifiers).await;

    let mut whales = Vec::new();
    for transfer in transfers {
        let value_wei = match scale_to_wei(&transfer.raw_value, transfer.token_decimals) {
            Ok(v) => v,
            Err(err) => {
                logger::warning(
                    LogTag::Whales,
                    &format!("skipping transfer {}: {}", transfer.id, err),
                );
                continue;
            }
        };
        if value_wei.is_zero() {
            continue;
        }

        let price = prices
            .get(&price_identifier(transfer))
            .copied()
            .unwrap_or(0.0);
        let price_pico = price_to_pico_usd(price);
        // Unpriced tokens cannot qualify, whatever their raw size
        if price_pico == 0 {
            continue;
        }

        if meets_threshold(value_wei, price_pico, threshold_wei) {
            let usd_value = wei_to_f64(value_wei) * price;
            whales.push(WhaleTransfer {
                transfer: transfer.clone(),
                value_wei: value_wei.to_string(),
                token_price_usd: price,
                usd_value,
            });
        }
    }
    whales
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::types::{PriceContract, RawTokenPrice, RawTransfer};
    use crate::provider::TransferProvider;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    struct FixedPrices(HashMap<String, f64>);

    #[async_trait]
    impl TransferProvider for FixedPrices {
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
            Ok(contracts
                .iter()
                .filter_map(|addr| {
                    self.0.get(addr).map(|p| RawTokenPrice {
                        contract: Some(PriceContract {
                            address: Some(addr.clone()),
                        }),
                        price: Some(serde_json::json!(p)),
                    })
                })
                .collect())
        }
    }

    fn resolver(prices: &[(&str, f64)]) -> PriceResolver {
        PriceResolver::new(
            Arc::new(FixedPrices(
                prices.iter().map(|(a, p)| (a.to_string(), *p)).collect(),
            )),
            Duration::from_secs(3600),
            100,
        )
    }

    fn transfer(raw_value: &str, decimals: u32, contract: Option<&str>, symbol: &str) -> Transfer {
        Transfer {
            id: format!("0xhash-{}", symbol),
            hash: "0xhash".to_string(),
            from: "0xf1".to_string(),
            to: "0xf2".to_string(),
            raw_value: raw_value.to_string(),
            token_symbol: symbol.to_string(),
            token_decimals: decimals,
            contract_address: contract.map(str::to_string),
            chain: "ethereum".to_string(),
            network: "mainnet".to_string(),
            timestamp_ms: 1_756_166_400_000,
        }
    }

    /// $10M threshold expressed in 18-decimal base units
    fn threshold_10m() -> U256 {
        U256::from_dec_str("10000000000000000000000000").unwrap()
    }

    #[tokio::test]
    async fn test_one_base_unit_below_threshold_excluded() {
        // 10,000 tokens at $1000 is exactly $10M and qualifies;
        // one wei less must not, which f64 rounding would get wrong
        let resolver = resolver(&[(WETH, 1000.0)]);
        let at = transfer("10000000000000000000000", 18, Some(WETH), "WETH");
        let below = transfer("9999999999999999999999", 18, Some(WETH), "WETH");

        let whales = filter_whales(
            &[at.clone(), below],
            threshold_10m(),
            &resolver,
            "ethereum",
            "mainnet",
        )
        .await;
        assert_eq!(whales.len(), 1);
        assert_eq!(whales[0].transfer.id, at.id);
        assert_eq!(whales[0].usd_value, 10_000_000.0);
    }

    #[tokio::test]
    async fn test_low_decimal_token_scaled_before_comparison() {
        // 20M USDC, 6 decimals at $1: scaled to 18 decimals it clears $10M
        let resolver = resolver(&[(USDC, 1.0)]);
        let t = transfer("20000000000000", 6, Some(USDC), "USDC");
        let whales =
            filter_whales(&[t], threshold_10m(), &resolver, "ethereum", "mainnet").await;
        assert_eq!(whales.len(), 1);
        assert_eq!(whales[0].value_wei, "20000000000000000000000000");
    }

    #[tokio::test]
    async fn test_unpriced_token_never_qualifies() {
        let resolver = resolver(&[]);
        let t = transfer("999999999999999999999999999", 18, Some(USDC), "MYSTERY");
        let whales =
            filter_whales(&[t], threshold_10m(), &resolver, "ethereum", "mainnet").await;
        assert!(whales.is_empty());
    }

    #[tokio::test]
    async fn test_native_transfer_priced_by_symbol() {
        let resolver = resolver(&[(WETH, 4000.0)]);
        // 5000 ETH at $4000 = $20M
        let t = transfer("5000000000000000000000", 18, None, "ETH");
        let whales =
            filter_whales(&[t], threshold_10m(), &resolver, "ethereum", "mainnet").await;
        assert_eq!(whales.len(), 1);
        assert_eq!(whales[0].token_price_usd, 4000.0);
        assert_eq!(whales[0].usd_value, 20_000_000.0);
    }

    #[tokio::test]
    async fn test_zero_value_and_malformed_transfers_skipped() {
        let resolver = resolver(&[(WETH, 4000.0)]);
        let zero = transfer("0", 18, Some(WETH), "WETH");
        let mut malformed = transfer("100", 18, Some(WETH), "WETH");
        malformed.token_decimals = 40; // unsupported decimal count
        let ok = transfer("5000000000000000000000", 18, Some(WETH), "WETH");

        let whales = filter_whales(
            &[zero, malformed, ok.clone()],
            threshold_10m(),
            &resolver,
            "ethereum",
            "mainnet",
        )
        .await;
        assert_eq!(whales.len(), 1);
        assert_eq!(whales[0].transfer.id, ok.id);
    }
}
