//! Wire types for the transfer/price provider API
//!
//! Numeric token values arrive as `serde_json::Value` on purpose: with
//! arbitrary-precision JSON parsing the original literal survives intact and
//! the normalizer can expand it without ever passing through a float.

use serde::{Deserialize, Serialize};

// ===== REQUEST BODIES =====

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransfersRequest {
    pub from_date: String,
    pub to_date: String,
    pub with_zero_value: bool,
    pub min_value: String,
    pub rpp: u32,
    pub with_count: bool,
    pub sort: String,
}

impl TransfersRequest {
    pub fn new(from_date: String, to_date: String, min_value: String) -> Self {
        Self {
            from_date,
            to_date,
            with_zero_value: false,
            min_value,
            rpp: 1000,
            with_count: false,
            sort: "value:desc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesRequest {
    pub contract_addresses: Vec<String>,
    pub currency: String,
}

impl PricesRequest {
    pub fn new(contract_addresses: Vec<String>) -> Self {
        Self {
            contract_addresses,
            currency: "USD".to_string(),
        }
    }
}

// ===== RESPONSE TYPES =====

/// Transfer list responses come either as a bare array or wrapped in `items`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransfersResponse {
    Wrapped { items: Vec<RawTransfer> },
    Bare(Vec<RawTransfer>),
}

impl TransfersResponse {
    pub fn into_items(self) -> Vec<RawTransfer> {
        match self {
            TransfersResponse::Wrapped { items } => items,
            TransfersResponse::Bare(items) => items,
        }
    }
}

/// A token transfer as the provider reports it, before normalization
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransfer {
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    /// Exact value literal; number or string depending on the provider
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub contract: Option<RawContract>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenPrice {
    #[serde(default)]
    pub contract: Option<PriceContract>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceContract {
    #[serde(default)]
    pub address: Option<String>,
}

impl RawTokenPrice {
    /// Price as f64 for display math; quotes arrive as numbers or strings
    pub fn price_f64(&self) -> Option<f64> {
        match self.price.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64().or_else(|| n.to_string().parse().ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}
