//! Raw transfer normalization
//!
//! Converts provider-shaped transfers into the canonical internal form. The
//! value field is the delicate part: it must become an exact base-10 integer
//! string in the token's smallest unit with no float anywhere in the path.

use crate::chains::native_symbol;
use crate::errors::NormalizeError;
use crate::provider::types::RawTransfer;
use crate::units::parse_base_units;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical integrity check applied after expansion
static BASE_UNITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;

/// A normalized transfer, ready for threshold filtering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    /// `{transaction_hash}-{chain}`, the dedup key downstream
    pub id: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Exact integer value in the token's smallest unit, base-10 string
    pub raw_value: String,
    pub token_symbol: String,
    pub token_decimals: u32,
    /// Lowercased contract address; `None` for native-coin transfers
    pub contract_address: Option<String>,
    pub chain: String,
    pub network: String,
    pub timestamp_ms: i64,
}

impl Transfer {
    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }
}

/// Normalize one raw transfer for `chain`/`network`
///
/// Missing addresses default to empty strings and missing timestamps to the
/// current time; only an unusable value field is a hard error.
pub fn normalize(raw: &RawTransfer, chain: &str, network: &str) -> Result<Transfer, NormalizeError> {
    let value = raw.value.as_ref().ok_or(NormalizeError::MissingField("value"))?;
    let literal = match value {
        // arbitrary_precision keeps the exact source literal in the Number
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => {
            return Err(NormalizeError::InvalidValue {
                value: other.to_string(),
                reason: "not a number or numeric string".to_string(),
            })
        }
    };
    let raw_value = parse_base_units(&literal)?;
    if !BASE_UNITS_RE.is_match(&raw_value) {
        return Err(NormalizeError::InvalidValue {
            value: raw_value,
            reason: "expansion produced a non-digit result".to_string(),
        });
    }

    let hash = raw.transaction_hash.clone().unwrap_or_default();
    let (token_symbol, token_decimals, contract_address) = match &raw.contract {
        Some(contract) => (
            contract
                .symbol
                .clone()
                .unwrap_or_else(|| native_symbol(chain).to_string()),
            contract.decimals.unwrap_or(DEFAULT_TOKEN_DECIMALS),
            contract.address.as_ref().map(|a| a.to_lowercase()),
        ),
        None => (
            native_symbol(chain).to_string(),
            DEFAULT_TOKEN_DECIMALS,
            None,
        ),
    };

    Ok(Transfer {
        id: format!("{}-{}", hash, chain),
        hash,
        from: raw.from.as_deref().unwrap_or_default().to_lowercase(),
        to: raw.to.as_deref().unwrap_or_default().to_lowercase(),
        raw_value,
        token_symbol,
        token_decimals,
        contract_address,
        chain: chain.to_string(),
        network: network.to_string(),
        timestamp_ms: raw
            .timestamp
            .map(|secs| secs * 1000)
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
    })
}
