/// Chain registry: canonical native symbols and wrapped-native contracts
///
/// Native-asset transfers carry no contract metadata, so pricing routes them
/// through the chain's canonical wrapped token (WETH/WMATIC). Addresses are
/// stored lower-cased; comparisons elsewhere assume that.

/// Canonical native symbol for a chain. Unknown chains fall back to ETH,
/// matching the upstream provider's EVM-only coverage.
pub fn native_symbol(chain: &str) -> &'static str {
    match chain {
        "ethereum" => "ETH",
        "polygon" => "MATIC",
        "arbitrum" => "ETH",
        "base" => "ETH",
        "optimism" => "ETH",
        _ => "ETH",
    }
}

/// Wrapped-native token contract used to price the native asset
pub fn wrapped_native_contract(chain: &str) -> Option<&'static str> {
    match chain {
        "ethereum" => Some("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"), // WETH
        "polygon" => Some("0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0"), // WMATIC
        "arbitrum" => Some("0x82af49447d8a07e3bd95bd0d56f35241523fbab1"), // WETH
        "base" => Some("0x4200000000000000000000000000000000000006"), // WETH
        "optimism" => Some("0x4200000000000000000000000000000000000006"), // WETH
        _ => None,
    }
}

/// Loose shape check for an EVM contract address ("0x" + 40 hex chars)
pub fn looks_like_contract_address(addr: &str) -> bool {
    addr.len() == 42 && addr.starts_with("0x")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_symbols() {
        assert_eq!(native_symbol("ethereum"), "ETH");
        assert_eq!(native_symbol("polygon"), "MATIC");
        assert_eq!(native_symbol("optimism"), "ETH");
        assert_eq!(native_symbol("unknown-chain"), "ETH");
    }

    #[test]
    fn test_wrapped_contracts_are_lowercase_addresses() {
        for chain in ["ethereum", "polygon", "arbitrum", "base", "optimism"] {
            let addr = wrapped_native_contract(chain).unwrap();
            assert!(looks_like_contract_address(addr));
            assert_eq!(addr, addr.to_lowercase());
        }
        assert!(wrapped_native_contract("solana").is_none());
    }
}
