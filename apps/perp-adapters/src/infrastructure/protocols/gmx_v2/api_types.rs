//! GMX REST API types (`/prices/tickers`, `/tokens`).

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One entry of `/prices/tickers`. Prices are per unit with
/// `30 - token_decimals` decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    /// Token address.
    pub token_address: Address,
    /// Token symbol.
    pub token_symbol: String,
    /// Minimum oracle price.
    #[serde(with = "u256_string")]
    pub min_price: U256,
    /// Maximum oracle price.
    #[serde(with = "u256_string")]
    pub max_price: U256,
    /// Update time (ms).
    #[serde(default)]
    pub updated_at: Option<u64>,
}

impl Ticker {
    /// Mid of min and max price.
    #[must_use]
    pub fn mid_price(&self) -> U256 {
        (self.min_price + self.max_price) / U256::from(2u8)
    }
}

/// Integer prices as decimal strings.
mod u256_string {
    use std::str::FromStr;

    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => U256::from_str(&text).map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }
}

/// `/tokens` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensResponse {
    /// Tokens.
    pub tokens: Vec<TokenEntry>,
}

/// Token metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Symbol.
    pub symbol: String,
    /// Address (synthetic index tokens have a placeholder address).
    pub address: Address,
    /// Decimals.
    pub decimals: u8,
    /// Whether the token exists only as an index.
    #[serde(default)]
    pub synthetic: bool,
}
