//! Minimal Ethereum JSON-RPC client.
//!
//! Only the read methods the on-chain adapters need. Transactions are never
//! sent from here; writes are returned to the caller as [`UnsignedTx`].
//!
//! [`UnsignedTx`]: crate::domain::UnsignedTx

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AdapterError;
use crate::infrastructure::http::{HttpClientConfig, JsonHttpClient};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client for one chain.
#[derive(Debug)]
pub struct RpcClient {
    http: JsonHttpClient,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for `config.base_url`.
    pub fn new(config: &HttpClientConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            http: JsonHttpClient::public(config)?,
            next_id: AtomicU64::new(1),
        })
    }

    /// Node URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.http.base_url()
    }

    /// Raw JSON-RPC request.
    pub async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, AdapterError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response: RpcResponse<T> = self.http.post_query("", &request).await?;

        if let Some(err) = response.error {
            tracing::debug!(method, code = err.code, message = %err.message, "RPC error");
            return Err(AdapterError::Rpc(format!("{method}: {} ({})", err.message, err.code)));
        }
        response
            .result
            .ok_or_else(|| AdapterError::Rpc(format!("{method}: empty result")))
    }

    /// `eth_call` against the latest block.
    pub async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, AdapterError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    /// `eth_gasPrice`.
    pub async fn gas_price(&self) -> Result<U256, AdapterError> {
        let hex: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&hex)
    }

    /// `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, AdapterError> {
        let hex: String = self.request("eth_chainId", json!([])).await?;
        let id = parse_quantity(&hex)?;
        u64::try_from(id).map_err(|_| AdapterError::Rpc(format!("chain id {id} out of range")))
    }

    /// `eth_getBalance` at the latest block.
    pub async fn native_balance(&self, account: Address) -> Result<U256, AdapterError> {
        let hex: String = self
            .request("eth_getBalance", json!([account, "latest"]))
            .await?;
        parse_quantity(&hex)
    }

    /// Encode `call`, run it with `eth_call` and decode the return values.
    pub async fn call<C: SolCall>(&self, to: Address, call: &C) -> Result<C::Return, AdapterError> {
        let data = self.eth_call(to, Bytes::from(call.abi_encode())).await?;
        C::abi_decode_returns(&data, true).map_err(AdapterError::from)
    }
}

/// Parse a hex `QUANTITY` (`0x1a`).
pub fn parse_quantity(hex: &str) -> Result<U256, AdapterError> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| AdapterError::Rpc(format!("invalid quantity {hex}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_quantity("0xa4b1").unwrap(), U256::from(42_161u64));
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn request_serializes_as_jsonrpc() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "eth_chainId",
            params: json!([]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "eth_chainId");
    }
}
