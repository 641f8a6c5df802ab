//! Multicall3 `aggregate3` batching for read calls.

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, address};

use super::rpc::RpcClient;
use crate::error::AdapterError;

/// Canonical Multicall3 deployment (same address on every major chain).
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

alloy::sol! {
    #![sol(all_derives)]

    /// Multicall3 batch entry.
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    /// Multicall3 batch result.
    struct Result3 {
        bool success;
        bytes returnData;
    }

    function aggregate3(Call3[] calls) external payable returns (Result3[] returnData);
}

/// A batch of read calls executed in one `eth_call`.
#[derive(Debug, Default, Clone)]
pub struct MulticallBatch {
    calls: Vec<Call3>,
}

impl MulticallBatch {
    /// Empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { calls: Vec::new() }
    }

    /// Queue a typed call. Returns its index in the results.
    pub fn push<C: SolCall>(&mut self, target: Address, call: &C) -> usize {
        self.push_raw(target, Bytes::from(call.abi_encode()))
    }

    /// Queue pre-encoded calldata. Returns its index in the results.
    pub fn push_raw(&mut self, target: Address, data: Bytes) -> usize {
        self.calls.push(Call3 {
            target,
            allowFailure: true,
            callData: data,
        });
        self.calls.len() - 1
    }

    /// Number of queued calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no calls are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run the batch. Each entry is `None` when that call reverted.
    pub async fn execute(
        self,
        rpc: &RpcClient,
        multicall: Address,
    ) -> Result<MulticallResults, AdapterError> {
        if self.calls.is_empty() {
            return Ok(MulticallResults {
                results: Vec::new(),
            });
        }
        let count = self.calls.len();
        let returned = rpc
            .call(multicall, &aggregate3Call { calls: self.calls })
            .await?
            .returnData;
        if returned.len() != count {
            return Err(AdapterError::Rpc(format!(
                "multicall returned {} results for {count} calls",
                returned.len()
            )));
        }
        Ok(MulticallResults {
            results: returned
                .into_iter()
                .map(|r| r.success.then_some(r.returnData))
                .collect(),
        })
    }
}

/// Results of an executed [`MulticallBatch`].
#[derive(Debug, Clone)]
pub struct MulticallResults {
    results: Vec<Option<Bytes>>,
}

impl MulticallResults {
    /// Raw return data for call `index`, `None` if it reverted.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&Bytes> {
        self.results.get(index).and_then(Option::as_ref)
    }

    /// Decode call `index` as the returns of `C`.
    pub fn decode<C: SolCall>(&self, index: usize) -> Result<C::Return, AdapterError> {
        let data = self.raw(index).ok_or_else(|| {
            AdapterError::Rpc(format!("multicall entry {index} ({}) reverted", C::SIGNATURE))
        })?;
        C::abi_decode_returns(data, true).map_err(AdapterError::from)
    }

    /// Like [`decode`](Self::decode), but a reverted call yields `None`.
    pub fn try_decode<C: SolCall>(&self, index: usize) -> Option<C::Return> {
        self.raw(index)
            .and_then(|data| C::abi_decode_returns(data, true).ok())
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
