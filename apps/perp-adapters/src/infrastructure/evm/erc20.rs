//! ERC-20 reads and approval transactions.

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, U256};

use super::rpc::RpcClient;
use crate::domain::{Chain, UnsignedTx};
use crate::error::AdapterError;

alloy::sol! {
    #![sol(all_derives)]

    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// Token balance of `owner`.
pub async fn balance_of(rpc: &RpcClient, token: Address, owner: Address) -> Result<U256, AdapterError> {
    Ok(rpc
        .call(token, &IERC20::balanceOfCall { account: owner })
        .await?
        ._0)
}

/// Amount `spender` may move on behalf of `owner`.
pub async fn allowance(
    rpc: &RpcClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, AdapterError> {
    Ok(rpc
        .call(token, &IERC20::allowanceCall { owner, spender })
        .await?
        ._0)
}

/// Token decimals.
pub async fn decimals(rpc: &RpcClient, token: Address) -> Result<u8, AdapterError> {
    Ok(rpc.call(token, &IERC20::decimalsCall {}).await?._0)
}

/// `approve(spender, amount)` transaction.
#[must_use]
pub fn approve_tx(chain: Chain, token: Address, symbol: &str, spender: Address, amount: U256) -> UnsignedTx {
    UnsignedTx {
        chain,
        to: token,
        data: Bytes::from(IERC20::approveCall { spender, amount }.abi_encode()),
        value: U256::ZERO,
        heading: format!("Approve {symbol}"),
        description: format!("Allow {spender} to spend {symbol}"),
    }
}

/// Approval transaction when the current allowance is below `required`.
pub async fn approval_if_needed(
    rpc: &RpcClient,
    chain: Chain,
    token: Address,
    symbol: &str,
    owner: Address,
    spender: Address,
    required: U256,
) -> Result<Option<UnsignedTx>, AdapterError> {
    let current = allowance(rpc, token, owner, spender).await?;
    if current >= required {
        return Ok(None);
    }
    tracing::debug!(%token, %spender, %current, %required, "Allowance too low, adding approval");
    Ok(Some(approve_tx(chain, token, symbol, spender, required)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_calldata_layout() {
        let spender = Address::repeat_byte(0x22);
        let tx = approve_tx(
            Chain::ARBITRUM,
            Address::repeat_byte(0x11),
            "USDC",
            spender,
            U256::from(5_000_000u64),
        );
        // approve(address,uint256)
        assert_eq!(&tx.data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(&tx.data[16..36], spender.as_slice());
        assert_eq!(tx.data.len(), 4 + 64);
        assert_eq!(tx.value, U256::ZERO);
        assert_eq!(tx.heading, "Approve USDC");
    }
}
