//! DataStore key derivation.
//!
//! GMX stores parameters under `keccak256(abi.encode(NAME_HASH, args...))`
//! where `NAME_HASH = keccak256(abi.encode("NAME"))`.

use alloy::sol_types::SolValue;
use alloy_primitives::{Address, B256, keccak256};

/// `keccak256(abi.encode(name))`.
#[must_use]
pub fn hash_string(name: &str) -> B256 {
    keccak256(name.to_string().abi_encode())
}

/// `MIN_COLLATERAL_USD`.
#[must_use]
pub fn min_collateral_usd_key() -> B256 {
    hash_string("MIN_COLLATERAL_USD")
}

/// Open interest of `market` backed by `collateral_token` on one side.
#[must_use]
pub fn open_interest_key(market: Address, collateral_token: Address, is_long: bool) -> B256 {
    keccak256((hash_string("OPEN_INTEREST"), market, collateral_token, is_long).abi_encode_params())
}

/// Pool amount of `token` in `market`.
#[must_use]
pub fn pool_amount_key(market: Address, token: Address) -> B256 {
    keccak256((hash_string("POOL_AMOUNT"), market, token).abi_encode_params())
}

/// Maximum open interest per side.
#[must_use]
pub fn max_open_interest_key(market: Address, is_long: bool) -> B256 {
    keccak256((hash_string("MAX_OPEN_INTEREST"), market, is_long).abi_encode_params())
}

/// Funding factor.
#[must_use]
pub fn funding_factor_key(market: Address) -> B256 {
    keccak256((hash_string("FUNDING_FACTOR"), market).abi_encode_params())
}

/// Funding exponent factor.
#[must_use]
pub fn funding_exponent_factor_key(market: Address) -> B256 {
    keccak256((hash_string("FUNDING_EXPONENT_FACTOR"), market).abi_encode_params())
}

/// Borrowing factor per side.
#[must_use]
pub fn borrowing_factor_key(market: Address, is_long: bool) -> B256 {
    keccak256((hash_string("BORROWING_FACTOR"), market, is_long).abi_encode_params())
}

/// Borrowing exponent factor per side.
#[must_use]
pub fn borrowing_exponent_factor_key(market: Address, is_long: bool) -> B256 {
    keccak256((hash_string("BORROWING_EXPONENT_FACTOR"), market, is_long).abi_encode_params())
}

/// Cumulative borrowing factor per side.
#[must_use]
pub fn cumulative_borrowing_factor_key(market: Address, is_long: bool) -> B256 {
    keccak256((hash_string("CUMULATIVE_BORROWING_FACTOR"), market, is_long).abi_encode_params())
}

/// Minimum collateral factor.
#[must_use]
pub fn min_collateral_factor_key(market: Address) -> B256 {
    keccak256((hash_string("MIN_COLLATERAL_FACTOR"), market).abi_encode_params())
}

/// Position fee factor. `for_positive_impact` selects the lower tier.
#[must_use]
pub fn position_fee_factor_key(market: Address, for_positive_impact: bool) -> B256 {
    keccak256((hash_string("POSITION_FEE_FACTOR"), market, for_positive_impact).abi_encode_params())
}

/// Set of order keys owned by `account`.
#[must_use]
pub fn account_order_list_key(account: Address) -> B256 {
    keccak256((hash_string("ACCOUNT_ORDER_LIST"), account).abi_encode_params())
}

/// Position key: `keccak256(abi.encode(account, market, collateralToken, isLong))`.
#[must_use]
pub fn position_key(account: Address, market: Address, collateral_token: Address, is_long: bool) -> B256 {
    keccak256((account, market, collateral_token, is_long).abi_encode_params())
}
