//! Perennial v2 contract bindings.
//!
//! `Fixed6` / `UFixed6` are user-defined value types over `int256` /
//! `uint256` with 6 decimals; the ABI sees the underlying integer.

use alloy::sol_types::SolValue;
use alloy_primitives::{Address, Bytes, I256, U256};

alloy::sol! {
    #![sol(all_derives)]

    struct PAccumulator {
        int256 _value;
        int256 _skew;
    }

    struct Global {
        uint256 currentId;
        uint256 latestId;
        uint256 protocolFee;
        uint256 oracleFee;
        uint256 riskFee;
        uint256 donation;
        int256 latestPrice;
        PAccumulator pAccumulator;
    }

    struct Invalidation {
        int256 maker;
        int256 long;
        int256 short;
    }

    struct Position {
        uint256 timestamp;
        uint256 maker;
        uint256 long;
        uint256 short;
        uint256 fee;
        uint256 keeper;
        int256 collateral;
        int256 delta;
        Invalidation invalidation;
    }

    struct Local {
        uint256 currentId;
        uint256 latestId;
        int256 collateral;
        uint256 reward;
        uint256 protection;
    }

    interface IMarket {
        function global() external view returns (Global memory);
        function position() external view returns (Position memory);
        function positions(address account) external view returns (Position memory);
        function locals(address account) external view returns (Local memory);
    }

    struct TriggerOrder {
        uint8 side;
        int8 comparison;
        uint256 fee;
        int256 price;
        int256 delta;
    }

    struct Invocation {
        uint8 action;
        bytes args;
    }

    interface IMultiInvoker {
        function invoke(Invocation[] invocations) external payable;
        function latestNonce() external view returns (uint256);
        function orders(address account, address market, uint256 nonce)
            external view returns (TriggerOrder memory);
    }
}

/// `IMultiInvoker.PerennialAction` values used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    /// Set absolute maker / long / short and move collateral.
    UpdatePosition = 1,
    /// Store a keeper-executed trigger order.
    PlaceOrder = 3,
    /// Remove a trigger order.
    CancelOrder = 4,
}

/// `TriggerOrder.side` for longs.
pub const SIDE_LONG: u8 = 1;
/// `TriggerOrder.side` for shorts.
pub const SIDE_SHORT: u8 = 2;

/// `UPDATE_POSITION(market, maker, long, short, collateralDelta, wrap)`.
#[must_use]
pub fn update_position(
    market: Address,
    maker: U256,
    long: U256,
    short: U256,
    collateral_delta: I256,
    wrap: bool,
) -> Invocation {
    Invocation {
        action: Action::UpdatePosition as u8,
        args: Bytes::from((market, maker, long, short, collateral_delta, wrap).abi_encode_params()),
    }
}

/// `PLACE_ORDER(market, order)`.
#[must_use]
pub fn place_order(market: Address, order: TriggerOrder) -> Invocation {
    Invocation {
        action: Action::PlaceOrder as u8,
        args: Bytes::from((market, order).abi_encode_params()),
    }
}

/// `CANCEL_ORDER(market, nonce)`.
#[must_use]
pub fn cancel_order(market: Address, nonce: U256) -> Invocation {
    Invocation {
        action: Action::CancelOrder as u8,
        args: Bytes::from((market, nonce).abi_encode_params()),
    }
}
