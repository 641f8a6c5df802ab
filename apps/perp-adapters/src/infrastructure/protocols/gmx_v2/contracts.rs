//! GMX v2 contract bindings (v2.0 ABI).

alloy::sol! {
    #![sol(all_derives)]

    // ExchangeRouter

    struct CreateOrderParamsAddresses {
        address receiver;
        address callbackContract;
        address uiFeeReceiver;
        address market;
        address initialCollateralToken;
        address[] swapPath;
    }

    struct CreateOrderParamsNumbers {
        uint256 sizeDeltaUsd;
        uint256 initialCollateralDeltaAmount;
        uint256 triggerPrice;
        uint256 acceptablePrice;
        uint256 executionFee;
        uint256 callbackGasLimit;
        uint256 minOutputAmount;
    }

    struct CreateOrderParams {
        CreateOrderParamsAddresses addresses;
        CreateOrderParamsNumbers numbers;
        uint8 orderType;
        uint8 decreasePositionSwapType;
        bool isLong;
        bool shouldUnwrapNativeToken;
        bytes32 referralCode;
    }

    interface IExchangeRouter {
        function multicall(bytes[] data) external payable returns (bytes[] results);
        function sendWnt(address receiver, uint256 amount) external payable;
        function sendTokens(address token, address receiver, uint256 amount) external payable;
        function createOrder(CreateOrderParams params) external payable returns (bytes32);
        function updateOrder(
            bytes32 key,
            uint256 sizeDeltaUsd,
            uint256 acceptablePrice,
            uint256 triggerPrice,
            uint256 minOutputAmount
        ) external payable;
        function cancelOrder(bytes32 key) external payable;
    }

    // Reader

    struct MarketProps {
        address marketToken;
        address indexToken;
        address longToken;
        address shortToken;
    }

    struct PositionAddresses {
        address account;
        address market;
        address collateralToken;
    }

    struct PositionNumbers {
        uint256 sizeInUsd;
        uint256 sizeInTokens;
        uint256 collateralAmount;
        uint256 borrowingFactor;
        uint256 fundingFeeAmountPerSize;
        uint256 longTokenClaimableFundingAmountPerSize;
        uint256 shortTokenClaimableFundingAmountPerSize;
        uint256 increasedAtBlock;
        uint256 decreasedAtBlock;
    }

    struct PositionFlags {
        bool isLong;
    }

    struct PositionProps {
        PositionAddresses addresses;
        PositionNumbers numbers;
        PositionFlags flags;
    }

    struct OrderAddresses {
        address account;
        address receiver;
        address callbackContract;
        address uiFeeReceiver;
        address market;
        address initialCollateralToken;
        address[] swapPath;
    }

    struct OrderNumbers {
        uint8 orderType;
        uint8 decreasePositionSwapType;
        uint256 sizeDeltaUsd;
        uint256 initialCollateralDeltaAmount;
        uint256 triggerPrice;
        uint256 acceptablePrice;
        uint256 executionFee;
        uint256 callbackGasLimit;
        uint256 minOutputAmount;
        uint256 updatedAtBlock;
    }

    struct OrderFlags {
        bool isLong;
        bool shouldUnwrapNativeToken;
        bool isFrozen;
    }

    struct OrderProps {
        OrderAddresses addresses;
        OrderNumbers numbers;
        OrderFlags flags;
    }

    interface IReader {
        function getMarkets(address dataStore, uint256 start, uint256 end)
            external view returns (MarketProps[] markets);
        function getAccountPositions(address dataStore, address account, uint256 start, uint256 end)
            external view returns (PositionProps[] positions);
        function getOrder(address dataStore, bytes32 key)
            external view returns (OrderProps order);
    }

    // DataStore

    interface IDataStore {
        function getUint(bytes32 key) external view returns (uint256);
        function getBytes32ValuesAt(bytes32 setKey, uint256 start, uint256 end)
            external view returns (bytes32[] values);
    }
}

/// `Order.OrderType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GmxOrderType {
    /// Swap at market.
    MarketSwap = 0,
    /// Swap at a limit price.
    LimitSwap = 1,
    /// Open / increase at market.
    MarketIncrease = 2,
    /// Open / increase at a limit price.
    LimitIncrease = 3,
    /// Reduce / close at market.
    MarketDecrease = 4,
    /// Reduce / close at a limit (take profit) price.
    LimitDecrease = 5,
    /// Reduce / close at a stop price.
    StopLossDecrease = 6,
    /// Keeper liquidation.
    Liquidation = 7,
}

impl GmxOrderType {
    /// Decode the on-chain value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::MarketSwap,
            1 => Self::LimitSwap,
            2 => Self::MarketIncrease,
            3 => Self::LimitIncrease,
            4 => Self::MarketDecrease,
            5 => Self::LimitDecrease,
            6 => Self::StopLossDecrease,
            7 => Self::Liquidation,
            _ => return None,
        })
    }

    /// Whether the order increases a position.
    #[must_use]
    pub const fn is_increase(self) -> bool {
        matches!(self, Self::MarketIncrease | Self::LimitIncrease)
    }

    /// Whether the order decreases a position.
    #[must_use]
    pub const fn is_decrease(self) -> bool {
        matches!(
            self,
            Self::MarketDecrease | Self::LimitDecrease | Self::StopLossDecrease | Self::Liquidation
        )
    }
}

/// `Order.DecreasePositionSwapType::NoSwap`.
pub const DECREASE_SWAP_NONE: u8 = 0;

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn order_type_round_trip() {
        for value in 0..=7u8 {
            let ty = GmxOrderType::from_u8(value).unwrap();
            assert_eq!(ty as u8, value);
        }
        assert!(GmxOrderType::from_u8(8).is_none());
        assert!(GmxOrderType::LimitIncrease.is_increase());
        assert!(GmxOrderType::StopLossDecrease.is_decrease());
        assert!(!GmxOrderType::MarketSwap.is_increase());
    }

    #[test]
    fn router_function_signatures() {
        assert_eq!(IExchangeRouter::sendWntCall::SIGNATURE, "sendWnt(address,uint256)");
        assert_eq!(IExchangeRouter::cancelOrderCall::SIGNATURE, "cancelOrder(bytes32)");
        assert_eq!(
            IExchangeRouter::updateOrderCall::SIGNATURE,
            "updateOrder(bytes32,uint256,uint256,uint256,uint256)"
        );
    }
}
