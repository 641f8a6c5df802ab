//! Helpers shared by the venue adapters.

use alloy_primitives::Address;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::application::AdapterResult;
use crate::domain::{MarketId, MarketInfo, ProtocolId, Side};
use crate::error::AdapterError;

/// Fail unless `wallet` is the account the adapter holds credentials for.
pub fn ensure_wallet(protocol: ProtocolId, configured: Address, wallet: Address) -> AdapterResult<()> {
    if configured == wallet {
        return Ok(());
    }
    Err(AdapterError::Validation(format!(
        "{protocol} is configured for {configured}, not {wallet}"
    )))
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Look up a market by id.
pub fn find_market<'a>(markets: &'a [MarketInfo], id: &MarketId) -> AdapterResult<&'a MarketInfo> {
    markets
        .iter()
        .find(|m| &m.market_id == id)
        .ok_or_else(|| AdapterError::MarketNotFound(id.to_string()))
}

/// Round `value` down to a multiple of `step`. A non-positive step is ignored.
#[must_use]
pub fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}

/// Liquidation price of a linear perp with a maintenance ratio.
///
/// `collateral_usd` is the equity backing the position at `price` (margin
/// plus unrealized PnL). Liquidation happens when equity falls to
/// `maintenance_ratio * notional`:
/// long `(sP - C) / (s(1 - m))`, short `(sP + C) / (s(1 + m))`.
#[must_use]
pub fn linear_liquidation_price(
    side: Side,
    size_tokens: Decimal,
    price: Decimal,
    collateral_usd: Decimal,
    maintenance_ratio: Decimal,
) -> Option<Decimal> {
    if size_tokens <= Decimal::ZERO {
        return None;
    }
    let notional = size_tokens * price;
    let liquidation = match side {
        Side::Long => {
            let denominator = size_tokens * (Decimal::ONE - maintenance_ratio);
            if denominator <= Decimal::ZERO {
                return None;
            }
            (notional - collateral_usd) / denominator
        }
        Side::Short => (notional + collateral_usd) / (size_tokens * (Decimal::ONE + maintenance_ratio)),
    };
    (liquidation > Decimal::ZERO).then_some(liquidation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_down_to_tick() {
        assert_eq!(round_down_to_step(dec!(1.23456), dec!(0.01)), dec!(1.23));
        assert_eq!(round_down_to_step(dec!(7), dec!(5)), dec!(5));
        assert_eq!(round_down_to_step(dec!(7), Decimal::ZERO), dec!(7));
    }

    #[test]
    fn wallet_mismatch_is_rejected() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        assert!(ensure_wallet(ProtocolId::Orderly, a, a).is_ok());
        assert!(matches!(
            ensure_wallet(ProtocolId::Orderly, a, b),
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn linear_liquidation_examples() {
        // 1 ETH long at 2000 with 200 margin and 1% maintenance:
        // (2000 - 200) / 0.99
        let long = linear_liquidation_price(Side::Long, dec!(1), dec!(2000), dec!(200), dec!(0.01));
        assert_eq!(long.unwrap().round_dp(4), dec!(1818.1818));

        // (2000 + 200) / 1.01
        let short = linear_liquidation_price(Side::Short, dec!(1), dec!(2000), dec!(200), dec!(0.01));
        assert_eq!(short.unwrap().round_dp(4), dec!(2178.2178));
    }

    #[test]
    fn fully_collateralized_long_cannot_be_liquidated() {
        assert_eq!(
            linear_liquidation_price(Side::Long, dec!(1), dec!(2000), dec!(2000), dec!(0.01)),
            None
        );
    }

    proptest! {
        #[test]
        fn liquidation_brackets_the_mark(
            tokens in 1u32..10_000,
            price in 1u32..100_000,
            leverage in 2u32..20,
        ) {
            let size = Decimal::from(tokens);
            let price = Decimal::from(price);
            let collateral = size * price / Decimal::from(leverage);
            let long = linear_liquidation_price(Side::Long, size, price, collateral, dec!(0.01));
            let short = linear_liquidation_price(Side::Short, size, price, collateral, dec!(0.01));
            prop_assert!(long.is_some_and(|p| p < price));
            prop_assert!(short.is_some_and(|p| p > price));
        }
    }
}
