//! GMX v2 position math used by previews and position reads.
//!
//! All amounts are USD `Decimal`s unless noted; factors are already scaled
//! down from GMX's 30-decimal fixed point.

use alloy_primitives::U256;
use rust_decimal::{Decimal, MathematicalOps};

use crate::domain::Side;
use crate::error::AdapterError;
use crate::infrastructure::evm::{to_units, units::pow10};

const SECONDS_PER_HOUR: Decimal = Decimal::from_parts(3600, 0, 0, false, 0);

/// `gas_limit * gas_price * multiplier`, in wei.
pub fn execution_fee(gas_limit: u64, gas_price: U256, multiplier: Decimal) -> Result<U256, AdapterError> {
    let base = U256::from(gas_limit) * gas_price;
    let scaled_multiplier = to_units(multiplier, 4)?;
    Ok(base * scaled_multiplier / pow10(4))
}

/// Worst price the order may fill at.
///
/// Buying (long increase, short decrease) tolerates a higher price; selling
/// tolerates a lower one.
#[must_use]
pub fn acceptable_price(price: Decimal, side: Side, is_increase: bool, slippage: Decimal) -> Decimal {
    let buying = side.is_long() == is_increase;
    if buying {
        price * (Decimal::ONE + slippage)
    } else {
        price * (Decimal::ONE - slippage)
    }
}

/// `size / collateral`, `None` when collateral is not positive.
#[must_use]
pub fn leverage(size_usd: Decimal, collateral_usd: Decimal) -> Option<Decimal> {
    (collateral_usd > Decimal::ZERO).then(|| size_usd / collateral_usd)
}

/// Profit or loss of a position marked at `price`.
#[must_use]
pub fn pnl_usd(side: Side, size_usd: Decimal, size_tokens: Decimal, price: Decimal) -> Decimal {
    let value = size_tokens * price;
    match side {
        Side::Long => value - size_usd,
        Side::Short => size_usd - value,
    }
}

/// Collateral the position must keep: `max(size * min_collateral_factor, min_collateral_usd)`.
#[must_use]
pub fn liquidation_collateral_usd(
    size_usd: Decimal,
    min_collateral_factor: Decimal,
    min_collateral_usd: Decimal,
) -> Decimal {
    (size_usd * min_collateral_factor).max(min_collateral_usd)
}

/// Index price at which remaining collateral hits the liquidation threshold.
///
/// `pending_fees_usd` covers borrowing, funding and the closing fee.
#[must_use]
pub fn liquidation_price(
    side: Side,
    size_usd: Decimal,
    size_tokens: Decimal,
    collateral_usd: Decimal,
    pending_fees_usd: Decimal,
    min_collateral_factor: Decimal,
    min_collateral_usd: Decimal,
) -> Option<Decimal> {
    if size_tokens <= Decimal::ZERO || size_usd <= Decimal::ZERO {
        return None;
    }
    let liq_collateral = liquidation_collateral_usd(size_usd, min_collateral_factor, min_collateral_usd);
    let price = match side {
        Side::Long => (liq_collateral + size_usd + pending_fees_usd - collateral_usd) / size_tokens,
        Side::Short => (size_usd + collateral_usd - pending_fees_usd - liq_collateral) / size_tokens,
    };
    (price > Decimal::ZERO).then_some(price)
}

/// Open / close fee for `size_delta_usd`.
#[must_use]
pub fn position_fee_usd(size_delta_usd: Decimal, fee_factor: Decimal) -> Decimal {
    size_delta_usd * fee_factor
}

/// Borrowing fee accrued since the position last settled.
#[must_use]
pub fn pending_borrowing_fee_usd(
    size_usd: Decimal,
    cumulative_factor: Decimal,
    position_factor: Decimal,
) -> Decimal {
    if cumulative_factor <= position_factor {
        return Decimal::ZERO;
    }
    size_usd * (cumulative_factor - position_factor)
}

/// Hourly funding rates `(long, short)`; positive pays, negative receives.
///
/// The larger side pays `funding_factor * diff^exponent / total` per second;
/// the smaller side receives the same USD amount spread over its size.
#[must_use]
pub fn funding_rates_per_hour(
    long_oi_usd: Decimal,
    short_oi_usd: Decimal,
    funding_factor: Decimal,
    funding_exponent: Decimal,
) -> (Decimal, Decimal) {
    let total = long_oi_usd + short_oi_usd;
    if total.is_zero() || long_oi_usd == short_oi_usd {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let diff = (long_oi_usd - short_oi_usd).abs();
    let paying_rate = funding_factor * apply_exponent(diff, funding_exponent) / total * SECONDS_PER_HOUR;

    let (larger, smaller) = if long_oi_usd > short_oi_usd {
        (long_oi_usd, short_oi_usd)
    } else {
        (short_oi_usd, long_oi_usd)
    };
    let receiving_rate = if smaller.is_zero() {
        Decimal::ZERO
    } else {
        -(paying_rate * larger / smaller)
    };

    if long_oi_usd > short_oi_usd {
        (paying_rate, receiving_rate)
    } else {
        (receiving_rate, paying_rate)
    }
}

/// Hourly borrowing rate for one side: `factor * oi^exponent / pool`.
#[must_use]
pub fn borrowing_rate_per_hour(
    borrowing_factor: Decimal,
    borrowing_exponent: Decimal,
    open_interest_usd: Decimal,
    pool_usd: Decimal,
) -> Decimal {
    if pool_usd <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    borrowing_factor * apply_exponent(open_interest_usd, borrowing_exponent) / pool_usd * SECONDS_PER_HOUR
}

/// `value^exponent`; an exponent of zero is treated as one (unset in DataStore).
fn apply_exponent(value: Decimal, exponent: Decimal) -> Decimal {
    if exponent.is_zero() || exponent == Decimal::ONE {
        return value;
    }
    value.checked_powd(exponent).unwrap_or(value)
}
