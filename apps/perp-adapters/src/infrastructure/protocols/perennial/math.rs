//! Perennial v2 margin math.

use rust_decimal::Decimal;

use crate::domain::Side;
use crate::infrastructure::protocols::common::linear_liquidation_price;

const HOURS_PER_YEAR: Decimal = Decimal::from_parts(8760, 0, 0, false, 0);

/// `|size| * price / collateral`, zero when collateral is not positive.
#[must_use]
pub fn leverage(size_tokens: Decimal, price: Decimal, collateral: Decimal) -> Decimal {
    if collateral <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    size_tokens.abs() * price / collateral
}

/// Collateral a position must hold: `max(|size| * price * ratio, floor)`.
///
/// With the maintenance ratio this is the liquidation threshold; with the
/// margin ratio it is the requirement for opening or increasing.
#[must_use]
pub fn requirement_usd(size_tokens: Decimal, price: Decimal, ratio: Decimal, floor: Decimal) -> Decimal {
    if size_tokens.is_zero() {
        return Decimal::ZERO;
    }
    (size_tokens.abs() * price * ratio).max(floor)
}

/// Price at which `collateral` falls to the maintenance requirement.
#[must_use]
pub fn liquidation_price(
    side: Side,
    size_tokens: Decimal,
    price: Decimal,
    collateral: Decimal,
    maintenance: Decimal,
) -> Option<Decimal> {
    linear_liquidation_price(side, size_tokens.abs(), price, collateral, maintenance)
}

/// Hourly funding `(long, short)` from the annualized `pAccumulator` value.
///
/// A positive rate means longs pay. The receiving side gets the same USD
/// amount spread over its own open interest.
#[must_use]
pub fn funding_rates_per_hour(
    annual_rate: Decimal,
    long_oi_usd: Decimal,
    short_oi_usd: Decimal,
) -> (Decimal, Decimal) {
    let hourly = annual_rate / HOURS_PER_YEAR;
    if hourly.is_zero() {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    if hourly > Decimal::ZERO {
        let short = if short_oi_usd.is_zero() {
            Decimal::ZERO
        } else {
            -hourly * long_oi_usd / short_oi_usd
        };
        (hourly, short)
    } else {
        let long = if long_oi_usd.is_zero() {
            Decimal::ZERO
        } else {
            hourly * short_oi_usd / long_oi_usd
        };
        (long, -hourly)
    }
}
