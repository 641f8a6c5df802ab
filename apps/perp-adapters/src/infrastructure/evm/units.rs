//! Decimal <-> fixed-point integer conversion.
//!
//! Contract values carry an implied number of decimals: 6 for USDC, 18 for
//! most ERC-20s, 30 for GMX USD amounts. `Decimal` holds at most 28 fractional
//! digits, so fractions beyond [`MAX_FRACTION_DIGITS`] are truncated when
//! reading.

use alloy_primitives::{I256, Sign, U256};
use rust_decimal::Decimal;

use crate::error::AdapterError;

/// Fractional digits kept when converting fixed-point values to `Decimal`.
pub const MAX_FRACTION_DIGITS: u32 = 18;

/// `10^exp` as `U256`.
#[must_use]
pub fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Scale a non-negative decimal to an integer with `decimals` implied digits.
/// Digits beyond `decimals` are truncated.
pub fn to_units(value: Decimal, decimals: u8) -> Result<U256, AdapterError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AdapterError::Conversion(format!(
            "cannot convert negative amount {value} to unsigned units"
        )));
    }
    Ok(scale_mantissa(value, decimals))
}

/// Signed variant of [`to_units`].
pub fn to_units_signed(value: Decimal, decimals: u8) -> Result<I256, AdapterError> {
    let abs = scale_mantissa(value.abs(), decimals);
    let sign = if value.is_sign_negative() && !value.is_zero() {
        Sign::Negative
    } else {
        Sign::Positive
    };
    I256::checked_from_sign_and_abs(sign, abs)
        .ok_or_else(|| AdapterError::Conversion(format!("{value} overflows int256")))
}

/// Read an integer with `decimals` implied digits as a decimal.
pub fn from_units(value: U256, decimals: u8) -> Result<Decimal, AdapterError> {
    let base = pow10(u32::from(decimals));
    let whole = value / base;
    let mut fraction = value % base;
    let mut scale = u32::from(decimals);
    if scale > MAX_FRACTION_DIGITS {
        fraction /= pow10(scale - MAX_FRACTION_DIGITS);
        scale = MAX_FRACTION_DIGITS;
    }

    let whole = u128::try_from(whole)
        .ok()
        .and_then(|w| i128::try_from(w).ok())
        .and_then(|w| Decimal::try_from_i128_with_scale(w, 0).ok())
        .ok_or_else(|| AdapterError::Conversion(format!("{value} is too large for a decimal")))?;
    let fraction = u128::try_from(fraction)
        .ok()
        .and_then(|f| i128::try_from(f).ok())
        .and_then(|f| Decimal::try_from_i128_with_scale(f, scale).ok())
        .ok_or_else(|| AdapterError::Conversion(format!("{value} fraction out of range")))?;

    whole
        .checked_add(fraction)
        .map(|d| d.normalize())
        .ok_or_else(|| AdapterError::Conversion(format!("{value} is too large for a decimal")))
}

/// Signed variant of [`from_units`].
pub fn from_units_signed(value: I256, decimals: u8) -> Result<Decimal, AdapterError> {
    let magnitude = from_units(value.unsigned_abs(), decimals)?;
    Ok(if value.is_negative() {
        -magnitude
    } else {
        magnitude
    })
}

/// Convert a token price to GMX's 30-decimal per-unit price
/// (`price * 10^(30 - token_decimals)`).
pub fn to_gmx_price(price: Decimal, token_decimals: u8) -> Result<U256, AdapterError> {
    to_units(price, 30u8.saturating_sub(token_decimals))
}

/// Inverse of [`to_gmx_price`].
pub fn from_gmx_price(price: U256, token_decimals: u8) -> Result<Decimal, AdapterError> {
    from_units(price, 30u8.saturating_sub(token_decimals))
}

fn scale_mantissa(value: Decimal, decimals: u8) -> U256 {
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    let decimals = u32::from(decimals);
    if decimals >= scale {
        mantissa * pow10(decimals - scale)
    } else {
        mantissa / pow10(scale - decimals)
    }
}
