//! Pre-trade validation shared by all adapters.
//!
//! Venue-specific limits come in through [`MarketInfo`]; the checks here are
//! the ones every venue applies before accepting an order.

use rust_decimal::Decimal;

use crate::domain::{ClosePosition, CreateOrder, MarketInfo, PositionInfo, UpdatePositionMargin};
use crate::error::AdapterError;

/// Validate an open / increase order against market limits.
///
/// `price` is the reference price used to convert between USD and tokens;
/// `margin_usd` is the USD value of `order.margin_delta`.
pub fn validate_create_order(
    order: &CreateOrder,
    market: &MarketInfo,
    price: Decimal,
    margin_usd: Decimal,
) -> Result<(), AdapterError> {
    if order.size_delta <= Decimal::ZERO && order.margin_delta <= Decimal::ZERO {
        return Err(AdapterError::Validation(
            "order must change size or margin".to_string(),
        ));
    }

    if order.size_delta < Decimal::ZERO || order.margin_delta < Decimal::ZERO {
        return Err(AdapterError::Validation(
            "size and margin deltas must not be negative".to_string(),
        ));
    }

    if order.order_type.requires_trigger() {
        match order.trigger_price {
            Some(p) if p > Decimal::ZERO => {}
            _ => {
                return Err(AdapterError::Validation(format!(
                    "{:?} order requires a positive trigger price",
                    order.order_type
                )));
            }
        }
    } else if order.trigger_price.is_some() {
        return Err(AdapterError::Validation(
            "market orders must not carry a trigger price".to_string(),
        ));
    }

    if order.order_type.requires_trigger() && !market.supports_limit_orders {
        return Err(AdapterError::Validation(format!(
            "{} does not accept {:?} orders",
            market.market_id, order.order_type
        )));
    }

    validate_slippage(order.slippage)?;

    let size_usd = order.size_usd_at(price);
    if size_usd > Decimal::ZERO && size_usd < market.min_position_size_usd {
        return Err(AdapterError::Validation(format!(
            "position size {size_usd} USD is below the minimum {} USD",
            market.min_position_size_usd
        )));
    }

    if margin_usd > Decimal::ZERO {
        if margin_usd < market.min_initial_margin_usd {
            return Err(AdapterError::Validation(format!(
                "margin {margin_usd} USD is below the minimum {} USD",
                market.min_initial_margin_usd
            )));
        }

        if size_usd > Decimal::ZERO {
            let leverage = size_usd / margin_usd;
            if leverage > market.max_leverage {
                return Err(AdapterError::Validation(format!(
                    "leverage {leverage:.2}x exceeds maximum {}x",
                    market.max_leverage
                )));
            }
            if leverage < market.min_leverage {
                return Err(AdapterError::Validation(format!(
                    "leverage {leverage:.2}x is below minimum {}x",
                    market.min_leverage
                )));
            }
        }
    }

    Ok(())
}

/// Slippage must be a fraction strictly between 0 and 1.
pub fn validate_slippage(slippage: Decimal) -> Result<(), AdapterError> {
    if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
        return Err(AdapterError::Validation(format!(
            "slippage {slippage} must be between 0 and 1"
        )));
    }
    Ok(())
}

/// Fail with [`AdapterError::InsufficientBalance`] when `available < required`.
pub fn ensure_sufficient_balance(
    token: &str,
    required: Decimal,
    available: Decimal,
) -> Result<(), AdapterError> {
    if available < required {
        return Err(AdapterError::InsufficientBalance {
            token: token.to_string(),
            required: required.to_string(),
            available: available.to_string(),
        });
    }
    Ok(())
}

/// Validate a close against the position it reduces.
pub fn validate_close(close: &ClosePosition, position: &PositionInfo) -> Result<(), AdapterError> {
    if close.close_size <= Decimal::ZERO {
        return Err(AdapterError::Validation(
            "close size must be positive".to_string(),
        ));
    }
    if close.close_size > position.size_tokens {
        return Err(AdapterError::Validation(format!(
            "close size {} exceeds position size {}",
            close.close_size, position.size_tokens
        )));
    }
    if close.order_type.requires_trigger() && close.trigger_price.is_none() {
        return Err(AdapterError::Validation(format!(
            "{:?} close requires a trigger price",
            close.order_type
        )));
    }
    validate_slippage(close.slippage)
}

/// Validate a margin update against the position it modifies.
pub fn validate_margin_update(
    update: &UpdatePositionMargin,
    position: &PositionInfo,
) -> Result<(), AdapterError> {
    if update.margin_delta <= Decimal::ZERO {
        return Err(AdapterError::Validation(
            "margin delta must be positive".to_string(),
        ));
    }
    if !update.is_deposit && update.margin_delta >= position.margin_usd {
        return Err(AdapterError::Validation(format!(
            "cannot withdraw {} from margin of {}",
            update.margin_delta, position.margin_usd
        )));
    }
    Ok(())
}
