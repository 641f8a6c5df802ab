//! Orderly REST request and response types.
//!
//! Every response is wrapped in `{ "success": bool, "data": T }`; failures
//! carry `code` and `message` instead of `data`. Numbers arrive as JSON
//! numbers, so request bodies serialize decimals as floats too.

use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, HttpError};

/// Response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload or turn the venue error into [`HttpError::Api`].
    pub fn into_data(self) -> Result<T, AdapterError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(HttpError::Api {
                status: 200,
                code: self.code.map_or_else(|| "UNKNOWN".to_string(), |c| c.to_string()),
                message: self.message.unwrap_or_else(|| "missing data".to_string()),
            }
            .into()),
        }
    }
}

/// `{ rows: [...] }` list payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Rows<T> {
    /// Entries.
    pub rows: Vec<T>,
}

// ============================================================================
// Public
// ============================================================================

/// `/v1/public/info` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    /// `PERP_<BASE>_USDC`.
    pub symbol: String,
    /// Price tick.
    pub quote_tick: Decimal,
    /// Minimum order quantity.
    pub base_min: Decimal,
    /// Quantity step.
    pub base_tick: Decimal,
    /// Minimum notional.
    #[serde(default)]
    pub min_notional: Decimal,
    /// Base initial margin ratio (1 / max leverage).
    pub base_imr: Decimal,
    /// Base maintenance margin ratio.
    pub base_mmr: Decimal,
    /// Initial margin growth factor for large positions.
    #[serde(default)]
    pub imr_factor: Decimal,
}

impl SymbolInfo {
    /// Base asset of `PERP_ETH_USDC` is `ETH`.
    #[must_use]
    pub fn base(&self) -> &str {
        self.symbol.split('_').nth(1).unwrap_or(&self.symbol)
    }

    /// Initial margin ratio at `notional_usd`:
    /// `max(base_imr, imr_factor * notional^0.8)`.
    #[must_use]
    pub fn initial_margin_ratio(&self, notional_usd: Decimal) -> Decimal {
        self.base_imr.max(self.imr_factor * scaled_notional(notional_usd))
    }

    /// Maintenance margin ratio at `notional_usd`, scaled like the initial
    /// ratio by `base_mmr / base_imr`.
    #[must_use]
    pub fn maintenance_margin_ratio(&self, notional_usd: Decimal) -> Decimal {
        if self.base_imr.is_zero() {
            return self.base_mmr;
        }
        let scaled = self.base_mmr / self.base_imr * self.imr_factor * scaled_notional(notional_usd);
        self.base_mmr.max(scaled)
    }
}

fn scaled_notional(notional_usd: Decimal) -> Decimal {
    const EXPONENT: Decimal = Decimal::from_parts(8, 0, 0, false, 1);
    if notional_usd <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    notional_usd.checked_powd(EXPONENT).unwrap_or(Decimal::MAX)
}

/// `/v1/public/futures` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FuturesInfo {
    /// Symbol.
    pub symbol: String,
    /// Index price.
    pub index_price: Decimal,
    /// Mark price.
    pub mark_price: Decimal,
    /// Estimated funding rate for the current 8h period.
    #[serde(default)]
    pub est_funding_rate: Decimal,
    /// Open interest in base units.
    #[serde(default)]
    pub open_interest: Decimal,
}

/// `/v1/registration_nonce`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationNonce {
    /// Nonce as a decimal string.
    pub registration_nonce: String,
}

/// `/v1/get_account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountLookup {
    /// Account id.
    pub account_id: String,
}

/// `/v1/get_orderly_key`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderlyKeyInfo {
    /// Expiration (ms).
    #[serde(default)]
    pub expiration: Option<u64>,
    /// Key scope.
    #[serde(default)]
    pub scope: Option<String>,
}

// ============================================================================
// Private
// ============================================================================

/// `/v1/withdraw_nonce`.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawNonce {
    /// Next nonce.
    pub withdraw_nonce: u64,
}

/// `/v1/positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionsData {
    /// Free collateral (USD).
    pub free_collateral: Decimal,
    /// Total collateral (USD).
    pub total_collateral_value: Decimal,
    /// Margin ratio including open orders.
    #[serde(default)]
    pub current_margin_ratio_with_orders: Option<Decimal>,
    /// Positions.
    pub rows: Vec<PositionRow>,
}

/// One position.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionRow {
    /// Symbol.
    pub symbol: String,
    /// Signed quantity (negative for shorts).
    pub position_qty: Decimal,
    /// Average open price.
    pub average_open_price: Decimal,
    /// Mark price.
    pub mark_price: Decimal,
    /// Estimated liquidation price (0 when not computable).
    #[serde(default)]
    pub est_liq_price: Decimal,
    /// Unsettled PnL.
    #[serde(default)]
    pub unsettled_pnl: Decimal,
    /// Initial margin ratio for this position.
    pub imr: Decimal,
    /// Maintenance margin ratio.
    pub mmr: Decimal,
}

/// `/v1/orders` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    /// Order id.
    pub order_id: u64,
    /// Symbol.
    pub symbol: String,
    /// `BUY` / `SELL`.
    pub side: String,
    /// `LIMIT`, `MARKET`, `POST_ONLY`, ...
    #[serde(rename = "type")]
    pub order_type: String,
    /// Limit price.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Quantity.
    pub quantity: Decimal,
    /// Executed quantity.
    #[serde(default)]
    pub executed: Decimal,
    /// Reduce only.
    #[serde(default)]
    pub reduce_only: bool,
    /// Creation time (ms).
    #[serde(default)]
    pub created_time: Option<i64>,
}

/// `/v1/algo/orders` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgoOrderRow {
    /// Algo order id.
    pub algo_order_id: u64,
    /// Symbol.
    pub symbol: String,
    /// `BUY` / `SELL`.
    pub side: String,
    /// Quantity.
    pub quantity: Decimal,
    /// Trigger price.
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
    /// Reduce only.
    #[serde(default)]
    pub reduce_only: bool,
    /// Creation time (ms).
    #[serde(default)]
    pub created_time: Option<i64>,
}

/// `/v1/client/holding`.
#[derive(Debug, Clone, Deserialize)]
pub struct HoldingData {
    /// Token balances.
    pub holding: Vec<Holding>,
}

/// Balance of one token.
#[derive(Debug, Clone, Deserialize)]
pub struct Holding {
    /// Token.
    pub token: String,
    /// Balance.
    pub holding: Decimal,
    /// Locked by withdrawals and orders.
    #[serde(default)]
    pub frozen: Decimal,
}

/// `POST /v1/order` body.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    /// Symbol.
    pub symbol: String,
    /// `MARKET` / `LIMIT`.
    pub order_type: &'static str,
    /// Limit price.
    #[serde(with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub order_price: Option<Decimal>,
    /// Quantity in base units.
    #[serde(with = "rust_decimal::serde::float")]
    pub order_quantity: Decimal,
    /// `BUY` / `SELL`.
    pub side: &'static str,
    /// Reduce only.
    pub reduce_only: bool,
    /// Client order id.
    pub client_order_id: String,
}

/// `PUT /v1/order` body.
#[derive(Debug, Clone, Serialize)]
pub struct EditOrder {
    /// Order id.
    pub order_id: String,
    /// Symbol.
    pub symbol: String,
    /// `LIMIT`.
    pub order_type: &'static str,
    /// New price.
    #[serde(with = "rust_decimal::serde::float")]
    pub order_price: Decimal,
    /// New quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub order_quantity: Decimal,
    /// `BUY` / `SELL`.
    pub side: &'static str,
}

/// `POST /v1/algo/order` body (stop market).
#[derive(Debug, Clone, Serialize)]
pub struct NewAlgoOrder {
    /// Symbol.
    pub symbol: String,
    /// `STOP`.
    pub algo_type: &'static str,
    /// `MARKET`.
    #[serde(rename = "type")]
    pub order_type: &'static str,
    /// `BUY` / `SELL`.
    pub side: &'static str,
    /// Quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// Trigger price.
    #[serde(with = "rust_decimal::serde::float")]
    pub trigger_price: Decimal,
    /// Reduce only.
    pub reduce_only: bool,
}

/// `PUT /v1/algo/order` body.
#[derive(Debug, Clone, Serialize)]
pub struct EditAlgoOrder {
    /// Algo order id.
    pub order_id: String,
    /// New quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// New trigger price.
    #[serde(with = "rust_decimal::serde::float")]
    pub trigger_price: Decimal,
}

/// `POST /v1/order` response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreated {
    /// Order id.
    pub order_id: u64,
}

/// `POST /v1/algo/order` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgoOrderCreated {
    /// Created orders.
    pub rows: Vec<AlgoOrderId>,
}

/// Id of a created algo order.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgoOrderId {
    /// Order id.
    pub order_id: u64,
}

/// Response whose payload is not used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    /// Status reported by the venue.
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_failure_becomes_api_error() {
        let env: Envelope<Ack> =
            serde_json::from_str(r#"{"success":false,"code":-1003,"message":"rate limited"}"#).unwrap();
        let err = env.into_data().unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(err.to_string().contains("-1003"));
    }

    #[test]
    fn parses_numeric_fields() {
        let info: SymbolInfo = serde_json::from_str(
            r#"{"symbol":"PERP_ETH_USDC","quote_tick":0.01,"base_min":0.001,"base_tick":0.001,
                "min_notional":10,"base_imr":0.02,"base_mmr":0.012,"imr_factor":0.0000003754}"#,
        )
        .unwrap();
        assert_eq!(info.base(), "ETH");
        assert_eq!(info.base_imr, dec!(0.02));
        assert_eq!(info.quote_tick, dec!(0.01));
    }

    #[test]
    fn margin_ratios_grow_with_notional() {
        let info = SymbolInfo {
            symbol: "PERP_BTC_USDC".to_string(),
            quote_tick: dec!(0.1),
            base_min: dec!(0.00001),
            base_tick: dec!(0.00001),
            min_notional: dec!(10),
            base_imr: dec!(0.02),
            base_mmr: dec!(0.012),
            imr_factor: dec!(0.0000002512),
        };
        assert_eq!(info.initial_margin_ratio(dec!(1000)), dec!(0.02));
        assert_eq!(info.maintenance_margin_ratio(dec!(1000)), dec!(0.012));

        let large = dec!(100_000_000);
        assert!(info.initial_margin_ratio(large) > dec!(0.02));
        assert!(info.maintenance_margin_ratio(large) > dec!(0.012));
        assert!(info.maintenance_margin_ratio(large) < info.initial_margin_ratio(large));
    }

    #[test]
    fn order_body_uses_numbers() {
        let body = NewOrder {
            symbol: "PERP_ETH_USDC".to_string(),
            order_type: "LIMIT",
            order_price: Some(dec!(2000.5)),
            order_quantity: dec!(0.25),
            side: "BUY",
            reduce_only: false,
            client_order_id: "abc".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["order_price"], 2000.5);
        assert_eq!(json["order_quantity"], 0.25);

        let market = NewOrder { order_price: None, order_type: "MARKET", ..body };
        let json = serde_json::to_value(&market).unwrap();
        assert!(json.get("order_price").is_none());
    }
}
