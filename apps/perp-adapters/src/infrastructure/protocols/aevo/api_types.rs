//! Aevo REST types. Numeric fields arrive as decimal strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `/markets` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Market {
    /// Numeric instrument id (as a string).
    pub instrument_id: String,
    /// `ETH-PERP`.
    pub instrument_name: String,
    /// `PERPETUAL`, `OPTION`, ...
    pub instrument_type: String,
    /// Underlying asset.
    pub underlying_asset: String,
    /// Price step.
    pub price_step: Decimal,
    /// Amount step.
    pub amount_step: Decimal,
    /// Minimum order value (USD).
    #[serde(default)]
    pub min_order_value: Decimal,
    /// Maximum leverage, when reported.
    #[serde(default)]
    pub max_leverage: Option<Decimal>,
    /// Mark price.
    pub mark_price: Decimal,
    /// Index price.
    #[serde(default)]
    pub index_price: Option<Decimal>,
    /// Whether the market trades.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

/// `/funding` response.
#[derive(Debug, Clone, Deserialize)]
pub struct Funding {
    /// Hourly funding rate.
    pub funding_rate: Decimal,
}

/// `/account` response.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// Account address.
    pub account: String,
    /// Equity (USD).
    pub equity: Decimal,
    /// Balance available for new orders and withdrawals.
    pub available_balance: Decimal,
    /// Initial margin in use.
    #[serde(default)]
    pub initial_margin: Decimal,
    /// Maintenance margin in use.
    #[serde(default)]
    pub maintenance_margin: Decimal,
    /// Open positions.
    #[serde(default)]
    pub positions: Vec<AccountPosition>,
    /// Collateral balances.
    #[serde(default)]
    pub collaterals: Vec<Collateral>,
}

/// One position inside `/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPosition {
    /// Instrument name.
    pub instrument_name: String,
    /// `PERPETUAL`, `OPTION`, ...
    pub instrument_type: String,
    /// `buy` / `sell`.
    pub side: String,
    /// Size in base units.
    pub amount: Decimal,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Mark price.
    pub mark_price: Decimal,
    /// Liquidation price.
    #[serde(default)]
    pub liquidation_price: Option<Decimal>,
    /// Unrealized PnL.
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    /// Isolated margin, when isolated.
    #[serde(default)]
    pub isolated_margin: Option<Decimal>,
}

/// Collateral balance.
#[derive(Debug, Clone, Deserialize)]
pub struct Collateral {
    /// Asset symbol.
    pub collateral_asset: String,
    /// Balance.
    pub balance: Decimal,
    /// Available balance.
    #[serde(default)]
    pub available_balance: Option<Decimal>,
}

/// `/orders` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrder {
    /// Order id.
    pub order_id: String,
    /// Instrument name.
    pub instrument_name: String,
    /// `buy` / `sell`.
    pub side: String,
    /// `limit` / `market`.
    pub order_type: String,
    /// Limit price.
    pub price: Decimal,
    /// Amount.
    pub amount: Decimal,
    /// Filled amount.
    #[serde(default)]
    pub filled: Decimal,
    /// Reduce only.
    #[serde(default)]
    pub reduce_only: bool,
    /// `STOP_LOSS` / `TAKE_PROFIT` for trigger orders.
    #[serde(default)]
    pub stop: Option<String>,
    /// Trigger price.
    #[serde(default)]
    pub trigger: Option<Decimal>,
    /// Creation time, nanoseconds.
    #[serde(default)]
    pub created_timestamp: Option<String>,
}

/// `POST /orders` body.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    /// Account.
    pub maker: String,
    /// Buy or sell.
    pub is_buy: bool,
    /// Numeric instrument id.
    pub instrument: String,
    /// Limit price, 6-decimal integer string.
    pub limit_price: String,
    /// Amount, 6-decimal integer string.
    pub amount: String,
    /// Salt used in the signature.
    pub salt: String,
    /// Order signature.
    pub signature: String,
    /// Unix seconds used in the signature.
    pub timestamp: String,
    /// Post only.
    pub post_only: bool,
    /// Reduce only.
    pub reduce_only: bool,
    /// `GTC` / `IOC`.
    pub time_in_force: &'static str,
    /// `STOP_LOSS` / `TAKE_PROFIT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'static str>,
    /// Trigger price, 6-decimal integer string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

/// Order id in create and cancel responses.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    /// Order id.
    pub order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_string_numbers() {
        let market: Market = serde_json::from_str(
            r#"{"instrument_id":"1","instrument_name":"ETH-PERP","instrument_type":"PERPETUAL",
                "underlying_asset":"ETH","price_step":"0.01","amount_step":"0.01",
                "min_order_value":"10","mark_price":"2012.345"}"#,
        )
        .unwrap();
        assert_eq!(market.mark_price, dec!(2012.345));
        assert!(market.is_active);
        assert!(market.max_leverage.is_none());
    }

    #[test]
    fn stop_fields_are_omitted_for_plain_orders() {
        let body = NewOrder {
            maker: "0x0".to_string(),
            is_buy: true,
            instrument: "1".to_string(),
            limit_price: "2000000000".to_string(),
            amount: "1000000".to_string(),
            salt: "1".to_string(),
            signature: "0x".to_string(),
            timestamp: "1".to_string(),
            post_only: false,
            reduce_only: false,
            time_in_force: "GTC",
            stop: None,
            trigger: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["limit_price"], "2000000000");
    }
}
