//! Domain layer - the common shape every adapter maps into.
//!
//! Plain value objects with no I/O. Amounts are `rust_decimal::Decimal`;
//! adapters convert to venue fixed-point at the boundary.

pub mod account;
pub mod market;
pub mod order;
pub mod output;
pub mod position;
pub mod preview;
pub mod protocol;

pub use account::{AccountInfo, TokenBalance};
pub use market::{MarketInfo, MarketState, TokenInfo};
pub use order::{CancelOrder, CreateOrder, OrderInfo, OrderStatus, OrderType, Side, UpdateOrder};
pub use output::{Eip712Payload, RouterOutput, UnsignedTx};
pub use position::{ClosePosition, PositionInfo, UpdatePositionMargin, unrealized_pnl};
pub use preview::{CloseTradePreview, MarginPreview, OpenTradePreview};
pub use protocol::{Chain, MarketId, ProtocolId};
