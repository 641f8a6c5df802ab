// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_collect,
        clippy::default_trait_access
    )
)]

//! Perp Adapters - unified access to decentralized perpetuals venues.
//!
//! # Architecture
//!
//! - **Domain**: venue-neutral value objects (markets, orders, positions,
//!   previews, router outputs)
//! - **Application**: the `PerpsAdapter` port, the consolidated
//!   `AdapterRouter` and shared pre-trade validation
//! - **Infrastructure**: HTTP and EVM transports, the memoizing cache and one
//!   adapter per venue
//!   - `gmx_v2`: ExchangeRouter multicall transactions
//!   - `perennial`: MultiInvoker transactions
//!   - `orderly`: REST orders, EIP-712 account actions, vault deposits
//!   - `aevo`: REST orders signed with EIP-712
//!
//! Writes never broadcast anything: on-chain venues return unsigned
//! transactions, off-chain venues return typed data to sign or the venue's
//! acknowledgement.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - value objects shared by every adapter.
pub mod domain;

/// Application layer - adapter port, router and validation.
pub mod application;

/// Infrastructure layer - transports and venue adapters.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Error types.
pub mod error;

/// Prometheus metrics.
pub mod observability;

/// Tracing subscriber setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::{AdapterResult, AdapterRouter, Aggregated, PerpsAdapter, ProtocolFailure};
pub use config::{Config, ConfigError, load_config, load_config_from_string};
pub use domain::{
    AccountInfo, CancelOrder, Chain, ClosePosition, CloseTradePreview, CreateOrder, MarketId, MarketInfo,
    MarketState, OpenTradePreview, OrderInfo, OrderType, PositionInfo, ProtocolId, RouterOutput, Side,
    UpdateOrder, UpdatePositionMargin,
};
pub use error::{AdapterError, HttpError};
pub use infrastructure::protocols::{AevoAdapter, GmxV2Adapter, OrderlyAdapter, PerennialAdapter, build_router};
