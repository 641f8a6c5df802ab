//! GMX v2 synthetics: Reader / DataStore reads, ExchangeRouter order
//! transactions, REST tickers.

mod adapter;
pub mod api_types;
pub mod config;
pub mod contracts;
pub mod keys;
pub mod math;

pub use adapter::GmxV2Adapter;
pub use config::{ExecutionFeeConfig, GmxV2Config, GmxV2Contracts};
