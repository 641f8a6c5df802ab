//! Perennial v2: on-chain markets settled through the MultiInvoker.

mod adapter;
pub mod config;
pub mod contracts;
pub mod math;

pub use adapter::PerennialAdapter;
pub use config::{PerennialConfig, PerennialMarketConfig};
