//! Orderly: cross-margined order book behind a signed REST API.

mod adapter;
pub mod api_types;
pub mod auth;
pub mod config;
pub mod typed_data;

pub use adapter::OrderlyAdapter;
pub use config::OrderlyConfig;
