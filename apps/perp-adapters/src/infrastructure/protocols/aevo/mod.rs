//! Aevo perpetuals.

mod adapter;
pub mod api_types;
pub mod auth;
pub mod config;
pub mod typed_data;

pub use adapter::AevoAdapter;
pub use config::AevoConfig;
