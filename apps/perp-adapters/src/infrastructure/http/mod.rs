//! REST transport shared by the off-chain venues.

mod auth;
mod client;
mod retry;

pub use auth::{NoAuth, RequestAuth};
pub use client::{HttpClientConfig, JsonHttpClient};
pub use retry::{Backoff, RetryConfig, StatusClass, classify, duration_ms, is_idempotent, retry_after};
