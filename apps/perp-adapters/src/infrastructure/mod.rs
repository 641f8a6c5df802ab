//! Infrastructure: transports, caches and the venue adapters.

pub mod cache;
pub mod evm;
pub mod http;
pub mod protocols;

pub use cache::{CachePolicy, TimedCache};
