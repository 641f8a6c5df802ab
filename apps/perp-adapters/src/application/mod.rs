//! Application layer - the adapter port, the router and shared validation.

pub mod ports;
pub mod router;
pub mod validation;

pub use ports::{AdapterResult, PerpsAdapter};
pub use router::{AdapterRouter, Aggregated, ProtocolFailure};
