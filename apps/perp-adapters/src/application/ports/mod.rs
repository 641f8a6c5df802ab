//! Ports - interfaces for the venues the router talks to.

mod adapter_port;

pub use adapter_port::{AdapterResult, PerpsAdapter, ensure_paired};

#[cfg(test)]
pub use adapter_port::MockPerpsAdapter;
