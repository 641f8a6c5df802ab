//! EVM plumbing: fixed-point units, JSON-RPC reads, Multicall3, ERC-20 and
//! EIP-712.

pub mod eip712;
pub mod erc20;
pub mod multicall;
pub mod rpc;
pub mod units;

pub use eip712::{LocalSigner, typed_data_payload};
pub use multicall::{MULTICALL3_ADDRESS, MulticallBatch, MulticallResults};
pub use rpc::RpcClient;
pub use units::{from_units, from_units_signed, to_units, to_units_signed};
