// src/rpc/mod.rs

pub mod endpoint_pool;
pub mod errors;
pub mod resilient_client;
pub mod transport;

pub use endpoint_pool::{EndpointPoolConfig, RpcEndpointPool, RpcEndpointStats};
pub use errors::{ErrorClass, RpcError};
pub use resilient_client::SolanaRpcTransport;
pub use transport::{
    Commitment, LatestBlockhash, ProgramAccountFilter, RpcTransport, SendOptions, SignatureStatus,
    SimulationOutcome,
};
