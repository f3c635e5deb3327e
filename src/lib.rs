// src/lib.rs

// Le coeur du trader Raydium V4 : décodage, RPC, pricing, exécution, stratégies.
// Le binaire `trader` se contente de câbler ces modules.
pub mod config;
pub mod data_pipeline;
pub mod decoders;
pub mod execution;
pub mod math;
pub mod monitoring;
pub mod rpc;
pub mod state;
pub mod strategies;

#[cfg(test)]
pub(crate) mod testing;
