// src/data_pipeline/mod.rs

// Découverte des pools : index HTTP, scan on-chain, et le résolveur qui fusionne les deux.
pub mod api_connectors;
pub mod onchain_scanner;
pub mod pool_resolver;
