// src/state/mod.rs

pub mod pool_cache;

pub use pool_cache::{CacheConfig, CacheEntry, PoolCache};
