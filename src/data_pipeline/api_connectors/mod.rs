pub mod pool_index;

pub use pool_index::{HttpPoolIndex, IndexError, IndexedPool, PoolIndex};
