//! # Memory Management
//!
//! Generational arenas and recycling pools.
//!
//! ## Design Philosophy
//!
//! Objects are created once and recycled. During gameplay:
//! - Released objects go back on a free list instead of being dropped
//! - Every slot carries a generation so stale handles resolve to nothing
//! - Growth past the configured capacity is allowed but always reported

mod arena;
mod pool;

pub use arena::{SlotArena, SlotHandle};
pub use pool::{
    Acquired, ObjectPool, OverflowPolicy, PoolConfig, PoolError, PoolHandle, PoolStats, Released,
};
