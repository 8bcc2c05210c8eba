//! # EMBER Core
//!
//! The kernel underneath the effect engine:
//! - Generational storage so recycled objects invalidate old handles
//! - Bounded object pools that never fail to hand out an object
//! - A frame clock and timer queue so "waiting" is data, not a blocked thread
//!
//! ## Architecture Rules
//!
//! 1. **No allocation in steady state** - pools recycle, arenas reuse slots
//! 2. **Handles, never pointers** - every back-reference is a generational id
//! 3. **Tick time only** - nothing in here reads the wall clock
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_core::{ObjectPool, PoolConfig};
//!
//! let mut pool: ObjectPool<Vec<u8>> = ObjectPool::new(PoolConfig::with_capacity(8));
//! let acquired = pool.acquire_with(Vec::new);
//! pool.release(acquired.handle)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod memory;
pub mod time;

pub use memory::{
    Acquired, ObjectPool, OverflowPolicy, PoolConfig, PoolError, PoolHandle, PoolStats, Released,
    SlotArena, SlotHandle,
};
pub use time::{FrameClock, TimerId, TimerQueue, TIME_EPSILON};
