//! # Object Pool
//!
//! Recycling pool for objects that are expensive to build and cheap to reset.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by [`ObjectPool`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The handle's generation no longer matches its slot.
    #[error("stale pool handle: slot {index} generation {generation}")]
    StaleHandle {
        /// Slot index.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },

    /// The slot exists but its object is not checked out.
    #[error("pool slot {0} is not active")]
    NotActive(u32),
}

/// What happens when a released object would push the free list past capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Hard cap: the overflowing object is handed back to the caller for destruction.
    #[default]
    DestroyOverflow,
    /// Soft cap: the object is kept and a warning is logged.
    KeepAndWarn,
}

/// Pool sizing and overflow behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Soft cap on `count_all`.
    pub capacity_max: usize,
    /// Release-time policy when the free list is full.
    pub overflow: OverflowPolicy,
}

impl PoolConfig {
    /// Default capacity for effect pools.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Config with the given capacity and the default overflow policy.
    #[must_use]
    pub const fn with_capacity(capacity_max: usize) -> Self {
        Self {
            capacity_max,
            overflow: OverflowPolicy::DestroyOverflow,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

/// Handle to an object checked out of an [`ObjectPool`].
///
/// Each release bumps the slot generation, so a handle is only valid for a
/// single acquire/release cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation this handle was issued with.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Result of [`ObjectPool::acquire_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acquired {
    /// Handle to the checked-out object.
    pub handle: PoolHandle,
    /// True if the factory ran (no idle object was available).
    pub created: bool,
    /// True if this acquire pushed the pool past `capacity_max`.
    pub over_capacity: bool,
}

/// Result of [`ObjectPool::release`].
#[derive(Debug, PartialEq, Eq)]
pub enum Released<T> {
    /// The object went back on the free list.
    Recycled,
    /// The free list was full under [`OverflowPolicy::DestroyOverflow`];
    /// the caller owns the object and must destroy it.
    Overflow(T),
}

/// Occupancy snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects currently checked out.
    pub count_active: usize,
    /// Objects idle on the free list.
    pub count_inactive: usize,
    /// Configured soft cap.
    pub capacity_max: usize,
    /// Objects built by the factory over the pool's lifetime.
    pub created: u64,
    /// Objects handed back for destruction (overflow or drain).
    pub destroyed: u64,
    /// Times the pool grew or kept objects beyond `capacity_max`.
    pub capacity_warnings: u64,
}

impl PoolStats {
    /// Active plus inactive.
    #[inline]
    #[must_use]
    pub const fn count_all(&self) -> usize {
        self.count_active + self.count_inactive
    }
}

struct PoolSlot<T> {
    generation: u32,
    value: Option<T>,
    active: bool,
}

/// Reset hook run on every released object.
pub type ResetHook<T> = Box<dyn FnMut(&mut T) + Send>;

/// A bounded recycling pool.
///
/// Objects are built lazily by a caller-supplied factory and recycled on
/// release. Unlike a fixed allocator the pool never refuses an acquire:
/// growth past `capacity_max` succeeds and is counted as a capacity warning.
///
/// An object is always in exactly one of: active set, free list, or gone.
///
/// # Thread Safety
///
/// Not thread-safe. Wrap the owner in a mutex if several threads tick it.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: ObjectPool<Vec<u8>> = ObjectPool::new(PoolConfig::with_capacity(2));
/// let a = pool.acquire_with(|| Vec::with_capacity(256));
/// pool.get_mut(a.handle).unwrap().push(1);
/// pool.release(a.handle)?;
/// ```
pub struct ObjectPool<T> {
    slots: Vec<PoolSlot<T>>,
    /// Slots holding idle objects (LIFO).
    inactive: Vec<u32>,
    /// Slots holding nothing.
    vacant: Vec<u32>,
    count_active: usize,
    config: PoolConfig,
    reset: Option<ResetHook<T>>,
    created: u64,
    destroyed: u64,
    capacity_warnings: u64,
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.capacity_max),
            inactive: Vec::with_capacity(config.capacity_max),
            vacant: Vec::new(),
            count_active: 0,
            config,
            reset: None,
            created: 0,
            destroyed: 0,
            capacity_warnings: 0,
        }
    }

    /// Installs the hook run on every object as it is released.
    #[must_use]
    pub fn with_reset(mut self, reset: impl FnMut(&mut T) + Send + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Pool configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> PoolConfig {
        self.config
    }

    /// Objects currently checked out.
    #[inline]
    #[must_use]
    pub const fn count_active(&self) -> usize {
        self.count_active
    }

    /// Objects idle on the free list.
    #[inline]
    #[must_use]
    pub fn count_inactive(&self) -> usize {
        self.inactive.len()
    }

    /// Active plus inactive.
    #[inline]
    #[must_use]
    pub fn count_all(&self) -> usize {
        self.count_active + self.inactive.len()
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            count_active: self.count_active,
            count_inactive: self.inactive.len(),
            capacity_max: self.config.capacity_max,
            created: self.created,
            destroyed: self.destroyed,
            capacity_warnings: self.capacity_warnings,
        }
    }

    /// Builds `count` idle objects up front, never exceeding `capacity_max`.
    pub fn prewarm(&mut self, count: usize, mut factory: impl FnMut() -> T) {
        let target = count.min(self.config.capacity_max);
        while self.count_all() < target {
            let index = self.store(factory(), false);
            self.inactive.push(index);
        }
    }

    /// Checks out an idle object, or builds one with `factory`.
    ///
    /// Never fails. Growing past `capacity_max` is logged and counted.
    pub fn acquire_with(&mut self, factory: impl FnOnce() -> T) -> Acquired {
        if let Some(index) = self.inactive.pop() {
            let slot = &mut self.slots[index as usize];
            slot.active = true;
            self.count_active += 1;
            return Acquired {
                handle: PoolHandle {
                    index,
                    generation: slot.generation,
                },
                created: false,
                over_capacity: false,
            };
        }

        let over_capacity = self.count_all() + 1 > self.config.capacity_max;
        if over_capacity {
            self.capacity_warnings += 1;
            tracing::warn!(
                "Pool grew past capacity: {} objects (capacity {})",
                self.count_all() + 1,
                self.config.capacity_max
            );
        }

        let index = self.store(factory(), true);
        self.count_active += 1;
        Acquired {
            handle: PoolHandle {
                index,
                generation: self.slots[index as usize].generation,
            },
            created: true,
            over_capacity,
        }
    }

    /// Returns an object to the pool.
    ///
    /// The reset hook runs first. The slot generation is bumped, so `handle`
    /// and every copy of it go stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale or the object is not checked out.
    pub fn release(&mut self, handle: PoolHandle) -> Result<Released<T>, PoolError> {
        self.validate(handle)?;

        let slot = &mut self.slots[handle.index as usize];
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.count_active -= 1;
        if let (Some(reset), Some(value)) = (self.reset.as_mut(), slot.value.as_mut()) {
            reset(value);
        }

        if self.inactive.len() >= self.config.capacity_max {
            match self.config.overflow {
                OverflowPolicy::DestroyOverflow => {
                    let value = slot.value.take();
                    self.vacant.push(handle.index);
                    if let Some(value) = value {
                        self.destroyed += 1;
                        return Ok(Released::Overflow(value));
                    }
                    return Ok(Released::Recycled);
                }
                OverflowPolicy::KeepAndWarn => {
                    self.capacity_warnings += 1;
                    tracing::warn!(
                        "Pool free list past capacity: keeping {} idle objects (capacity {})",
                        self.inactive.len() + 1,
                        self.config.capacity_max
                    );
                }
            }
        }

        self.inactive.push(handle.index);
        Ok(Released::Recycled)
    }

    /// True if `handle` refers to a checked-out object.
    #[inline]
    #[must_use]
    pub fn is_active(&self, handle: PoolHandle) -> bool {
        self.validate(handle).is_ok()
    }

    /// Gets a checked-out object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.validate(handle).ok()?;
        self.slots[handle.index as usize].value.as_ref()
    }

    /// Gets a checked-out object mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.validate(handle).ok()?;
        self.slots[handle.index as usize].value.as_mut()
    }

    /// Handles of every checked-out object, in slot order.
    #[must_use]
    pub fn active_handles(&self) -> Vec<PoolHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active && slot.value.is_some())
            .map(|(index, slot)| PoolHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Iterates over checked-out objects, in slot order.
    pub fn iter_active(&self) -> impl Iterator<Item = &T> {
        self.slots
            .iter()
            .filter(|slot| slot.active)
            .filter_map(|slot| slot.value.as_ref())
    }

    /// Iterates mutably over checked-out objects, in slot order.
    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots
            .iter_mut()
            .filter(|slot| slot.active)
            .filter_map(|slot| slot.value.as_mut())
    }

    /// Iterates over idle objects.
    pub fn iter_inactive(&self) -> impl Iterator<Item = &T> {
        self.inactive
            .iter()
            .filter_map(|&index| self.slots[index as usize].value.as_ref())
    }

    /// Removes every object, active or idle, and returns them for destruction.
    ///
    /// All outstanding handles go stale. Counters other than `destroyed`
    /// reset to zero.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.count_all());
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.active = false;
                slot.generation = slot.generation.wrapping_add(1);
                self.vacant.push(index as u32);
                values.push(value);
            }
        }
        self.inactive.clear();
        self.count_active = 0;
        self.destroyed += values.len() as u64;
        values
    }

    fn store(&mut self, value: T, active: bool) -> u32 {
        self.created += 1;
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.active = active;
            return index;
        }
        let index = self.slots.len() as u32;
        self.slots.push(PoolSlot {
            generation: 0,
            value: Some(value),
            active,
        });
        index
    }

    fn validate(&self, handle: PoolHandle) -> Result<(), PoolError> {
        let stale = PoolError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        };
        let slot = self.slots.get(handle.index as usize).ok_or(stale)?;
        if slot.generation != handle.generation || slot.value.is_none() {
            return Err(stale);
        }
        if !slot.active {
            return Err(PoolError::NotActive(handle.index));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_acquire_release() {
        let mut pool: ObjectPool<u32> = ObjectPool::new(PoolConfig::with_capacity(10));

        let a = pool.acquire_with(|| 42);
        assert!(a.created);
        assert_eq!(*pool.get(a.handle).unwrap(), 42);
        assert_eq!(pool.count_active(), 1);

        assert_eq!(pool.release(a.handle), Ok(Released::Recycled));
        assert_eq!(pool.count_active(), 0);
        assert_eq!(pool.count_inactive(), 1);
    }

    #[test]
    fn test_pool_reuse_and_stale_handle() {
        let mut pool: ObjectPool<u32> = ObjectPool::new(PoolConfig::with_capacity(1));

        let h1 = pool.acquire_with(|| 1).handle;
        pool.release(h1).unwrap();

        let second = pool.acquire_with(|| 2);
        assert!(!second.created);
        assert_eq!(h1.index(), second.handle.index()); // Same slot reused
        assert_eq!(*pool.get(second.handle).unwrap(), 1); // Recycled object, factory skipped
        assert!(pool.get(h1).is_none());
        assert!(matches!(pool.release(h1), Err(PoolError::StaleHandle { .. })));
    }

    #[test]
    fn test_pool_soft_cap_warns_once_per_growth() {
        let mut pool: ObjectPool<u8> = ObjectPool::new(PoolConfig::with_capacity(2));

        let a = pool.acquire_with(|| 1);
        let b = pool.acquire_with(|| 2);
        let c = pool.acquire_with(|| 3);

        assert!(!a.over_capacity && !b.over_capacity);
        assert!(c.over_capacity);
        assert_eq!(pool.count_active(), 3);
        assert_eq!(pool.stats().capacity_warnings, 1);
    }

    #[test]
    fn test_pool_overflow_destroyed_on_release() {
        let mut pool: ObjectPool<u8> = ObjectPool::new(PoolConfig::with_capacity(1));

        let a = pool.acquire_with(|| 1).handle;
        let b = pool.acquire_with(|| 2).handle;
        assert_eq!(pool.release(a), Ok(Released::Recycled));
        assert_eq!(pool.release(b), Ok(Released::Overflow(2)));
        assert_eq!(pool.count_all(), 1);
        assert_eq!(pool.stats().destroyed, 1);
    }

    #[test]
    fn test_pool_overflow_kept_under_soft_policy() {
        let mut pool: ObjectPool<u8> = ObjectPool::new(PoolConfig {
            capacity_max: 1,
            overflow: OverflowPolicy::KeepAndWarn,
        });

        let a = pool.acquire_with(|| 1).handle;
        let b = pool.acquire_with(|| 2).handle;
        pool.release(a).unwrap();
        assert_eq!(pool.release(b), Ok(Released::Recycled));
        assert_eq!(pool.count_inactive(), 2);
        assert_eq!(pool.stats().capacity_warnings, 2); // growth + keep
    }

    #[test]
    fn test_pool_reset_hook_and_double_release() {
        let mut pool: ObjectPool<Vec<u8>> =
            ObjectPool::new(PoolConfig::with_capacity(4)).with_reset(Vec::clear);

        let h = pool.acquire_with(Vec::new).handle;
        pool.get_mut(h).unwrap().extend_from_slice(&[1, 2, 3]);
        pool.release(h).unwrap();
        assert!(pool.iter_inactive().all(Vec::is_empty));
        assert!(pool.release(h).is_err());
    }

    #[test]
    fn test_pool_prewarm_round_trip() {
        let mut pool: ObjectPool<u32> = ObjectPool::new(PoolConfig::with_capacity(4));
        pool.prewarm(2, || 0);
        let before = pool.stats();

        let h = pool.acquire_with(|| 9).handle;
        pool.release(h).unwrap();

        let after = pool.stats();
        assert_eq!(before.count_active, after.count_active);
        assert_eq!(before.count_inactive, after.count_inactive);
        assert_eq!(after.created, 2);
    }

    #[test]
    fn test_pool_drain() {
        let mut pool: ObjectPool<u32> = ObjectPool::new(PoolConfig::with_capacity(4));
        let a = pool.acquire_with(|| 1).handle;
        let b = pool.acquire_with(|| 2).handle;
        pool.release(b).unwrap();

        assert_eq!(pool.iter_active_mut().count(), 1);

        let drained = pool.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(pool.count_all(), 0);
        assert!(!pool.is_active(a));
    }
}
