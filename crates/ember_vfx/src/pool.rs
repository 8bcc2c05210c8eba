//! Per-template effect pools.

use std::sync::Arc;

use ember_core::{Acquired, ObjectPool, PoolConfig, PoolHandle, PoolStats, Released};

use crate::error::EffectResult;

use crate::instance::EffectInstance;
use crate::template::{EffectTemplate, TemplateId};

/// Index of a pool within its registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u32);

impl PoolId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position in the registry's pool list.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bounded pool of instances for one template.
///
/// Each pool only ever holds instances of its own template, so acquiring
/// from one pool can never hand out another pool's instance.
pub struct EffectPool {
    id: PoolId,
    template: Arc<EffectTemplate>,
    instances: ObjectPool<EffectInstance>,
}

impl EffectPool {
    pub(crate) fn new(id: PoolId, template: Arc<EffectTemplate>, config: PoolConfig) -> Self {
        Self {
            id,
            template,
            instances: ObjectPool::new(config).with_reset(EffectInstance::reset_for_pool),
        }
    }

    /// Pool id.
    #[must_use]
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Template every instance in this pool was built from.
    #[must_use]
    pub fn template(&self) -> &Arc<EffectTemplate> {
        &self.template
    }

    /// Template id.
    #[must_use]
    pub fn template_id(&self) -> TemplateId {
        self.template.id
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.instances.stats()
    }

    /// Instance behind a checked-out slot.
    #[must_use]
    pub fn get(&self, slot: PoolHandle) -> Option<&EffectInstance> {
        self.instances.get(slot)
    }

    pub(crate) fn get_mut(&mut self, slot: PoolHandle) -> Option<&mut EffectInstance> {
        self.instances.get_mut(slot)
    }

    /// Slots currently checked out.
    #[must_use]
    pub fn active_slots(&self) -> Vec<PoolHandle> {
        self.instances.active_handles()
    }

    /// Checked-out instances that are playing or winding down.
    #[must_use]
    pub fn count_playing(&self) -> usize {
        self.instances.iter_active().filter(|i| i.is_active()).count()
    }

    pub(crate) fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut EffectInstance> {
        self.instances.iter_active_mut()
    }

    pub(crate) fn prewarm(&mut self, count: usize, factory: impl FnMut() -> EffectInstance) {
        self.instances.prewarm(count, factory);
    }

    pub(crate) fn acquire(&mut self, factory: impl FnOnce() -> EffectInstance) -> Acquired {
        self.instances.acquire_with(factory)
    }

    pub(crate) fn release(&mut self, slot: PoolHandle) -> EffectResult<Released<EffectInstance>> {
        Ok(self.instances.release(slot)?)
    }

    pub(crate) fn drain(&mut self) -> Vec<EffectInstance> {
        self.instances.drain()
    }
}

impl std::fmt::Debug for EffectPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectPool")
            .field("id", &self.id)
            .field("template", &self.template.name)
            .field("stats", &self.stats())
            .finish()
    }
}
