//! # Effect Instances
//!
//! One playable effect and its playback state machine:
//!
//! ```text
//!           play                stop(graceful)            backend done
//! Idle ──────────> Active ───────────────────> Stopping ──────────────> Stopped
//!                    │                                                   ^
//!                    └──────────────── stop(immediate) ──────────────────┘
//! Stopped ── play ──> Active
//! ```
//!
//! Instances are owned by their pool (or by the registry for standalone
//! effects) and only ever addressed through an [`EffectHandle`].

use std::sync::Arc;

use ember_core::{PoolHandle, SlotHandle, TimerId};

use crate::backend::{BackendSet, EffectBackend};
use crate::director::Director;
use crate::placement::{NodeId, NodePlacement};
use crate::pool::PoolId;
use crate::template::{EffectDescriptor, EffectTemplate, TemplateId, Timing};

/// Handle to an effect instance.
///
/// Pooled handles are valid for one play cycle: recycling bumps the slot
/// generation, after which the handle resolves to nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectHandle {
    /// Instance checked out of a pool.
    Pooled {
        /// Owning pool.
        pool: PoolId,
        /// Slot in that pool.
        slot: PoolHandle,
    },
    /// Instance owned directly by the registry.
    Standalone(SlotHandle),
}

impl EffectHandle {
    /// True for pooled handles.
    #[inline]
    #[must_use]
    pub const fn is_pooled(self) -> bool {
        matches!(self, Self::Pooled { .. })
    }

    /// Owning pool, if pooled.
    #[inline]
    #[must_use]
    pub const fn pool(self) -> Option<PoolId> {
        match self {
            Self::Pooled { pool, .. } => Some(pool),
            Self::Standalone(_) => None,
        }
    }
}

/// Playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectState {
    /// Never played.
    #[default]
    Idle,
    /// Playing.
    Active,
    /// Winding down after a graceful stop.
    Stopping,
    /// Finished; may play again.
    Stopped,
}

/// What an instance plays.
#[derive(Debug)]
pub enum EffectKind {
    /// Backends driven directly.
    Simple(BackendSet),
    /// Sub-effects driven by entries.
    Director(Director),
}

impl EffectKind {
    /// Builds the runtime payload for a template.
    #[must_use]
    pub fn from_descriptor(descriptor: &EffectDescriptor) -> Self {
        match descriptor {
            EffectDescriptor::Simple(specs) => Self::Simple(BackendSet::from_specs(specs)),
            EffectDescriptor::Custom(factory) => {
                let mut set = BackendSet::new();
                set.push(factory.build());
                Self::Simple(set)
            }
            EffectDescriptor::Director(entries) => Self::Director(Director::new(entries)),
        }
    }
}

/// A playable effect.
#[derive(Debug)]
pub struct EffectInstance {
    pub(crate) template: Arc<EffectTemplate>,
    pub(crate) node: NodeId,
    pub(crate) pooled: bool,
    pub(crate) state: EffectState,
    /// Set while a stop is being finalized; play is refused meanwhile.
    pub(crate) finalizing: bool,
    /// Timing resolved on first play; cleared when director entries change.
    pub(crate) timing: Option<Timing>,
    pub(crate) kind: EffectKind,
    pub(crate) parent_director: Option<EffectHandle>,
    pub(crate) finish_timer: Option<TimerId>,
    pub(crate) deparent_timer: Option<TimerId>,
    /// Placement captured at play time (standalone instances only).
    pub(crate) saved_placement: Option<NodePlacement>,
    pub(crate) cycles: u64,
}

impl EffectInstance {
    /// Cold, idle instance for `template` owning `node`.
    #[must_use]
    pub fn new(template: Arc<EffectTemplate>, node: NodeId, pooled: bool) -> Self {
        let kind = EffectKind::from_descriptor(&template.descriptor);
        Self {
            template,
            node,
            pooled,
            state: EffectState::Idle,
            finalizing: false,
            timing: None,
            kind,
            parent_director: None,
            finish_timer: None,
            deparent_timer: None,
            saved_placement: None,
            cycles: 0,
        }
    }

    /// Template this instance was built from.
    #[must_use]
    pub fn template(&self) -> &EffectTemplate {
        &self.template
    }

    /// Template id.
    #[must_use]
    pub fn template_id(&self) -> TemplateId {
        self.template.id
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// Playback state.
    #[must_use]
    pub fn state(&self) -> EffectState {
        self.state
    }

    /// Playing or winding down.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, EffectState::Active | EffectState::Stopping)
    }

    /// Winding down after a graceful stop.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.state == EffectState::Stopping
    }

    /// True while a stop is being finalized.
    #[must_use]
    pub fn is_finalizing(&self) -> bool {
        self.finalizing
    }

    /// Never ends on its own. False until timing is resolved.
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.timing.is_some_and(|t| t.looping)
    }

    /// Playback length in seconds, or -1 if looping or not yet resolved.
    #[must_use]
    pub fn playback_duration(&self) -> f32 {
        self.timing.map_or(Timing::INDETERMINATE, |t| t.duration)
    }

    /// Resolved timing, if the instance has played.
    #[must_use]
    pub fn timing(&self) -> Option<Timing> {
        self.timing
    }

    /// Owned by a pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Director that spawned this instance in the current cycle.
    #[must_use]
    pub fn parent_director(&self) -> Option<EffectHandle> {
        self.parent_director
    }

    /// Placement node.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Runtime payload.
    #[must_use]
    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }

    /// Backends, for simple effects.
    #[must_use]
    pub fn backends(&self) -> Option<&BackendSet> {
        match &self.kind {
            EffectKind::Simple(set) => Some(set),
            EffectKind::Director(_) => None,
        }
    }

    /// Director payload, for directors.
    #[must_use]
    pub fn director(&self) -> Option<&Director> {
        match &self.kind {
            EffectKind::Director(director) => Some(director),
            EffectKind::Simple(_) => None,
        }
    }

    /// Play cycles started over the instance's life.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub(crate) fn director_mut(&mut self) -> Option<&mut Director> {
        match &mut self.kind {
            EffectKind::Director(director) => Some(director),
            EffectKind::Simple(_) => None,
        }
    }

    /// Advances the backends of a playing simple effect.
    pub(crate) fn advance_backends(&mut self, dt: f32) {
        if let (true, EffectKind::Simple(set)) = (self.is_active(), &mut self.kind) {
            set.advance(dt);
        }
    }

    /// True once a stopping simple effect's backends are done.
    pub(crate) fn backends_finished(&self) -> bool {
        match &self.kind {
            EffectKind::Simple(set) => set.is_finished(),
            EffectKind::Director(_) => false,
        }
    }

    /// Clears per-cycle bookkeeping before the instance goes back on its
    /// pool's free list.
    pub(crate) fn reset_for_pool(&mut self) {
        self.finalizing = false;
        self.parent_director = None;
        self.finish_timer = None;
        self.deparent_timer = None;
        self.saved_placement = None;
        if let EffectKind::Director(director) = &mut self.kind {
            for entry in director.entries_mut() {
                entry.live.clear();
                entry.take_timers();
                entry.repeat_count = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnimationSpec, BackendSpec};
    use crate::director::EntrySpec;
    use crate::placement::{PlacementProvider, SceneGraph};

    fn instance(template: EffectTemplate) -> EffectInstance {
        let mut graph = SceneGraph::new();
        let node = graph.create_node("fx");
        EffectInstance::new(Arc::new(template), node, true)
    }

    #[test]
    fn test_new_instance_is_idle_and_unresolved() {
        let fx = instance(EffectTemplate::simple(
            "fx/a",
            vec![BackendSpec::Animation(AnimationSpec::default())],
        ));
        assert_eq!(fx.state(), EffectState::Idle);
        assert!(!fx.is_active());
        assert!(!fx.is_looping());
        assert_eq!(fx.playback_duration(), Timing::INDETERMINATE);
        assert_eq!(fx.backends().map(BackendSet::len), Some(1));
        assert!(fx.director().is_none());
    }

    #[test]
    fn test_director_kind() {
        let fx = instance(EffectTemplate::director(
            "fx/dir",
            vec![EntrySpec::new(TemplateId::from_path("fx/a"))],
        ));
        assert_eq!(fx.director().map(|d| d.entries().len()), Some(1));
    }

    #[test]
    fn test_reset_clears_cycle_bookkeeping() {
        let mut fx = instance(EffectTemplate::director(
            "fx/dir",
            vec![EntrySpec::new(TemplateId::from_path("fx/a"))],
        ));
        fx.parent_director = Some(EffectHandle::Standalone(SlotHandle::new(0, 0)));
        fx.finalizing = true;
        if let Some(director) = fx.director_mut() {
            director.entries_mut()[0].repeat_count = 3;
        }

        fx.reset_for_pool();
        assert!(fx.parent_director().is_none());
        assert!(!fx.is_finalizing());
        assert_eq!(fx.director().unwrap().entries()[0].repeat_count(), 0);
    }

    #[test]
    fn test_handle_kinds() {
        let standalone = EffectHandle::Standalone(SlotHandle::new(1, 0));
        assert!(!standalone.is_pooled());
        assert_eq!(standalone.pool(), None);
    }
}
