//! # Effect Registry
//!
//! The service every effect is played through. It owns:
//! - One pool per template, created on first play
//! - Standalone (non-pooled) instances
//! - The timer queue that replaces every "wait" in effect playback
//!
//! ## Tick
//!
//! ```text
//! advance(dt)
//! ├─ 1. frame clock (Δt rejected if negative, clamped if huge)
//! ├─ 2. advance backends of every playing effect
//! ├─ 3. service due timers, registration order
//! │     └─ follow-up passes for timers re-armed into the past
//! └─ 4. finalize graceful stops whose backends / children are done
//! ```
//!
//! ## Handles
//!
//! Pooled handles live for one play cycle. Once an instance is recycled its
//! handle resolves to nothing, so a director holding a handle from an old
//! cycle can never stop somebody else's effect.

use std::collections::HashMap;
use std::sync::Arc;

use ember_core::{FrameClock, PoolStats, Released, SlotArena, TimerId, TimerQueue};
use ember_shared::{Quaternion, Transform, Vec3};

use crate::backend::EffectBackend;
use crate::config::RegistryConfig;
use crate::director::{self, DirectorEntry, EntrySpec, LoopBehavior};
use crate::error::{EffectError, EffectResult};
use crate::events::{EffectEvent, EffectEventBus, EffectEventReceiver, EffectEventSender, Violation};
use crate::instance::{EffectHandle, EffectInstance, EffectKind, EffectState};
use crate::params::PlayParams;
use crate::placement::{NodeId, NodePlacement, PlacementProvider, SceneGraph};
use crate::pool::{EffectPool, PoolId};
use crate::template::{self, EffectTemplate, TemplateId, TemplateSource, Timing};

/// Work armed on the timer queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FxTimer {
    /// Playback duration elapsed; stop gracefully.
    Finish(EffectHandle),
    /// Detach an attached effect from its parent.
    Deparent(EffectHandle),
    /// A director entry's start delay elapsed.
    EntryStart { director: EffectHandle, entry: usize },
    /// A loop-for-duration sub-effect has run its course.
    EntryLoopEnd {
        director: EffectHandle,
        entry: usize,
        instance: EffectHandle,
    },
    /// Next spawn of a repeating entry.
    EntryRepeat { director: EffectHandle, entry: usize },
}

/// Result of [`EffectRegistry::stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The instance was not playing (or the handle is stale).
    NotActive,
    /// The instance reached `Stopped` before `stop` returned.
    Finalized,
    /// Finalization waits for a later tick.
    Deferred,
}

/// Per-tick summary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Frame number after this tick.
    pub frame: u64,
    /// Δt actually applied.
    pub applied_delta: f32,
    /// Timers serviced.
    pub timers_fired: usize,
    /// Timer passes run.
    pub timer_passes: u32,
    /// Graceful stops finalized by the poll phase.
    pub finalized: usize,
    /// True if due timers were left for the next tick.
    pub pass_limit_hit: bool,
}

/// Every live instance, pooled or not.
#[derive(Default)]
struct InstanceStore {
    pools: Vec<EffectPool>,
    by_template: HashMap<TemplateId, PoolId>,
    standalone: SlotArena<EffectInstance>,
}

impl InstanceStore {
    fn get(&self, handle: EffectHandle) -> Option<&EffectInstance> {
        match handle {
            EffectHandle::Pooled { pool, slot } => self.pools.get(pool.index())?.get(slot),
            EffectHandle::Standalone(slot) => self.standalone.get(slot),
        }
    }

    fn get_mut(&mut self, handle: EffectHandle) -> Option<&mut EffectInstance> {
        match handle {
            EffectHandle::Pooled { pool, slot } => self.pools.get_mut(pool.index())?.get_mut(slot),
            EffectHandle::Standalone(slot) => self.standalone.get_mut(slot),
        }
    }

    fn is_live(&self, handle: EffectHandle) -> bool {
        self.get(handle).is_some_and(EffectInstance::is_active)
    }

    fn entry_mut(&mut self, director: EffectHandle, index: usize) -> Option<&mut DirectorEntry> {
        self.get_mut(director)?.director_mut()?.entry_mut(index)
    }

    fn entry_count(&self, director: EffectHandle) -> usize {
        self.get(director)
            .and_then(EffectInstance::director)
            .map_or(0, |d| d.entries().len())
    }

    /// True if `handle` is playing and was spawned by `director` this cycle.
    fn owned_by(&self, handle: EffectHandle, director: EffectHandle) -> bool {
        self.get(handle)
            .is_some_and(|i| i.is_active() && i.parent_director == Some(director))
    }

    fn count_playing(&self) -> usize {
        let pooled: usize = self.pools.iter().map(EffectPool::count_playing).sum();
        pooled
            + self
                .standalone
                .iter()
                .filter(|(_, instance)| instance.is_active())
                .count()
    }

    fn playing_handles(&self) -> Vec<EffectHandle> {
        let pooled = self.pools.iter().flat_map(|pool| {
            pool.active_slots()
                .into_iter()
                .map(move |slot| EffectHandle::Pooled { pool: pool.id(), slot })
        });
        let standalone = self
            .standalone
            .iter()
            .map(|(slot, _)| EffectHandle::Standalone(slot));
        pooled
            .chain(standalone)
            .filter(|&handle| self.is_live(handle))
            .collect()
    }
}

/// Builds a cold instance and its placement node.
fn build_instance(
    placement: &mut dyn PlacementProvider,
    container: NodeId,
    template: &Arc<EffectTemplate>,
    pooled: bool,
) -> EffectInstance {
    let node = placement.create_node(&template.name);
    if pooled {
        park(placement, node, container, template.base_scale);
    }
    EffectInstance::new(Arc::clone(template), node, pooled)
}

/// Puts an idle pooled node under the pool container at its prefab scale.
fn park(placement: &mut dyn PlacementProvider, node: NodeId, container: NodeId, base_scale: Vec3) {
    placement.attach(
        node,
        container,
        Transform::new(Vec3::ZERO, Quaternion::IDENTITY, base_scale),
    );
}

/// Effect pooling and playback service.
///
/// # Lifecycle
///
/// Construct with [`EffectRegistry::new`], tick with [`EffectRegistry::advance`],
/// tear down with [`EffectRegistry::shutdown`]. Dropping an un-shut-down
/// registry shuts it down.
///
/// # Thread Safety
///
/// Not thread-safe. Hosts that touch effects from several threads go
/// through [`crate::SharedRegistry`].
pub struct EffectRegistry {
    config: RegistryConfig,
    templates: Box<dyn TemplateSource>,
    placement: Box<dyn PlacementProvider>,
    store: InstanceStore,
    timers: TimerQueue<FxTimer>,
    clock: FrameClock,
    timing_cache: HashMap<TemplateId, Timing>,
    /// Graceful stops awaiting the poll phase, in request order.
    stopping: Vec<EffectHandle>,
    bus: EffectEventBus,
    events: EffectEventSender,
    /// Parent of every idle pooled node.
    pool_container: NodeId,
    shut_down: bool,
}

impl EffectRegistry {
    /// Creates a registry.
    pub fn new(
        config: RegistryConfig,
        templates: impl TemplateSource + 'static,
        placement: impl PlacementProvider + 'static,
    ) -> Self {
        let mut placement: Box<dyn PlacementProvider> = Box::new(placement);
        let pool_container = placement.create_node("EffectPools");
        let bus = EffectEventBus::new(config.event_capacity);
        let events = bus.sender();

        tracing::info!(
            "Effect registry online: capacity {} per pool, prewarm {}, max dt {}",
            config.capacity_max,
            config.prewarm,
            config.max_delta
        );

        Self {
            clock: FrameClock::new(config.max_delta),
            config,
            templates: Box::new(templates),
            placement,
            store: InstanceStore::default(),
            timers: TimerQueue::new(),
            timing_cache: HashMap::new(),
            stopping: Vec::new(),
            bus,
            events,
            pool_container,
            shut_down: false,
        }
    }

    /// Creates a registry placing effects in a fresh [`SceneGraph`].
    pub fn with_scene_graph(config: RegistryConfig, templates: impl TemplateSource + 'static) -> Self {
        Self::new(config, templates, SceneGraph::new())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Seconds of tick time elapsed.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Ticks applied.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.clock.frame()
    }

    /// Placement provider.
    #[must_use]
    pub fn placement(&self) -> &dyn PlacementProvider {
        &*self.placement
    }

    /// Placement provider, for creating parents and moving nodes.
    pub fn placement_mut(&mut self) -> &mut dyn PlacementProvider {
        &mut *self.placement
    }

    /// Node every idle pooled instance is parked under.
    #[must_use]
    pub fn pool_container(&self) -> NodeId {
        self.pool_container
    }

    /// New receiver for lifecycle events.
    #[must_use]
    pub fn events(&self) -> EffectEventReceiver {
        self.bus.receiver()
    }

    /// Events dropped because nobody drained the channel.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.bus.dropped()
    }

    /// Instance behind a handle.
    #[must_use]
    pub fn instance(&self, handle: EffectHandle) -> Option<&EffectInstance> {
        self.store.get(handle)
    }

    /// State of the instance behind a handle. `None` once the handle is stale.
    #[must_use]
    pub fn state(&self, handle: EffectHandle) -> Option<EffectState> {
        self.store.get(handle).map(EffectInstance::state)
    }

    /// True if the handle refers to a playing (or stopping) instance.
    #[must_use]
    pub fn is_live(&self, handle: EffectHandle) -> bool {
        self.store.is_live(handle)
    }

    /// Handles of every playing instance.
    #[must_use]
    pub fn playing(&self) -> Vec<EffectHandle> {
        self.store.playing_handles()
    }

    /// Number of playing instances.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.store.count_playing()
    }

    /// Armed timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pool for a template, if one was created.
    #[must_use]
    pub fn pool(&self, template: TemplateId) -> Option<&EffectPool> {
        let id = self.store.by_template.get(&template)?;
        self.store.pools.get(id.index())
    }

    /// Occupancy of a template's pool.
    #[must_use]
    pub fn pool_stats(&self, template: TemplateId) -> Option<PoolStats> {
        self.pool(template).map(EffectPool::stats)
    }

    /// Occupancy of every pool, in creation order.
    #[must_use]
    pub fn pool_stats_all(&self) -> Vec<(TemplateId, PoolStats)> {
        self.store
            .pools
            .iter()
            .map(|pool| (pool.template_id(), pool.stats()))
            .collect()
    }

    /// Resolved timing of a template.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown templates and self-containing directors.
    pub fn template_timing(&mut self, template: TemplateId) -> EffectResult<Timing> {
        template::resolve_timing(&*self.templates, template, &mut self.timing_cache)
    }

    /// True after [`Self::shutdown`].
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Plays a pooled effect.
    ///
    /// Returns `None` (and logs) if the template is unknown or playback
    /// could not start.
    pub fn play_effect(&mut self, template: TemplateId, params: PlayParams) -> Option<EffectHandle> {
        self.spawn_pooled(template, params, None)
    }

    /// Creates a non-pooled instance at `placement`.
    ///
    /// With `play_on_start` the instance plays at once; otherwise it stays
    /// idle until [`Self::play_instance`].
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown, the registry is shut
    /// down, or the first play fails.
    pub fn spawn_standalone(
        &mut self,
        template: TemplateId,
        placement: NodePlacement,
        play_on_start: bool,
    ) -> EffectResult<EffectHandle> {
        if self.shut_down {
            return Err(EffectError::ShutDown);
        }
        let resolved = self
            .templates
            .resolve(template)
            .ok_or(EffectError::UnknownTemplate(template))?;

        let instance = build_instance(&mut *self.placement, self.pool_container, &resolved, false);
        self.placement.restore(instance.node, placement);
        let handle = EffectHandle::Standalone(self.store.standalone.insert(instance));
        self.emit(EffectEvent::Spawned { handle, template });

        if play_on_start {
            self.play_instance(handle, PlayParams::default())?;
        }
        Ok(handle)
    }

    /// Starts a play cycle on an existing instance.
    ///
    /// A standalone instance that is already playing is stopped immediately
    /// and restarted. A pooled instance that is already playing is a
    /// pooling bug: it is force-stopped and an error is returned.
    /// Standalone instances keep their own placement; only pooled instances
    /// are placed by `params`.
    ///
    /// # Errors
    ///
    /// Returns an error for stale handles, pooled restarts, play during
    /// finalization and unresolvable director timing.
    pub fn play_instance(&mut self, handle: EffectHandle, params: PlayParams) -> EffectResult<()> {
        if self.shut_down {
            return Err(EffectError::ShutDown);
        }
        let instance = self.store.get(handle).ok_or(EffectError::StaleHandle(handle))?;
        let template = Arc::clone(&instance.template);

        if instance.is_finalizing() {
            tracing::error!("Effect {} asked to play while finalizing a stop", template.name);
            self.violation(Violation::PlayDuringFinalize, Some(template.id));
            return Err(EffectError::PlayDuringFinalize(handle));
        }

        if instance.is_active() {
            if instance.is_pooled() {
                tracing::error!(
                    "Pool returned active effect {}! Forcing the stale cycle to stop",
                    template.name
                );
                self.violation(Violation::PooledRestart, Some(template.id));
                self.stop(handle, true);
                return Err(EffectError::PooledRestart(handle));
            }
            tracing::debug!("Restarting standalone effect {}", template.name);
            self.stop(handle, true);
        }

        let timing = self.ensure_timing(handle)?;

        let placement = &mut *self.placement;
        let instance = self
            .store
            .get_mut(handle)
            .ok_or(EffectError::StaleHandle(handle))?;
        instance.state = EffectState::Active;
        instance.cycles += 1;
        let attached = if instance.pooled {
            params.configure(placement, instance.node, template.base_scale)
        } else {
            instance.saved_placement = placement.capture(instance.node);
            placement.parent(instance.node).is_some()
        };
        let director = instance.parent_director;
        let is_director = match &mut instance.kind {
            EffectKind::Simple(set) => {
                set.start();
                false
            }
            EffectKind::Director(_) => true,
        };

        if is_director {
            self.play_director(handle);
        }

        let finish_timer = timing
            .is_determinate()
            .then(|| self.timers.schedule(timing.duration, FxTimer::Finish(handle)));
        let deparent_timer = (attached && params.wants_deparent() && timing.is_determinate())
            .then(|| {
                self.timers
                    .schedule(params.deparent_time * timing.duration, FxTimer::Deparent(handle))
            });
        if let Some(instance) = self.store.get_mut(handle) {
            instance.finish_timer = finish_timer;
            instance.deparent_timer = deparent_timer;
        }

        tracing::trace!(
            "Effect {} started (duration {}, looping {})",
            template.name,
            timing.duration,
            timing.looping
        );
        self.emit(EffectEvent::Started {
            handle,
            template: template.id,
            director,
        });
        Ok(())
    }

    /// Stops an instance.
    ///
    /// Immediate stops cancel every timer and backend (and, for directors,
    /// every sub-effect) and finalize before returning. Graceful stops let
    /// content play out and finalize on a later tick.
    pub fn stop(&mut self, handle: EffectHandle, immediate: bool) -> StopOutcome {
        let Some(instance) = self.store.get_mut(handle) else {
            return StopOutcome::NotActive;
        };
        if !instance.is_active() || instance.finalizing {
            return StopOutcome::NotActive;
        }
        if instance.is_stopping() && !immediate {
            return StopOutcome::Deferred;
        }

        instance.state = EffectState::Stopping;
        let finish = instance.finish_timer.take();
        let deparent = instance.deparent_timer.take();
        let node = instance.node;
        let template = Arc::clone(&instance.template);
        let is_director = match &mut instance.kind {
            EffectKind::Simple(set) => {
                if immediate {
                    set.stop_immediate();
                } else {
                    set.stop_graceful();
                }
                false
            }
            EffectKind::Director(_) => true,
        };

        if let Some(id) = finish {
            self.timers.cancel(id);
        }
        if let Some(id) = deparent {
            self.timers.cancel(id);
            tracing::debug!("Deparenting {} early on stop", template.name);
            self.placement.detach_to_world(node);
        }
        self.emit(EffectEvent::Stopping { handle, immediate });

        if is_director {
            self.stop_director_entries(handle, immediate);
        }

        if immediate || self.stop_complete(handle) {
            self.finalize(handle);
            StopOutcome::Finalized
        } else {
            if !self.stopping.contains(&handle) {
                self.stopping.push(handle);
            }
            StopOutcome::Deferred
        }
    }

    /// Stops a pooled effect immediately and returns it to its pool.
    ///
    /// Standalone instances manage their own lifecycle; for them this is a
    /// no-op. Returns true if an instance was released.
    pub fn stop_effect(&mut self, handle: EffectHandle) -> bool {
        if !handle.is_pooled() {
            tracing::debug!("stop_effect ignored for standalone effect {:?}", handle);
            return false;
        }
        match self.stop(handle, true) {
            StopOutcome::Finalized => true,
            StopOutcome::Deferred => false,
            StopOutcome::NotActive => {
                if self.store.get(handle).is_some() {
                    // Checked out but never played
                    self.recycle(handle);
                    true
                } else {
                    tracing::warn!("stop_effect on stale handle {:?}", handle);
                    let template = handle
                        .pool()
                        .and_then(|pool| self.store.pools.get(pool.index()))
                        .map(EffectPool::template_id);
                    self.violation(Violation::StaleHandle, template);
                    false
                }
            }
        }
    }

    /// Destroys a standalone instance. Returns false for pooled or stale handles.
    pub fn despawn(&mut self, handle: EffectHandle) -> bool {
        let EffectHandle::Standalone(slot) = handle else {
            tracing::debug!("despawn ignored for pooled effect {:?}", handle);
            return false;
        };
        self.stop(handle, true);
        match self.store.standalone.remove(slot) {
            Some(instance) => {
                self.destroy_instance(instance);
                true
            }
            None => false,
        }
    }

    /// Replaces a director instance's entries to match `templates`.
    ///
    /// Entries for surviving templates keep their authored timing. Timing is
    /// re-resolved on the next play. Returns true if anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error for stale handles, non-directors and playing directors.
    pub fn rebuild_director_entries(
        &mut self,
        handle: EffectHandle,
        templates: &[TemplateId],
    ) -> EffectResult<bool> {
        let instance = self
            .store
            .get_mut(handle)
            .ok_or(EffectError::StaleHandle(handle))?;
        if instance.is_active() {
            return Err(EffectError::DirectorBusy(handle));
        }
        let changed = instance
            .director_mut()
            .ok_or(EffectError::NotADirector(handle))?
            .rebuild_entries(templates);
        if changed {
            instance.timing = None;
        }
        Ok(changed)
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advances every effect by one tick.
    pub fn advance(&mut self, dt: f32) -> TickReport {
        let applied = self.clock.advance(dt);
        self.timers.advance_to(self.clock.now());
        let mut report = TickReport {
            frame: self.clock.frame(),
            applied_delta: applied,
            ..TickReport::default()
        };
        if self.shut_down {
            return report;
        }

        // Phase 2: backends
        for pool in &mut self.store.pools {
            for instance in pool.iter_active_mut() {
                instance.advance_backends(applied);
            }
        }
        for (_, instance) in self.store.standalone.iter_mut() {
            instance.advance_backends(applied);
        }

        // Phase 3: timers
        while self.timers.has_due() {
            if report.timer_passes >= self.config.max_timer_passes {
                tracing::warn!(
                    "Timer pass limit {} hit at frame {}; {} timers wait for the next tick",
                    self.config.max_timer_passes,
                    report.frame,
                    self.timers.len()
                );
                report.pass_limit_hit = true;
                break;
            }
            report.timer_passes += 1;
            for (id, deadline, timer) in self.timers.take_due() {
                report.timers_fired += 1;
                self.dispatch(id, deadline, timer);
            }
        }

        // Phase 4: graceful-stop polls
        report.finalized = self.poll_stopping();
        report
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stops and destroys every instance of a template's pool.
    ///
    /// The pool stays registered and refills on the next play. Returns the
    /// number of instances destroyed.
    pub fn dispose_pool(&mut self, template: TemplateId) -> usize {
        let Some(&pool_id) = self.store.by_template.get(&template) else {
            return 0;
        };
        let slots = self
            .store
            .pools
            .get(pool_id.index())
            .map(EffectPool::active_slots)
            .unwrap_or_default();
        for slot in slots {
            self.stop(EffectHandle::Pooled { pool: pool_id, slot }, true);
        }

        let drained = self
            .store
            .pools
            .get_mut(pool_id.index())
            .map(EffectPool::drain)
            .unwrap_or_default();
        let count = drained.len();
        for instance in drained {
            self.destroy_instance(instance);
        }
        tracing::debug!("Disposed pool {} ({} instances)", template, count);
        count
    }

    /// Stops everything, disposes every pool and destroys standalone
    /// instances. Further plays are refused.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        tracing::info!(
            "Shutting down effect registry: {} pools, {} standalone effects",
            self.store.pools.len(),
            self.store.standalone.len()
        );

        for slot in self.store.standalone.handles() {
            self.stop(EffectHandle::Standalone(slot), true);
        }
        let templates: Vec<TemplateId> = self.store.pools.iter().map(EffectPool::template_id).collect();
        for template in templates {
            self.dispose_pool(template);
        }
        for instance in self.store.standalone.drain() {
            self.destroy_instance(instance);
        }

        self.timers.clear();
        self.stopping.clear();
        self.placement.destroy_node(self.pool_container);
        self.shut_down = true;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn emit(&self, event: EffectEvent) {
        self.events.send(event);
    }

    fn violation(&self, violation: Violation, template: Option<TemplateId>) {
        self.emit(EffectEvent::UsageViolation { violation, template });
    }

    fn ensure_pool(&mut self, template: TemplateId) -> EffectResult<PoolId> {
        if let Some(&id) = self.store.by_template.get(&template) {
            return Ok(id);
        }
        let resolved = self
            .templates
            .resolve(template)
            .ok_or(EffectError::UnknownTemplate(template))?;
        let (config, prewarm) = self.config.pool_for(template);
        let id = PoolId::new(u32::try_from(self.store.pools.len()).unwrap_or(u32::MAX));

        let mut pool = EffectPool::new(id, Arc::clone(&resolved), config);
        if prewarm > 0 {
            let placement = &mut *self.placement;
            let container = self.pool_container;
            pool.prewarm(prewarm, || build_instance(placement, container, &resolved, true));
        }

        tracing::debug!(
            "Created pool for {} (capacity {}, prewarmed {})",
            resolved.name,
            config.capacity_max,
            pool.stats().count_inactive
        );
        self.store.pools.push(pool);
        self.store.by_template.insert(template, id);
        Ok(id)
    }

    fn acquire(&mut self, pool_id: PoolId) -> Option<EffectHandle> {
        let placement = &mut *self.placement;
        let container = self.pool_container;
        let pool = self.store.pools.get_mut(pool_id.index())?;
        let template = Arc::clone(pool.template());

        let acquired = pool.acquire(|| build_instance(placement, container, &template, true));
        let stats = pool.stats();
        let handle = EffectHandle::Pooled {
            pool: pool_id,
            slot: acquired.handle,
        };

        if acquired.created {
            self.emit(EffectEvent::Spawned {
                handle,
                template: template.id,
            });
        }
        if acquired.over_capacity {
            self.emit(EffectEvent::CapacityExceeded {
                template: template.id,
                count_all: stats.count_all(),
                capacity_max: stats.capacity_max,
            });
        }
        Some(handle)
    }

    fn spawn_pooled(
        &mut self,
        template: TemplateId,
        params: PlayParams,
        director: Option<EffectHandle>,
    ) -> Option<EffectHandle> {
        if self.shut_down {
            tracing::error!("Effect {} played after registry shutdown", template);
            return None;
        }
        let pool_id = match self.ensure_pool(template) {
            Ok(id) => id,
            Err(error) => {
                tracing::error!("Cannot play effect: {}", error);
                self.violation(Violation::UnknownTemplate, Some(template));
                return None;
            }
        };
        let handle = self.acquire(pool_id)?;
        if let Some(instance) = self.store.get_mut(handle) {
            instance.parent_director = director;
        }

        match self.play_instance(handle, params) {
            Ok(()) => Some(handle),
            Err(error) => {
                tracing::error!("Effect {} failed to play: {}", template, error);
                if self.store.get(handle).is_some_and(|i| !i.is_active()) {
                    self.recycle(handle);
                }
                None
            }
        }
    }

    fn ensure_timing(&mut self, handle: EffectHandle) -> EffectResult<Timing> {
        let instance = self.store.get(handle).ok_or(EffectError::StaleHandle(handle))?;
        if let Some(timing) = instance.timing {
            return Ok(timing);
        }

        let timing = match &instance.kind {
            EffectKind::Simple(set) => Timing::of_backend(set),
            EffectKind::Director(director) => {
                let specs: Vec<EntrySpec> = director.specs();
                let source = &*self.templates;
                let cache = &mut self.timing_cache;
                director::compute_timing(&specs, |child| template::resolve_timing(source, child, cache))?
            }
        };

        if let Some(instance) = self.store.get_mut(handle) {
            instance.timing = Some(timing);
        }
        Ok(timing)
    }

    /// Graceful stop is complete once nothing is left to play.
    fn stop_complete(&self, handle: EffectHandle) -> bool {
        let Some(instance) = self.store.get(handle) else {
            return true;
        };
        match instance.director() {
            Some(director) => !director.has_live_children(|child| self.store.is_live(child)),
            None => instance.backends_finished(),
        }
    }

    /// Ends a play cycle: recycles pooled instances, restores standalone ones.
    fn finalize(&mut self, handle: EffectHandle) {
        let Some(instance) = self.store.get_mut(handle) else {
            return;
        };
        instance.finalizing = true;
        instance.state = EffectState::Stopped;
        instance.parent_director = None;
        let mut timers: Vec<TimerId> = [instance.finish_timer.take(), instance.deparent_timer.take()]
            .into_iter()
            .flatten()
            .collect();
        if let Some(director) = instance.director_mut() {
            for entry in director.entries_mut() {
                timers.extend(entry.take_timers().into_iter().flatten());
                entry.live.clear();
                entry.repeat_count = 0;
            }
        }
        let pooled = instance.pooled;
        let node = instance.node;
        let saved = instance.saved_placement.take();
        let template = instance.template.id;

        for id in timers {
            self.timers.cancel(id);
        }
        self.stopping.retain(|&pending| pending != handle);
        self.emit(EffectEvent::Stopped { handle, template });

        if pooled {
            self.recycle(handle);
            return;
        }

        if let Some(saved) = saved {
            self.placement.restore(node, saved);
            self.emit(EffectEvent::PlacementRestored { handle });
        }
        if let Some(instance) = self.store.get_mut(handle) {
            instance.finalizing = false;
        }
    }

    /// Parks a pooled instance and hands it back to its pool.
    fn recycle(&mut self, handle: EffectHandle) {
        let EffectHandle::Pooled { pool, slot } = handle else {
            return;
        };
        let container = self.pool_container;
        let Some(effect_pool) = self.store.pools.get_mut(pool.index()) else {
            return;
        };
        if let Some(instance) = effect_pool.get(slot) {
            park(
                &mut *self.placement,
                instance.node,
                container,
                instance.template.base_scale,
            );
        }

        let template = effect_pool.template_id();
        match effect_pool.release(slot) {
            Ok(Released::Recycled) => self.emit(EffectEvent::Recycled { handle, template }),
            Ok(Released::Overflow(instance)) => {
                tracing::debug!("Pool {} full; destroying overflow instance", template);
                self.destroy_instance(instance);
            }
            Err(error) => tracing::error!("Failed to release effect {}: {}", template, error),
        }
    }

    fn destroy_instance(&mut self, mut instance: EffectInstance) {
        if let EffectKind::Simple(set) = &mut instance.kind {
            set.stop_immediate();
        }
        self.placement.destroy_node(instance.node);
        self.emit(EffectEvent::Destroyed {
            template: instance.template.id,
        });
    }

    fn poll_stopping(&mut self) -> usize {
        let pending = std::mem::take(&mut self.stopping);
        let mut finalized = 0;
        for handle in pending {
            let waiting = self
                .store
                .get(handle)
                .is_some_and(|i| i.is_stopping() && !i.finalizing);
            if !waiting {
                continue;
            }
            if self.stop_complete(handle) {
                self.finalize(handle);
                finalized += 1;
            } else if !self.stopping.contains(&handle) {
                self.stopping.push(handle);
            }
        }
        finalized
    }

    fn dispatch(&mut self, id: TimerId, deadline: f64, timer: FxTimer) {
        match timer {
            FxTimer::Finish(handle) => {
                let armed = self
                    .store
                    .get(handle)
                    .is_some_and(|i| i.finish_timer == Some(id));
                if armed {
                    if let Some(instance) = self.store.get_mut(handle) {
                        instance.finish_timer = None;
                    }
                    self.stop(handle, false);
                }
            }
            FxTimer::Deparent(handle) => {
                let Some(instance) = self.store.get_mut(handle) else {
                    return;
                };
                if instance.deparent_timer == Some(id) {
                    instance.deparent_timer = None;
                    let node = instance.node;
                    self.placement.detach_to_world(node);
                }
            }
            FxTimer::EntryStart { director, entry } => self.on_entry_start(director, entry, id, deadline),
            FxTimer::EntryLoopEnd {
                director,
                entry,
                instance,
            } => {
                let Some(state) = self.store.entry_mut(director, entry) else {
                    return;
                };
                if state.follow_timer != Some(id) {
                    return;
                }
                state.follow_timer = None;
                if self.store.owned_by(instance, director) {
                    self.stop(instance, false);
                }
            }
            FxTimer::EntryRepeat { director, entry } => {
                let Some(state) = self.store.entry_mut(director, entry) else {
                    return;
                };
                if state.follow_timer != Some(id) {
                    return;
                }
                state.follow_timer = None;
                let spec = state.spec().clone();
                self.repeat_entry(director, entry, &spec, deadline);
            }
        }
    }

    fn director_playing(&self, director: EffectHandle) -> bool {
        self.store
            .get(director)
            .is_some_and(|i| i.state == EffectState::Active)
    }

    fn play_director(&mut self, director: EffectHandle) {
        for index in 0..self.store.entry_count(director) {
            self.play_entry(director, index);
        }
    }

    fn play_entry(&mut self, director: EffectHandle, index: usize) {
        let Some(entry) = self.store.entry_mut(director, index) else {
            return;
        };
        if entry.spec().template.is_none() {
            return;
        }
        let stale = std::mem::take(&mut entry.live);
        entry.repeat_count = 0;
        let start_delay = entry.spec().start_delay;

        if !stale.is_empty() {
            tracing::error!(
                "Director entry {} still tracks {} instances from a previous cycle",
                index,
                stale.len()
            );
            let template = self.store.get(director).map(EffectInstance::template_id);
            self.violation(Violation::StaleDirectorInstances, template);
            for child in stale {
                if self.store.owned_by(child, director) {
                    self.stop(child, true);
                }
            }
        }

        let timer = self
            .timers
            .schedule(start_delay, FxTimer::EntryStart { director, entry: index });
        if let Some(entry) = self.store.entry_mut(director, index) {
            entry.start_timer = Some(timer);
        }
    }

    fn on_entry_start(&mut self, director: EffectHandle, index: usize, id: TimerId, deadline: f64) {
        let Some(entry) = self.store.entry_mut(director, index) else {
            return;
        };
        if entry.start_timer != Some(id) {
            return;
        }
        entry.start_timer = None;
        let spec = entry.spec().clone();
        if !self.director_playing(director) {
            return;
        }

        match spec.loop_behavior {
            LoopBehavior::Inherit => {
                self.spawn_entry_child(director, index, &spec);
            }
            LoopBehavior::LoopForDuration => {
                let Some(child) = self.spawn_entry_child(director, index, &spec) else {
                    return;
                };
                let end = deadline + f64::from(spec.loop_duration.max(0.0));
                let timer = self.timers.schedule_at(
                    end,
                    FxTimer::EntryLoopEnd {
                        director,
                        entry: index,
                        instance: child,
                    },
                );
                if let Some(entry) = self.store.entry_mut(director, index) {
                    entry.follow_timer = Some(timer);
                }
            }
            LoopBehavior::RepeatWithDirector | LoopBehavior::RepeatForDuration => {
                self.repeat_entry(director, index, &spec, deadline);
            }
        }
    }

    /// One step of a repeating entry: spawn, then re-arm relative to the
    /// fired deadline so repeats do not drift with frame timing.
    fn repeat_entry(&mut self, director: EffectHandle, index: usize, spec: &EntrySpec, deadline: f64) {
        if !self.director_playing(director) {
            return;
        }
        let Some(count) = self.store.entry_mut(director, index).map(|e| e.repeat_count) else {
            return;
        };
        let interval = spec.effective_repeat_interval();
        if spec.loop_behavior == LoopBehavior::RepeatForDuration
            && f64::from(count) * f64::from(interval) >= f64::from(spec.loop_duration)
        {
            return;
        }

        self.spawn_entry_child(director, index, spec);
        let timer = self.timers.schedule_at(
            deadline + f64::from(interval),
            FxTimer::EntryRepeat {
                director,
                entry: index,
            },
        );
        if let Some(entry) = self.store.entry_mut(director, index) {
            entry.repeat_count += 1;
            entry.follow_timer = Some(timer);
        }
    }

    fn spawn_entry_child(
        &mut self,
        director: EffectHandle,
        index: usize,
        spec: &EntrySpec,
    ) -> Option<EffectHandle> {
        let template = spec.template?;
        let parent = self.store.get(director)?.node;
        let params = PlayParams {
            should_attach: true,
            parent: Some(parent),
            local_position: spec.position,
            local_rotation: spec.rotation,
            local_scale: spec.scale,
            deparent_time: spec.deparent_time,
        };

        let child = self.spawn_pooled(template, params, Some(director))?;
        let store = &mut self.store;
        let Some(mut live) = store
            .entry_mut(director, index)
            .map(|entry| std::mem::take(&mut entry.live))
        else {
            return Some(child);
        };
        // Finished children were recycled; their handles are stale
        live.retain(|&handle| store.owned_by(handle, director));
        live.push(child);
        if let Some(entry) = store.entry_mut(director, index) {
            entry.live = live;
        }
        Some(child)
    }

    fn stop_director_entries(&mut self, director: EffectHandle, immediate: bool) {
        for index in 0..self.store.entry_count(director) {
            let Some(entry) = self.store.entry_mut(director, index) else {
                continue;
            };
            let timers = entry.take_timers();
            let live = entry.live.clone();
            for id in timers.into_iter().flatten() {
                self.timers.cancel(id);
            }
            for child in live {
                if self.store.owned_by(child, director) {
                    self.stop(child, immediate);
                }
            }
            if immediate {
                if let Some(entry) = self.store.entry_mut(director, index) {
                    entry.live.clear();
                }
            }
        }
    }
}

impl Drop for EffectRegistry {
    fn drop(&mut self) {
        if !self.shut_down {
            tracing::debug!("Effect registry dropped without shutdown; disposing pools");
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnimationSpec, BackendSpec};
    use crate::template::TemplateLibrary;

    const CLIP: TemplateId = TemplateId::from_path("fx/clip");
    const BURST: TemplateId = TemplateId::from_path("fx/burst");

    fn registry() -> EffectRegistry {
        let library = TemplateLibrary::new()
            .with(EffectTemplate::simple(
                "fx/clip",
                vec![BackendSpec::Animation(AnimationSpec {
                    clip_length: 1.0,
                    ..AnimationSpec::default()
                })],
            ))
            .with(EffectTemplate::director("fx/burst", vec![EntrySpec::new(CLIP)]));
        EffectRegistry::with_scene_graph(RegistryConfig::default().with_max_delta(1.0), library)
    }

    #[test]
    fn test_play_during_finalize_rejected() {
        let mut registry = registry();
        let handle = registry.play_effect(CLIP, PlayParams::default()).unwrap();
        registry.store.get_mut(handle).unwrap().finalizing = true;

        assert_eq!(
            registry.play_instance(handle, PlayParams::default()),
            Err(EffectError::PlayDuringFinalize(handle))
        );
        registry.store.get_mut(handle).unwrap().finalizing = false;
    }

    #[test]
    fn test_finish_timer_cleared_by_immediate_stop() {
        let mut registry = registry();
        let handle = registry.play_effect(CLIP, PlayParams::default()).unwrap();
        assert_eq!(registry.pending_timers(), 1);

        assert_eq!(registry.stop(handle, true), StopOutcome::Finalized);
        assert_eq!(registry.pending_timers(), 0);
        assert!(registry.stopping.is_empty());
    }

    #[test]
    fn test_finish_timer_stops_gracefully() {
        let mut registry = registry();
        let handle = registry.play_effect(CLIP, PlayParams::default()).unwrap();

        let report = registry.advance(0.5);
        assert_eq!(report.timers_fired, 0);
        assert!(registry.is_live(handle));

        let report = registry.advance(0.5);
        assert_eq!(report.timers_fired, 1);
        assert!(!registry.is_live(handle));
        assert_eq!(registry.pool_stats(CLIP).unwrap().count_active, 0);
    }

    #[test]
    fn test_pool_container_parks_idle_nodes() {
        let mut registry = registry();
        let handle = registry
            .play_effect(CLIP, PlayParams::at(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        let node = registry.instance(handle).unwrap().node();
        assert_eq!(registry.placement().parent(node), None);

        registry.stop_effect(handle);
        assert_eq!(registry.placement().parent(node), Some(registry.pool_container()));
        assert!(registry
            .placement()
            .local_transform(node)
            .unwrap()
            .approx_eq(&Transform::IDENTITY));
    }

    #[test]
    fn test_shutdown_refuses_play() {
        let mut registry = registry();
        registry.play_effect(CLIP, PlayParams::default()).unwrap();
        registry.shutdown();

        assert!(registry.is_shut_down());
        assert_eq!(registry.pool_stats(CLIP).unwrap().count_all(), 0);
        assert!(registry.play_effect(CLIP, PlayParams::default()).is_none());
        assert_eq!(registry.pending_timers(), 0);
    }

    #[test]
    fn test_replay_with_stale_entry_children_heals() {
        let mut registry = registry();
        let events = registry.events();
        let director = registry
            .spawn_standalone(BURST, NodePlacement::world(Transform::IDENTITY), false)
            .unwrap();
        // Leftover child from a cycle whose bookkeeping was never cleared
        let stale = registry
            .spawn_pooled(CLIP, PlayParams::default(), Some(director))
            .unwrap();
        registry.store.entry_mut(director, 0).unwrap().live.push(stale);
        events.drain();

        registry.play_instance(director, PlayParams::default()).unwrap();
        let drained = events.drain();
        assert!(drained.contains(&EffectEvent::UsageViolation {
            violation: Violation::StaleDirectorInstances,
            template: Some(BURST),
        }));
        assert!(drained.contains(&EffectEvent::Stopped {
            handle: stale,
            template: CLIP,
        }));
        assert!(!registry.is_live(stale));

        registry.advance(0.1);
        let entry = &registry.instance(director).unwrap().director().unwrap().entries()[0];
        assert_eq!(entry.live().len(), 1);
        assert_ne!(entry.live()[0], stale);
        assert!(registry.store.owned_by(entry.live()[0], director));
    }

    #[test]
    fn test_stop_effect_on_stale_handle_reports_violation() {
        let mut registry = registry();
        let events = registry.events();
        let handle = registry.play_effect(CLIP, PlayParams::default()).unwrap();
        assert!(registry.stop_effect(handle));
        events.drain();

        assert!(!registry.stop_effect(handle));
        assert_eq!(
            events.drain(),
            vec![EffectEvent::UsageViolation {
                violation: Violation::StaleHandle,
                template: Some(CLIP),
            }]
        );
    }

    #[test]
    fn test_pool_release_error_converts() {
        let mut registry = registry();
        let handle = registry.play_effect(CLIP, PlayParams::default()).unwrap();
        assert!(registry.stop_effect(handle));

        let EffectHandle::Pooled { pool, slot } = handle else {
            panic!("expected a pooled handle");
        };
        assert!(matches!(
            registry.store.pools[pool.index()].release(slot),
            Err(EffectError::Pool(_))
        ));
    }

    #[test]
    fn test_active_count_matches_playing() {
        let mut registry = registry();
        let a = registry.play_effect(CLIP, PlayParams::default()).unwrap();
        registry.play_effect(CLIP, PlayParams::default()).unwrap();
        registry.stop_effect(a);
        registry
            .spawn_standalone(CLIP, NodePlacement::world(Transform::IDENTITY), true)
            .unwrap();
        registry
            .spawn_standalone(CLIP, NodePlacement::world(Transform::IDENTITY), false)
            .unwrap();

        assert_eq!(registry.active_count(), 2);
        assert_eq!(registry.active_count(), registry.playing().len());
    }
}
