//! # EMBER Frame Loop
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. ADVANCE                                                          │
//! │    └─ registry.advance(Δt): clock, backends, timers, stop polls     │
//! │                                                                     │
//! │ 2. DRAIN EVENTS                                                     │
//! │    └─ Lifecycle events tallied and kept for this frame's observers  │
//! │                                                                     │
//! │ 3. RECORD                                                           │
//! │    └─ FrameStats into the accumulator                               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use ember_vfx::{EffectEvent, EffectEventReceiver, EffectRegistry, TickReport};

/// Per-frame statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Δt applied by the registry (after clamping).
    pub delta_time: f32,
    /// Events drained this frame.
    pub events_drained: usize,
    /// Instances playing or stopping after the tick.
    pub active_instances: usize,
    /// Timers serviced this frame.
    pub timers_fired: usize,
}

/// Running event counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventTally {
    /// Instances built.
    pub spawned: u64,
    /// Play cycles started.
    pub started: u64,
    /// Play cycles finished.
    pub stopped: u64,
    /// Instances returned to a pool.
    pub recycled: u64,
    /// Instances destroyed.
    pub destroyed: u64,
    /// Pools grown past capacity.
    pub capacity_warnings: u64,
    /// Usage violations detected.
    pub violations: u64,
}

impl EventTally {
    /// Counts one event.
    pub fn record(&mut self, event: &EffectEvent) {
        match event {
            EffectEvent::Spawned { .. } => self.spawned += 1,
            EffectEvent::Started { .. } => self.started += 1,
            EffectEvent::Stopped { .. } => self.stopped += 1,
            EffectEvent::Recycled { .. } => self.recycled += 1,
            EffectEvent::Destroyed { .. } => self.destroyed += 1,
            EffectEvent::CapacityExceeded { .. } => self.capacity_warnings += 1,
            EffectEvent::UsageViolation { .. } => self.violations += 1,
            EffectEvent::Stopping { .. } | EffectEvent::PlacementRestored { .. } => {}
        }
    }
}

/// Accumulated frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Frames recorded.
    pub frames_recorded: u64,
    /// Total Δt applied.
    pub simulated_seconds: f64,
    /// Most instances alive after any frame.
    pub peak_active: usize,
    /// Total timers serviced.
    pub timers_fired: u64,
    /// Frames whose Δt was clamped or rejected.
    pub clamped_frames: u64,
}

impl FrameStatsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            simulated_seconds: 0.0,
            peak_active: 0,
            timers_fired: 0,
            clamped_frames: 0,
        }
    }

    /// Records one frame.
    pub fn record(&mut self, stats: FrameStats, requested_delta: f32) {
        self.frames_recorded += 1;
        self.simulated_seconds += f64::from(stats.delta_time);
        self.peak_active = self.peak_active.max(stats.active_instances);
        self.timers_fired += stats.timers_fired as u64;
        if (stats.delta_time - requested_delta).abs() > f32::EPSILON {
            self.clamped_frames += 1;
        }
    }

    /// Logs a summary.
    pub fn log_summary(&self, tally: &EventTally) {
        tracing::info!(
            "Frames: {}, simulated {:.2}s, peak active {}, timers {}, clamped {}",
            self.frames_recorded,
            self.simulated_seconds,
            self.peak_active,
            self.timers_fired,
            self.clamped_frames
        );
        tracing::info!(
            "Events: spawned {}, started {}, stopped {}, recycled {}, destroyed {}",
            tally.spawned,
            tally.started,
            tally.stopped,
            tally.recycled,
            tally.destroyed
        );
        if tally.capacity_warnings > 0 || tally.violations > 0 {
            tracing::warn!(
                "Capacity warnings: {}, usage violations: {}",
                tally.capacity_warnings,
                tally.violations
            );
        }
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame loop around an [`EffectRegistry`].
///
/// Owns the registry and one event receiver. The caller supplies Δt.
pub struct FxLoop {
    registry: EffectRegistry,
    events: EffectEventReceiver,
    frame_events: Vec<EffectEvent>,
    tally: EventTally,
    stats: FrameStatsAccumulator,
    last_report: TickReport,
}

impl FxLoop {
    /// Wraps a registry.
    #[must_use]
    pub fn new(registry: EffectRegistry) -> Self {
        let events = registry.events();
        Self {
            registry,
            events,
            frame_events: Vec::new(),
            tally: EventTally::default(),
            stats: FrameStatsAccumulator::new(),
            last_report: TickReport::default(),
        }
    }

    /// Runs one frame.
    pub fn tick(&mut self, delta_time: f32) -> FrameStats {
        let report = self.registry.advance(delta_time);
        if report.pass_limit_hit {
            tracing::debug!("Frame {} deferred timers to the next frame", report.frame);
        }

        self.frame_events = self.events.drain();
        for event in &self.frame_events {
            self.tally.record(event);
        }

        let stats = FrameStats {
            frame: report.frame,
            delta_time: report.applied_delta,
            events_drained: self.frame_events.len(),
            active_instances: self.registry.active_count(),
            timers_fired: report.timers_fired,
        };
        self.stats.record(stats, delta_time);
        self.last_report = report;
        stats
    }

    /// The registry, for playing and stopping effects.
    pub fn registry_mut(&mut self) -> &mut EffectRegistry {
        &mut self.registry
    }

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Events drained by the last [`Self::tick`].
    #[must_use]
    pub fn frame_events(&self) -> &[EffectEvent] {
        &self.frame_events
    }

    /// Running event counts.
    #[must_use]
    pub fn tally(&self) -> &EventTally {
        &self.tally
    }

    /// Accumulated frame statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Registry report from the last frame.
    #[must_use]
    pub fn last_report(&self) -> TickReport {
        self.last_report
    }

    /// Shuts the registry down and drains the final events.
    pub fn shutdown(&mut self) {
        self.registry.shutdown();
        for event in self.events.drain() {
            self.tally.record(&event);
        }
        self.frame_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_vfx::{
        AnimationSpec, BackendSpec, EffectTemplate, PlayParams, RegistryConfig, TemplateId,
        TemplateLibrary,
    };

    const FLASH: TemplateId = TemplateId::from_path("fx/flash");

    fn fx_loop() -> FxLoop {
        let library = TemplateLibrary::new().with(EffectTemplate::simple(
            "fx/flash",
            vec![BackendSpec::Animation(AnimationSpec {
                clip_length: 0.5,
                ..AnimationSpec::default()
            })],
        ));
        FxLoop::new(EffectRegistry::with_scene_graph(RegistryConfig::default(), library))
    }

    #[test]
    fn test_tick_drains_events() {
        let mut fx = fx_loop();
        fx.registry_mut().play_effect(FLASH, PlayParams::default()).unwrap();

        let stats = fx.tick(0.05);
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.active_instances, 1);
        assert_eq!(stats.events_drained, 2); // Spawned + Started
        assert_eq!(fx.tally().started, 1);
    }

    #[test]
    fn test_effect_recycles_over_frames() {
        let mut fx = fx_loop();
        fx.registry_mut().play_effect(FLASH, PlayParams::default()).unwrap();

        for _ in 0..6 {
            fx.tick(0.1);
        }
        assert_eq!(fx.registry().active_count(), 0);
        assert_eq!(fx.tally().recycled, 1);
        assert_eq!(fx.stats().peak_active, 1);
    }

    #[test]
    fn test_clamped_frames_counted() {
        let mut fx = fx_loop();
        let stats = fx.tick(2.0);
        assert!((stats.delta_time - 0.1).abs() < f32::EPSILON);
        fx.tick(-1.0);
        assert_eq!(fx.stats().clamped_frames, 2);
    }

    #[test]
    fn test_shutdown_counts_destroyed() {
        let mut fx = fx_loop();
        fx.registry_mut().play_effect(FLASH, PlayParams::default()).unwrap();
        fx.tick(0.05);
        fx.shutdown();
        assert_eq!(fx.tally().destroyed, 1);
        assert!(fx.registry().is_shut_down());
    }
}
