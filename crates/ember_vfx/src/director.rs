//! # Directors
//!
//! A director is a composite effect: an ordered list of entries, each of
//! which plays a sub-effect after a start delay under a loop policy.
//!
//! ```text
//! director time ──────────────────────────────────────────────>
//! entry 0  [delay]──play──────────────┤                       Inherit
//! entry 1  [delay]──play──┬──play──┬──play──┬── ...           RepeatWithDirector
//! entry 2  [delay]──play (looping) ──────────┤stop            LoopForDuration
//! ```
//!
//! This module holds the authored entry data and the pure timing math. The
//! registry owns the timers that actually drive the entries.

use ember_core::TimerId;
use ember_shared::{Quaternion, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{EffectError, EffectResult};
use crate::instance::EffectHandle;
use crate::template::{TemplateId, Timing};

/// Shortest repeat interval honored by the repeat policies.
///
/// Smaller authored intervals are raised to this so a repeat can never spawn
/// unboundedly within one tick.
pub const MIN_REPEAT_INTERVAL: f32 = 0.01;

/// How an entry's sub-effect is (re)played.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopBehavior {
    /// Play once; the sub-effect's own duration governs.
    #[default]
    Inherit,
    /// Play once, then stop gracefully after `loop_duration`.
    LoopForDuration,
    /// Play every `repeat_interval` while the director is active.
    RepeatWithDirector,
    /// Play every `repeat_interval` until `loop_duration` is covered.
    RepeatForDuration,
}

/// Authored director entry.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EntrySpec {
    /// Sub-effect template. Entries without one are skipped.
    pub template: Option<TemplateId>,
    /// Seconds after the director starts.
    pub start_delay: f32,
    /// Loop policy.
    pub loop_behavior: LoopBehavior,
    /// Bound for [`LoopBehavior::LoopForDuration`] and [`LoopBehavior::RepeatForDuration`].
    pub loop_duration: f32,
    /// Spacing of repeat spawns.
    pub repeat_interval: f32,
    /// Fraction of the sub-effect's duration after which it detaches, in `[0, 1]`.
    pub deparent_time: f32,
    /// Offset relative to the director.
    pub position: Vec3,
    /// Rotation relative to the director.
    pub rotation: Quaternion,
    /// Scale relative to the director.
    pub scale: Vec3,
}

impl Default for EntrySpec {
    fn default() -> Self {
        Self {
            template: None,
            start_delay: 0.0,
            loop_behavior: LoopBehavior::Inherit,
            loop_duration: 1.0,
            repeat_interval: 1.0,
            deparent_time: 0.0,
            position: Vec3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl EntrySpec {
    /// Inherit entry for `template` with no delay.
    #[must_use]
    pub fn new(template: TemplateId) -> Self {
        Self {
            template: Some(template),
            ..Self::default()
        }
    }

    /// Sets the start delay.
    #[must_use]
    pub fn with_start_delay(mut self, delay: f32) -> Self {
        self.start_delay = delay.max(0.0);
        self
    }

    /// Sets the loop policy.
    #[must_use]
    pub fn with_loop_behavior(mut self, behavior: LoopBehavior) -> Self {
        self.loop_behavior = behavior;
        self
    }

    /// Sets the loop duration.
    #[must_use]
    pub fn with_loop_duration(mut self, duration: f32) -> Self {
        self.loop_duration = duration;
        self
    }

    /// Sets the repeat interval.
    #[must_use]
    pub fn with_repeat_interval(mut self, interval: f32) -> Self {
        self.repeat_interval = interval;
        self
    }

    /// Sets the deparent fraction.
    #[must_use]
    pub fn with_deparent_time(mut self, fraction: f32) -> Self {
        self.deparent_time = fraction.clamp(0.0, 1.0);
        self
    }

    /// Sets the transform relative to the director.
    #[must_use]
    pub fn with_local(mut self, local: Transform) -> Self {
        self.position = local.position;
        self.rotation = local.rotation;
        self.scale = local.scale;
        self
    }

    /// Transform relative to the director.
    #[must_use]
    pub fn local_transform(&self) -> Transform {
        Transform::new(self.position, self.rotation, self.scale)
    }

    /// Repeat interval with the floor applied.
    #[must_use]
    pub fn effective_repeat_interval(&self) -> f32 {
        self.repeat_interval.max(MIN_REPEAT_INTERVAL)
    }

    /// Whether this entry keeps the director running indefinitely.
    #[must_use]
    pub fn effective_looping(&self, template: Timing) -> bool {
        match self.loop_behavior {
            LoopBehavior::Inherit => template.looping,
            LoopBehavior::LoopForDuration | LoopBehavior::RepeatForDuration => false,
            LoopBehavior::RepeatWithDirector => true,
        }
    }

    /// Seconds this entry runs after its start delay.
    #[must_use]
    pub fn effective_duration(&self, template: Timing) -> f32 {
        match self.loop_behavior {
            LoopBehavior::Inherit => template.duration,
            LoopBehavior::LoopForDuration | LoopBehavior::RepeatForDuration => self.loop_duration,
            LoopBehavior::RepeatWithDirector => Timing::INDETERMINATE,
        }
    }

    /// Maps director time to this entry's local time.
    ///
    /// Negative before the entry starts. Repeat policies wrap into
    /// `[0, repeat_interval]`.
    #[must_use]
    pub fn effective_local_time(&self, director_time: f32) -> f32 {
        let local = director_time - self.start_delay;
        match self.loop_behavior {
            LoopBehavior::Inherit | LoopBehavior::LoopForDuration => local,
            LoopBehavior::RepeatWithDirector | LoopBehavior::RepeatForDuration => {
                let interval = self.effective_repeat_interval();
                (local % interval).clamp(0.0, interval)
            }
        }
    }
}

/// Runtime state of one entry.
#[derive(Clone, Debug)]
pub struct DirectorEntry {
    spec: EntrySpec,
    /// Sub-effects spawned by this entry in the current cycle.
    pub(crate) live: Vec<EffectHandle>,
    pub(crate) start_timer: Option<TimerId>,
    /// Loop-end or next-repeat timer.
    pub(crate) follow_timer: Option<TimerId>,
    pub(crate) repeat_count: u32,
}

impl DirectorEntry {
    /// Idle entry.
    #[must_use]
    pub fn new(spec: EntrySpec) -> Self {
        Self {
            spec,
            live: Vec::new(),
            start_timer: None,
            follow_timer: None,
            repeat_count: 0,
        }
    }

    /// Authored data.
    #[must_use]
    pub fn spec(&self) -> &EntrySpec {
        &self.spec
    }

    /// Handles spawned this cycle. Pruned on each spawn, so some may
    /// already be stale between spawns.
    #[must_use]
    pub fn live(&self) -> &[EffectHandle] {
        &self.live
    }

    /// Spawns issued this cycle.
    #[must_use]
    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// True if any spawned sub-effect is still playing.
    pub fn is_playing(&self, is_live: impl Fn(EffectHandle) -> bool) -> bool {
        self.live.iter().any(|&handle| is_live(handle))
    }

    pub(crate) fn take_timers(&mut self) -> [Option<TimerId>; 2] {
        [self.start_timer.take(), self.follow_timer.take()]
    }
}

/// Director payload of an effect instance.
#[derive(Clone, Debug, Default)]
pub struct Director {
    entries: Vec<DirectorEntry>,
}

impl Director {
    /// Director with one idle entry per spec.
    #[must_use]
    pub fn new(specs: &[EntrySpec]) -> Self {
        Self {
            entries: specs.iter().cloned().map(DirectorEntry::new).collect(),
        }
    }

    /// Entries in authored order.
    #[must_use]
    pub fn entries(&self) -> &[DirectorEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [DirectorEntry] {
        &mut self.entries
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> Option<&mut DirectorEntry> {
        self.entries.get_mut(index)
    }

    /// Authored specs in order.
    #[must_use]
    pub fn specs(&self) -> Vec<EntrySpec> {
        self.entries.iter().map(|entry| entry.spec.clone()).collect()
    }

    /// True if any entry still has a playing sub-effect.
    pub fn has_live_children(&self, is_live: impl Fn(EffectHandle) -> bool) -> bool {
        self.entries.iter().any(|entry| entry.is_playing(&is_live))
    }

    /// Re-syncs entries to the current child templates.
    ///
    /// Entries for templates still present keep their authored timing, new
    /// templates get default [`LoopBehavior::Inherit`] entries and entries
    /// for vanished templates are dropped. Returns true if anything changed.
    pub fn rebuild_entries(&mut self, templates: &[TemplateId]) -> bool {
        let mut previous = std::mem::take(&mut self.entries);
        let before = previous.len();
        let mut changed = false;

        for &template in templates {
            let existing = previous
                .iter()
                .position(|entry| entry.spec.template == Some(template));
            match existing {
                Some(index) => self.entries.push(previous.remove(index)),
                None => {
                    self.entries.push(DirectorEntry::new(EntrySpec::new(template)));
                    changed = true;
                }
            }
        }

        if !previous.is_empty() {
            tracing::debug!("Director dropped {} stale entries", previous.len());
            changed = true;
        }
        changed || before != self.entries.len()
    }
}

/// Resolves a director's timing from its entries.
///
/// Duration is the max of `start_delay + effective_duration` over the
/// non-looping entries; any looping entry makes the director indeterminate.
/// Entries whose template is missing or unknown are skipped.
///
/// # Errors
///
/// Propagates any error from `timing_of` other than an unknown template.
pub fn compute_timing(
    entries: &[EntrySpec],
    mut timing_of: impl FnMut(TemplateId) -> EffectResult<Timing>,
) -> EffectResult<Timing> {
    let mut duration = 0.0f32;
    let mut looping = false;

    for entry in entries {
        let Some(template) = entry.template else {
            continue;
        };
        let timing = match timing_of(template) {
            Ok(timing) => timing,
            Err(EffectError::UnknownTemplate(id)) => {
                tracing::warn!("Director entry references unknown template {}", id);
                continue;
            }
            Err(error) => return Err(error),
        };

        if entry.effective_looping(timing) {
            looping = true;
        } else {
            duration = duration.max(entry.start_delay + entry.effective_duration(timing).max(0.0));
        }
    }

    Ok(if looping {
        Timing::looping()
    } else {
        Timing::one_shot(duration)
    })
}
