//! # Playback Backends
//!
//! A backend is whatever actually renders an effect: a particle system, an
//! animated clip, or a test double. The engine only needs to start it, stop
//! it (gracefully or at once) and ask how long it runs.
//!
//! A simple effect owns a [`BackendSet`]; the set aggregates its members:
//! - Duration is the longest member duration
//! - Looping if any member loops
//! - Finished only when every member has finished

mod animation;
mod particles;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use animation::{AnimationBackend, AnimationSpec};
pub use particles::{EmitterType, ParticleBackend, ParticleSpec};

/// Playback collaborator driven by an effect instance.
pub trait EffectBackend: Send + fmt::Debug {
    /// Begins playback from the start.
    fn start(&mut self);

    /// Advances playback by `dt` seconds.
    fn advance(&mut self, dt: f32);

    /// Stops emitting new content; existing content plays out.
    fn stop_graceful(&mut self);

    /// Stops and clears everything at once.
    fn stop_immediate(&mut self);

    /// True once nothing is left to play.
    fn is_finished(&self) -> bool;

    /// Natural playback length in seconds. Negative means indeterminate.
    fn reported_duration(&self) -> f32;

    /// True if playback never ends on its own.
    fn reported_looping(&self) -> bool;
}

/// Authored description of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSpec {
    /// Particle emitter.
    Particles(ParticleSpec),
    /// Animated clip.
    Animation(AnimationSpec),
}

impl BackendSpec {
    /// Instantiates the backend.
    #[must_use]
    pub fn build(&self) -> Box<dyn EffectBackend> {
        match self {
            Self::Particles(spec) => Box::new(ParticleBackend::new(spec.clone())),
            Self::Animation(spec) => Box::new(AnimationBackend::new(spec.clone())),
        }
    }
}

/// The backends of one simple effect, driven as a unit.
#[derive(Debug, Default)]
pub struct BackendSet {
    backends: Vec<Box<dyn EffectBackend>>,
}

impl BackendSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one backend per spec.
    #[must_use]
    pub fn from_specs(specs: &[BackendSpec]) -> Self {
        Self {
            backends: specs.iter().map(BackendSpec::build).collect(),
        }
    }

    /// Adds a backend.
    pub fn push(&mut self, backend: Box<dyn EffectBackend>) {
        self.backends.push(backend);
    }

    /// Number of backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True if the set has no backends.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Iterates over the backends.
    pub fn iter(&self) -> impl Iterator<Item = &dyn EffectBackend> {
        self.backends.iter().map(AsRef::as_ref)
    }
}

impl EffectBackend for BackendSet {
    fn start(&mut self) {
        self.backends.iter_mut().for_each(|b| b.start());
    }

    fn advance(&mut self, dt: f32) {
        self.backends.iter_mut().for_each(|b| b.advance(dt));
    }

    fn stop_graceful(&mut self) {
        self.backends.iter_mut().for_each(|b| b.stop_graceful());
    }

    fn stop_immediate(&mut self) {
        self.backends.iter_mut().for_each(|b| b.stop_immediate());
    }

    fn is_finished(&self) -> bool {
        self.backends.iter().all(|b| b.is_finished())
    }

    fn reported_duration(&self) -> f32 {
        self.backends
            .iter()
            .map(|b| b.reported_duration())
            .fold(0.0, f32::max)
    }

    fn reported_looping(&self) -> bool {
        self.backends.iter().any(|b| b.reported_looping())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_aggregates_duration_and_looping() {
        let set = BackendSet::from_specs(&[
            BackendSpec::Animation(AnimationSpec {
                clip_length: 2.5,
                ..AnimationSpec::default()
            }),
            BackendSpec::Particles(ParticleSpec {
                emitter: EmitterType::Burst,
                lifetime: 1.0,
                ..ParticleSpec::default()
            }),
        ]);

        assert_eq!(set.len(), 2);
        assert!((set.reported_duration() - 2.5).abs() < f32::EPSILON);
        assert!(!set.reported_looping());
    }

    #[test]
    fn test_set_loops_if_any_member_loops() {
        let set = BackendSet::from_specs(&[
            BackendSpec::Animation(AnimationSpec::default()),
            BackendSpec::Particles(ParticleSpec {
                emitter: EmitterType::Continuous,
                spawn_rate: 10.0,
                ..ParticleSpec::default()
            }),
        ]);
        assert!(set.reported_looping());
    }

    #[test]
    fn test_set_finished_only_when_all_finished() {
        let mut set = BackendSet::from_specs(&[
            BackendSpec::Animation(AnimationSpec {
                clip_length: 1.0,
                ..AnimationSpec::default()
            }),
            BackendSpec::Animation(AnimationSpec {
                clip_length: 2.0,
                ..AnimationSpec::default()
            }),
        ]);
        set.start();
        set.advance(1.5);
        assert!(!set.is_finished());
        set.advance(1.0);
        assert!(set.is_finished());
    }

    #[test]
    fn test_empty_set() {
        let set = BackendSet::new();
        assert!(set.is_empty());
        assert!(set.is_finished());
        assert_eq!(set.reported_duration(), 0.0);
    }
}
