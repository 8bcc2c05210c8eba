//! Particle emitter backend.
//!
//! Particles are tracked by remaining lifetime only; simulation and drawing
//! belong to the renderer.

use serde::{Deserialize, Serialize};

use super::EffectBackend;

/// Emitter types
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterType {
    /// All particles spawn at once
    #[default]
    Burst,
    /// Particles spawn over time
    Stream {
        /// Duration in seconds
        duration: f32,
    },
    /// Continuous emission
    Continuous,
}

/// Authored particle emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSpec {
    /// Emission pattern.
    pub emitter: EmitterType,
    /// Particles spawned by a burst.
    pub spawn_count: u32,
    /// Particles per second for stream and continuous emitters.
    pub spawn_rate: f32,
    /// Lifetime of each particle in seconds.
    pub lifetime: f32,
    /// Hard cap on live particles.
    pub max_particles: u32,
}

impl Default for ParticleSpec {
    fn default() -> Self {
        Self {
            emitter: EmitterType::Burst,
            spawn_count: 32,
            spawn_rate: 0.0,
            lifetime: 1.0,
            max_particles: 1024,
        }
    }
}

/// A particle emitter (CPU side)
#[derive(Debug, Clone)]
pub struct ParticleBackend {
    spec: ParticleSpec,
    /// Remaining lifetime of each live particle.
    particles: Vec<f32>,
    /// Time since start
    age: f32,
    emitting: bool,
    /// Fractional particles owed by rate emission
    spawn_accumulator: f32,
    spawned_total: u64,
}

impl ParticleBackend {
    /// Creates an idle emitter.
    #[must_use]
    pub fn new(spec: ParticleSpec) -> Self {
        let capacity = spec.max_particles as usize;
        Self {
            spec,
            particles: Vec::with_capacity(capacity),
            age: 0.0,
            emitting: false,
            spawn_accumulator: 0.0,
            spawned_total: 0,
        }
    }

    /// Live particle count.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.particles.len()
    }

    /// True while new particles are still being emitted.
    #[must_use]
    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    /// Particles spawned since creation.
    #[must_use]
    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    fn spawn(&mut self, count: u32) {
        let room = (self.spec.max_particles as usize).saturating_sub(self.particles.len());
        let count = (count as usize).min(room);
        self.particles
            .extend(std::iter::repeat(self.spec.lifetime).take(count));
        self.spawned_total += count as u64;
    }

    fn emit_for(&mut self, dt: f32) {
        self.spawn_accumulator += self.spec.spawn_rate.max(0.0) * dt;
        let whole = self.spawn_accumulator.floor();
        self.spawn_accumulator -= whole;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.spawn(whole as u32);
    }
}

impl EffectBackend for ParticleBackend {
    fn start(&mut self) {
        self.particles.clear();
        self.age = 0.0;
        self.spawn_accumulator = 0.0;
        self.emitting = true;

        if self.spec.emitter == EmitterType::Burst {
            // Burst emitters are done emitting once they have spawned
            self.spawn(self.spec.spawn_count);
            self.emitting = false;
        }
    }

    fn advance(&mut self, dt: f32) {
        for remaining in &mut self.particles {
            *remaining -= dt;
        }
        self.particles.retain(|remaining| *remaining > 0.0);

        if !self.emitting {
            return;
        }

        match self.spec.emitter {
            EmitterType::Burst => self.emitting = false,
            EmitterType::Stream { duration } => {
                let window = (duration - self.age).clamp(0.0, dt);
                self.emit_for(window);
                self.age += dt;
                if self.age >= duration {
                    self.emitting = false;
                }
            }
            EmitterType::Continuous => {
                self.emit_for(dt);
                self.age += dt;
            }
        }
    }

    fn stop_graceful(&mut self) {
        self.emitting = false;
    }

    fn stop_immediate(&mut self) {
        self.emitting = false;
        self.particles.clear();
    }

    fn is_finished(&self) -> bool {
        !self.emitting && self.particles.is_empty()
    }

    fn reported_duration(&self) -> f32 {
        match self.spec.emitter {
            EmitterType::Burst => self.spec.lifetime,
            EmitterType::Stream { duration } => duration,
            EmitterType::Continuous => -1.0,
        }
    }

    fn reported_looping(&self) -> bool {
        self.spec.emitter == EmitterType::Continuous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(emitter: EmitterType) -> ParticleSpec {
        ParticleSpec {
            emitter,
            spawn_count: 10,
            spawn_rate: 4.0,
            lifetime: 1.0,
            max_particles: 64,
        }
    }

    #[test]
    fn test_burst_spawns_once_and_dies_out() {
        let mut emitter = ParticleBackend::new(spec(EmitterType::Burst));
        emitter.start();
        assert_eq!(emitter.alive_count(), 10);
        assert!(!emitter.is_emitting());

        emitter.advance(0.5);
        assert_eq!(emitter.alive_count(), 10);
        assert!(!emitter.is_finished());

        emitter.advance(0.5);
        assert!(emitter.is_finished());
    }

    #[test]
    fn test_stream_emits_for_duration() {
        let mut emitter = ParticleBackend::new(spec(EmitterType::Stream { duration: 1.0 }));
        emitter.start();
        emitter.advance(0.5);
        assert!(emitter.is_emitting());
        assert_eq!(emitter.spawned_total(), 2);

        emitter.advance(0.75);
        assert!(!emitter.is_emitting());
        assert_eq!(emitter.spawned_total(), 4);
    }

    #[test]
    fn test_continuous_graceful_stop_drains() {
        let mut emitter = ParticleBackend::new(spec(EmitterType::Continuous));
        assert!(emitter.reported_looping());
        emitter.start();
        emitter.advance(0.5);
        assert!(emitter.alive_count() > 0);

        emitter.stop_graceful();
        assert!(!emitter.is_finished());
        emitter.advance(1.0);
        assert!(emitter.is_finished());
    }

    #[test]
    fn test_immediate_stop_clears() {
        let mut emitter = ParticleBackend::new(spec(EmitterType::Burst));
        emitter.start();
        emitter.stop_immediate();
        assert!(emitter.is_finished());
        assert_eq!(emitter.alive_count(), 0);
    }

    #[test]
    fn test_max_particles_cap() {
        let mut emitter = ParticleBackend::new(ParticleSpec {
            spawn_count: 500,
            max_particles: 16,
            ..ParticleSpec::default()
        });
        emitter.start();
        assert_eq!(emitter.alive_count(), 16);
    }
}
