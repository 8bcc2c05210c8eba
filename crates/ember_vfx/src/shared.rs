//! Thread-safe handle to a registry.
//!
//! Gameplay code on worker threads plays and stops effects through a
//! [`SharedRegistry`]; the host thread ticks it. Every call takes the lock
//! for the duration of one operation only.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use ember_core::PoolStats;

use crate::instance::EffectHandle;
use crate::params::PlayParams;
use crate::registry::{EffectRegistry, StopOutcome, TickReport};
use crate::template::TemplateId;

/// Cloneable, lock-protected [`EffectRegistry`].
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<EffectRegistry>>,
}

impl SharedRegistry {
    /// Wraps a registry.
    #[must_use]
    pub fn new(registry: EffectRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Locks the registry for several operations in a row.
    pub fn lock(&self) -> MutexGuard<'_, EffectRegistry> {
        self.inner.lock()
    }

    /// See [`EffectRegistry::play_effect`].
    pub fn play_effect(&self, template: TemplateId, params: PlayParams) -> Option<EffectHandle> {
        self.inner.lock().play_effect(template, params)
    }

    /// See [`EffectRegistry::stop`].
    pub fn stop(&self, handle: EffectHandle, immediate: bool) -> StopOutcome {
        self.inner.lock().stop(handle, immediate)
    }

    /// See [`EffectRegistry::stop_effect`].
    pub fn stop_effect(&self, handle: EffectHandle) -> bool {
        self.inner.lock().stop_effect(handle)
    }

    /// See [`EffectRegistry::advance`].
    pub fn advance(&self, dt: f32) -> TickReport {
        self.inner.lock().advance(dt)
    }

    /// See [`EffectRegistry::pool_stats`].
    #[must_use]
    pub fn pool_stats(&self, template: TemplateId) -> Option<PoolStats> {
        self.inner.lock().pool_stats(template)
    }

    /// See [`EffectRegistry::shutdown`].
    pub fn shutdown(&self) {
        self.inner.lock().shutdown();
    }
}

impl std::fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegistry")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendSpec, ParticleSpec};
    use crate::config::RegistryConfig;
    use crate::template::{EffectTemplate, TemplateLibrary};

    #[test]
    fn test_play_from_worker_thread() {
        let library = TemplateLibrary::new().with(EffectTemplate::simple(
            "fx/spark",
            vec![BackendSpec::Particles(ParticleSpec::default())],
        ));
        let shared = SharedRegistry::new(EffectRegistry::with_scene_graph(
            RegistryConfig::default(),
            library,
        ));
        let spark = TemplateId::from_path("fx/spark");

        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || shared.play_effect(spark, PlayParams::default()))
        };
        let handle = worker.join().unwrap().unwrap();

        assert!(shared.lock().is_live(handle));
        assert!(shared.stop_effect(handle));
        assert_eq!(shared.pool_stats(spark).unwrap().count_active, 0);
        shared.shutdown();
    }
}
