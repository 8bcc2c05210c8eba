//! # EMBER VFX
//!
//! Effect pooling and playback orchestration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        EffectRegistry                            │
//! │                                                                  │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐                │
//! │  │ EffectPool │   │ EffectPool │   │ Standalone │   TimerQueue   │
//! │  │  fx/spark  │   │ fx/combo   │   │ instances  │   (deadlines)  │
//! │  └─────┬──────┘   └─────┬──────┘   └────────────┘                │
//! │        │                │                                        │
//! │   EffectInstance   EffectInstance (Director)                     │
//! │   └ BackendSet     └ DirectorEntry ──plays──> pooled children    │
//! └──────────────────────────────────────────────────────────────────┘
//!          │ placement                        │ events
//!          v                                  v
//!   PlacementProvider                   EffectEventBus
//! ```
//!
//! ## Rules
//!
//! 1. **One pool per template** - a pool never hands out another template
//! 2. **Handles are generational** - a recycled instance's old handle is dead
//! 3. **Tick-driven** - every delay is a timer against the host's Δt
//! 4. **Violations heal** - misuse is logged, reported and recovered from
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_vfx::{EffectRegistry, PlayParams, RegistryConfig, TemplateId, TemplateLibrary};
//!
//! let library = TemplateLibrary::load("data/effects/showcase.toml")?;
//! let mut registry = EffectRegistry::with_scene_graph(RegistryConfig::default(), library);
//!
//! let spark = TemplateId::from_path("fx/spark");
//! registry.play_effect(spark, PlayParams::at(Vec3::new(0.0, 1.0, 0.0)));
//! registry.advance(1.0 / 60.0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod config;
pub mod director;
pub mod error;
pub mod events;
pub mod instance;
pub mod params;
pub mod placement;
pub mod pool;
pub mod registry;
pub mod shared;
pub mod template;

pub use backend::{
    AnimationBackend, AnimationSpec, BackendSet, BackendSpec, EffectBackend, EmitterType,
    ParticleBackend, ParticleSpec,
};
pub use config::{PoolOverride, RegistryConfig};
pub use director::{Director, DirectorEntry, EntrySpec, LoopBehavior, MIN_REPEAT_INTERVAL};
pub use error::{ConfigError, ConfigResult, EffectError, EffectResult};
pub use events::{EffectEvent, EffectEventBus, EffectEventReceiver, EffectEventSender, Violation};
pub use instance::{EffectHandle, EffectInstance, EffectKind, EffectState};
pub use params::PlayParams;
pub use placement::{NodeId, NodePlacement, PlacementProvider, SceneGraph};
pub use pool::{EffectPool, PoolId};
pub use registry::{EffectRegistry, StopOutcome, TickReport};
pub use shared::SharedRegistry;
pub use template::{
    BackendFactory, EffectDescriptor, EffectTemplate, TemplateId, TemplateLibrary, TemplateSource,
    Timing,
};
