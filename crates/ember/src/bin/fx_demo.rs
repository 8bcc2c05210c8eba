//! # EMBER Showcase
//!
//! Headless demo: loads the effect library and registry config from
//! `data/effects`, plays a scripted timeline and logs what happens.
//!
//! ```bash
//! # Default data directory, 4 seconds
//! cargo run --bin fx_demo
//!
//! # Custom data directory and length, with lifecycle tracing
//! RUST_LOG=ember_vfx=debug cargo run --bin fx_demo -- data/effects 10
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ember::shared::{Quaternion, Transform, Vec3};
use ember::vfx::{
    EffectRegistry, NodePlacement, PlayParams, RegistryConfig, SceneGraph, TemplateId,
    TemplateLibrary,
};
use ember::FxLoop;
use tracing_subscriber::filter::EnvFilter;

/// Target frame time for 60 FPS.
const TARGET_FRAME_TIME: Duration = Duration::from_micros(16_666);

const SPARK: TemplateId = TemplateId::from_path("fx/spark");
const HIT_FLASH: TemplateId = TemplateId::from_path("fx/hit_flash");
const COMBO: TemplateId = TemplateId::from_path("fx/combo");
const PULSE: TemplateId = TemplateId::from_path("fx/pulse");
const AURA: TemplateId = TemplateId::from_path("fx/aura");

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load(data_dir: &Path) -> Result<FxLoop, ember::vfx::ConfigError> {
    let config_path = data_dir.join("registry.toml");
    let config = if config_path.exists() {
        RegistryConfig::load(&config_path)?
    } else {
        tracing::warn!("{} not found; using default registry config", config_path.display());
        RegistryConfig::default()
    };
    let library = TemplateLibrary::load(data_dir.join("showcase.toml"))?;
    Ok(FxLoop::new(EffectRegistry::new(config, library, SceneGraph::new())))
}

/// Scripted gameplay: what fires at which frame.
fn script(fx: &mut FxLoop, frame: u64) {
    let registry = fx.registry_mut();
    match frame {
        1 => {
            let hero = registry.placement_mut().create_node("hero");
            registry
                .placement_mut()
                .place_in_world(hero, Transform::from_position(Vec3::new(0.0, 0.0, 5.0)));
            registry.play_effect(AURA, PlayParams::attached_to(hero).with_position(Vec3::Y));
            registry.play_effect(COMBO, PlayParams::near(hero).with_position(Vec3::Z));
        }
        30 => {
            let spin = Quaternion::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_4);
            match registry.spawn_standalone(
                PULSE,
                NodePlacement::world(Transform::new(Vec3::new(3.0, 0.0, 0.0), spin, Vec3::ONE)),
                true,
            ) {
                Ok(handle) => tracing::info!("Standalone pulse spawned: {:?}", handle),
                Err(error) => tracing::error!("Standalone pulse failed: {}", error),
            }
        }
        f if f % 12 == 0 => {
            // A burst of hits every 0.2s, enough to push the pool past capacity
            for i in 0..4u8 {
                let x = f32::from(i) - 1.5;
                registry.play_effect(SPARK, PlayParams::at(Vec3::new(x, 1.0, 0.0)));
                registry.play_effect(HIT_FLASH, PlayParams::at(Vec3::new(x, 1.0, 0.0)));
            }
        }
        _ => {}
    }
}

fn main() {
    init_logging();

    let mut args = std::env::args().skip(1);
    let data_dir = args.next().map_or_else(|| PathBuf::from("data/effects"), PathBuf::from);
    let seconds: f32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(4.0);

    let mut fx = match load(&data_dir) {
        Ok(fx) => fx,
        Err(error) => {
            tracing::error!("Failed to load effect data from {}: {}", data_dir.display(), error);
            std::process::exit(1);
        }
    };

    tracing::info!("EMBER showcase: {}s from {}", seconds, data_dir.display());

    let started = Instant::now();
    let mut last = started;
    while started.elapsed().as_secs_f32() < seconds {
        let frame_start = Instant::now();
        let delta = frame_start.duration_since(last).as_secs_f32();
        last = frame_start;

        let next_frame = fx.registry().frame() + 1;
        script(&mut fx, next_frame);
        let stats = fx.tick(delta);
        if stats.frame % 60 == 0 {
            tracing::info!(
                "Frame {}: {} active, {} events, {} timers",
                stats.frame,
                stats.active_instances,
                stats.events_drained,
                stats.timers_fired
            );
            for (template, pool) in fx.registry().pool_stats_all() {
                tracing::debug!(
                    "  pool {}: {} active / {} idle (cap {})",
                    template,
                    pool.count_active,
                    pool.count_inactive,
                    pool.capacity_max
                );
            }
        }

        if let Some(remaining) = TARGET_FRAME_TIME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    fx.shutdown();
    fx.stats().log_summary(fx.tally());
    if fx.registry().dropped_events() > 0 {
        tracing::warn!("{} events dropped", fx.registry().dropped_events());
    }
}
