//! # Showcase Data Tests
//!
//! The shipped `data/effects` files must parse and play.
//!
//! Run with: cargo test -p ember --test showcase_data

use std::path::PathBuf;

use ember::core::OverflowPolicy;
use ember::vfx::{
    EffectRegistry, PlayParams, RegistryConfig, TemplateId, TemplateLibrary, Timing,
};
use ember::FxLoop;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/effects")
}

fn showcase() -> (RegistryConfig, TemplateLibrary) {
    let config = RegistryConfig::load(data_dir().join("registry.toml")).unwrap();
    let library = TemplateLibrary::load(data_dir().join("showcase.toml")).unwrap();
    (config, library)
}

#[test]
fn test_registry_config_parses() {
    let (config, _) = showcase();
    assert_eq!(config.prewarm, 2);

    let (spark, spark_prewarm) = config.pool_for(TemplateId::from_path("fx/spark"));
    assert_eq!(spark.capacity_max, 16);
    assert_eq!(spark_prewarm, 8);

    let (flash, _) = config.pool_for(TemplateId::from_path("fx/hit_flash"));
    assert_eq!(flash.overflow, OverflowPolicy::KeepAndWarn);
}

#[test]
fn test_showcase_timings() {
    let (config, library) = showcase();
    assert_eq!(library.len(), 6);
    let mut registry = EffectRegistry::with_scene_graph(config, library);

    let timing = |registry: &mut EffectRegistry, path: &str| {
        registry.template_timing(TemplateId::from_path(path)).unwrap()
    };
    assert_eq!(timing(&mut registry, "fx/spark"), Timing::one_shot(0.4));
    assert_eq!(timing(&mut registry, "fx/aura"), Timing::looping());
    // smoke: 0.3 delay + 1.2 stream
    assert!((timing(&mut registry, "fx/combo").duration - 1.5).abs() < 1e-6);
    assert_eq!(timing(&mut registry, "fx/pulse"), Timing::one_shot(2.5));
}

#[test]
fn test_showcase_plays_out() {
    let (config, library) = showcase();
    let mut fx = FxLoop::new(EffectRegistry::with_scene_graph(config, library));

    let combo = fx
        .registry_mut()
        .play_effect(TemplateId::from_path("fx/combo"), PlayParams::default())
        .unwrap();
    let pulse = fx
        .registry_mut()
        .play_effect(TemplateId::from_path("fx/pulse"), PlayParams::default())
        .unwrap();

    for _ in 0..40 {
        fx.tick(0.1);
    }

    assert!(!fx.registry().is_live(combo));
    assert!(!fx.registry().is_live(pulse));
    assert_eq!(fx.registry().active_count(), 0);
    assert_eq!(fx.tally().violations, 0);
    // flash, spark, smoke + four pulse sparks and an aura
    assert_eq!(fx.tally().started, 2 + 3 + 4 + 1);
}
