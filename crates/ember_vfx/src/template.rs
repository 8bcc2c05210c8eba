//! # Effect Templates
//!
//! A template is the immutable identity an effect is played by. Its id
//! selects the pool; its descriptor says how to build an instance.
//!
//! Libraries are authored in TOML:
//!
//! ```toml
//! [[template]]
//! path = "fx/spark_burst"
//! kind = "simple"
//!
//! [[template.backends]]
//! type = "particles"
//! emitter = "burst"
//! spawn_count = 40
//! lifetime = 0.8
//!
//! [[template]]
//! path = "fx/explosion"
//! kind = "director"
//!
//! [[template.entries]]
//! template = "fx/spark_burst"
//! start_delay = 0.25
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ember_shared::Vec3;
use serde::Deserialize;

use crate::backend::{BackendSet, BackendSpec, EffectBackend};
use crate::director::{self, EntrySpec};
use crate::error::{ConfigError, ConfigResult, EffectError, EffectResult};

/// Stable identity of an effect template.
///
/// Usually derived from the asset path with FNV-1a, so the same path always
/// maps to the same pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub struct TemplateId(u64);

impl TemplateId {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Wraps a raw numeric id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Hashes an asset path into an id.
    #[must_use]
    pub const fn from_path(path: &str) -> Self {
        let bytes = path.as_bytes();
        let mut hash = Self::FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<&str> for TemplateId {
    fn from(path: &str) -> Self {
        Self::from_path(path)
    }
}

impl From<String> for TemplateId {
    fn from(path: String) -> Self {
        Self::from_path(&path)
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Resolved playback length of a template or instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    /// Seconds, or [`Timing::INDETERMINATE`].
    pub duration: f32,
    /// Never ends on its own.
    pub looping: bool,
}

impl Timing {
    /// Duration of looping or otherwise unbounded playback.
    pub const INDETERMINATE: f32 = -1.0;

    /// Bounded playback.
    #[must_use]
    pub fn one_shot(duration: f32) -> Self {
        Self {
            duration: duration.max(0.0),
            looping: false,
        }
    }

    /// Unbounded playback.
    #[must_use]
    pub const fn looping() -> Self {
        Self {
            duration: Self::INDETERMINATE,
            looping: true,
        }
    }

    /// Reads timing off a backend.
    #[must_use]
    pub fn of_backend(backend: &dyn EffectBackend) -> Self {
        if backend.reported_looping() {
            Self::looping()
        } else {
            Self::one_shot(backend.reported_duration())
        }
    }

    /// True if playback ends after a known number of seconds.
    #[must_use]
    pub fn is_determinate(&self) -> bool {
        !self.looping && self.duration >= 0.0
    }
}

/// Programmatic backend constructor for [`EffectDescriptor::Custom`].
#[derive(Clone)]
pub struct BackendFactory(Arc<dyn Fn() -> Box<dyn EffectBackend> + Send + Sync>);

impl BackendFactory {
    /// Wraps a constructor.
    pub fn new(factory: impl Fn() -> Box<dyn EffectBackend> + Send + Sync + 'static) -> Self {
        Self(Arc::new(factory))
    }

    /// Builds one backend.
    #[must_use]
    pub fn build(&self) -> Box<dyn EffectBackend> {
        (self.0)()
    }
}

impl fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackendFactory(..)")
    }
}

/// How instances of a template are built.
#[derive(Debug, Clone)]
pub enum EffectDescriptor {
    /// Plays a set of backends.
    Simple(Vec<BackendSpec>),
    /// Orchestrates sub-effects.
    Director(Vec<EntrySpec>),
    /// Plays one backend from a factory.
    Custom(BackendFactory),
}

/// Immutable effect template.
#[derive(Debug, Clone)]
pub struct EffectTemplate {
    /// Pool key.
    pub id: TemplateId,
    /// Human-readable name, used in logs.
    pub name: String,
    /// Prefab scale, restored on every recycle.
    pub base_scale: Vec3,
    /// Construction recipe.
    pub descriptor: EffectDescriptor,
}

impl EffectTemplate {
    /// Template with an explicit id.
    pub fn new(id: TemplateId, name: impl Into<String>, descriptor: EffectDescriptor) -> Self {
        Self {
            id,
            name: name.into(),
            base_scale: Vec3::ONE,
            descriptor,
        }
    }

    /// Simple effect keyed by its asset path.
    #[must_use]
    pub fn simple(path: &str, backends: Vec<BackendSpec>) -> Self {
        Self::new(TemplateId::from_path(path), path, EffectDescriptor::Simple(backends))
    }

    /// Director keyed by its asset path.
    #[must_use]
    pub fn director(path: &str, entries: Vec<EntrySpec>) -> Self {
        Self::new(TemplateId::from_path(path), path, EffectDescriptor::Director(entries))
    }

    /// Effect whose backend is built by `factory`.
    pub fn custom(
        path: &str,
        factory: impl Fn() -> Box<dyn EffectBackend> + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            TemplateId::from_path(path),
            path,
            EffectDescriptor::Custom(BackendFactory::new(factory)),
        )
    }

    /// Sets the prefab scale.
    #[must_use]
    pub fn with_base_scale(mut self, scale: Vec3) -> Self {
        self.base_scale = scale;
        self
    }

    /// True for director templates.
    #[must_use]
    pub fn is_director(&self) -> bool {
        matches!(self.descriptor, EffectDescriptor::Director(_))
    }
}

/// Template lookup used by the registry.
pub trait TemplateSource: Send {
    /// Looks up a template. `None` if the id is unknown.
    fn resolve(&self, id: TemplateId) -> Option<Arc<EffectTemplate>>;
}

/// In-memory template collection.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: HashMap<TemplateId, Arc<EffectTemplate>>,
}

impl TemplateLibrary {
    /// Empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template, replacing any template with the same id.
    pub fn insert(&mut self, template: EffectTemplate) -> TemplateId {
        let id = template.id;
        if let Some(previous) = self.templates.insert(id, Arc::new(template)) {
            tracing::warn!("Template {} ({}) replaced", previous.name, id);
        }
        id
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with(mut self, template: EffectTemplate) -> Self {
        self.insert(template);
        self
    }

    /// Looks up a template.
    #[must_use]
    pub fn get(&self, id: TemplateId) -> Option<&Arc<EffectTemplate>> {
        self.templates.get(&id)
    }

    /// True if the id is known.
    #[must_use]
    pub fn contains(&self, id: TemplateId) -> bool {
        self.templates.contains_key(&id)
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True if the library is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Parses a TOML library.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a template is inconsistent.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let mut library = Self::new();
        library.extend_from_toml_str(source)?;
        Ok(library)
    }

    /// Reads and parses a TOML library file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library = Self::from_toml_str(&source)?;
        tracing::info!("Loaded {} effect templates from {}", library.len(), path.display());
        Ok(library)
    }

    /// Adds every template from a TOML library.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a template is inconsistent.
    pub fn extend_from_toml_str(&mut self, source: &str) -> ConfigResult<()> {
        let file: LibraryFile = toml::from_str(source)?;
        for def in file.template {
            let template = def.into_template()?;
            self.insert(template);
        }
        Ok(())
    }
}

impl TemplateSource for TemplateLibrary {
    fn resolve(&self, id: TemplateId) -> Option<Arc<EffectTemplate>> {
        self.templates.get(&id).cloned()
    }
}

#[derive(Deserialize)]
struct LibraryFile {
    #[serde(default)]
    template: Vec<TemplateDef>,
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum TemplateKind {
    Simple,
    Director,
}

#[derive(Deserialize)]
struct TemplateDef {
    path: String,
    name: Option<String>,
    base_scale: Option<Vec3>,
    kind: TemplateKind,
    #[serde(default)]
    backends: Vec<BackendSpec>,
    #[serde(default)]
    entries: Vec<EntrySpec>,
}

impl TemplateDef {
    fn into_template(self) -> ConfigResult<EffectTemplate> {
        let descriptor = match self.kind {
            TemplateKind::Simple if !self.entries.is_empty() => {
                return Err(ConfigError::Invalid(format!(
                    "simple template {} has director entries",
                    self.path
                )));
            }
            TemplateKind::Director if !self.backends.is_empty() => {
                return Err(ConfigError::Invalid(format!(
                    "director template {} has backends",
                    self.path
                )));
            }
            TemplateKind::Simple => EffectDescriptor::Simple(self.backends),
            TemplateKind::Director => EffectDescriptor::Director(self.entries),
        };

        let name = self.name.unwrap_or_else(|| self.path.clone());
        let mut template = EffectTemplate::new(TemplateId::from_path(&self.path), name, descriptor);
        if let Some(scale) = self.base_scale {
            template.base_scale = scale;
        }
        Ok(template)
    }
}

/// Resolves a template's playback timing, memoized in `cache`.
///
/// Directors resolve their children recursively.
///
/// # Errors
///
/// Returns [`EffectError::UnknownTemplate`] if `id` cannot be resolved and
/// [`EffectError::DirectorCycle`] if a director contains itself.
pub fn resolve_timing(
    source: &dyn TemplateSource,
    id: TemplateId,
    cache: &mut HashMap<TemplateId, Timing>,
) -> EffectResult<Timing> {
    let mut stack = Vec::new();
    resolve_timing_inner(source, id, cache, &mut stack)
}

fn resolve_timing_inner(
    source: &dyn TemplateSource,
    id: TemplateId,
    cache: &mut HashMap<TemplateId, Timing>,
    stack: &mut Vec<TemplateId>,
) -> EffectResult<Timing> {
    if let Some(timing) = cache.get(&id) {
        return Ok(*timing);
    }
    if stack.contains(&id) {
        return Err(EffectError::DirectorCycle(id));
    }

    let template = source.resolve(id).ok_or(EffectError::UnknownTemplate(id))?;
    let timing = match &template.descriptor {
        EffectDescriptor::Simple(specs) => Timing::of_backend(&BackendSet::from_specs(specs)),
        EffectDescriptor::Custom(factory) => Timing::of_backend(factory.build().as_ref()),
        EffectDescriptor::Director(entries) => {
            stack.push(id);
            let timing = director::compute_timing(entries, |child| {
                resolve_timing_inner(source, child, cache, stack)
            });
            stack.pop();
            timing?
        }
    };

    cache.insert(id, timing);
    Ok(timing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnimationSpec, EmitterType, ParticleSpec};
    use crate::director::LoopBehavior;

    fn clip(path: &str, length: f32) -> EffectTemplate {
        EffectTemplate::simple(
            path,
            vec![BackendSpec::Animation(AnimationSpec {
                clip_length: length,
                ..AnimationSpec::default()
            })],
        )
    }

    #[test]
    fn test_template_id_is_stable() {
        assert_eq!(TemplateId::from_path("fx/spark"), TemplateId::from_path("fx/spark"));
        assert_ne!(TemplateId::from_path("fx/spark"), TemplateId::from_path("fx/smoke"));
        assert_eq!(TemplateId::from("fx/spark"), TemplateId::from_path("fx/spark"));
        // FNV-1a of the empty string is the offset basis
        assert_eq!(TemplateId::from_path("").raw(), 0xcbf2_9ce4_8422_2325);
    }

    #[test]
    fn test_director_timing_is_max_of_entries() {
        let a = TemplateId::from_path("fx/a");
        let library = TemplateLibrary::new()
            .with(clip("fx/a", 2.0))
            .with(EffectTemplate::director(
                "fx/dir",
                vec![EntrySpec::new(a), EntrySpec::new(a).with_start_delay(1.0)],
            ));

        let mut cache = HashMap::new();
        let timing = resolve_timing(&library, TemplateId::from_path("fx/dir"), &mut cache).unwrap();
        assert!(!timing.looping);
        assert!((timing.duration - 3.0).abs() < 1e-6);
        assert!(cache.contains_key(&a));
    }

    #[test]
    fn test_director_with_looping_entry_is_indeterminate() {
        let a = TemplateId::from_path("fx/a");
        let library = TemplateLibrary::new().with(clip("fx/a", 2.0)).with(EffectTemplate::director(
            "fx/dir",
            vec![EntrySpec::new(a).with_loop_behavior(LoopBehavior::RepeatWithDirector)],
        ));

        let timing =
            resolve_timing(&library, TemplateId::from_path("fx/dir"), &mut HashMap::new()).unwrap();
        assert_eq!(timing, Timing::looping());
    }

    #[test]
    fn test_director_cycle_rejected() {
        let outer = TemplateId::from_path("fx/outer");
        let inner = TemplateId::from_path("fx/inner");
        let library = TemplateLibrary::new()
            .with(EffectTemplate::director("fx/outer", vec![EntrySpec::new(inner)]))
            .with(EffectTemplate::director("fx/inner", vec![EntrySpec::new(outer)]));

        let result = resolve_timing(&library, outer, &mut HashMap::new());
        assert!(matches!(result, Err(EffectError::DirectorCycle(_))));
    }

    #[test]
    fn test_unknown_template() {
        let library = TemplateLibrary::new();
        let id = TemplateId::from_path("fx/missing");
        assert_eq!(
            resolve_timing(&library, id, &mut HashMap::new()),
            Err(EffectError::UnknownTemplate(id))
        );
    }

    #[test]
    fn test_library_from_toml() {
        let library = TemplateLibrary::from_toml_str(
            r#"
            [[template]]
            path = "fx/sparks"
            kind = "simple"
            base_scale = { x = 2.0, y = 2.0, z = 2.0 }

            [[template.backends]]
            type = "particles"
            emitter = { stream = { duration = 1.5 } }
            spawn_rate = 20.0
            lifetime = 0.5

            [[template]]
            path = "fx/combo"
            name = "Combo"
            kind = "director"

            [[template.entries]]
            template = "fx/sparks"
            start_delay = 0.5
            loop_behavior = "loop_for_duration"
            loop_duration = 4.0
            "#,
        )
        .unwrap();

        assert_eq!(library.len(), 2);
        let sparks = library.get(TemplateId::from_path("fx/sparks")).unwrap();
        assert_eq!(sparks.base_scale, Vec3::new(2.0, 2.0, 2.0));
        match &sparks.descriptor {
            EffectDescriptor::Simple(specs) => match &specs[0] {
                BackendSpec::Particles(spec) => {
                    assert_eq!(spec.emitter, EmitterType::Stream { duration: 1.5 });
                    assert_eq!(spec.max_particles, ParticleSpec::default().max_particles);
                }
                BackendSpec::Animation(_) => panic!("expected particles"),
            },
            _ => panic!("expected simple"),
        }

        let combo = library.get(TemplateId::from_path("fx/combo")).unwrap();
        assert_eq!(combo.name, "Combo");
        let timing = resolve_timing(&library, combo.id, &mut HashMap::new()).unwrap();
        assert!((timing.duration - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_library_rejects_mixed_descriptor() {
        let result = TemplateLibrary::from_toml_str(
            r#"
            [[template]]
            path = "fx/bad"
            kind = "director"

            [[template.backends]]
            type = "animation"
            clip_length = 1.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
