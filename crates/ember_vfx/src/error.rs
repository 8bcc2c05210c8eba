//! Error types for the effect engine.

use std::path::PathBuf;

use ember_core::PoolError;
use thiserror::Error;

use crate::instance::EffectHandle;
use crate::template::TemplateId;

/// Errors reported by effect playback and lookup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    /// No template is registered under this id.
    #[error("unknown effect template {0}")]
    UnknownTemplate(TemplateId),

    /// The handle no longer refers to a live instance.
    #[error("stale effect handle {0:?}")]
    StaleHandle(EffectHandle),

    /// A pool handed out an instance that was still playing.
    ///
    /// The instance has been force-stopped and returned to its pool.
    #[error("pooled effect {0:?} was restarted while active")]
    PooledRestart(EffectHandle),

    /// Play was requested while the instance was finalizing a stop.
    #[error("effect {0:?} cannot play while finalizing a stop")]
    PlayDuringFinalize(EffectHandle),

    /// A director (transitively) contains itself.
    #[error("director template {0} contains itself")]
    DirectorCycle(TemplateId),

    /// The handle does not refer to a director.
    #[error("effect {0:?} is not a director")]
    NotADirector(EffectHandle),

    /// Director entries cannot change while the director is playing.
    #[error("director {0:?} is playing; stop it before rebuilding entries")]
    DirectorBusy(EffectHandle),

    /// The registry has been shut down.
    #[error("effect registry is shut down")]
    ShutDown,

    /// Pool bookkeeping error.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors reported while loading effect libraries and registry config.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected schema.
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but describes something impossible.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for effect operations.
pub type EffectResult<T> = Result<T, EffectError>;

/// Result type for config loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
