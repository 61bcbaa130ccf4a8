//! Layered configuration for the narrator TTS orchestrator
//!
//! Settings load from built-in defaults, then an optional `narrator.toml`,
//! then `NARRATOR_*` environment variables, and are validated before use.

mod settings;

pub use settings::{
    CooldownSettings, EngineSettings, NetworkSettings, OnlineSettings, PlaybackSettings,
    ProgressSettings, Settings, SynthesisSettings,
};

use thiserror::Error;

/// Speaking-rate bounds accepted everywhere a speed is set.
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 3.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
