//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use narrator_core::Strategy;
use narrator_text::SplitStrategy;

use crate::{ConfigError, MAX_SPEED, MIN_SPEED};

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Synthesis parameters (voice, speed, volume, strategy).
    #[serde(default)]
    pub synthesis: SynthesisSettings,

    /// Offline engine configuration.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Audio player configuration.
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Online-failure cooldown configuration.
    #[serde(default)]
    pub cooldown: CooldownSettings,

    /// Network watcher configuration.
    #[serde(default)]
    pub network: NetworkSettings,

    /// Online repository configuration.
    #[serde(default)]
    pub online: OnlineSettings,

    /// Sentence-progress estimator tuning.
    #[serde(default)]
    pub progress: ProgressSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Voice used until `set_voice` changes it.
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Speaking rate, clamped to [0.5, 3.0].
    #[serde(default = "default_speed")]
    pub default_speed: f32,

    /// Output gain in [0, 1].
    #[serde(default = "default_volume")]
    pub default_volume: f32,

    /// Backend selection policy.
    #[serde(default)]
    pub strategy: Strategy,

    /// Sentence splitting strategy.
    #[serde(default)]
    pub split_strategy: SplitStrategy,
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_volume() -> f32 {
    1.0
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            default_voice: default_voice(),
            default_speed: default_speed(),
            default_volume: default_volume(),
            strategy: Strategy::default(),
            split_strategy: SplitStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Directory holding the native engine's voice data.
    #[serde(default = "default_engine_data_path")]
    pub data_path: PathBuf,

    /// Samples requested from the engine per `synthesize` call.
    #[serde(default = "default_engine_chunk_samples")]
    pub chunk_samples: usize,
}

fn default_engine_data_path() -> PathBuf {
    PathBuf::from("data/engine")
}

fn default_engine_chunk_samples() -> usize {
    4096
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_path: default_engine_data_path(),
            chunk_samples: default_engine_chunk_samples(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Bounded PCM+marker queue capacity; producers suspend when full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Samples per sink write; bounds control latency during playback.
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    /// Device buffer size requested from the sink factory, in samples.
    #[serde(default = "default_sink_buffer_samples")]
    pub sink_buffer_samples: usize,

    /// Sleep between control polls while paused, milliseconds.
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,

    /// Consumer maintenance tick (head mirror, volume application),
    /// milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Playback-head stall after which an end-of-stream is declared
    /// drained, milliseconds.
    #[serde(default = "default_eos_stall_ms")]
    pub eos_stall_ms: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_chunk_samples() -> usize {
    2048
}

fn default_sink_buffer_samples() -> usize {
    8192
}

fn default_pause_poll_ms() -> u64 {
    10
}

fn default_tick_ms() -> u64 {
    50
}

fn default_eos_stall_ms() -> u64 {
    1000
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            chunk_samples: default_chunk_samples(),
            sink_buffer_samples: default_sink_buffer_samples(),
            pause_poll_ms: default_pause_poll_ms(),
            tick_ms: default_tick_ms(),
            eos_stall_ms: default_eos_stall_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownSettings {
    /// First-failure backoff, seconds.
    #[serde(default = "default_cooldown_base_secs")]
    pub base_secs: u64,

    /// Backoff ceiling, seconds.
    #[serde(default = "default_cooldown_max_secs")]
    pub max_secs: u64,

    /// Cap on the doubling exponent.
    #[serde(default = "default_cooldown_exponent_cap")]
    pub exponent_cap: u32,
}

fn default_cooldown_base_secs() -> u64 {
    3
}

fn default_cooldown_max_secs() -> u64 {
    60
}

fn default_cooldown_exponent_cap() -> u32 {
    5
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            base_secs: default_cooldown_base_secs(),
            max_secs: default_cooldown_max_secs(),
            exponent_cap: default_cooldown_exponent_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// How long a recovered network must stay good before an upgrade,
    /// milliseconds.
    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,
}

fn default_stabilization_ms() -> u64 {
    600
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            stabilization_ms: default_stabilization_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineSettings {
    /// TTS synthesis endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Token issue/refresh endpoint.
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// Per-request timeout, milliseconds.
    #[serde(default = "default_online_timeout_ms")]
    pub timeout_ms: u64,

    /// Directory for cached decoded audio.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// File holding the persisted access token.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// When set, repository output is resampled to this rate.
    #[serde(default)]
    pub output_sample_rate: Option<u32>,

    /// Credentials for token refresh.
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
}

fn default_endpoint() -> String {
    "https://tts.example.com/v1/synthesize".to_string()
}

fn default_token_endpoint() -> String {
    "https://tts.example.com/v1/token".to_string()
}

fn default_online_timeout_ms() -> u64 {
    10_000
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/tts")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("cache/tts/token.json")
}

impl Default for OnlineSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token_endpoint: default_token_endpoint(),
            timeout_ms: default_online_timeout_ms(),
            cache_dir: default_cache_dir(),
            token_path: default_token_path(),
            output_sample_rate: None,
            app_key: String::new(),
            app_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSettings {
    /// Predicted-total climb allowance per query, milliseconds of audio.
    #[serde(default = "default_climb_ms")]
    pub climb_ms_per_query: u64,

    /// Initial freeze window, milliseconds.
    #[serde(default = "default_freeze_ms")]
    pub freeze_ms: u64,

    /// Fraction ceiling during the freeze window.
    #[serde(default = "default_freeze_max_fraction")]
    pub freeze_max_fraction: f32,

    /// Fraction after which the estimate retracts toward accepted samples.
    #[serde(default = "default_retract_after_fraction")]
    pub retract_after_fraction: f32,
}

fn default_climb_ms() -> u64 {
    120
}

fn default_freeze_ms() -> u64 {
    150
}

fn default_freeze_max_fraction() -> f32 {
    0.03
}

fn default_retract_after_fraction() -> f32 {
    0.85
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            climb_ms_per_query: default_climb_ms(),
            freeze_ms: default_freeze_ms(),
            freeze_max_fraction: default_freeze_max_fraction(),
            retract_after_fraction: default_retract_after_fraction(),
        }
    }
}

impl Settings {
    /// Create default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from an optional file plus `NARRATOR_*` environment
    /// overrides, then validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        } else {
            builder = builder.add_source(File::with_name("narrator").required(false));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("NARRATOR").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate ranges, clamping nothing: configuration mistakes should be
    /// loud, not silently adjusted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.synthesis.default_speed) {
            return Err(ConfigError::Invalid(format!(
                "synthesis.default_speed {} outside [{MIN_SPEED}, {MAX_SPEED}]",
                self.synthesis.default_speed
            )));
        }
        if !(0.0..=1.0).contains(&self.synthesis.default_volume) {
            return Err(ConfigError::Invalid(format!(
                "synthesis.default_volume {} outside [0, 1]",
                self.synthesis.default_volume
            )));
        }
        if self.playback.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "playback.queue_capacity must be at least 1".into(),
            ));
        }
        if self.playback.chunk_samples == 0 || self.engine.chunk_samples == 0 {
            return Err(ConfigError::Invalid(
                "chunk sizes must be at least 1 sample".into(),
            ));
        }
        if self.playback.chunk_samples > self.playback.sink_buffer_samples {
            return Err(ConfigError::Invalid(format!(
                "playback.chunk_samples {} exceeds sink buffer {}",
                self.playback.chunk_samples, self.playback.sink_buffer_samples
            )));
        }
        if self.cooldown.base_secs == 0 || self.cooldown.max_secs < self.cooldown.base_secs {
            return Err(ConfigError::Invalid(format!(
                "cooldown base {}s / max {}s is not a valid backoff range",
                self.cooldown.base_secs, self.cooldown.max_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.progress.freeze_max_fraction)
            || !(0.0..=1.0).contains(&self.progress.retract_after_fraction)
        {
            return Err(ConfigError::Invalid(
                "progress fractions must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
