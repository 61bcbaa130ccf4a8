//! Playback and synthesis coordination core
//!
//! Wires the sentence splitter, the two synthesis backends, and the audio
//! sink into one orchestrator with strict ordering guarantees:
//! - a command actor serializes every external and internal event;
//! - a synthesis loop produces sentences through the strategy-selected
//!   backend, with cooldown-gated online attempts and offline fallback;
//! - a streaming audio player owns the sink behind a bounded PCM+marker
//!   queue, guarded by a generation counter and a protection window that
//!   makes the offline→online upgrade seamless;
//! - a network watcher turns debounced connectivity recovery into upgrade
//!   commands.
//!
//! All public entry points go through [`Narrator`].

pub mod cooldown;
pub mod dsp;
pub mod sink;
pub mod strategy;

mod actor;
mod narrator;
mod network;
mod player;
mod synth;

pub use cooldown::Cooldown;
pub use dsp::SpeedStretcher;
pub use narrator::Narrator;
pub use player::{AudioPlayer, SentenceProgress};
pub use sink::{ClockSink, ClockSinkFactory};
pub use strategy::StrategyManager;
