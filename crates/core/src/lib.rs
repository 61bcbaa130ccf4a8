//! Core traits and types for the narrator TTS orchestrator
//!
//! This crate provides the foundational types used across all other crates:
//! - Port traits for the external collaborators (offline engine, online
//!   repository, audio sink, network monitor)
//! - Playback state, strategy, and session types
//! - The user-facing callback trait
//! - PCM helpers and error types

pub mod audio;
pub mod callbacks;
pub mod error;
pub mod state;
pub mod status;
pub mod traits;

pub use audio::AudioSource;
pub use callbacks::NarratorCallback;
pub use error::{Error, Result};
pub use state::{DesiredMode, PendingChange, PlaybackState, SessionCounter, Strategy};
pub use status::NarratorStatus;

pub use traits::{
    AudioSink,
    DecodedPcm,
    ManualNetwork,
    NetworkMonitor,
    OfflineEngine,
    RepositoryError,
    SinkFactory,
    SinkState,
    SpeechRepository,
    SynthesisChunk,
};
