//! Online speech repository
//!
//! Implements the [`narrator_core::SpeechRepository`] port against a remote
//! HTTPS TTS service:
//! - cache-first lookup of previously decoded sentences (WAV on disk)
//! - MP3 payload decode to mono 16-bit PCM
//! - optional resample to a fixed output rate
//! - transparent access-token refresh

mod cache;
mod decode;
mod repository;
mod resample;
mod token;

pub use cache::PcmCache;
pub use repository::HttpSpeechRepository;
pub use token::TokenManager;
