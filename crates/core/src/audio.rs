//! PCM sample types and conversions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which backend produced a piece of audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioSource {
    /// Local native synthesis engine
    Offline,
    /// Remote TTS service
    Online,
}

impl std::fmt::Display for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSource::Offline => write!(f, "offline"),
            AudioSource::Online => write!(f, "online"),
        }
    }
}

/// Convert 16-bit little-endian PCM bytes to samples.
pub fn pcm16_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Convert 16-bit samples to little-endian PCM bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Playback duration of a mono sample run at the given rate.
pub fn samples_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / sample_rate as f64)
}

/// Number of mono samples covering the given duration at the given rate.
pub fn duration_samples(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64) as usize
}
