//! OS audio sink port
//!
//! A mono 16-bit PCM stream with a playback-head counter, modeled on the
//! platform audio track interface. One sink plays one sample rate; rate
//! changes mean closing the sink and opening a new one.

use crate::error::Result;

/// Transport state of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Playing,
    Paused,
    Stopped,
}

/// An open audio output stream.
///
/// `write` may block until buffer space frees up; callers run it on a
/// blocking-capable context. All other methods return promptly.
pub trait AudioSink: Send {
    fn play(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// Discard buffered, unplayed samples.
    fn flush(&mut self);

    /// Set output gain, `v` in [0, 1].
    fn set_volume(&mut self, v: f32);

    /// Append samples; returns how many were accepted. Blocks while the
    /// device buffer is full and the sink is playing.
    fn write(&mut self, samples: &[i16]) -> usize;

    /// Total samples played since `open`, monotone while playing, frozen
    /// while paused.
    fn playback_head_position(&self) -> u64;

    fn play_state(&self) -> SinkState;

    fn sample_rate(&self) -> u32;
}

/// Opens sinks at a requested rate.
pub trait SinkFactory: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>>;
}
