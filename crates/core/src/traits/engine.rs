//! Offline synthesis engine port
//!
//! Models the native codec library: a single global, non-reentrant engine
//! that synthesizes one prepared utterance at a time into caller-provided
//! buffers. Callers must serialize access through an exclusive async mutex
//! and call `reset` after every utterance, successful or not.

use std::path::Path;

/// Result of one `synthesize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisChunk {
    /// `n` samples were written to the front of the buffer.
    Pcm(usize),
    /// The prepared utterance is exhausted.
    End,
    /// The engine reported a negative status. Non-fatal: callers skip the
    /// sentence and reset.
    Error(i32),
}

/// Native offline synthesis engine.
///
/// Methods mirror the underlying C surface: integer statuses where the
/// native call returns one (0 means ok), unit where it cannot fail.
pub trait OfflineEngine: Send {
    /// Load engine resources from `data_path`. Returns the native status
    /// code; 0 means the engine is usable.
    fn init(&mut self, data_path: &Path) -> i32;

    /// Release all native resources. The engine is unusable afterwards.
    fn destroy(&mut self);

    /// Abort any prepared utterance and return to a clean state.
    fn reset(&mut self);

    /// Select the voice used by subsequent `prepare` calls.
    fn set_voice(&mut self, name: &str) -> i32;

    /// Set the speaking rate in the engine's own scale.
    fn set_speed(&mut self, value: f32);

    fn set_volume(&mut self, value: f32);

    /// Stage `text` for synthesis. Returns the native status; 0 means
    /// `synthesize` may be called.
    fn prepare(&mut self, text: &str) -> i32;

    /// Produce the next run of samples for the prepared utterance.
    fn synthesize(&mut self, buffer: &mut [i16]) -> SynthesisChunk;

    /// Output rate of this engine's PCM, constant for its lifetime.
    fn sample_rate(&self) -> u32;
}
