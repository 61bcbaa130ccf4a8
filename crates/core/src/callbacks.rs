//! User-facing callback surface
//!
//! All methods are invoked from the command actor task, one at a time, in
//! the order the corresponding events were observed. Implementations should
//! return quickly; long work belongs on the caller's own executor.

use crate::state::PlaybackState;

/// Best-effort notifications about synthesis and playback progress.
///
/// Every method has a no-op default so implementors only override what they
/// consume.
#[allow(unused_variables)]
pub trait NarratorCallback: Send + Sync {
    /// Engine initialization finished (`ok == false` means the offline
    /// backend is unavailable; online-only operation may still work).
    fn on_initialized(&self, ok: bool) {}

    /// A `speak` call was accepted and synthesis is starting.
    fn on_synthesis_start(&self) {}

    /// Playback of sentence `index` (of `total`) began.
    fn on_sentence_start(&self, index: usize, text: &str, total: usize) {}

    /// Playback of sentence `index` finished.
    fn on_sentence_complete(&self, index: usize, text: &str) {}

    /// The externally observable state changed.
    fn on_state_changed(&self, state: PlaybackState) {}

    /// The last sentence finished playing and the utterance is complete.
    fn on_synthesis_complete(&self) {}

    fn on_paused(&self) {}

    fn on_resumed(&self) {}

    /// A failure the orchestrator could not hide. Playback is either
    /// stopped or auto-paused when this fires.
    fn on_error(&self, message: &str) {}
}

/// Callback implementation that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl NarratorCallback for NoopCallback {}
