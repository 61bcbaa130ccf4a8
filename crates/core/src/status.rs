//! Status snapshot exposed to observers

use serde::{Deserialize, Serialize};

use crate::state::PlaybackState;

/// A point-in-time view of the orchestrator, cheap to copy out.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NarratorStatus {
    pub state: PlaybackState,
    /// Number of sentences in the current utterance (0 when idle).
    pub total_sentences: usize,
    /// Index of the sentence currently playing, if any.
    pub current_sentence_index: Option<usize>,
    /// Text of the sentence currently playing, if any.
    pub current_sentence: Option<String>,
}

impl NarratorStatus {
    pub fn is_speaking(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}
