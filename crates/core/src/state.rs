//! Playback state, strategy, and session types

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Externally observable playback state.
///
/// Errors never become a fourth state: a severe failure surfaces through the
/// error callback and an automatic transition to `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Backend selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Only the local engine is used.
    OfflineOnly,
    /// The remote service is preferred, falling back to the local engine.
    #[default]
    OnlinePreferred,
    /// Only the remote service is used; failures surface to the user.
    OnlineOnly,
}

/// The backend a sentence should be produced with, derived from the strategy
/// and the current network condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredMode {
    Offline,
    Online,
}

/// A parameter change recorded while paused, applied on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingChange {
    Speaker,
    Speed,
}

/// Monotonic session counter shared between the command actor and the
/// audio player.
///
/// Every producer task captures the current value at launch and compares it
/// after each suspension point; a mismatch means the work was retired and
/// must be dropped without side effects. Bumps happen *before* the old
/// workload is cancelled, so tasks dispatched after the bump can never be
/// invalidated by the old cancellation.
#[derive(Debug, Default)]
pub struct SessionCounter(AtomicU64);

impl SessionCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(0)))
    }

    /// Current session id.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Mint a new session id, retiring all work captured under older ids.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether work captured under `session` is still current.
    pub fn is_current(&self, session: u64) -> bool {
        self.current() == session
    }
}
