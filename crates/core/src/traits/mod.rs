//! Port traits for the four external collaborators
//!
//! The orchestrator core never talks to a device, a native library, or the
//! network directly; it goes through these traits so every collaborator can
//! be replaced by a mock in tests.

pub mod engine;
pub mod network;
pub mod repository;
pub mod sink;

pub use engine::{OfflineEngine, SynthesisChunk};
pub use network::{ManualNetwork, NetworkMonitor};
pub use repository::{DecodedPcm, RepositoryError, SpeechRepository};
pub use sink::{AudioSink, SinkFactory, SinkState};
