//! Queue items flowing from producers to the audio consumer

use narrator_core::AudioSource;
use tokio::sync::oneshot;

/// Sentence boundary markers travelling through the PCM queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    SentenceStart,
    SentenceEnd,
}

/// Callback fired when the consumer dequeues a marker or declares the
/// stream drained. Receives the item's session stamp — the re-stamped
/// value when a queue-only reset carried the item across a bump — so the
/// actor can tell live events from retired ones. Posts back into the
/// command channel; never does real work on the consumer task.
pub(crate) type ReachedCallback = Box<dyn FnOnce(u64) + Send>;

pub(crate) enum QueueItem {
    Pcm {
        session: u64,
        samples: Vec<i16>,
        sample_rate: u32,
        source: AudioSource,
        sentence: usize,
    },
    Marker {
        session: u64,
        sentence: usize,
        kind: MarkerKind,
        source: AudioSource,
        on_reached: ReachedCallback,
    },
    EndOfStream {
        session: u64,
        on_drained: ReachedCallback,
    },
}

impl QueueItem {
    pub(crate) fn session(&self) -> u64 {
        match self {
            QueueItem::Pcm { session, .. }
            | QueueItem::Marker { session, .. }
            | QueueItem::EndOfStream { session, .. } => *session,
        }
    }

    /// Re-stamp an item kept across a queue-only reset.
    pub(crate) fn set_session(&mut self, new_session: u64) {
        match self {
            QueueItem::Pcm { session, .. }
            | QueueItem::Marker { session, .. }
            | QueueItem::EndOfStream { session, .. } => *session = new_session,
        }
    }

    /// Sentence index, when the item belongs to one.
    pub(crate) fn sentence(&self) -> Option<usize> {
        match self {
            QueueItem::Pcm { sentence, .. } | QueueItem::Marker { sentence, .. } => Some(*sentence),
            QueueItem::EndOfStream { .. } => None,
        }
    }

    pub(crate) fn source(&self) -> Option<AudioSource> {
        match self {
            QueueItem::Pcm { source, .. } | QueueItem::Marker { source, .. } => Some(*source),
            QueueItem::EndOfStream { .. } => None,
        }
    }
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItem::Pcm {
                session,
                samples,
                sample_rate,
                source,
                sentence,
            } => f
                .debug_struct("Pcm")
                .field("session", session)
                .field("samples", &samples.len())
                .field("sample_rate", sample_rate)
                .field("source", source)
                .field("sentence", sentence)
                .finish(),
            QueueItem::Marker {
                session,
                sentence,
                kind,
                source,
                ..
            } => f
                .debug_struct("Marker")
                .field("session", session)
                .field("sentence", sentence)
                .field("kind", kind)
                .field("source", source)
                .finish(),
            QueueItem::EndOfStream { session, .. } => f
                .debug_struct("EndOfStream")
                .field("session", session)
                .finish(),
        }
    }
}

/// Control requests to the consumer. Later resets supersede earlier ones;
/// the consumer drains this channel before touching PCM.
pub(crate) enum Control {
    /// Full reset: drop every queued item, release the sink, clear
    /// protection and progress.
    Hard {
        generation: u64,
        ack: oneshot::Sender<()>,
    },
    /// Queue-only reset preserving one sentence, opening the protection
    /// window for it. The sink keeps playing.
    SoftQueueOnly {
        generation: u64,
        preserve: usize,
        ack: oneshot::Sender<()>,
    },
    /// Posted by the deferred-flush task once the sink drained the
    /// protected sentence.
    CloseProtection { generation: u64 },
    /// Tear down the consumer and release the sink.
    Shutdown { ack: oneshot::Sender<()> },
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Hard { generation, .. } => write!(f, "Hard({generation})"),
            Control::SoftQueueOnly {
                generation,
                preserve,
                ..
            } => write!(f, "SoftQueueOnly({generation}, preserve={preserve})"),
            Control::CloseProtection { generation } => {
                write!(f, "CloseProtection({generation})")
            }
            Control::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}
