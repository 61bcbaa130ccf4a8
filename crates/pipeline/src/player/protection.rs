//! Protection window and deferred buckets
//!
//! While a queue-only reset preserves one sentence, only that sentence's
//! audio may play immediately. Everything else arriving at the consumer is
//! either dropped (stale offline data for other sentences) or parked in a
//! per-sentence bucket and replayed, in ascending sentence order, once the
//! protected sentence has fully drained. This is what keeps the
//! offline→online upgrade free of reordering and of start/end callbacks
//! for sentences that never played.

use std::collections::BTreeMap;

use narrator_core::AudioSource;

use super::queue::{MarkerKind, QueueItem};

/// Consumer-side window state, readable by producers via `can_accept`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ProtectionState {
    pub(crate) active: bool,
    pub(crate) protected: Option<usize>,
}

impl ProtectionState {
    pub(crate) fn open(preserve: usize) -> Self {
        Self {
            active: true,
            protected: Some(preserve),
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether a producer should bother generating data for this sentence.
    /// Offline data for non-protected sentences would be dropped on
    /// arrival, so producers are told to back off instead.
    pub(crate) fn accepts(&self, source: AudioSource, sentence: usize) -> bool {
        if !self.active {
            return true;
        }
        if self.protected == Some(sentence) {
            return true;
        }
        source != AudioSource::Offline
    }
}

/// Where an arriving queue item goes while the window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Play immediately.
    Admit,
    /// Stale offline data for another sentence.
    DropSilently,
    /// Park in the sentence's deferred bucket.
    Defer,
}

pub(crate) fn admit(state: &ProtectionState, item: &QueueItem) -> Admission {
    if !state.active {
        return Admission::Admit;
    }
    match (item.sentence(), item.source()) {
        // End-of-stream carries no sentence; it must not complete ahead of
        // deferred sentences, so it waits with them.
        (None, _) => Admission::Defer,
        (Some(sentence), source) => {
            if state.protected == Some(sentence) {
                Admission::Admit
            } else if source == Some(AudioSource::Offline) {
                Admission::DropSilently
            } else {
                Admission::Defer
            }
        }
    }
}

/// In-order holding pen for one sentence's deferred items.
#[derive(Default)]
pub(crate) struct DeferredBucket {
    pub(crate) items: Vec<QueueItem>,
    pub(crate) has_pcm: bool,
    pub(crate) has_start: bool,
    pub(crate) has_end: bool,
}

impl DeferredBucket {
    fn push(&mut self, item: QueueItem) {
        match &item {
            QueueItem::Pcm { .. } => self.has_pcm = true,
            QueueItem::Marker { kind, .. } => match kind {
                MarkerKind::SentenceStart => self.has_start = true,
                MarkerKind::SentenceEnd => self.has_end = true,
            },
            QueueItem::EndOfStream { .. } => {}
        }
        self.items.push(item);
    }
}

/// All deferred work accumulated during one protection window.
#[derive(Default)]
pub(crate) struct DeferredBuckets {
    by_sentence: BTreeMap<usize, DeferredBucket>,
    end_of_stream: Vec<QueueItem>,
}

impl DeferredBuckets {
    pub(crate) fn defer(&mut self, item: QueueItem) {
        match item.sentence() {
            Some(sentence) => self.by_sentence.entry(sentence).or_default().push(item),
            None => self.end_of_stream.push(item),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.by_sentence.clear();
        self.end_of_stream.clear();
    }

    /// Drain into replay order: per sentence ascending, start marker first,
    /// then PCM in arrival order, then the end marker. A bucket that never
    /// received PCM is discarded wholesale so its markers cannot fake a
    /// sentence advance. End-of-stream items come last.
    pub(crate) fn drain_for_replay(&mut self) -> Vec<QueueItem> {
        let mut replay = Vec::new();
        for (sentence, bucket) in std::mem::take(&mut self.by_sentence) {
            if !bucket.has_pcm {
                tracing::debug!(sentence, "discarding deferred bucket without pcm");
                continue;
            }
            let mut start = None;
            let mut end = None;
            let mut pcm = Vec::new();
            for item in bucket.items {
                match &item {
                    QueueItem::Marker { kind, .. } => match kind {
                        MarkerKind::SentenceStart => start = Some(item),
                        MarkerKind::SentenceEnd => end = Some(item),
                    },
                    _ => pcm.push(item),
                }
            }
            replay.extend(start);
            replay.append(&mut pcm);
            replay.extend(end);
        }
        replay.append(&mut self.end_of_stream);
        replay
    }
}
