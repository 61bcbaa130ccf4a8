//! Streaming audio player
//!
//! Owns the OS sink behind a bounded PCM+marker queue with one exclusive
//! consumer task. Producers never touch the sink; they enqueue session-
//! stamped items and the consumer validates, orders, and writes them.

mod consumer;
mod progress;
mod protection;
mod queue;

pub use progress::SentenceProgress;

pub(crate) use queue::{Control, MarkerKind, QueueItem, ReachedCallback};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use narrator_config::{PlaybackSettings, ProgressSettings};
use narrator_core::{AudioSource, Error, Result, SessionCounter, SinkFactory};

use consumer::Consumer;
pub(crate) use consumer::FatalHook;
use progress::ProgressTable;
use protection::ProtectionState;

/// State shared between the player handle, the consumer task, and the
/// short-lived drain/flush side tasks.
pub(crate) struct PlayerShared {
    pub(crate) sessions: Arc<SessionCounter>,
    pub(crate) protection: Mutex<ProtectionState>,
    pub(crate) progress: Mutex<ProgressTable>,
    pub(crate) paused: AtomicBool,
    pub(crate) volume: Mutex<f32>,
    pub(crate) volume_dirty: AtomicBool,
    /// Mirror of the sink's playback head, updated by the consumer.
    pub(crate) head: AtomicU64,
    /// Samples written to the currently open sink.
    pub(crate) written: AtomicU64,
    pub(crate) sink_playing: AtomicBool,
}

impl PlayerShared {
    fn new(sessions: Arc<SessionCounter>) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            protection: Mutex::new(ProtectionState::default()),
            progress: Mutex::new(ProgressTable::default()),
            paused: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            volume_dirty: AtomicBool::new(false),
            head: AtomicU64::new(0),
            written: AtomicU64::new(0),
            sink_playing: AtomicBool::new(false),
        })
    }
}

struct ConsumerHandles {
    pcm_tx: mpsc::Sender<QueueItem>,
    ctrl_tx: mpsc::Sender<Control>,
    task: JoinHandle<()>,
}

/// Handle to the audio player. Cheap to clone; all clones share one
/// consumer.
#[derive(Clone)]
pub struct AudioPlayer {
    playback: PlaybackSettings,
    progress_settings: ProgressSettings,
    factory: Arc<dyn SinkFactory>,
    shared: Arc<PlayerShared>,
    on_fatal: FatalHook,
    handles: Arc<Mutex<Option<ConsumerHandles>>>,
}

impl AudioPlayer {
    pub(crate) fn new(
        playback: PlaybackSettings,
        progress_settings: ProgressSettings,
        factory: Arc<dyn SinkFactory>,
        sessions: Arc<SessionCounter>,
        on_fatal: FatalHook,
    ) -> Self {
        Self {
            playback,
            progress_settings,
            factory,
            shared: PlayerShared::new(sessions),
            on_fatal,
            handles: Arc::new(Mutex::new(None)),
        }
    }

    /// Launch the consumer if it is not already running. Idempotent.
    pub(crate) fn start_if_needed(&self, volume: f32) {
        let mut handles = self.handles.lock();
        let running = handles.as_ref().is_some_and(|h| !h.task.is_finished());
        if running {
            self.set_volume(volume);
            return;
        }

        let (pcm_tx, pcm_rx) = mpsc::channel(self.playback.queue_capacity);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(16);

        self.shared.paused.store(false, Ordering::Release);
        *self.shared.volume.lock() = volume.clamp(0.0, 1.0);
        self.shared.volume_dirty.store(true, Ordering::Release);

        let consumer = Consumer::new(
            self.playback.clone(),
            self.factory.clone(),
            self.shared.clone(),
            pcm_rx,
            ctrl_rx,
            ctrl_tx.clone(),
            self.on_fatal.clone(),
        );
        let task = tokio::spawn(consumer.run());

        *handles = Some(ConsumerHandles {
            pcm_tx,
            ctrl_tx,
            task,
        });
        tracing::debug!("audio consumer launched");
    }

    fn pcm_tx(&self) -> Result<mpsc::Sender<QueueItem>> {
        self.handles
            .lock()
            .as_ref()
            .map(|h| h.pcm_tx.clone())
            .ok_or(Error::ChannelClosed("audio queue"))
    }

    fn ctrl_tx(&self) -> Option<mpsc::Sender<Control>> {
        self.handles.lock().as_ref().map(|h| h.ctrl_tx.clone())
    }

    /// Enqueue PCM for playback. Suspends on backpressure.
    pub(crate) async fn enqueue_pcm(
        &self,
        session: u64,
        samples: Vec<i16>,
        sample_rate: u32,
        source: AudioSource,
        sentence: usize,
    ) -> Result<()> {
        let tx = self.pcm_tx()?;
        tx.send(QueueItem::Pcm {
            session,
            samples,
            sample_rate,
            source,
            sentence,
        })
        .await
        .map_err(|_| Error::ChannelClosed("audio queue"))
    }

    pub(crate) async fn enqueue_marker(
        &self,
        session: u64,
        sentence: usize,
        kind: MarkerKind,
        source: AudioSource,
        on_reached: ReachedCallback,
    ) -> Result<()> {
        let tx = self.pcm_tx()?;
        tx.send(QueueItem::Marker {
            session,
            sentence,
            kind,
            source,
            on_reached,
        })
        .await
        .map_err(|_| Error::ChannelClosed("audio queue"))
    }

    pub(crate) async fn enqueue_end_of_stream(
        &self,
        session: u64,
        on_drained: ReachedCallback,
    ) -> Result<()> {
        let tx = self.pcm_tx()?;
        tx.send(QueueItem::EndOfStream {
            session,
            on_drained,
        })
        .await
        .map_err(|_| Error::ChannelClosed("audio queue"))
    }

    /// Hard reset: drop everything queued, release the sink, clear
    /// protection and progress. Returns once the consumer acknowledged.
    pub(crate) async fn reset_blocking(&self) {
        let generation = self.shared.sessions.current();
        self.send_control_and_wait(|ack| Control::Hard { generation, ack })
            .await;
    }

    /// Queue-only reset preserving `preserve`'s items, opening the
    /// protection window for it. The sink keeps playing.
    pub(crate) async fn reset_queue_only_blocking(&self, preserve: usize) {
        let generation = self.shared.sessions.current();
        self.send_control_and_wait(|ack| Control::SoftQueueOnly {
            generation,
            preserve,
            ack,
        })
        .await;
    }

    async fn send_control_and_wait<F>(&self, make: F)
    where
        F: FnOnce(oneshot::Sender<()>) -> Control,
    {
        let Some(tx) = self.ctrl_tx() else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(make(ack_tx)).await.is_ok() {
            // A dropped ack means the consumer exited; nothing left to wait
            // for either way.
            let _ = ack_rx.await;
        }
    }

    pub(crate) fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub(crate) fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    pub(crate) fn set_volume(&self, v: f32) {
        *self.shared.volume.lock() = v.clamp(0.0, 1.0);
        self.shared.volume_dirty.store(true, Ordering::Release);
    }

    /// Tear down the consumer and the sink. Safe to call when already
    /// stopped.
    pub(crate) async fn stop_and_release_blocking(&self) {
        let taken = self.handles.lock().take();
        let Some(handles) = taken else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if handles
            .ctrl_tx
            .send(Control::Shutdown { ack: ack_tx })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
        let _ = handles.task.await;
        self.shared.paused.store(false, Ordering::Release);
        tracing::debug!("audio consumer released");
    }

    /// Cheap producer-side predicate: would data for this sentence from
    /// this source currently be playable (or at least bufferable)?
    pub(crate) fn can_accept(&self, source: AudioSource, sentence: usize) -> bool {
        self.shared.protection.lock().accepts(source, sentence)
    }

    /// Record the producer's estimate of a sentence's total samples.
    pub(crate) fn set_predicted_total(&self, sentence: usize, samples: u64) {
        self.shared.progress.lock().set_predicted_total(sentence, samples);
    }

    /// Progress of the sentence currently playing.
    pub fn current_sentence_progress(&self) -> Option<SentenceProgress> {
        let head = self.shared.head.load(Ordering::Acquire);
        self.shared
            .progress
            .lock()
            .query(head, &self.progress_settings)
    }
}
