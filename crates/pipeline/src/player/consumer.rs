//! The audio consumer task
//!
//! Single exclusive owner of the sink. Each iteration settles control work
//! first, then replayed items, then waits for fresh queue items. PCM is
//! written in fixed-size chunks with a control poll between chunks so a
//! reset can preempt playback within one chunk's worth of latency.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use narrator_config::PlaybackSettings;
use narrator_core::{AudioSink, AudioSource, SinkFactory, SinkState};

use super::protection::{admit, Admission, DeferredBuckets, ProtectionState};
use super::queue::{Control, MarkerKind, QueueItem, ReachedCallback};
use super::PlayerShared;

/// Invoked when the sink is unrecoverably broken.
pub(crate) type FatalHook = Arc<dyn Fn(String) + Send + Sync>;

#[derive(PartialEq)]
enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Consumer {
    playback: PlaybackSettings,
    factory: Arc<dyn SinkFactory>,
    shared: Arc<PlayerShared>,
    pcm_rx: mpsc::Receiver<QueueItem>,
    ctrl_rx: mpsc::Receiver<Control>,
    /// Handed to drain/flush side tasks so they can post back.
    ctrl_tx: mpsc::Sender<Control>,
    on_fatal: FatalHook,
    sink: Option<Box<dyn AudioSink>>,
    /// Items valid for playback carry this stamp.
    generation: u64,
    buckets: DeferredBuckets,
    /// Items to process ahead of the channel (kept by a queue-only reset,
    /// or replayed from deferred buckets).
    replay: VecDeque<QueueItem>,
    /// Controls observed mid-write, settled at the top of the loop.
    pending_ctrl: VecDeque<Control>,
    sink_paused: bool,
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        playback: PlaybackSettings,
        factory: Arc<dyn SinkFactory>,
        shared: Arc<PlayerShared>,
        pcm_rx: mpsc::Receiver<QueueItem>,
        ctrl_rx: mpsc::Receiver<Control>,
        ctrl_tx: mpsc::Sender<Control>,
        on_fatal: FatalHook,
    ) -> Self {
        let generation = shared.sessions.current();
        Self {
            playback,
            factory,
            shared,
            pcm_rx,
            ctrl_rx,
            ctrl_tx,
            on_fatal,
            sink: None,
            generation,
            buckets: DeferredBuckets::default(),
            replay: VecDeque::new(),
            pending_ctrl: VecDeque::new(),
            sink_paused: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            while let Some(control) = self.pending_ctrl.pop_front() {
                if self.handle_control(control) == Flow::Exit {
                    return;
                }
            }
            while let Ok(control) = self.ctrl_rx.try_recv() {
                if self.handle_control(control) == Flow::Exit {
                    return;
                }
            }

            self.apply_shared_flags();

            if self.shared.paused.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_millis(self.playback.pause_poll_ms)).await;
                continue;
            }

            if let Some(item) = self.replay.pop_front() {
                self.handle_item(item).await;
                self.mirror_sink();
                continue;
            }

            tokio::select! {
                biased;
                control = self.ctrl_rx.recv() => match control {
                    Some(control) => self.pending_ctrl.push_back(control),
                    None => return,
                },
                item = self.pcm_rx.recv() => match item {
                    Some(item) => self.handle_item(item).await,
                    None => return,
                },
                () = tokio::time::sleep(Duration::from_millis(self.playback.tick_ms)) => {}
            }

            self.mirror_sink();
        }
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    fn handle_control(&mut self, control: Control) -> Flow {
        match control {
            Control::Hard { generation, ack } => {
                tracing::debug!(generation, "hard reset");
                self.generation = generation;
                while self.pcm_rx.try_recv().is_ok() {}
                self.replay.clear();
                self.buckets.clear();
                self.release_sink();
                self.shared.protection.lock().clear();
                self.shared.progress.lock().clear();
                let _ = ack.send(());
                Flow::Continue
            }
            Control::SoftQueueOnly {
                generation,
                preserve,
                ack,
            } => {
                tracing::debug!(generation, preserve, "queue-only reset");
                self.generation = generation;

                let mut kept = VecDeque::new();
                for mut item in std::mem::take(&mut self.replay) {
                    if item.sentence() == Some(preserve) {
                        item.set_session(generation);
                        kept.push_back(item);
                    }
                }
                while let Ok(mut item) = self.pcm_rx.try_recv() {
                    if item.sentence() == Some(preserve) {
                        item.set_session(generation);
                        kept.push_back(item);
                    }
                }
                tracing::debug!(kept = kept.len(), "requeued preserved items");
                let has_end = kept.iter().any(|item| {
                    matches!(
                        item,
                        QueueItem::Marker {
                            kind: MarkerKind::SentenceEnd,
                            ..
                        }
                    )
                });
                self.replay = kept;
                self.buckets.clear();
                *self.shared.protection.lock() = ProtectionState::open(preserve);
                self.shared.progress.lock().retain_sentence(preserve);
                if !has_end {
                    // The preserved sentence's end marker was already
                    // consumed; nothing will trigger the close later, so
                    // start the drain wait now.
                    self.spawn_protection_flush();
                }
                let _ = ack.send(());
                Flow::Continue
            }
            Control::CloseProtection { generation } => {
                if generation != self.generation {
                    tracing::debug!(generation, "stale protection close ignored");
                    return Flow::Continue;
                }
                self.shared.protection.lock().clear();
                let mut items = self.buckets.drain_for_replay();
                for item in &mut items {
                    item.set_session(self.generation);
                }
                tracing::debug!(replayed = items.len(), "protection window closed");
                self.replay.extend(items);
                Flow::Continue
            }
            Control::Shutdown { ack } => {
                while self.pcm_rx.try_recv().is_ok() {}
                self.release_sink();
                let _ = ack.send(());
                Flow::Exit
            }
        }
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    async fn handle_item(&mut self, item: QueueItem) {
        if item.session() != self.generation {
            tracing::trace!(?item, generation = self.generation, "dropping stale item");
            return;
        }

        let admission = {
            let protection = self.shared.protection.lock();
            admit(&protection, &item)
        };
        match admission {
            Admission::DropSilently => {
                tracing::trace!(?item, "dropped by protection window");
            }
            Admission::Defer => {
                tracing::trace!(?item, "deferred by protection window");
                self.buckets.defer(item);
            }
            Admission::Admit => self.process_item(item).await,
        }
    }

    async fn process_item(&mut self, item: QueueItem) {
        match item {
            QueueItem::Pcm {
                session,
                samples,
                sample_rate,
                source,
                sentence,
            } => {
                self.write_pcm(session, samples, sample_rate, source, sentence)
                    .await;
            }
            QueueItem::Marker {
                session,
                sentence,
                kind,
                source,
                on_reached,
            } => match kind {
                MarkerKind::SentenceStart => {
                    tracing::debug!(sentence, %source, "sentence start reached");
                    self.shared.progress.lock().sentence_started(sentence);
                    on_reached(session);
                }
                MarkerKind::SentenceEnd => {
                    tracing::debug!(sentence, %source, "sentence end reached");
                    on_reached(session);
                    let close_needed = {
                        let protection = self.shared.protection.lock();
                        protection.active && protection.protected == Some(sentence)
                    };
                    if close_needed {
                        self.spawn_protection_flush();
                    }
                }
            },
            QueueItem::EndOfStream {
                session,
                on_drained,
            } => {
                self.spawn_drain_watchdog(session, on_drained);
            }
        }
    }

    /// Chunked write with between-chunk preemption.
    async fn write_pcm(
        &mut self,
        session: u64,
        samples: Vec<i16>,
        sample_rate: u32,
        source: AudioSource,
        sentence: usize,
    ) {
        if samples.is_empty() {
            return;
        }
        if !self.ensure_sink(sample_rate) {
            return;
        }

        {
            let head = self
                .sink
                .as_ref()
                .map_or(0, |s| s.playback_head_position());
            let mut progress = self.shared.progress.lock();
            progress.on_accepted(sentence, samples.len(), sample_rate);
            progress.on_first_write(sentence, head);
        }

        let chunk = self.playback.chunk_samples;
        let pause_poll = Duration::from_millis(self.playback.pause_poll_ms);
        let mut allow_cross_generation = false;
        let mut offset = 0;

        while offset < samples.len() {
            match self.ctrl_rx.try_recv() {
                Ok(Control::SoftQueueOnly {
                    generation,
                    preserve,
                    ack,
                }) if preserve == sentence => {
                    // Finish the sentence's write to avoid a mid-sentence
                    // cut; the reset itself is settled right after.
                    allow_cross_generation = true;
                    self.pending_ctrl.push_back(Control::SoftQueueOnly {
                        generation,
                        preserve,
                        ack,
                    });
                }
                Ok(control @ Control::CloseProtection { .. }) => {
                    self.pending_ctrl.push_back(control);
                }
                Ok(control) => {
                    // Hard reset, a reset for another sentence, or shutdown:
                    // abandon the rest of this item.
                    tracing::debug!(?control, sentence, %source, "write preempted");
                    self.pending_ctrl.push_back(control);
                    return;
                }
                Err(_) => {}
            }

            if self.shared.paused.load(Ordering::Acquire) {
                self.apply_shared_flags();
                tokio::time::sleep(pause_poll).await;
                continue;
            }
            self.apply_shared_flags();

            if !allow_cross_generation && !self.shared.sessions.is_current(session) {
                tracing::debug!(session, sentence, "write aborted, session changed");
                return;
            }

            let end = (offset + chunk).min(samples.len());
            let Some(sink) = self.sink.as_mut() else {
                return;
            };
            let written = tokio::task::block_in_place(|| sink.write(&samples[offset..end]));
            if written == 0 {
                tokio::time::sleep(pause_poll).await;
                continue;
            }
            offset += written;
            self.shared
                .written
                .fetch_add(written as u64, Ordering::AcqRel);
            self.shared
                .head
                .store(sink.playback_head_position(), Ordering::Release);
        }
    }

    // ------------------------------------------------------------------
    // Sink lifecycle
    // ------------------------------------------------------------------

    /// Open the sink, or reopen it when the incoming rate differs. The
    /// switch is deferred while a protection window is open so the
    /// protected tail is not cut.
    fn ensure_sink(&mut self, sample_rate: u32) -> bool {
        let needs_reopen = self
            .sink
            .as_ref()
            .map_or(true, |sink| sink.sample_rate() != sample_rate);
        if !needs_reopen {
            return true;
        }

        if self.sink.is_some() && self.shared.protection.lock().active {
            tracing::warn!(sample_rate, "sample-rate switch deferred during protection");
            return true;
        }

        self.release_sink();
        match self.factory.open(sample_rate) {
            Ok(mut sink) => {
                sink.set_volume(*self.shared.volume.lock());
                self.shared.volume_dirty.store(false, Ordering::Release);
                if self.shared.paused.load(Ordering::Acquire) {
                    sink.pause();
                    self.sink_paused = true;
                } else {
                    sink.play();
                    self.sink_paused = false;
                    self.shared.sink_playing.store(true, Ordering::Release);
                }
                tracing::debug!(sample_rate, "sink opened");
                self.sink = Some(sink);
                true
            }
            Err(e) => {
                tracing::error!(sample_rate, error = %e, "sink open failed");
                (self.on_fatal)(format!("audio sink unavailable: {e}"));
                false
            }
        }
    }

    fn release_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.stop();
            tracing::debug!("sink released");
        }
        self.shared.head.store(0, Ordering::Release);
        self.shared.written.store(0, Ordering::Release);
        self.shared.sink_playing.store(false, Ordering::Release);
        self.sink_paused = false;
    }

    /// Apply pause/resume and volume requests to the open sink.
    fn apply_shared_flags(&mut self) {
        let paused = self.shared.paused.load(Ordering::Acquire);
        if let Some(sink) = self.sink.as_mut() {
            if paused && !self.sink_paused {
                sink.pause();
                self.sink_paused = true;
                self.shared.sink_playing.store(false, Ordering::Release);
            } else if !paused && self.sink_paused {
                sink.play();
                self.sink_paused = false;
                self.shared.sink_playing.store(true, Ordering::Release);
            }
            if self.shared.volume_dirty.swap(false, Ordering::AcqRel) {
                sink.set_volume(*self.shared.volume.lock());
            }
        }
    }

    fn mirror_sink(&mut self) {
        if let Some(sink) = self.sink.as_ref() {
            self.shared
                .head
                .store(sink.playback_head_position(), Ordering::Release);
            self.shared.sink_playing.store(
                sink.play_state() == SinkState::Playing,
                Ordering::Release,
            );
        }
    }

    // ------------------------------------------------------------------
    // Side tasks
    // ------------------------------------------------------------------

    /// After the protected sentence's end marker, wait for the sink to
    /// drain it, then ask the consumer to close the window and replay the
    /// deferred buckets.
    fn spawn_protection_flush(&self) {
        let shared = self.shared.clone();
        let ctrl = self.ctrl_tx.clone();
        let generation = self.generation;
        let stall = Duration::from_millis(self.playback.eos_stall_ms);
        tokio::spawn(async move {
            wait_for_drain(&shared, stall).await;
            let _ = ctrl.send(Control::CloseProtection { generation }).await;
        });
    }

    /// End-of-stream barrier: report drained once the playback head stops
    /// advancing (or everything written has played), unless the session was
    /// retired meanwhile.
    fn spawn_drain_watchdog(&self, session: u64, on_drained: ReachedCallback) {
        let shared = self.shared.clone();
        let stall = Duration::from_millis(self.playback.eos_stall_ms);
        tracing::debug!(session, "end of stream reached, watching for drain");
        tokio::spawn(async move {
            wait_for_drain(&shared, stall).await;
            if shared.sessions.is_current(session) {
                on_drained(session);
            } else {
                tracing::debug!(session, "drain watchdog outlived its session");
            }
        });
    }
}

/// Poll the shared head mirror until playback caught up with what was
/// written, the sink left the playing state, or the head stalls for
/// `stall`.
async fn wait_for_drain(shared: &PlayerShared, stall: Duration) {
    let mut last_head = shared.head.load(Ordering::Acquire);
    let mut last_change = Instant::now();
    loop {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let head = shared.head.load(Ordering::Acquire);
        let written = shared.written.load(Ordering::Acquire);
        if written == 0 || head >= written {
            return;
        }
        if !shared.sink_playing.load(Ordering::Acquire) {
            return;
        }
        if head != last_head {
            last_head = head;
            last_change = Instant::now();
        } else if last_change.elapsed() >= stall {
            return;
        }
    }
}
