//! Command actor
//!
//! The single place where playback state changes. External calls and
//! internal notifications (marker callbacks, drain reports, network
//! recovery) all arrive as commands on one unbounded channel and are
//! handled strictly in order. The user callback is only ever invoked from
//! this task.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{block_in_place, JoinHandle};

use narrator_config::{Settings, MAX_SPEED, MIN_SPEED};
use narrator_core::{
    AudioSource, NarratorCallback, NarratorStatus, NetworkMonitor, PendingChange, PlaybackState,
    SessionCounter, SpeechRepository, Strategy,
};
use narrator_text::split_sentences;

use crate::cooldown::Cooldown;
use crate::dsp::SpeedDsp;
use crate::network;
use crate::player::AudioPlayer;
use crate::strategy::StrategyManager;
use crate::synth::{self, EngineSlot, SynthesisContext, SynthesisParams};

pub(crate) enum Command {
    Speak(String),
    SetSpeed(f32),
    SetVoice(String),
    SetVolume(f32),
    Pause,
    Resume,
    Stop,
    Release,
    SetStrategy(Strategy),
    SetCallback(Option<Arc<dyn NarratorCallback>>),
    /// A sentence-start marker was reached by the audio consumer.
    SentenceStarted {
        session: u64,
        index: usize,
        source: AudioSource,
    },
    /// A sentence-end marker was reached by the audio consumer.
    SentenceFinished {
        session: u64,
        index: usize,
        source: AudioSource,
    },
    /// The end-of-stream barrier drained. `fatal` carries the reason when
    /// the synthesis loop broke instead of finishing.
    StreamDrained {
        session: u64,
        fatal: Option<String>,
    },
    /// The network watcher saw a stable recovery.
    NetworkRecovered,
    /// The player lost its sink beyond recovery.
    Fatal(String),
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Exit,
}

pub(crate) struct CommandActor {
    pub(crate) settings: Settings,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) sessions: Arc<SessionCounter>,
    pub(crate) player: AudioPlayer,
    pub(crate) engine: Arc<Mutex<EngineSlot>>,
    pub(crate) repository: Arc<dyn SpeechRepository>,
    pub(crate) dsp: Arc<Mutex<SpeedDsp>>,
    pub(crate) strategy: Arc<StrategyManager>,
    pub(crate) cooldown: Arc<Cooldown>,
    pub(crate) monitor: Arc<dyn NetworkMonitor>,
    pub(crate) status: Arc<RwLock<NarratorStatus>>,
    pub(crate) playing_tx: watch::Sender<bool>,

    pub(crate) state: PlaybackState,
    pub(crate) sentences: Arc<Vec<String>>,
    pub(crate) playing_index: usize,
    pub(crate) pending: HashSet<PendingChange>,
    pub(crate) paused_by_error: bool,
    pub(crate) voice: String,
    pub(crate) speed: f32,
    pub(crate) volume: f32,
    pub(crate) callback: Option<Arc<dyn NarratorCallback>>,
    pub(crate) engine_ok: bool,
    pub(crate) init_notified: bool,
    pub(crate) loop_handle: Option<JoinHandle<()>>,
    pub(crate) watcher: Option<JoinHandle<()>>,
    /// Sentence a queue-only reset preserved; cleared when its end marker
    /// comes back. While set, further upgrades are skipped.
    pub(crate) upgrade_protected: Option<usize>,
}

impl CommandActor {
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.initialize().await;
        while let Some(command) = rx.recv().await {
            if self.handle(command).await == Flow::Exit {
                break;
            }
        }
        tracing::debug!("command actor exited");
    }

    async fn initialize(&mut self) {
        let data_path = self.settings.engine.data_path.clone();
        let status = {
            let mut slot = self.engine.lock().await;
            block_in_place(|| slot.engine.init(&data_path))
        };
        self.engine_ok = status == 0;
        if self.engine_ok {
            tracing::info!(path = %data_path.display(), "offline engine initialized");
        } else {
            tracing::error!(status, path = %data_path.display(), "offline engine init failed");
        }

        self.watcher = Some(network::spawn_watcher(
            self.monitor.clone(),
            self.strategy.clone(),
            self.cooldown.clone(),
            self.commands.clone(),
            self.settings.network.stabilization_ms,
        ));
    }

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Speak(text) => self.on_speak(text).await,
            Command::SetSpeed(value) => self.on_set_speed(value).await,
            Command::SetVoice(name) => self.on_set_voice(name).await,
            Command::SetVolume(value) => {
                let value = value.clamp(0.0, 1.0);
                self.volume = value;
                self.player.set_volume(value);
            }
            Command::Pause => self.on_pause(),
            Command::Resume => self.on_resume().await,
            Command::Stop => self.stop_internal().await,
            Command::Release => {
                self.stop_internal().await;
                {
                    let mut slot = self.engine.lock().await;
                    block_in_place(|| slot.engine.destroy());
                    slot.loaded_voice = None;
                }
                if let Some(watcher) = self.watcher.take() {
                    watcher.abort();
                }
                tracing::info!("narrator released");
                return Flow::Exit;
            }
            Command::SetStrategy(strategy) => self.strategy.set_strategy(strategy),
            Command::SetCallback(callback) => {
                self.callback = callback;
                if !self.init_notified {
                    if let Some(cb) = &self.callback {
                        cb.on_initialized(self.engine_ok);
                        self.init_notified = true;
                    }
                }
            }
            Command::SentenceStarted {
                session,
                index,
                source,
            } => self.on_sentence_started(session, index, source),
            Command::SentenceFinished {
                session,
                index,
                source,
            } => self.on_sentence_finished(session, index, source),
            Command::StreamDrained { session, fatal } => self.on_stream_drained(session, fatal),
            Command::NetworkRecovered => self.on_network_recovered().await,
            Command::Fatal(message) => {
                tracing::error!(%message, "fatal playback failure");
                self.stop_internal().await;
                self.notify(|cb| cb.on_error(&message));
            }
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------
    // External commands
    // ------------------------------------------------------------------

    async fn on_speak(&mut self, text: String) {
        if self.state != PlaybackState::Idle {
            self.stop_internal().await;
        }

        let sentences = split_sentences(&text, self.settings.synthesis.split_strategy);
        if sentences.is_empty() {
            tracing::warn!("speak called with no usable sentences");
            self.notify(|cb| cb.on_error("nothing to speak"));
            return;
        }
        let total = sentences.len();
        self.sentences = Arc::new(sentences);
        self.playing_index = 0;
        self.pending.clear();
        self.paused_by_error = false;
        self.upgrade_protected = None;

        let session = self.sessions.bump();
        self.player.start_if_needed(self.volume);
        // An already-running consumer still carries the previous session's
        // generation; the reset hands it the new one and clears leftovers.
        self.player.reset_blocking().await;
        self.set_state(PlaybackState::Playing);
        self.notify(|cb| cb.on_synthesis_start());
        self.launch_loop(0, session);
        tracing::info!(session, total, "speak accepted");
    }

    async fn on_set_speed(&mut self, value: f32) {
        let value = value.clamp(MIN_SPEED, MAX_SPEED);
        self.speed = value;
        self.dsp.lock().await.set_ratio(value);
        match self.state {
            PlaybackState::Playing => self.soft_restart().await,
            PlaybackState::Paused => self.record_pending(PendingChange::Speed).await,
            PlaybackState::Idle => {}
        }
    }

    async fn on_set_voice(&mut self, name: String) {
        self.voice = name;
        match self.state {
            PlaybackState::Playing => self.soft_restart().await,
            PlaybackState::Paused => self.record_pending(PendingChange::Speaker).await,
            PlaybackState::Idle => {}
        }
    }

    fn on_pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.player.pause();
        self.set_state(PlaybackState::Paused);
        self.notify(|cb| cb.on_paused());
    }

    async fn on_resume(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        if !self.pending.is_empty() || self.paused_by_error {
            // The current sentence restarts with the new parameters (or
            // gets another chance after an error).
            let session = self.sessions.bump();
            self.abort_loop().await;
            self.player.reset_blocking().await;
            self.pending.clear();
            self.paused_by_error = false;
            self.upgrade_protected = None;
            self.launch_loop(self.playing_index, session);
            tracing::info!(session, from = self.playing_index, "resume with new parameters");
        }
        self.set_state(PlaybackState::Playing);
        self.player.resume();
        self.notify(|cb| cb.on_resumed());
    }

    async fn stop_internal(&mut self) {
        let session = self.sessions.bump();
        self.abort_loop().await;
        self.player.stop_and_release_blocking().await;
        self.sentences = Arc::new(Vec::new());
        self.playing_index = 0;
        self.pending.clear();
        self.paused_by_error = false;
        self.upgrade_protected = None;
        self.set_state(PlaybackState::Idle);
        tracing::debug!(session, "stopped");
    }

    // ------------------------------------------------------------------
    // Internal commands
    // ------------------------------------------------------------------

    fn on_sentence_started(&mut self, session: u64, index: usize, source: AudioSource) {
        if !self.sessions.is_current(session) {
            return;
        }
        self.playing_index = index;
        self.update_status();
        let total = self.sentences.len();
        let text = self.sentences.get(index).cloned().unwrap_or_default();
        tracing::debug!(session, sentence = index, %source, "sentence started");
        self.notify(|cb| cb.on_sentence_start(index, &text, total));
    }

    fn on_sentence_finished(&mut self, session: u64, index: usize, source: AudioSource) {
        if !self.sessions.is_current(session) {
            return;
        }
        let text = self.sentences.get(index).cloned().unwrap_or_default();
        tracing::debug!(session, sentence = index, %source, "sentence finished");
        self.notify(|cb| cb.on_sentence_complete(index, &text));

        // Any completion at or past the preserved sentence means the
        // protection window is behind us. The preserved index itself may
        // never report under the new session when its end marker was
        // consumed just before the queue-only reset.
        if self.upgrade_protected.is_some_and(|p| index >= p) {
            self.upgrade_protected = None;
        }

        let is_last = index + 1 == self.sentences.len();
        if is_last && !self.paused_by_error && self.state != PlaybackState::Idle {
            self.set_state(PlaybackState::Idle);
            self.notify(|cb| cb.on_synthesis_complete());
            tracing::info!(session, "synthesis complete");
        }
    }

    fn on_stream_drained(&mut self, session: u64, fatal: Option<String>) {
        if !self.sessions.is_current(session) {
            tracing::debug!(session, "stale stream-drained report ignored");
            return;
        }
        if let Some(message) = fatal {
            tracing::error!(session, %message, "synthesis ended fatally");
            self.player.pause();
            self.paused_by_error = true;
            self.set_state(PlaybackState::Paused);
            self.notify(|cb| cb.on_error(&message));
        } else if self.state == PlaybackState::Playing {
            // Normally the last sentence-end marker already completed the
            // utterance. Still Playing here means the tail sentences were
            // skipped without markers, leaving the drain as the only
            // completion signal.
            tracing::debug!(session, "stream drained past a skipped tail");
            self.set_state(PlaybackState::Idle);
            self.notify(|cb| cb.on_synthesis_complete());
        }
    }

    async fn on_network_recovered(&mut self) {
        if self.strategy.strategy() != Strategy::OnlinePreferred {
            return;
        }
        if self.state != PlaybackState::Playing {
            return;
        }
        if self.upgrade_protected.is_some() {
            tracing::debug!("upgrade already in flight, skipping");
            return;
        }

        self.cooldown.reset();
        let preserve = self.playing_index;
        let session = self.sessions.bump();
        self.abort_loop().await;
        self.player.reset_queue_only_blocking(preserve).await;
        self.upgrade_protected = Some(preserve);
        self.launch_loop(preserve + 1, session);
        tracing::info!(session, preserve, "upgrading to online synthesis");
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Same-sentence restart with the current parameters: bump, cancel,
    /// hard-reset the player, resynthesize from the playing sentence.
    async fn soft_restart(&mut self) {
        let session = self.sessions.bump();
        self.abort_loop().await;
        self.player.reset_blocking().await;
        self.upgrade_protected = None;
        self.launch_loop(self.playing_index, session);
        tracing::debug!(session, from = self.playing_index, "soft restart");
    }

    /// First pending change while paused invalidates the queued audio
    /// immediately; the user stays paused.
    async fn record_pending(&mut self, change: PendingChange) {
        let first = self.pending.is_empty();
        self.pending.insert(change);
        if first {
            self.sessions.bump();
            self.abort_loop().await;
            self.player.reset_blocking().await;
            tracing::debug!(?change, "pending change pre-cleared queued audio");
        }
    }

    async fn abort_loop(&mut self) {
        if let Some(handle) = self.loop_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        // Residue the retired loop left in the speed DSP must not leak
        // into the next session's first sentence.
        let _ = self.dsp.lock().await.flush();
    }

    fn launch_loop(&mut self, start: usize, session: u64) {
        let ctx = SynthesisContext {
            engine: self.engine.clone(),
            repository: self.repository.clone(),
            player: self.player.clone(),
            dsp: self.dsp.clone(),
            strategy: self.strategy.clone(),
            cooldown: self.cooldown.clone(),
            sessions: self.sessions.clone(),
            commands: self.commands.clone(),
            engine_chunk: self.settings.engine.chunk_samples,
        };
        let params = SynthesisParams {
            voice: self.voice.clone(),
            speed: self.speed,
            volume: self.volume,
        };
        self.loop_handle = Some(tokio::spawn(synth::run_loop(
            ctx,
            params,
            self.sentences.clone(),
            start,
            session,
        )));
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            self.update_status();
            return;
        }
        self.state = state;
        self.update_status();
        self.playing_tx
            .send_replace(state == PlaybackState::Playing);
        self.notify(|cb| cb.on_state_changed(state));
    }

    fn update_status(&self) {
        let mut status = self.status.write();
        status.state = self.state;
        status.total_sentences = self.sentences.len();
        if self.state == PlaybackState::Idle {
            status.current_sentence_index = None;
            status.current_sentence = None;
        } else {
            status.current_sentence_index = Some(self.playing_index);
            status.current_sentence = self.sentences.get(self.playing_index).cloned();
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn NarratorCallback)) {
        if let Some(callback) = &self.callback {
            f(callback.as_ref());
        }
    }
}
