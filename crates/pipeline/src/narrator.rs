//! Public orchestrator handle
//!
//! [`Narrator`] is the single entry point consumers hold. Every call turns
//! into a command for the actor task, so the handle itself is cheap,
//! non-blocking, and callable from any context inside a multi-thread Tokio
//! runtime.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use narrator_config::Settings;
use narrator_core::{
    NarratorCallback, NarratorStatus, NetworkMonitor, OfflineEngine, SessionCounter, SinkFactory,
    SpeechRepository, Strategy,
};

use crate::actor::{Command, CommandActor};
use crate::cooldown::Cooldown;
use crate::dsp::SpeedDsp;
use crate::player::{AudioPlayer, FatalHook, SentenceProgress};
use crate::strategy::StrategyManager;
use crate::synth::EngineSlot;

pub struct Narrator {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<RwLock<NarratorStatus>>,
    playing_rx: watch::Receiver<bool>,
    player: AudioPlayer,
}

impl Narrator {
    /// Assemble the orchestrator and spawn its actor.
    ///
    /// Must be called within a multi-thread Tokio runtime; the engine and
    /// sink are driven through blocking sections.
    pub fn new(
        settings: Settings,
        engine: Box<dyn OfflineEngine>,
        repository: Arc<dyn SpeechRepository>,
        sink_factory: Arc<dyn SinkFactory>,
        monitor: Arc<dyn NetworkMonitor>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let sessions = SessionCounter::new();

        let fatal_tx = commands.clone();
        let on_fatal: FatalHook = Arc::new(move |message: String| {
            let _ = fatal_tx.send(Command::Fatal(message));
        });

        let player = AudioPlayer::new(
            settings.playback.clone(),
            settings.progress.clone(),
            sink_factory,
            sessions.clone(),
            on_fatal,
        );

        let status = Arc::new(RwLock::new(NarratorStatus::default()));
        let (playing_tx, playing_rx) = watch::channel(false);
        let strategy = Arc::new(StrategyManager::new(
            settings.synthesis.strategy,
            monitor.is_good(),
        ));
        let cooldown = Arc::new(Cooldown::new(settings.cooldown.clone()));
        let dsp = Arc::new(Mutex::new(SpeedDsp::new(settings.synthesis.default_speed)));
        let engine = Arc::new(Mutex::new(EngineSlot {
            engine,
            loaded_voice: None,
        }));

        let actor = CommandActor {
            voice: settings.synthesis.default_voice.clone(),
            speed: settings.synthesis.default_speed,
            volume: settings.synthesis.default_volume,
            settings,
            commands: commands.clone(),
            sessions,
            player: player.clone(),
            engine,
            repository,
            dsp,
            strategy,
            cooldown,
            monitor,
            status: status.clone(),
            playing_tx,
            state: Default::default(),
            sentences: Arc::new(Vec::new()),
            playing_index: 0,
            pending: Default::default(),
            paused_by_error: false,
            callback: None,
            engine_ok: false,
            init_notified: false,
            loop_handle: None,
            watcher: None,
            upgrade_protected: None,
        };
        tokio::spawn(actor.run(rx));

        Self {
            commands,
            status,
            playing_rx,
            player,
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("narrator already released, command ignored");
        }
    }

    /// Split `text` into sentences and play them. An active utterance is
    /// stopped first; the latest call wins.
    pub fn speak(&self, text: impl Into<String>) {
        self.send(Command::Speak(text.into()));
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Stop and tear everything down, including the native engine. The
    /// handle is inert afterwards.
    pub fn release(&self) {
        self.send(Command::Release);
    }

    /// Speaking rate in [0.5, 3.0]. Mid-playback changes restart the
    /// current sentence; changes while paused apply on resume.
    pub fn set_speed(&self, value: f32) {
        self.send(Command::SetSpeed(value));
    }

    /// Voice for subsequent synthesis. Same restart semantics as
    /// [`Narrator::set_speed`].
    pub fn set_voice(&self, name: impl Into<String>) {
        self.send(Command::SetVoice(name.into()));
    }

    /// Output gain in [0, 1]. Applied without restarting playback.
    pub fn set_volume(&self, value: f32) {
        self.send(Command::SetVolume(value));
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.send(Command::SetStrategy(strategy));
    }

    /// Install (or clear) the callback. `on_initialized` is delivered on
    /// the first install.
    pub fn set_callback(&self, callback: Option<Arc<dyn NarratorCallback>>) {
        self.send(Command::SetCallback(callback));
    }

    pub fn status(&self) -> NarratorStatus {
        self.status.read().clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.status.read().is_speaking()
    }

    /// Reactive `is_playing` signal.
    pub fn playing_signal(&self) -> watch::Receiver<bool> {
        self.playing_rx.clone()
    }

    /// Progress of the sentence currently playing, if any.
    pub fn sentence_progress(&self) -> Option<SentenceProgress> {
        self.player.current_sentence_progress()
    }
}
