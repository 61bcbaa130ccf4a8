//! Shared test doubles for the orchestrator scenarios

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use narrator_config::Settings;
use narrator_core::{
    DecodedPcm, ManualNetwork, NarratorCallback, OfflineEngine, PlaybackState, RepositoryError,
    SpeechRepository, SynthesisChunk,
};
use narrator_pipeline::{ClockSinkFactory, Narrator};

/// Deterministic per-voice sample value so tests can tell which voice (and
/// which backend) produced a run of PCM.
pub fn voice_tag(voice: &str) -> i16 {
    let sum: u32 = voice.bytes().map(u32::from).sum();
    (sum % 1000) as i16 + 100
}

// ---------------------------------------------------------------------------
// Offline engine double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EngineLog {
    prepared: Mutex<Vec<(String, String)>>,
}

impl EngineLog {
    /// All (voice, text) pairs successfully prepared, in order.
    pub fn prepared(&self) -> Vec<(String, String)> {
        self.prepared.lock().clone()
    }
}

pub struct MockEngine {
    sample_rate: u32,
    samples_per_sentence: usize,
    voice: String,
    prepared: Option<String>,
    emitted: usize,
    /// Fail this many prepare calls before succeeding.
    fail_prepares: usize,
    log: Arc<EngineLog>,
}

impl MockEngine {
    pub fn new(sample_rate: u32, samples_per_sentence: usize) -> (Self, Arc<EngineLog>) {
        let log = Arc::new(EngineLog::default());
        (
            Self {
                sample_rate,
                samples_per_sentence,
                voice: String::new(),
                prepared: None,
                emitted: 0,
                fail_prepares: 0,
                log: log.clone(),
            },
            log,
        )
    }

    pub fn failing_prepares(mut self, count: usize) -> Self {
        self.fail_prepares = count;
        self
    }
}

impl OfflineEngine for MockEngine {
    fn init(&mut self, _data_path: &Path) -> i32 {
        0
    }

    fn destroy(&mut self) {}

    fn reset(&mut self) {
        self.prepared = None;
        self.emitted = 0;
    }

    fn set_voice(&mut self, name: &str) -> i32 {
        self.voice = name.to_string();
        0
    }

    fn set_speed(&mut self, _value: f32) {}

    fn set_volume(&mut self, _value: f32) {}

    fn prepare(&mut self, text: &str) -> i32 {
        if self.fail_prepares > 0 {
            self.fail_prepares -= 1;
            return -1;
        }
        self.prepared = Some(text.to_string());
        self.emitted = 0;
        self.log
            .prepared
            .lock()
            .push((self.voice.clone(), text.to_string()));
        0
    }

    fn synthesize(&mut self, buffer: &mut [i16]) -> SynthesisChunk {
        if self.prepared.is_none() || self.emitted >= self.samples_per_sentence {
            return SynthesisChunk::End;
        }
        let remaining = self.samples_per_sentence - self.emitted;
        let count = remaining.min(buffer.len());
        let tag = voice_tag(&self.voice);
        for slot in &mut buffer[..count] {
            *slot = tag;
        }
        self.emitted += count;
        SynthesisChunk::Pcm(count)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// ---------------------------------------------------------------------------
// Online repository double
// ---------------------------------------------------------------------------

pub struct MockRepository {
    sample_rate: u32,
    samples_per_sentence: usize,
    fail_first: AtomicUsize,
    fail_always: AtomicBool,
    calls: Mutex<Vec<(String, String, bool)>>,
}

impl MockRepository {
    pub fn new(sample_rate: u32, samples_per_sentence: usize) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            samples_per_sentence,
            fail_first: AtomicUsize::new(0),
            fail_always: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_first(self: &Arc<Self>, count: usize) -> Arc<Self> {
        self.fail_first.store(count, Ordering::SeqCst);
        self.clone()
    }

    pub fn fail_always(self: &Arc<Self>) -> Arc<Self> {
        self.fail_always.store(true, Ordering::SeqCst);
        self.clone()
    }

    /// All (text, speaker, allow_network) calls, in order.
    pub fn calls(&self) -> Vec<(String, String, bool)> {
        self.calls.lock().clone()
    }

    pub fn texts_requested(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.0.clone()).collect()
    }
}

#[async_trait]
impl SpeechRepository for MockRepository {
    async fn fetch_pcm(
        &self,
        text: &str,
        speaker: &str,
        allow_network: bool,
    ) -> Result<DecodedPcm, RepositoryError> {
        self.calls
            .lock()
            .push((text.to_string(), speaker.to_string(), allow_network));

        if self.fail_always.load(Ordering::SeqCst) {
            return Err(RepositoryError::Api {
                code: 500,
                message: "synthesis backend unavailable".into(),
            });
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RepositoryError::Api {
                code: 503,
                message: "temporary failure".into(),
            });
        }

        Ok(DecodedPcm {
            samples: vec![voice_tag(speaker); self.samples_per_sentence],
            sample_rate: self.sample_rate,
        })
    }
}

// ---------------------------------------------------------------------------
// Recording callback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Initialized(bool),
    SynthesisStart,
    SentenceStart(usize, String, usize),
    SentenceComplete(usize, String),
    StateChanged(PlaybackState),
    SynthesisComplete,
    Paused,
    Resumed,
    Error(String),
}

#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<Event>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Poll until `pred` holds for the recorded events or `timeout`
    /// expires. Returns whether it held.
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&[Event]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if pred(&self.events()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn sentence_starts(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::SentenceStart(i, ..) => Some(*i),
                _ => None,
            })
            .collect()
    }

    pub fn sentence_completes(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::SentenceComplete(i, ..) => Some(*i),
                _ => None,
            })
            .collect()
    }

    pub fn has_synthesis_complete(&self) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::SynthesisComplete))
    }
}

impl NarratorCallback for RecordingCallback {
    fn on_initialized(&self, ok: bool) {
        self.push(Event::Initialized(ok));
    }

    fn on_synthesis_start(&self) {
        self.push(Event::SynthesisStart);
    }

    fn on_sentence_start(&self, index: usize, text: &str, total: usize) {
        self.push(Event::SentenceStart(index, text.to_string(), total));
    }

    fn on_sentence_complete(&self, index: usize, text: &str) {
        self.push(Event::SentenceComplete(index, text.to_string()));
    }

    fn on_state_changed(&self, state: PlaybackState) {
        self.push(Event::StateChanged(state));
    }

    fn on_synthesis_complete(&self) {
        self.push(Event::SynthesisComplete);
    }

    fn on_paused(&self) {
        self.push(Event::Paused);
    }

    fn on_resumed(&self) {
        self.push(Event::Resumed);
    }

    fn on_error(&self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub narrator: Narrator,
    pub callback: Arc<RecordingCallback>,
    pub engine_log: Arc<EngineLog>,
    pub repository: Arc<MockRepository>,
    pub network: Arc<ManualNetwork>,
}

pub fn settings_for_tests() -> Settings {
    let mut settings = Settings::default();
    // Keep drain watchdogs snappy so scenario tests finish quickly.
    settings.playback.eos_stall_ms = 300;
    settings
}

pub fn build(
    settings: Settings,
    engine: MockEngine,
    engine_log: Arc<EngineLog>,
    repository: Arc<MockRepository>,
    network_good: bool,
) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let network = ManualNetwork::new(network_good);
    let factory = ClockSinkFactory::new(settings.playback.sink_buffer_samples);
    let callback = RecordingCallback::new();

    let narrator = Narrator::new(
        settings,
        Box::new(engine),
        repository.clone(),
        factory,
        network.clone(),
    );
    narrator.set_callback(Some(callback.clone()));

    Harness {
        narrator,
        callback,
        engine_log,
        repository,
        network,
    }
}
