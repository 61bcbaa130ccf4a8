//! End-to-end scenarios for the orchestrator
//!
//! Mock backends, a clock-driven sink, and a recording callback; each test
//! drives the public [`Narrator`] surface and asserts on the callback
//! stream the way a UI would observe it.

mod support;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use narrator_core::{ManualNetwork, NarratorCallback, PlaybackState, Strategy};
use narrator_pipeline::{ClockSinkFactory, Narrator, SentenceProgress};
use support::{build, settings_for_tests, Event, MockEngine, MockRepository};

const RATE: u32 = 24000;

fn assert_monotonic_starts(starts: &[usize]) {
    for pair in starts.windows(2) {
        assert!(pair[0] < pair[1], "starts not monotonic: {starts:?}");
    }
}

/// S1: two sentences, offline only, clean completion.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offline_happy_path() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;

    let (engine, engine_log) = MockEngine::new(RATE, 8000);
    let repository = MockRepository::new(RATE, 8000);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("Hello. World.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "synthesis did not complete: {:?}",
        h.callback.events()
    );

    let events = h.callback.events();
    let spoken: Vec<&Event> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::SentenceStart(..) | Event::SentenceComplete(..) | Event::SynthesisComplete
            )
        })
        .collect();
    assert_eq!(
        spoken,
        vec![
            &Event::SentenceStart(0, "Hello.".into(), 2),
            &Event::SentenceComplete(0, "Hello.".into()),
            &Event::SentenceStart(1, "World.".into(), 2),
            &Event::SentenceComplete(1, "World.".into()),
            &Event::SynthesisComplete,
        ]
    );
    assert_eq!(h.narrator.status().state, PlaybackState::Idle);
    assert!(h.repository.calls().is_empty());
}

/// S2: online preferred, the first online call fails, both sentences fall
/// back to offline and the cooldown suppresses the second attempt.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn online_failure_falls_back_and_cooldown_holds() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OnlinePreferred;

    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let repository = MockRepository::new(RATE, 2400).fail_first(1);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("A. B.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "synthesis did not complete: {:?}",
        h.callback.events()
    );

    assert_eq!(h.callback.sentence_completes(), vec![0, 1]);
    // One online attempt (sentence 0), then the cooldown kept sentence 1
    // offline.
    assert_eq!(h.repository.calls().len(), 1);
    let prepared: Vec<String> = h.engine_log.prepared().iter().map(|p| p.1.clone()).collect();
    assert_eq!(prepared, vec!["A.", "B."]);
}

/// S3: mid-playback upgrade. Playback starts offline, the network recovers
/// during sentence 1, the remaining sentences are produced online, and the
/// sentence callbacks stay strictly ordered.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upgrade_mid_sentence_preserves_order() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OnlinePreferred;

    let (engine, engine_log) = MockEngine::new(RATE, 36000);
    let repository = MockRepository::new(RATE, 36000);
    let h = build(settings, engine, engine_log, repository, false);

    h.narrator.speak("S0. S1. S2. S3.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SentenceStart(1, ..))))
            .await,
        "sentence 1 never started: {:?}",
        h.callback.events()
    );

    h.network.set_good(true);

    assert!(
        h.callback
            .wait_for(Duration::from_secs(15), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "synthesis did not complete after upgrade: {:?}",
        h.callback.events()
    );

    assert_eq!(h.callback.sentence_completes(), vec![0, 1, 2, 3]);
    assert_monotonic_starts(&h.callback.sentence_starts());

    // The upgrade resumed after the preserved sentence: the sentences past
    // it were requested online.
    let requested = h.repository.texts_requested();
    assert!(
        requested.contains(&"S2.".to_string()) && requested.contains(&"S3.".to_string()),
        "online requests missing: {requested:?}"
    );
    assert_eq!(h.narrator.status().state, PlaybackState::Idle);
}

/// S4: pause, change voice, resume. The interrupted sentence restarts with
/// the new voice; earlier sentences do not repeat.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_change_voice_resume_restarts_sentence() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;
    settings.synthesis.default_voice = "luna".into();

    let (engine, engine_log) = MockEngine::new(RATE, 14400);
    let repository = MockRepository::new(RATE, 14400);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("First. Second. Third.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SentenceStart(1, ..))))
            .await,
        "sentence 1 never started"
    );

    h.narrator.pause();
    h.narrator.set_voice("nova");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(2), |events| events
                .iter()
                .any(|e| matches!(e, Event::Paused)))
            .await
    );
    assert_eq!(h.narrator.status().state, PlaybackState::Paused);

    h.narrator.resume();

    assert!(
        h.callback
            .wait_for(Duration::from_secs(10), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "synthesis did not complete after resume: {:?}",
        h.callback.events()
    );

    // Sentence 1 started twice (before the pause and after the resume),
    // sentence 0 only once.
    let starts = h.callback.sentence_starts();
    assert_eq!(starts.iter().filter(|&&i| i == 0).count(), 1);
    assert_eq!(starts.iter().filter(|&&i| i == 1).count(), 2);

    // The re-synthesis of sentence 1 used the new voice.
    let prepared = h.engine_log.prepared();
    let second_prepares: Vec<&(String, String)> =
        prepared.iter().filter(|p| p.1 == "Second.").collect();
    assert!(second_prepares.len() >= 2, "prepared: {prepared:?}");
    assert_eq!(second_prepares.last().unwrap().0, "nova");
    assert_eq!(prepared.last().unwrap().0, "nova");
}

/// S5: stop during synthesis goes Idle promptly, emits nothing further,
/// and the narrator is immediately reusable.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_mid_synthesis_is_clean_and_reusable() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;

    let (engine, engine_log) = MockEngine::new(RATE, 9600);
    let repository = MockRepository::new(RATE, 9600);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator
        .speak("S0. S1. S2. S3. S4. S5. S6. S7. S8. S9.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SentenceStart(2, ..))))
            .await,
        "sentence 2 never started"
    );

    h.narrator.stop();

    assert!(
        h.callback
            .wait_for(Duration::from_millis(500), |events| events
                .iter()
                .any(|e| matches!(e, Event::StateChanged(PlaybackState::Idle))))
            .await,
        "stop did not reach idle"
    );
    let status = h.narrator.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert_eq!(status.total_sentences, 0);

    // No sentence callbacks trickle in after the stop settled.
    let settled = h.callback.events().len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let later = h.callback.events()[settled..].to_vec();
    assert!(
        !later
            .iter()
            .any(|e| matches!(e, Event::SentenceStart(..) | Event::SentenceComplete(..))),
        "late callbacks after stop: {later:?}"
    );

    // A fresh speak works without re-creating the narrator.
    h.narrator.speak("Again.");
    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| {
                events
                    .iter()
                    .any(|e| matches!(e, Event::SentenceComplete(0, text) if text == "Again."))
            })
            .await,
        "speak after stop failed: {:?}",
        h.callback.events()
    );
}

/// S6: online only with a dead service surfaces an error and parks in
/// Paused so the user can retry, without a completion callback.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn online_only_persistent_failure_pauses_with_error() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OnlineOnly;

    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let repository = MockRepository::new(RATE, 2400).fail_always();
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("Only sentence.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::Error(_))))
            .await,
        "no error surfaced: {:?}",
        h.callback.events()
    );
    assert_eq!(h.narrator.status().state, PlaybackState::Paused);
    assert!(!h.callback.has_synthesis_complete());
    // The offline engine was never asked to cover for the dead service.
    assert!(h.engine_log.prepared().is_empty());
}

/// Latest speak wins: a second speak cancels the first utterance.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn later_speak_replaces_earlier_one() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;

    let (engine, engine_log) = MockEngine::new(RATE, 24000);
    let repository = MockRepository::new(RATE, 24000);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("Old zero. Old one. Old two.");
    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SentenceStart(0, ..))))
            .await
    );

    h.narrator.speak("Replacement.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(10), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "replacement never completed: {:?}",
        h.callback.events()
    );

    let events = h.callback.events();
    let complete_at = events
        .iter()
        .position(|e| matches!(e, Event::SynthesisComplete))
        .unwrap();
    // The completion belongs to the replacement utterance.
    let last_complete = events[..complete_at]
        .iter()
        .rev()
        .find_map(|e| match e {
            Event::SentenceComplete(index, text) => Some((*index, text.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_complete, (0, "Replacement.".to_string()));
    // Nothing from the old utterance completes after the replacement
    // started playing.
    let replacement_start = events
        .iter()
        .position(|e| matches!(e, Event::SentenceStart(0, text, _) if text == "Replacement."))
        .unwrap();
    assert!(!events[replacement_start..]
        .iter()
        .any(|e| matches!(e, Event::SentenceComplete(_, text) if text.starts_with("Old"))));
}

/// A second utterance right after a clean completion plays normally — the
/// player survives across sessions without a stop in between.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_speaks_without_stop() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;

    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let repository = MockRepository::new(RATE, 2400);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("First run.");
    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await
    );

    h.narrator.speak("Second run.");
    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| {
                events
                    .iter()
                    .any(|e| matches!(e, Event::SentenceComplete(0, text) if text == "Second run."))
            })
            .await,
        "second utterance never played: {:?}",
        h.callback.events()
    );
}

/// Speaking nothing is an error, not a silent no-op.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_speak_reports_error() {
    let settings = settings_for_tests();
    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let repository = MockRepository::new(RATE, 2400);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("   \n  ");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(2), |events| events
                .iter()
                .any(|e| matches!(e, Event::Error(_))))
            .await
    );
    assert_eq!(h.narrator.status().state, PlaybackState::Idle);
}

/// Stop from idle stays idle and emits no spurious callbacks.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_is_idempotent() {
    let settings = settings_for_tests();
    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let repository = MockRepository::new(RATE, 2400);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.stop();
    h.narrator.stop();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.narrator.status().state, PlaybackState::Idle);
    assert!(h.callback.sentence_starts().is_empty());
}

/// Offline prepare failures skip the sentence silently and keep going.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prepare_failure_skips_sentence() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;

    // Three prepare failures exhaust all retries for sentence 0 only.
    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let engine = engine.failing_prepares(3);
    let repository = MockRepository::new(RATE, 2400);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("Skipped. Spoken.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "synthesis did not complete: {:?}",
        h.callback.events()
    );

    // The skipped sentence produced no callbacks at all.
    assert_eq!(h.callback.sentence_starts(), vec![1]);
    assert_eq!(h.callback.sentence_completes(), vec![1]);
}

/// Callback that snapshots the player's progress at each sentence
/// completion, so a test can check which sentence the enqueued audio was
/// accounted under.
#[derive(Default)]
struct SpeedProbe {
    narrator: Mutex<Option<Arc<Narrator>>>,
    starts: Mutex<Vec<usize>>,
    completes: Mutex<Vec<(usize, Option<SentenceProgress>)>>,
    complete: AtomicBool,
}

impl NarratorCallback for SpeedProbe {
    fn on_sentence_start(&self, index: usize, _text: &str, _total: usize) {
        self.starts.lock().push(index);
    }

    fn on_sentence_complete(&self, index: usize, _text: &str) {
        let progress = self
            .narrator
            .lock()
            .as_ref()
            .and_then(|n| n.sentence_progress());
        self.completes.lock().push((index, progress));
    }

    fn on_synthesis_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }
}

/// A speaking rate off the bypass band routes online audio through the
/// stretcher, which withholds sub-frame sentences until its analysis
/// window fills. Every sentence must still play exactly once, with its
/// audio accounted under its own index.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn online_speed_off_unity_keeps_sentences_paired() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OnlinePreferred;
    let sink_buffer = settings.playback.sink_buffer_samples;

    // 600 samples is 25 ms at 24 kHz: shorter than one stretcher frame, so
    // without a per-sentence drain nothing would come out of the DSP for
    // the first call.
    let (engine, engine_log) = MockEngine::new(RATE, 600);
    let repository = MockRepository::new(RATE, 600);
    let network = ManualNetwork::new(true);
    let factory = ClockSinkFactory::new(sink_buffer);

    let narrator = Arc::new(Narrator::new(
        settings,
        Box::new(engine),
        repository.clone(),
        factory,
        network,
    ));
    let probe = Arc::new(SpeedProbe::default());
    *probe.narrator.lock() = Some(narrator.clone());
    narrator.set_callback(Some(probe.clone()));

    narrator.set_speed(1.5);
    narrator.speak("A. B.");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !probe.complete.load(Ordering::SeqCst) {
        assert!(
            Instant::now() < deadline,
            "synthesis did not complete: starts {:?}, completes {:?}",
            probe.starts.lock(),
            probe
                .completes
                .lock()
                .iter()
                .map(|c| c.0)
                .collect::<Vec<_>>()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Exactly one start/complete pair per sentence, in order.
    assert_eq!(*probe.starts.lock(), vec![0, 1]);
    let completes = probe.completes.lock();
    let complete_indices: Vec<usize> = completes.iter().map(|c| c.0).collect();
    assert_eq!(complete_indices, vec![0, 1]);

    // At the final completion the player still accounts non-empty audio
    // under the final sentence: its samples were not left buffered in the
    // stretcher or drained under another index.
    let progress = completes
        .last()
        .and_then(|(_, p)| p.clone())
        .expect("no progress at final sentence completion");
    assert_eq!(progress.index, 1);
    assert!(progress.total_samples > 0);

    // Both sentences were produced online; the engine never stepped in.
    assert_eq!(
        repository.texts_requested(),
        vec!["A.".to_string(), "B.".to_string()]
    );
    assert!(engine_log.prepared().is_empty());
}

/// When every sentence is skipped no end marker ever fires, and the drain
/// becomes the only completion signal. The utterance must still finish.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn all_sentences_skipped_still_completes() {
    let mut settings = settings_for_tests();
    settings.synthesis.strategy = Strategy::OfflineOnly;

    let (engine, engine_log) = MockEngine::new(RATE, 2400);
    let engine = engine.failing_prepares(3);
    let repository = MockRepository::new(RATE, 2400);
    let h = build(settings, engine, engine_log, repository, true);

    h.narrator.speak("Unspeakable.");

    assert!(
        h.callback
            .wait_for(Duration::from_secs(5), |events| events
                .iter()
                .any(|e| matches!(e, Event::SynthesisComplete)))
            .await,
        "skipped utterance never completed: {:?}",
        h.callback.events()
    );
    assert!(h.callback.sentence_starts().is_empty());
    assert_eq!(h.narrator.status().state, PlaybackState::Idle);
}
