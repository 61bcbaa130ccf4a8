//! Synthesis loop
//!
//! One task per session walks the sentence list, picks a backend per
//! sentence under the strategy and cooldown, and feeds PCM plus markers
//! into the audio player. Every enqueue is a session checkpoint: a retired
//! loop exits without side effects, and only the currently-active session
//! issues the end-of-stream barrier.

mod offline;
mod online;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use narrator_core::{
    AudioSource, DesiredMode, OfflineEngine, SessionCounter, SpeechRepository, Strategy,
};

use crate::actor::Command;
use crate::cooldown::Cooldown;
use crate::dsp::SpeedDsp;
use crate::player::{AudioPlayer, MarkerKind, ReachedCallback};
use crate::strategy::StrategyManager;

/// Back-off while the protection window excludes the current sentence.
const DEFER_RETRY: Duration = Duration::from_millis(50);

/// The native engine plus the voice it currently has loaded.
pub(crate) struct EngineSlot {
    pub(crate) engine: Box<dyn OfflineEngine>,
    pub(crate) loaded_voice: Option<String>,
}

/// Everything a synthesis loop needs, cloned per launch.
#[derive(Clone)]
pub(crate) struct SynthesisContext {
    pub(crate) engine: Arc<Mutex<EngineSlot>>,
    pub(crate) repository: Arc<dyn SpeechRepository>,
    pub(crate) player: AudioPlayer,
    pub(crate) dsp: Arc<Mutex<SpeedDsp>>,
    pub(crate) strategy: Arc<StrategyManager>,
    pub(crate) cooldown: Arc<Cooldown>,
    pub(crate) sessions: Arc<SessionCounter>,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) engine_chunk: usize,
}

/// Parameter snapshot the loop runs with.
#[derive(Clone, Debug)]
pub(crate) struct SynthesisParams {
    pub(crate) voice: String,
    pub(crate) speed: f32,
    pub(crate) volume: f32,
}

/// Outcome of producing one sentence.
#[derive(Debug)]
pub(crate) enum Produce {
    /// Sentence fully enqueued (or deliberately skipped).
    Success,
    /// The protection window excludes this sentence right now; retry soon.
    Deferred,
    /// The session was retired mid-production.
    Cancelled,
    /// The backend could not produce the sentence.
    Failure(String),
}

/// The closure reports the session stamp the consumer hands it, not the
/// one at construction: a queue-only reset re-stamps preserved markers so
/// their events stay live across the bump.
pub(crate) fn marker_callback(
    commands: &mpsc::UnboundedSender<Command>,
    index: usize,
    source: AudioSource,
    kind: MarkerKind,
) -> ReachedCallback {
    let commands = commands.clone();
    Box::new(move |session: u64| {
        let command = match kind {
            MarkerKind::SentenceStart => Command::SentenceStarted {
                session,
                index,
                source,
            },
            MarkerKind::SentenceEnd => Command::SentenceFinished {
                session,
                index,
                source,
            },
        };
        let _ = commands.send(command);
    })
}

pub(crate) async fn run_loop(
    ctx: SynthesisContext,
    params: SynthesisParams,
    sentences: Arc<Vec<String>>,
    start: usize,
    session: u64,
) {
    let total = sentences.len();
    let mut index = start;
    let mut fatal: Option<String> = None;

    tracing::info!(session, start, total, voice = %params.voice, "synthesis loop started");

    while index < total {
        if !ctx.sessions.is_current(session) {
            tracing::debug!(session, "synthesis loop retired");
            return;
        }

        let text = sentences[index].as_str();
        let outcome = match ctx.strategy.strategy() {
            Strategy::OfflineOnly => offline::produce(&ctx, &params, session, index, text).await,
            Strategy::OnlineOnly => {
                if ctx.cooldown.allow_network_now() {
                    online::produce(&ctx, &params, session, index, text).await
                } else {
                    Produce::Failure("online synthesis blocked by cooldown".into())
                }
            }
            Strategy::OnlinePreferred => {
                let try_online = ctx.strategy.desired_mode() == DesiredMode::Online
                    && ctx.cooldown.allow_network_now();
                if try_online {
                    match online::produce(&ctx, &params, session, index, text).await {
                        Produce::Failure(reason) => {
                            tracing::warn!(
                                session,
                                sentence = index,
                                %reason,
                                "online production failed, retrying offline"
                            );
                            offline::produce(&ctx, &params, session, index, text).await
                        }
                        outcome => outcome,
                    }
                } else {
                    offline::produce(&ctx, &params, session, index, text).await
                }
            }
        };

        match outcome {
            Produce::Success => index += 1,
            Produce::Deferred => tokio::time::sleep(DEFER_RETRY).await,
            Produce::Cancelled => {
                tracing::debug!(session, sentence = index, "production cancelled");
                return;
            }
            Produce::Failure(reason) => {
                tracing::error!(session, sentence = index, %reason, "sentence production failed");
                fatal = Some(reason);
                break;
            }
        }
    }

    if !ctx.sessions.is_current(session) {
        return;
    }

    // Each sentence drains the speed DSP it fed; residue only remains
    // here if production stopped between feeding and draining, and it
    // belongs to the last sentence.
    let residue = ctx.dsp.lock().await.flush();
    if let Some((samples, sample_rate)) = residue {
        let last = index.min(total.saturating_sub(1));
        let _ = ctx
            .player
            .enqueue_pcm(session, samples, sample_rate, AudioSource::Online, last)
            .await;
    }

    let commands = ctx.commands.clone();
    let drained_fatal = fatal.clone();
    let enqueued = ctx
        .player
        .enqueue_end_of_stream(
            session,
            Box::new(move |drained_session: u64| {
                let _ = commands.send(Command::StreamDrained {
                    session: drained_session,
                    fatal: drained_fatal,
                });
            }),
        )
        .await;
    if enqueued.is_err() {
        tracing::debug!(session, "player gone before end of stream");
    }

    tracing::info!(session, produced_to = index, fatal = fatal.is_some(), "synthesis loop finished");
}
