//! Offline sentence production
//!
//! Drives the native engine under its exclusive lock. Engine failures are
//! silent skips: the loop moves on rather than surfacing a codec hiccup to
//! the user. The engine is always reset afterwards, success or not.

use tokio::task::block_in_place;

use narrator_core::{AudioSource, SynthesisChunk};

use super::{marker_callback, Produce, SynthesisContext, SynthesisParams};
use crate::player::MarkerKind;

/// Map a user speaking rate in [0.5, 3.0] onto the engine's own scale,
/// which centers normal speed at 50.
fn engine_speed(ratio: f32) -> f32 {
    ratio * 50.0
}

/// Resets the engine when production ends. Drop is the one place that
/// still runs when the loop task is aborted at an await point, so a
/// cancelled sentence cannot leave a prepared utterance staged in the
/// non-reentrant engine. The native reset is prompt.
struct ResetOnDrop<'a>(&'a mut super::EngineSlot);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.engine.reset();
    }
}

impl std::ops::Deref for ResetOnDrop<'_> {
    type Target = super::EngineSlot;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl std::ops::DerefMut for ResetOnDrop<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0
    }
}

pub(crate) async fn produce(
    ctx: &SynthesisContext,
    params: &SynthesisParams,
    session: u64,
    index: usize,
    text: &str,
) -> Produce {
    if !ctx.player.can_accept(AudioSource::Offline, index) {
        return Produce::Deferred;
    }

    let mut slot = ctx.engine.lock().await;
    let mut slot = ResetOnDrop(&mut slot);
    synthesize_sentence(&mut slot, ctx, params, session, index, text).await
}

async fn synthesize_sentence(
    slot: &mut super::EngineSlot,
    ctx: &SynthesisContext,
    params: &SynthesisParams,
    session: u64,
    index: usize,
    text: &str,
) -> Produce {
    if slot.loaded_voice.as_deref() != Some(params.voice.as_str()) {
        let status = block_in_place(|| slot.engine.set_voice(&params.voice));
        if status != 0 {
            tracing::warn!(
                session,
                sentence = index,
                voice = %params.voice,
                status,
                "voice load failed, skipping sentence"
            );
            return Produce::Success;
        }
        slot.loaded_voice = Some(params.voice.clone());
    }

    block_in_place(|| {
        slot.engine.set_speed(engine_speed(params.speed));
        slot.engine.set_volume(params.volume);
    });

    let mut prepared = false;
    for attempt in 1..=3 {
        let status = block_in_place(|| slot.engine.prepare(text));
        if status == 0 {
            prepared = true;
            break;
        }
        tracing::warn!(
            session,
            sentence = index,
            attempt,
            status,
            "engine prepare failed"
        );
        // Reload the voice before the next attempt; a half-initialized
        // voice is the usual culprit.
        let _ = block_in_place(|| slot.engine.set_voice(&params.voice));
    }
    if !prepared {
        tracing::warn!(session, sentence = index, "prepare kept failing, skipping sentence");
        return Produce::Success;
    }

    let sample_rate = slot.engine.sample_rate();
    let mut buffer = vec![0i16; ctx.engine_chunk];
    let mut started = false;

    loop {
        if !ctx.sessions.is_current(session) {
            return Produce::Cancelled;
        }
        if !ctx.player.can_accept(AudioSource::Offline, index) {
            return Produce::Deferred;
        }

        match block_in_place(|| slot.engine.synthesize(&mut buffer)) {
            SynthesisChunk::Error(status) => {
                tracing::warn!(
                    session,
                    sentence = index,
                    status,
                    "engine error mid-sentence, skipping remainder"
                );
                break;
            }
            SynthesisChunk::End | SynthesisChunk::Pcm(0) => break,
            SynthesisChunk::Pcm(count) => {
                if !started {
                    // Lazy start: the marker only exists once there is
                    // audible data behind it.
                    let on_reached = marker_callback(
                        &ctx.commands,
                        index,
                        AudioSource::Offline,
                        MarkerKind::SentenceStart,
                    );
                    if ctx
                        .player
                        .enqueue_marker(
                            session,
                            index,
                            MarkerKind::SentenceStart,
                            AudioSource::Offline,
                            on_reached,
                        )
                        .await
                        .is_err()
                    {
                        return Produce::Cancelled;
                    }
                    started = true;
                }

                let count = count.min(buffer.len());
                if ctx
                    .player
                    .enqueue_pcm(
                        session,
                        buffer[..count].to_vec(),
                        sample_rate,
                        AudioSource::Offline,
                        index,
                    )
                    .await
                    .is_err()
                {
                    return Produce::Cancelled;
                }
            }
        }
    }

    if started {
        let on_reached = marker_callback(
            &ctx.commands,
            index,
            AudioSource::Offline,
            MarkerKind::SentenceEnd,
        );
        if ctx
            .player
            .enqueue_marker(
                session,
                index,
                MarkerKind::SentenceEnd,
                AudioSource::Offline,
                on_reached,
            )
            .await
            .is_err()
        {
            return Produce::Cancelled;
        }
    }

    Produce::Success
}
