//! Online sentence production
//!
//! Fetches decoded PCM from the repository, runs it through the speed DSP,
//! and enqueues it. Any repository failure is classified for the caller;
//! an empty payload for a non-empty sentence counts as a failure so a
//! broken service cannot silently advance the sentence cursor. Markers are
//! lazy, like the offline path: a sentence only gets its start/end pair
//! once the DSP actually yielded audio for it.

use narrator_core::{AudioSource, RepositoryError};

use super::{marker_callback, Produce, SynthesisContext, SynthesisParams};
use crate::player::MarkerKind;

pub(crate) async fn produce(
    ctx: &SynthesisContext,
    params: &SynthesisParams,
    session: u64,
    index: usize,
    text: &str,
) -> Produce {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        // Nothing to say; keep the callback pairing without any PCM.
        return emit_empty_sentence(ctx, session, index).await;
    }

    let allow_network = ctx.cooldown.allow_network_now();
    let fetched = ctx
        .repository
        .fetch_pcm(trimmed, &params.voice, allow_network)
        .await;

    if !ctx.sessions.is_current(session) {
        return Produce::Cancelled;
    }

    let pcm = match fetched {
        Err(error) => {
            // Forbidden-network is the cooldown talking, not a fresh
            // failure; everything else extends the backoff.
            if !matches!(error, RepositoryError::ForbiddenNetwork) {
                ctx.cooldown.on_failure();
            }
            return Produce::Failure(error.to_string());
        }
        Ok(pcm) if pcm.samples.is_empty() => {
            ctx.cooldown.on_failure();
            return Produce::Failure("service returned no PCM for a non-empty sentence".into());
        }
        Ok(pcm) => pcm,
    };
    ctx.cooldown.on_success();

    // Progress hint: the stretched length is the fetched length scaled by
    // the speaking rate.
    let predicted = (pcm.samples.len() as f64 / f64::from(params.speed)) as u64;
    ctx.player.set_predicted_total(index, predicted);

    let processed = {
        let mut dsp = ctx.dsp.lock().await;
        dsp.set_ratio(params.speed);
        let mut out = dsp.process(pcm.sample_rate, &pcm.samples);
        // The stretcher withholds a tail until its analysis window fills.
        // Sentences are independent fetches; left buffered, that tail
        // would surface under the next sentence's index, so drain it now.
        if let Some((residue, _)) = dsp.flush() {
            out.extend(residue);
        }
        out
    };

    if !ctx.sessions.is_current(session) {
        return Produce::Cancelled;
    }

    // Lazy start, like the offline path: the marker only exists once
    // there is audible data behind it.
    let mut started = false;
    if !processed.is_empty() {
        let on_start = marker_callback(
            &ctx.commands,
            index,
            AudioSource::Online,
            MarkerKind::SentenceStart,
        );
        if ctx
            .player
            .enqueue_marker(
                session,
                index,
                MarkerKind::SentenceStart,
                AudioSource::Online,
                on_start,
            )
            .await
            .is_err()
        {
            return Produce::Cancelled;
        }
        started = true;

        if ctx
            .player
            .enqueue_pcm(
                session,
                processed,
                pcm.sample_rate,
                AudioSource::Online,
                index,
            )
            .await
            .is_err()
        {
            return Produce::Cancelled;
        }
    }

    if started {
        let on_end = marker_callback(
            &ctx.commands,
            index,
            AudioSource::Online,
            MarkerKind::SentenceEnd,
        );
        if ctx
            .player
            .enqueue_marker(
                session,
                index,
                MarkerKind::SentenceEnd,
                AudioSource::Online,
                on_end,
            )
            .await
            .is_err()
        {
            return Produce::Cancelled;
        }
    }

    Produce::Success
}

async fn emit_empty_sentence(ctx: &SynthesisContext, session: u64, index: usize) -> Produce {
    for kind in [MarkerKind::SentenceStart, MarkerKind::SentenceEnd] {
        let on_reached = marker_callback(&ctx.commands, index, AudioSource::Online, kind);
        if ctx
            .player
            .enqueue_marker(session, index, kind, AudioSource::Online, on_reached)
            .await
            .is_err()
        {
            return Produce::Cancelled;
        }
    }
    Produce::Success
}
