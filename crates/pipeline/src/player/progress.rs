//! Sentence progress accounting
//!
//! Pull-based progress for UI: the player tracks per-sentence sample counts
//! and computes a fraction from the sink's playback head on demand. The
//! estimate is deliberately conservative: it freezes briefly at the very
//! start, climbs its denominator in bounded increments while the producer
//! is still ahead of the hint, and retracts toward the accepted total late
//! in the sentence so it cannot overshoot. Fractions never decrease within
//! a sentence.

use std::collections::HashMap;
use std::time::Instant;

use narrator_config::ProgressSettings;

/// Progress snapshot for the sentence currently playing.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceProgress {
    pub index: usize,
    pub played_samples: u64,
    pub total_samples: u64,
    /// Monotone within a sentence, in [0, 1].
    pub fraction: f32,
}

#[derive(Debug, Default)]
struct SentenceAccount {
    accepted_samples: u64,
    predicted_total: Option<u64>,
    /// Sink head at the sentence's first write.
    start_anchor: Option<u64>,
    first_write_at: Option<Instant>,
    dynamic_predicted: f64,
    last_fraction: f32,
    sample_rate: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ProgressTable {
    accounts: HashMap<usize, SentenceAccount>,
    current: Option<usize>,
}

impl ProgressTable {
    pub(crate) fn clear(&mut self) {
        self.accounts.clear();
        self.current = None;
    }

    /// Keep only one sentence's account (queue-only reset).
    pub(crate) fn retain_sentence(&mut self, keep: usize) {
        self.accounts.retain(|&index, _| index == keep);
        if self.current != Some(keep) {
            self.current = None;
        }
    }

    pub(crate) fn sentence_started(&mut self, index: usize) {
        self.current = Some(index);
        self.accounts.entry(index).or_default();
    }

    #[cfg(test)]
    pub(crate) fn current_sentence(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn on_accepted(&mut self, index: usize, samples: usize, sample_rate: u32) {
        let account = self.accounts.entry(index).or_default();
        account.accepted_samples += samples as u64;
        account.sample_rate = sample_rate;
    }

    pub(crate) fn on_first_write(&mut self, index: usize, head: u64) {
        let account = self.accounts.entry(index).or_default();
        if account.start_anchor.is_none() {
            account.start_anchor = Some(head);
            account.first_write_at = Some(Instant::now());
        }
    }

    pub(crate) fn set_predicted_total(&mut self, index: usize, samples: u64) {
        self.accounts.entry(index).or_default().predicted_total = Some(samples);
    }

    /// Compute progress for the current sentence from the live head.
    pub(crate) fn query(
        &mut self,
        head: u64,
        settings: &ProgressSettings,
    ) -> Option<SentenceProgress> {
        let index = self.current?;
        let account = self.accounts.get_mut(&index)?;
        let anchor = account.start_anchor?;
        let rate = account.sample_rate.max(1);

        let played = head.saturating_sub(anchor);
        let accepted = account.accepted_samples as f64;
        let target = account
            .predicted_total
            .map_or(accepted, |p| (p as f64).max(accepted));

        // Climb the denominator toward the target in bounded steps.
        let climb = settings.climb_ms_per_query as f64 * f64::from(rate) / 1000.0;
        if account.dynamic_predicted < target {
            account.dynamic_predicted = (account.dynamic_predicted + climb).min(target);
        }

        let mut denom = account.dynamic_predicted.max(accepted);
        if denom <= 0.0 {
            return None;
        }

        // Late in the sentence, shrink back toward what was actually
        // accepted so the estimate cannot end short of 1.0.
        let raw = played as f64 / denom;
        if raw >= f64::from(settings.retract_after_fraction) && account.dynamic_predicted > accepted
        {
            account.dynamic_predicted =
                (account.dynamic_predicted - climb).max(accepted);
            denom = account.dynamic_predicted.max(accepted);
        }

        let mut fraction = (played as f64 / denom).clamp(0.0, 1.0) as f32;

        // Startup freeze against a jumpy first estimate.
        if let Some(first) = account.first_write_at {
            if (first.elapsed().as_millis() as u64) <= settings.freeze_ms {
                fraction = fraction.min(settings.freeze_max_fraction);
            }
        }

        // Monotone within the sentence.
        fraction = fraction.max(account.last_fraction);
        account.last_fraction = fraction;

        Some(SentenceProgress {
            index,
            played_samples: played,
            total_samples: denom as u64,
            fraction,
        })
    }
}
