//! Cooldown controller
//!
//! Exponential backoff gate for online synthesis attempts. Failures double
//! the wait (capped exponent, capped ceiling); one success or a stable
//! network recovery clears it.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use narrator_config::CooldownSettings;

#[derive(Debug, Default)]
struct CooldownState {
    failures: u32,
    until: Option<Instant>,
}

#[derive(Debug)]
pub struct Cooldown {
    settings: CooldownSettings,
    state: Mutex<CooldownState>,
}

impl Cooldown {
    pub fn new(settings: CooldownSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(CooldownState::default()),
        }
    }

    /// Clear all backoff state.
    pub fn on_success(&self) {
        let mut state = self.state.lock();
        state.failures = 0;
        state.until = None;
    }

    /// Alias used by the network watcher on a recovery edge.
    pub fn reset(&self) {
        self.on_success();
    }

    /// Record an online failure and extend the backoff window.
    pub fn on_failure(&self) {
        let mut state = self.state.lock();
        state.failures += 1;
        let delay = self.delay_for(state.failures);
        state.until = Some(Instant::now() + delay);
        tracing::debug!(
            failures = state.failures,
            delay_ms = delay.as_millis() as u64,
            "online cooldown extended"
        );
    }

    /// Whether an online attempt is currently allowed.
    pub fn allow_network_now(&self) -> bool {
        match self.state.lock().until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failures
    }

    /// Backoff for the i-th consecutive failure (1-based).
    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(self.settings.exponent_cap);
        let delay = self.settings.base_secs.saturating_mul(1u64 << exponent);
        Duration::from_secs(delay.min(self.settings.max_secs))
    }
}
