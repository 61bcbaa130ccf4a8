//! Strategy manager
//!
//! Holds the backend selection policy and the latest network judgement, and
//! derives the backend a new sentence should be produced with.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use narrator_core::{DesiredMode, Strategy};

#[derive(Debug)]
pub struct StrategyManager {
    strategy: RwLock<Strategy>,
    network_good: AtomicBool,
}

impl StrategyManager {
    pub fn new(strategy: Strategy, network_good: bool) -> Self {
        Self {
            strategy: RwLock::new(strategy),
            network_good: AtomicBool::new(network_good),
        }
    }

    pub fn strategy(&self) -> Strategy {
        *self.strategy.read()
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        *self.strategy.write() = strategy;
        tracing::debug!(?strategy, "strategy changed");
    }

    pub fn network_good(&self) -> bool {
        self.network_good.load(Ordering::Acquire)
    }

    pub fn set_network_good(&self, good: bool) {
        self.network_good.store(good, Ordering::Release);
    }

    /// Backend the next sentence should be produced with.
    pub fn desired_mode(&self) -> DesiredMode {
        match self.strategy() {
            Strategy::OfflineOnly => DesiredMode::Offline,
            Strategy::OnlineOnly => DesiredMode::Online,
            Strategy::OnlinePreferred => {
                if self.network_good() {
                    DesiredMode::Online
                } else {
                    DesiredMode::Offline
                }
            }
        }
    }
}
