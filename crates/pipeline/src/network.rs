//! Network watcher
//!
//! Follows the connectivity monitor and turns a debounced bad→good edge
//! into an upgrade command. The watcher only detects; the command actor
//! decides whether an upgrade actually happens.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use narrator_core::NetworkMonitor;

use crate::actor::Command;
use crate::cooldown::Cooldown;
use crate::strategy::StrategyManager;

pub(crate) fn spawn_watcher(
    monitor: Arc<dyn NetworkMonitor>,
    strategy: Arc<StrategyManager>,
    cooldown: Arc<Cooldown>,
    commands: mpsc::UnboundedSender<Command>,
    stabilization_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = monitor.subscribe();
        let mut last = *rx.borrow();
        strategy.set_network_good(last);

        loop {
            if rx.changed().await.is_err() {
                return;
            }
            let good = *rx.borrow_and_update();
            strategy.set_network_good(good);

            if good && !last {
                tracing::debug!(stabilization_ms, "network recovered, waiting for it to settle");
                tokio::time::sleep(Duration::from_millis(stabilization_ms)).await;

                let settled = *rx.borrow_and_update();
                strategy.set_network_good(settled);
                if settled {
                    cooldown.reset();
                    tracing::info!("network recovery stable");
                    if commands.send(Command::NetworkRecovered).is_err() {
                        return;
                    }
                    last = true;
                } else {
                    tracing::debug!("network recovery flapped, abandoning");
                    last = false;
                }
            } else {
                last = good;
            }
        }
    })
}
