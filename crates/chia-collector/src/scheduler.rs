//! Periodic driver for the collection cycle.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::info;

use crate::cycle::CollectionCycle;

/// Runs a [`CollectionCycle`] to completion, then sleeps a fixed interval.
///
/// Cycles never overlap: the interval is measured from the end of one cycle
/// to the start of the next.
///
/// After every cycle, aborted or not, the `chia_exporter_*` self-metrics are
/// rewritten. A cycle that leaves the Chia metrics untouched still changes
/// these two, so they are outside the "nothing changed" and idempotence
/// guarantees of [`CollectionCycle::run`].
pub struct Scheduler {
    cycle: CollectionCycle,
    interval: Duration,
}

impl Scheduler {
    pub fn new(cycle: CollectionCycle, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    /// Loop until `shutdown` flips to `true` or its sender is dropped. A
    /// shutdown requested mid-cycle takes effect once that cycle finishes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "collection scheduler started");
        loop {
            let started = Instant::now();
            let outcome = self.cycle.run().await;
            self.cycle.record_outcome(&outcome, started.elapsed());

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("collection scheduler stopped");
    }
}
