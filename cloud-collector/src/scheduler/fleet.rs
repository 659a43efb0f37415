//! Periodic collection for a single account.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collector::{CollectionContext, CollectionCycle};
use crate::config::AccountSource;

/// Lifecycle of a [`FleetScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, timer not started.
    Idle,
    /// Waiting for ticks or running a cycle.
    Running,
    /// Cancellation observed, the running cycle is finishing.
    Draining,
    /// Returned from [`FleetScheduler::run`].
    Stopped,
}

/// Runs one [`CollectionCycle`] per period for one account.
///
/// The first cycle runs one period after start. Cycles are awaited inline,
/// so ticks missed while a cycle is still running are skipped and cycles of
/// one account never overlap.
pub struct FleetScheduler {
    account: Arc<AccountSource>,
    cycle: CollectionCycle,
    period: Duration,
    state: watch::Sender<SchedulerState>,
    cancellation_token: CancellationToken,
}

impl FleetScheduler {
    pub fn new(
        account: Arc<AccountSource>,
        context: CollectionContext,
        cancellation_token: CancellationToken,
    ) -> Self {
        let period = account.period();
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            cycle: CollectionCycle::new(account.clone(), context),
            account,
            period,
            state,
            cancellation_token,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Tick until cancelled. Returns the number of cycles run.
    ///
    /// A cycle in flight when cancellation arrives is allowed to finish.
    pub async fn run(self) -> u64 {
        let account_id = self.account.id;
        self.state.send_replace(SchedulerState::Running);
        info!(
            account_id,
            server = %self.account.server,
            period = %humantime::format_duration(self.period),
            "Account scheduler started"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cycles = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cycle = self.cycle.run();
            tokio::pin!(cycle);
            let result = tokio::select! {
                biased;
                result = &mut cycle => result,
                _ = self.cancellation_token.cancelled() => {
                    self.state.send_replace(SchedulerState::Draining);
                    info!(account_id, "Cancellation received, waiting for the running cycle");
                    cycle.await
                }
            };

            match result {
                Ok(report) => debug!(
                    account_id,
                    sub_collections = report.sub_collections,
                    messages = report.messages,
                    "Cycle complete"
                ),
                Err(e) => error!(account_id, error = %e, "Collection cycle aborted"),
            }
            cycles += 1;
        }

        self.state.send_replace(SchedulerState::Draining);
        drop(ticker);
        info!(account_id, cycles, "Account scheduler stopped");
        self.state.send_replace(SchedulerState::Stopped);
        cycles
    }
}
