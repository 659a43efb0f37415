//! Fleet-level supervision: which accounts run, and for how long.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::fleet::FleetScheduler;
use crate::collector::{CollectionContext, CollectionSettings};
use crate::config::{AccountSource, FleetConfig};
use crate::credentials::SecretResolver;
use crate::delivery::DeliveryProducer;
use crate::provider::InventoryProvider;

/// Summary returned when the supervisor exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Accounts that got a scheduler.
    pub scheduled: usize,
    /// Accounts left out by the concurrency cap.
    pub ignored: usize,
    /// Cycles run across all accounts.
    pub cycles: u64,
}

/// The accounts to schedule: the first `concurrency` in configuration order.
pub fn plan_accounts(config: &FleetConfig) -> Vec<Arc<AccountSource>> {
    let cap = config.concurrency;
    if config.clouds.len() > cap {
        let ignored: Vec<i64> = config.clouds[cap..].iter().map(|a| a.id).collect();
        warn!(
            configured = config.clouds.len(),
            concurrency = cap,
            ignored = ?ignored,
            "More accounts than the concurrency cap allows, excess accounts are ignored"
        );
    }
    config
        .clouds
        .iter()
        .take(cap)
        .cloned()
        .map(Arc::new)
        .collect()
}

/// Starts and joins the per-account schedulers of one provider type.
pub struct CollectionSupervisor {
    task: Option<toml::Value>,
    provider: Arc<dyn InventoryProvider>,
    secrets: Arc<dyn SecretResolver>,
    producer: DeliveryProducer,
    cancellation_token: CancellationToken,
}

impl CollectionSupervisor {
    pub fn new(
        task: Option<toml::Value>,
        provider: Arc<dyn InventoryProvider>,
        secrets: Arc<dyn SecretResolver>,
        producer: DeliveryProducer,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            task,
            provider,
            secrets,
            producer,
            cancellation_token,
        }
    }

    /// Run every scheduler until cancellation, then wait for all of them.
    ///
    /// A missing or undecodable task, or an empty account list, makes this
    /// a no-op that returns immediately.
    pub async fn run(self) -> SupervisorReport {
        let Some(raw) = self.task else {
            info!("No fleet task configured, collection disabled");
            return SupervisorReport::default();
        };

        let config = match FleetConfig::decode(raw) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Fleet task rejected, collection disabled");
                return SupervisorReport::default();
            }
        };

        if config.clouds.is_empty() {
            info!("No accounts configured, nothing to schedule");
            return SupervisorReport::default();
        }

        let accounts = plan_accounts(&config);
        let context = CollectionContext::new(self.provider, self.secrets, self.producer)
            .with_settings(CollectionSettings {
                skipped_aliases: config.skipped_aliases.clone(),
                event_window: config.event_window,
            });

        let mut report = SupervisorReport {
            scheduled: accounts.len(),
            ignored: config.clouds.len() - accounts.len(),
            cycles: 0,
        };

        let mut schedulers = JoinSet::new();
        for account in accounts {
            let scheduler = FleetScheduler::new(
                account,
                context.clone(),
                self.cancellation_token.child_token(),
            );
            schedulers.spawn(scheduler.run());
        }
        drop(context);

        info!(
            scheduled = report.scheduled,
            ignored = report.ignored,
            "Collection supervisor started"
        );

        while let Some(result) = schedulers.join_next().await {
            match result {
                Ok(cycles) => report.cycles += cycles,
                Err(e) => error!(error = %e, "Account scheduler panicked"),
            }
        }

        info!(cycles = report.cycles, "Collection supervisor stopped");
        report
    }
}
