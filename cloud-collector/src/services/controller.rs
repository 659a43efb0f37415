//! Process-level orchestration of the delivery pipeline and the collectors.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::credentials::SecretResolver;
use crate::delivery::{DeliveryConfig, DeliveryPipeline, DeliveryStatsSnapshot};
use crate::provider::InventoryProvider;
use crate::scheduler::{CollectionSupervisor, SupervisorReport};
use crate::sink::TelemetrySink;
use crate::{Error, Result};

/// What the controller observed by the time everything stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub collection: SupervisorReport,
    pub delivery: DeliveryStatsSnapshot,
}

/// Owns the delivery pipeline and the collection supervisor for the
/// lifetime of the process.
pub struct ServiceController {
    delivery: DeliveryConfig,
    task: Option<toml::Value>,
    provider: Arc<dyn InventoryProvider>,
    secrets: Arc<dyn SecretResolver>,
    sink: Arc<dyn TelemetrySink>,
    cancellation_token: CancellationToken,
}

impl ServiceController {
    pub fn new(
        delivery: DeliveryConfig,
        task: Option<toml::Value>,
        provider: Arc<dyn InventoryProvider>,
        secrets: Arc<dyn SecretResolver>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            delivery,
            task,
            provider,
            secrets,
            sink,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<ShutdownReport> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then cancel everything and wait for it.
    ///
    /// Returns early with the error when the sink cannot be started.
    pub async fn run_until<F>(self, shutdown: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        let token = self.cancellation_token;
        let pipeline = DeliveryPipeline::new(self.delivery, token.child_token());
        let supervisor = CollectionSupervisor::new(
            self.task,
            self.provider,
            self.secrets,
            pipeline.producer(),
            token.child_token(),
        );

        let mut delivery = tokio::spawn(pipeline.run(self.sink));
        let collection = tokio::spawn(supervisor.run());
        info!("Services started");

        tokio::pin!(shutdown);
        let mut finished: Option<Result<DeliveryStatsSnapshot>> = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                result = &mut delivery, if finished.is_none() => {
                    match flatten(result) {
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "Delivery pipeline failed, shutting down");
                            token.cancel();
                            join_collection(collection).await;
                            return Err(e);
                        }
                        other => {
                            // Every producer is gone; collection has nothing left to run.
                            info!("Delivery pipeline finished before shutdown");
                            finished = Some(other);
                        }
                    }
                }
            }
        }

        token.cancel();
        let collection = join_collection(collection).await;
        let delivery = match finished {
            Some(result) => result?,
            None => flatten(delivery.await)?,
        };

        info!(
            cycles = collection.cycles,
            sent = delivery.sent,
            failed = delivery.failed,
            dropped = delivery.dropped,
            "Services stopped"
        );
        Ok(ShutdownReport {
            collection,
            delivery,
        })
    }
}

fn flatten<T>(result: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    result.map_err(|e| Error::Other(format!("task failed: {}", e)))?
}

async fn join_collection(handle: JoinHandle<SupervisorReport>) -> SupervisorReport {
    handle.await.unwrap_or_else(|e| {
        error!(error = %e, "Collection supervisor panicked");
        SupervisorReport::default()
    })
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
