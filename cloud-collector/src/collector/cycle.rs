//! One collection pass over one account.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::envelope::encode_batch;
use super::events::{collect_events, event_window};
use super::metrics::{MetricScope, collect_metrics};
use crate::config::{
    AccountSource, DEFAULT_SKIPPED_ALIAS, EventWindowMode, SubCollectionConfig, parse_period,
};
use crate::credentials::SecretResolver;
use crate::delivery::{DeliveryMessage, DeliveryProducer, PayloadKind};
use crate::inventory::{EntityKind, InventoryReference, InventoryResolver};
use crate::provider::{Credentials, InventoryProvider, ProviderSession};
use crate::{Error, Result};

/// Fleet-wide collection options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSettings {
    pub skipped_aliases: Vec<String>,
    pub event_window: EventWindowMode,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            skipped_aliases: vec![DEFAULT_SKIPPED_ALIAS.to_string()],
            event_window: EventWindowMode::default(),
        }
    }
}

/// Everything a cycle needs besides its account.
#[derive(Clone)]
pub struct CollectionContext {
    provider: Arc<dyn InventoryProvider>,
    secrets: Arc<dyn SecretResolver>,
    resolver: Arc<InventoryResolver>,
    producer: DeliveryProducer,
    settings: Arc<CollectionSettings>,
}

impl CollectionContext {
    pub fn new(
        provider: Arc<dyn InventoryProvider>,
        secrets: Arc<dyn SecretResolver>,
        producer: DeliveryProducer,
    ) -> Self {
        Self {
            provider,
            secrets,
            resolver: Arc::new(InventoryResolver::default()),
            producer,
            settings: Arc::new(CollectionSettings::default()),
        }
    }

    pub fn with_settings(mut self, settings: CollectionSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }
}

/// Outcome of a finished cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Sub-collections that ran.
    pub sub_collections: usize,
    /// Messages accepted by the delivery queue.
    pub messages: usize,
}

/// A single sampling pass for one account.
pub struct CollectionCycle {
    account: Arc<AccountSource>,
    context: CollectionContext,
}

impl CollectionCycle {
    pub fn new(account: Arc<AccountSource>, context: CollectionContext) -> Self {
        Self { account, context }
    }

    /// Authenticate, then run every configured sub-collection concurrently.
    ///
    /// Fails only when no session can be established; sub-collection
    /// failures are logged and leave their siblings untouched.
    pub async fn run(&self) -> Result<CycleReport> {
        let account = &self.account;
        let started = Instant::now();

        let active: Vec<(EntityKind, &SubCollectionConfig)> = account
            .sub_collections()
            .into_iter()
            .filter(|(_, config)| !config.instances.is_empty())
            .collect();
        if active.is_empty() {
            debug!(account_id = account.id, "No instances configured, nothing to collect");
            return Ok(CycleReport::default());
        }

        let session = self.open_session().await?;

        // Sampled once; every envelope of this cycle carries it.
        let now = Utc::now();
        let mut tasks = JoinSet::new();
        for (kind, config) in active {
            let task = SubCollectionTask {
                account_id: account.id,
                kind,
                config: config.clone(),
                event_period: parse_period(config.period.as_deref().or(account.period.as_deref())),
                now,
                session: session.clone(),
                resolver: self.context.resolver.clone(),
                settings: self.context.settings.clone(),
                producer: self.context.producer.clone(),
            };
            tasks.spawn(task.run());
        }

        let mut report = CycleReport::default();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(messages) => {
                    report.sub_collections += 1;
                    report.messages += messages;
                }
                Err(e) => error!(account_id = account.id, error = %e, "Sub-collection task panicked"),
            }
        }

        session.logout().await;

        info!(
            account_id = account.id,
            sub_collections = report.sub_collections,
            messages = report.messages,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collection cycle finished"
        );
        Ok(report)
    }

    async fn open_session(&self) -> Result<Arc<dyn ProviderSession>> {
        let account = &self.account;
        let password = self.context.secrets.resolve(&account.password).map_err(|e| {
            Error::auth(
                &account.server,
                format!("stored credential could not be resolved: {}", e),
            )
        })?;
        let credentials = Credentials {
            account: account.account.clone(),
            password,
        };
        self.context
            .provider
            .authenticate(&account.server, &credentials)
            .await
    }
}

/// Metric and event collection for one entity kind of one account.
struct SubCollectionTask {
    account_id: i64,
    kind: EntityKind,
    config: SubCollectionConfig,
    event_period: Duration,
    now: DateTime<Utc>,
    session: Arc<dyn ProviderSession>,
    resolver: Arc<InventoryResolver>,
    settings: Arc<CollectionSettings>,
    producer: DeliveryProducer,
}

impl SubCollectionTask {
    /// Returns the number of messages enqueued.
    async fn run(self) -> usize {
        let references = self
            .resolver
            .resolve_kind(self.session.as_ref(), self.kind, &self.config.instances)
            .await;
        if references.is_empty() {
            warn!(account_id = self.account_id, kind = %self.kind, "No matching instances found, nothing to collect");
            return 0;
        }

        let (metrics, events) = tokio::join!(self.metrics(&references), self.events(&references));
        metrics + events
    }

    async fn metrics(&self, references: &[InventoryReference]) -> usize {
        let scope = MetricScope {
            account_id: self.account_id,
            kind: self.kind,
            config: &self.config,
            references,
            skipped_aliases: &self.settings.skipped_aliases,
            timestamp: self.now.timestamp(),
        };

        match collect_metrics(self.session.as_ref(), &scope).await {
            Ok(envelopes) if envelopes.is_empty() => {
                info!(account_id = self.account_id, kind = %self.kind, "No metric data");
                0
            }
            Ok(envelopes) => {
                self.deliver(self.config.metric_data_id, PayloadKind::Metrics, &envelopes)
                    .await
            }
            Err(e) => {
                error!(account_id = self.account_id, kind = %self.kind, error = %e, "Metric collection failed");
                0
            }
        }
    }

    async fn events(&self, references: &[InventoryReference]) -> usize {
        let window = event_window(self.settings.event_window, self.now, self.event_period);

        match collect_events(self.session.as_ref(), self.account_id, references, &window).await {
            Ok(records) if records.is_empty() => {
                info!(account_id = self.account_id, kind = %self.kind, "No event data");
                0
            }
            Ok(records) => {
                self.deliver(self.config.event_data_id, PayloadKind::Events, &records)
                    .await
            }
            Err(e) => {
                error!(account_id = self.account_id, kind = %self.kind, error = %e, "Event collection failed");
                0
            }
        }
    }

    async fn deliver<T: Serialize>(&self, data_id: i32, kind: PayloadKind, records: &[T]) -> usize {
        let payload = match encode_batch(records) {
            Ok(payload) => payload,
            Err(e) => {
                error!(account_id = self.account_id, kind = %self.kind, payload = %kind, error = %e, "Failed to serialize batch");
                return 0;
            }
        };

        let source = format!("{}/{}", self.account_id, self.kind);
        let message = DeliveryMessage::new(data_id, payload, kind, source);
        if self.producer.enqueue(message).await {
            debug!(account_id = self.account_id, data_id, payload = %kind, count = records.len(), "Batch enqueued");
            1
        } else {
            0
        }
    }
}
