//! In-memory provider backed by a JSON inventory.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    CounterValue, Credentials, DatastoreSummary, EntitySeries, EventWindow, HostProperties,
    InventoryProvider, ManagedObjectRef, ManagedType, NamedRef, PerfQuery, ProviderSession,
    RawEvent,
};
use crate::{Error, Result};

/// Objects, samples and events served by a [`FixtureProvider`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureInventory {
    /// Accepted password; any password is accepted when unset.
    pub password: Option<String>,
    pub hosts: Vec<FixtureHost>,
    pub clusters: Vec<String>,
    pub vms: Vec<String>,
    pub datastores: Vec<FixtureDatastore>,
    pub samples: Vec<FixtureSample>,
    pub events: Vec<FixtureEvent>,
}

impl FixtureInventory {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::config(format!("invalid fixture inventory: {}", e)))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "cannot read fixture inventory {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureHost {
    pub id: String,
    #[serde(default)]
    pub memory_size_bytes: i64,
    #[serde(default)]
    pub datastores: Vec<String>,
}

impl FixtureHost {
    pub fn new(id: impl Into<String>, memory_size_bytes: i64) -> Self {
        Self {
            id: id.into(),
            memory_size_bytes,
            datastores: Vec::new(),
        }
    }

    pub fn with_datastores(mut self, datastores: &[&str]) -> Self {
        self.datastores = datastores.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDatastore {
    pub id: String,
    pub capacity: i64,
    pub free_space: i64,
}

/// One counter reading for one entity instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSample {
    pub entity: ManagedObjectRef,
    pub counter: String,
    #[serde(default)]
    pub instance: String,
    /// Comma separated values.
    pub values: String,
    pub unit: String,
}

/// An event attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEvent {
    pub entity: ManagedObjectRef,
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub user_name: String,
    /// Absolute creation time. When unset the event is `age_secs` older than
    /// the end of whichever window queries it.
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub age_secs: i64,
    #[serde(default)]
    pub vm: Option<NamedRef>,
    #[serde(default)]
    pub host: Option<NamedRef>,
    #[serde(default)]
    pub compute_resource: Option<NamedRef>,
    #[serde(default)]
    pub datacenter: Option<NamedRef>,
}

#[derive(Debug, Clone, Default)]
struct Failures {
    authentication: bool,
    listing: HashSet<ManagedType>,
    host_properties: bool,
    datastores: bool,
    sampling: HashSet<String>,
    events: HashSet<String>,
}

#[derive(Debug, Default)]
struct Recorder {
    authentications: AtomicUsize,
    endpoints: Mutex<Vec<String>>,
    perf_queries: Mutex<Vec<PerfQuery>>,
    event_windows: Mutex<Vec<EventWindow>>,
}

/// Provider serving a fixed [`FixtureInventory`].
///
/// Clones share the recorded calls, so a test can keep one clone and hand
/// the other to the collector.
#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    inventory: Arc<FixtureInventory>,
    failures: Arc<Failures>,
    recorder: Arc<Recorder>,
    login_latency: Duration,
}

impl FixtureProvider {
    pub fn new(inventory: FixtureInventory) -> Self {
        Self {
            inventory: Arc::new(inventory),
            failures: Arc::default(),
            recorder: Arc::default(),
            login_latency: Duration::ZERO,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Ok(Self::new(FixtureInventory::from_json_file(path)?))
    }

    /// Reject every login.
    pub fn fail_authentication(mut self) -> Self {
        Arc::make_mut(&mut self.failures).authentication = true;
        self
    }

    /// Fail listing objects of `kind`.
    pub fn fail_listing(mut self, kind: ManagedType) -> Self {
        Arc::make_mut(&mut self.failures).listing.insert(kind);
        self
    }

    /// Delay every login by `latency`.
    pub fn with_login_latency(mut self, latency: Duration) -> Self {
        self.login_latency = latency;
        self
    }

    pub fn fail_host_properties(mut self) -> Self {
        Arc::make_mut(&mut self.failures).host_properties = true;
        self
    }

    pub fn fail_datastores(mut self) -> Self {
        Arc::make_mut(&mut self.failures).datastores = true;
        self
    }

    /// Fail any performance query that includes the entity `value`.
    pub fn fail_sampling_for(mut self, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failures)
            .sampling
            .insert(value.into());
        self
    }

    /// Fail event queries for the entity `value`.
    pub fn fail_events_for(mut self, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failures).events.insert(value.into());
        self
    }

    /// Number of login attempts so far.
    pub fn authentications(&self) -> usize {
        self.recorder.authentications.load(Ordering::SeqCst)
    }

    /// Endpoints of every login attempt, in order.
    pub fn authenticated_endpoints(&self) -> Vec<String> {
        self.recorder.endpoints.lock().clone()
    }

    pub fn perf_queries(&self) -> Vec<PerfQuery> {
        self.recorder.perf_queries.lock().clone()
    }

    pub fn event_windows(&self) -> Vec<EventWindow> {
        self.recorder.event_windows.lock().clone()
    }
}

#[async_trait]
impl InventoryProvider for FixtureProvider {
    async fn authenticate(
        &self,
        endpoint: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ProviderSession>> {
        self.recorder.authentications.fetch_add(1, Ordering::SeqCst);
        self.recorder.endpoints.lock().push(endpoint.to_string());

        if !self.login_latency.is_zero() {
            tokio::time::sleep(self.login_latency).await;
        }
        if self.failures.authentication {
            return Err(Error::auth(endpoint, "login rejected"));
        }
        if let Some(expected) = &self.inventory.password
            && expected != &credentials.password
        {
            return Err(Error::auth(endpoint, "incorrect user name or password"));
        }

        debug!(endpoint = %endpoint, account = %credentials.account, "Fixture session opened");
        Ok(Arc::new(FixtureSession {
            provider: self.clone(),
        }))
    }
}

struct FixtureSession {
    provider: FixtureProvider,
}

impl FixtureSession {
    fn inventory(&self) -> &FixtureInventory {
        &self.provider.inventory
    }

    fn failures(&self) -> &Failures {
        &self.provider.failures
    }
}

#[async_trait]
impl ProviderSession for FixtureSession {
    async fn list_references(&self, kind: ManagedType) -> Result<Vec<ManagedObjectRef>> {
        if self.failures().listing.contains(&kind) {
            return Err(Error::query("list_references", format!("{} view failed", kind)));
        }

        let inventory = self.inventory();
        let values: Vec<&str> = match kind {
            ManagedType::HostSystem => inventory.hosts.iter().map(|h| h.id.as_str()).collect(),
            ManagedType::ClusterComputeResource => {
                inventory.clusters.iter().map(String::as_str).collect()
            }
            ManagedType::VirtualMachine => inventory.vms.iter().map(String::as_str).collect(),
            ManagedType::Datastore => inventory
                .datastores
                .iter()
                .map(|d| d.id.as_str())
                .collect(),
            ManagedType::Datacenter => Vec::new(),
        };

        Ok(values
            .into_iter()
            .map(|value| ManagedObjectRef::new(kind, value))
            .collect())
    }

    async fn host_properties(&self, hosts: &[ManagedObjectRef]) -> Result<Vec<HostProperties>> {
        if self.failures().host_properties {
            return Err(Error::query("host_properties", "property collector failed"));
        }

        let by_id: HashMap<&str, &FixtureHost> = self
            .inventory()
            .hosts
            .iter()
            .map(|h| (h.id.as_str(), h))
            .collect();

        Ok(hosts
            .iter()
            .filter_map(|reference| by_id.get(reference.value.as_str()))
            .map(|host| HostProperties {
                reference: ManagedObjectRef::new(ManagedType::HostSystem, &host.id),
                memory_size_bytes: host.memory_size_bytes,
                datastores: host
                    .datastores
                    .iter()
                    .map(|d| ManagedObjectRef::new(ManagedType::Datastore, d))
                    .collect(),
            })
            .collect())
    }

    async fn datastore_summaries(&self) -> Result<Vec<DatastoreSummary>> {
        if self.failures().datastores {
            return Err(Error::query("datastore_summaries", "datastore view failed"));
        }

        Ok(self
            .inventory()
            .datastores
            .iter()
            .map(|d| DatastoreSummary {
                reference: ManagedObjectRef::new(ManagedType::Datastore, &d.id),
                capacity: d.capacity,
                free_space: d.free_space,
            })
            .collect())
    }

    async fn sample_counters(&self, query: &PerfQuery) -> Result<Vec<EntitySeries>> {
        self.provider
            .recorder
            .perf_queries
            .lock()
            .push(query.clone());

        if let Some(entity) = query
            .entities
            .iter()
            .find(|e| self.failures().sampling.contains(&e.value))
        {
            return Err(Error::query(
                "sample_counters",
                format!("sampling failed for {}", entity),
            ));
        }

        let series = query
            .entities
            .iter()
            .map(|entity| EntitySeries {
                entity: entity.clone(),
                values: self
                    .inventory()
                    .samples
                    .iter()
                    .filter(|s| &s.entity == entity && query.aliases.contains(&s.counter))
                    .map(|s| CounterValue {
                        name: s.counter.clone(),
                        instance: s.instance.clone(),
                        value_csv: s.values.clone(),
                        unit_label: s.unit.clone(),
                    })
                    .collect(),
            })
            .filter(|series| !series.values.is_empty())
            .collect();

        Ok(series)
    }

    async fn query_events(
        &self,
        entity: &ManagedObjectRef,
        window: &EventWindow,
    ) -> Result<Vec<RawEvent>> {
        self.provider.recorder.event_windows.lock().push(*window);

        if self.failures().events.contains(&entity.value) {
            return Err(Error::query(
                "query_events",
                format!("event query failed for {}", entity),
            ));
        }

        Ok(self
            .inventory()
            .events
            .iter()
            .filter(|e| &e.entity == entity)
            .filter_map(|e| {
                let created_time = e.created_time.unwrap_or_else(|| {
                    window
                        .end
                        .checked_sub_signed(chrono::Duration::seconds(e.age_secs))
                        .unwrap_or(window.end)
                });
                window.contains(created_time).then(|| RawEvent {
                    event_type: e.event_type.clone(),
                    full_formatted_message: e.message.clone(),
                    user_name: e.user_name.clone(),
                    created_time,
                    vm: e.vm.clone(),
                    host: e.host.clone(),
                    compute_resource: e.compute_resource.clone(),
                    datacenter: e.datacenter.clone(),
                })
            })
            .collect())
    }
}
