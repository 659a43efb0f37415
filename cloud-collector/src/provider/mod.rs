//! Inventory, performance and event provider.
//!
//! The collector talks to the management endpoint only through
//! [`InventoryProvider`] and the [`ProviderSession`] it hands out. A session
//! belongs to a single collection cycle and is dropped when the cycle ends.
//!
//! [`FixtureProvider`] is an in-memory implementation backed by a JSON inventory.

mod fixture;

pub use fixture::{
    FixtureDatastore, FixtureEvent, FixtureHost, FixtureInventory, FixtureProvider, FixtureSample,
};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Sampling interval id requested from the performance manager (real-time, 20s).
pub const SAMPLE_INTERVAL_ID: i32 = 20;

/// Counter instance matching every device.
pub const WILDCARD_INSTANCE: &str = "*";

/// Provider-side object types the collector lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagedType {
    HostSystem,
    ClusterComputeResource,
    VirtualMachine,
    Datastore,
    Datacenter,
}

impl ManagedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HostSystem => "HostSystem",
            Self::ClusterComputeResource => "ClusterComputeResource",
            Self::VirtualMachine => "VirtualMachine",
            Self::Datastore => "Datastore",
            Self::Datacenter => "Datacenter",
        }
    }
}

impl fmt::Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one managed object, e.g. `HostSystem:host-10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub kind: ManagedType,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: ManagedType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// A reference plus the object's display name, as attached to events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub reference: ManagedObjectRef,
    pub name: String,
}

/// Login details for one account.
#[derive(Clone)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hardware summary of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProperties {
    pub reference: ManagedObjectRef,
    pub memory_size_bytes: i64,
    /// Datastores mounted on the host.
    pub datastores: Vec<ManagedObjectRef>,
}

/// Capacity summary of one datastore, in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreSummary {
    pub reference: ManagedObjectRef,
    pub capacity: i64,
    pub free_space: i64,
}

impl DatastoreSummary {
    pub fn used(&self) -> i64 {
        self.capacity - self.free_space
    }
}

/// Performance query for the most recent sample of a set of counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfQuery {
    pub entities: Vec<ManagedObjectRef>,
    /// Counter names such as `cpu.usage.average`.
    pub aliases: Vec<String>,
    pub interval_id: i32,
    pub max_sample: i32,
    pub instance: String,
}

impl PerfQuery {
    /// Single most recent sample across every instance of each counter.
    pub fn latest(entities: Vec<ManagedObjectRef>, aliases: Vec<String>) -> Self {
        Self {
            entities,
            aliases,
            interval_id: SAMPLE_INTERVAL_ID,
            max_sample: 1,
            instance: WILDCARD_INSTANCE.to_string(),
        }
    }
}

/// One counter reading for one instance of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterValue {
    /// Counter name, e.g. `cpu.usage.average`.
    pub name: String,
    /// Device instance; empty for the entity-wide aggregate.
    pub instance: String,
    /// Comma separated samples, oldest first.
    pub value_csv: String,
    /// Unit label from the counter info, e.g. `KB` or `%`.
    pub unit_label: String,
}

/// All counter readings returned for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySeries {
    pub entity: ManagedObjectRef,
    pub values: Vec<CounterValue>,
}

/// Time range of an event query.
///
/// The provider receives the bounds as given; an inverted window has its
/// begin after its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventWindow {
    /// `[now - period, now]`.
    pub fn trailing(now: DateTime<Utc>, period: Duration) -> Self {
        Self {
            begin: period_before(now, period),
            end: now,
        }
    }

    /// `[now, now - period]`.
    pub fn inverted(now: DateTime<Utc>, period: Duration) -> Self {
        Self {
            begin: now,
            end: period_before(now, period),
        }
    }

    /// Whether `at` falls inside `[begin, end]`. Always false when inverted.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.begin <= at && at <= self.end
    }
}

fn period_before(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// An event as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Event class name, e.g. `VmPoweredOnEvent`.
    pub event_type: String,
    pub full_formatted_message: String,
    pub user_name: String,
    pub created_time: DateTime<Utc>,
    pub vm: Option<NamedRef>,
    pub host: Option<NamedRef>,
    pub compute_resource: Option<NamedRef>,
    pub datacenter: Option<NamedRef>,
}

/// Factory of authenticated sessions.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Log in to `endpoint`. Failures are [`Error::Auth`](crate::Error::Auth).
    async fn authenticate(
        &self,
        endpoint: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ProviderSession>>;
}

/// An authenticated connection to one endpoint.
///
/// Every call may fail with [`Error::Query`](crate::Error::Query).
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// All objects of `kind`, searched recursively from the root folder.
    async fn list_references(&self, kind: ManagedType) -> Result<Vec<ManagedObjectRef>>;

    async fn host_properties(&self, hosts: &[ManagedObjectRef]) -> Result<Vec<HostProperties>>;

    async fn datastore_summaries(&self) -> Result<Vec<DatastoreSummary>>;

    async fn sample_counters(&self, query: &PerfQuery) -> Result<Vec<EntitySeries>>;

    /// Events of `entity` and its children inside `window`.
    async fn query_events(
        &self,
        entity: &ManagedObjectRef,
        window: &EventWindow,
    ) -> Result<Vec<RawEvent>>;

    /// End the session. Errors are ignored.
    async fn logout(&self) {}
}
