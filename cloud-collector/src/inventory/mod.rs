//! Inventory resolution.
//!
//! Maps configured instance identifiers of one entity kind to the provider's
//! object references. Each kind is listed by its own [`EntityLister`], picked
//! from a table keyed on the configuration name (`cluster`, `host`, `vm`,
//! `storage`).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::Result;
use crate::provider::{ManagedObjectRef, ManagedType, ProviderSession};

/// Entity kinds a sub-collection can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Cluster,
    Host,
    Storage,
    VirtualMachine,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Cluster,
        EntityKind::Host,
        EntityKind::Storage,
        EntityKind::VirtualMachine,
    ];

    /// Configuration name, also reported as the envelope `type` dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Host => "host",
            Self::Storage => "storage",
            Self::VirtualMachine => "vm",
        }
    }

    pub fn managed_type(&self) -> ManagedType {
        match self {
            Self::Cluster => ManagedType::ClusterComputeResource,
            Self::Host => ManagedType::HostSystem,
            Self::Storage => ManagedType::Datastore,
            Self::VirtualMachine => ManagedType::VirtualMachine,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved provider object of a requested kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryReference {
    pub kind: EntityKind,
    pub object: ManagedObjectRef,
}

impl InventoryReference {
    /// Provider identifier, e.g. `host-10`.
    pub fn value(&self) -> &str {
        &self.object.value
    }
}

/// Lists every object of one entity kind.
#[async_trait]
pub trait EntityLister: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn list_objects(&self, session: &dyn ProviderSession) -> Result<Vec<ManagedObjectRef>>;
}

pub struct HostLister;

#[async_trait]
impl EntityLister for HostLister {
    fn kind(&self) -> EntityKind {
        EntityKind::Host
    }

    async fn list_objects(&self, session: &dyn ProviderSession) -> Result<Vec<ManagedObjectRef>> {
        session.list_references(ManagedType::HostSystem).await
    }
}

pub struct ClusterLister;

#[async_trait]
impl EntityLister for ClusterLister {
    fn kind(&self) -> EntityKind {
        EntityKind::Cluster
    }

    async fn list_objects(&self, session: &dyn ProviderSession) -> Result<Vec<ManagedObjectRef>> {
        session
            .list_references(ManagedType::ClusterComputeResource)
            .await
    }
}

pub struct VirtualMachineLister;

#[async_trait]
impl EntityLister for VirtualMachineLister {
    fn kind(&self) -> EntityKind {
        EntityKind::VirtualMachine
    }

    async fn list_objects(&self, session: &dyn ProviderSession) -> Result<Vec<ManagedObjectRef>> {
        session.list_references(ManagedType::VirtualMachine).await
    }
}

pub struct DatastoreLister;

#[async_trait]
impl EntityLister for DatastoreLister {
    fn kind(&self) -> EntityKind {
        EntityKind::Storage
    }

    async fn list_objects(&self, session: &dyn ProviderSession) -> Result<Vec<ManagedObjectRef>> {
        session.list_references(ManagedType::Datastore).await
    }
}

/// Resolves configured identifiers to provider references.
pub struct InventoryResolver {
    listers: HashMap<&'static str, Arc<dyn EntityLister>>,
}

impl Default for InventoryResolver {
    fn default() -> Self {
        Self::empty()
            .with_lister(Arc::new(ClusterLister))
            .with_lister(Arc::new(HostLister))
            .with_lister(Arc::new(VirtualMachineLister))
            .with_lister(Arc::new(DatastoreLister))
    }
}

impl InventoryResolver {
    /// A resolver with no listers registered.
    pub fn empty() -> Self {
        Self {
            listers: HashMap::new(),
        }
    }

    /// Register `lister` under its kind's configuration name.
    pub fn with_lister(mut self, lister: Arc<dyn EntityLister>) -> Self {
        self.listers.insert(lister.kind().as_str(), lister);
        self
    }

    /// Resolve `instances` of the kind named `kind`.
    ///
    /// Returns only references whose identifier is in `instances`, in provider
    /// order. Unknown kinds and provider failures yield an empty list.
    pub async fn resolve(
        &self,
        session: &dyn ProviderSession,
        kind: &str,
        instances: &[String],
    ) -> Vec<InventoryReference> {
        let Some(lister) = self.listers.get(kind) else {
            warn!(kind = %kind, "Unsupported entity kind");
            return Vec::new();
        };

        if instances.is_empty() {
            return Vec::new();
        }

        let objects = match lister.list_objects(session).await {
            Ok(objects) => objects,
            Err(e) => {
                error!(kind = %kind, error = %e, "Failed to list inventory");
                return Vec::new();
            }
        };

        let requested: HashSet<&str> = instances.iter().map(String::as_str).collect();
        let entity_kind = lister.kind();
        let expected_type = entity_kind.managed_type();

        let resolved: Vec<InventoryReference> = objects
            .into_iter()
            .filter(|object| object.kind == expected_type)
            .filter(|object| requested.contains(object.value.as_str()))
            .map(|object| InventoryReference {
                kind: entity_kind,
                object,
            })
            .collect();

        debug!(
            kind = %kind,
            requested = instances.len(),
            resolved = resolved.len(),
            "Resolved inventory references"
        );
        resolved
    }

    pub async fn resolve_kind(
        &self,
        session: &dyn ProviderSession,
        kind: EntityKind,
        instances: &[String],
    ) -> Vec<InventoryReference> {
        self.resolve(session, kind.as_str(), instances).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        Credentials, FixtureHost, FixtureInventory, FixtureProvider, InventoryProvider,
    };

    fn inventory() -> FixtureInventory {
        FixtureInventory {
            hosts: vec![
                FixtureHost::new("host-10", 8 * 1024 * 1024 * 1024),
                FixtureHost::new("host-11", 4 * 1024 * 1024 * 1024),
                FixtureHost::new("host-12", 4 * 1024 * 1024 * 1024),
            ],
            clusters: vec!["domain-c7".into()],
            vms: vec!["vm-42".into(), "vm-43".into()],
            ..Default::default()
        }
    }

    async fn session(provider: &FixtureProvider) -> Arc<dyn ProviderSession> {
        let credentials = Credentials {
            account: "monitor".into(),
            password: "secret".into(),
        };
        provider.authenticate("vc01", &credentials).await.unwrap()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn values(refs: &[InventoryReference]) -> Vec<&str> {
        refs.iter().map(|r| r.value()).collect()
    }

    #[tokio::test]
    async fn test_resolve_filters_to_requested() {
        let provider = FixtureProvider::new(inventory());
        let session = session(&provider).await;
        let resolver = InventoryResolver::default();

        let refs = resolver
            .resolve(session.as_ref(), "host", &ids(&["host-11", "host-10", "host-99"]))
            .await;

        assert_eq!(values(&refs), vec!["host-10", "host-11"]);
        assert!(refs.iter().all(|r| r.kind == EntityKind::Host));
        assert!(
            refs.iter()
                .all(|r| r.object.kind == ManagedType::HostSystem)
        );
    }

    #[tokio::test]
    async fn test_resolve_each_kind() {
        let provider = FixtureProvider::new(inventory());
        let session = session(&provider).await;
        let resolver = InventoryResolver::default();

        let vms = resolver
            .resolve_kind(session.as_ref(), EntityKind::VirtualMachine, &ids(&["vm-43"]))
            .await;
        assert_eq!(values(&vms), vec!["vm-43"]);

        let clusters = resolver
            .resolve(session.as_ref(), "cluster", &ids(&["domain-c7"]))
            .await;
        assert_eq!(values(&clusters), vec!["domain-c7"]);

        // Identifiers of another kind never leak across.
        let hosts = resolver
            .resolve(session.as_ref(), "host", &ids(&["vm-42"]))
            .await;
        assert!(hosts.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let provider = FixtureProvider::new(inventory());
        let session = session(&provider).await;
        let resolver = InventoryResolver::default();
        let requested = ids(&["host-10", "host-12"]);

        let first = resolver.resolve(session.as_ref(), "host", &requested).await;
        let second = resolver.resolve(session.as_ref(), "host", &requested).await;

        let first: HashSet<_> = first.into_iter().collect();
        let second: HashSet<_> = second.into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_empty() {
        let provider = FixtureProvider::new(inventory());
        let session = session(&provider).await;
        let resolver = InventoryResolver::default();

        let refs = resolver
            .resolve(session.as_ref(), "network", &ids(&["network-1"]))
            .await;
        assert!(refs.is_empty());

        let refs = InventoryResolver::empty()
            .resolve(session.as_ref(), "host", &ids(&["host-10"]))
            .await;
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_is_empty() {
        let provider =
            FixtureProvider::new(inventory()).fail_listing(ManagedType::HostSystem);
        let session = session(&provider).await;
        let resolver = InventoryResolver::default();

        let refs = resolver
            .resolve(session.as_ref(), "host", &ids(&["host-10"]))
            .await;
        assert!(refs.is_empty());
    }

    #[test]
    fn test_entity_kind_names() {
        let names: Vec<_> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["cluster", "host", "storage", "vm"]);
        assert_eq!(EntityKind::Storage.managed_type(), ManagedType::Datastore);
    }
}
