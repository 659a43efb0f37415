//! Datastore space accounting behind the disk utilization metric.

use std::collections::HashMap;

use metric_units::unit_conversion;

use crate::provider::{DatastoreSummary, HostProperties};

/// Capacity and used space of one datastore, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSpace {
    pub capacity: i64,
    pub used: i64,
}

impl StoreSpace {
    pub fn utilization(&self) -> f64 {
        disk_utilization(self.capacity, self.used)
    }
}

/// Index datastore summaries by reference value.
pub fn store_space_map(summaries: &[DatastoreSummary]) -> HashMap<String, StoreSpace> {
    summaries
        .iter()
        .map(|s| {
            (
                s.reference.value.clone(),
                StoreSpace {
                    capacity: s.capacity,
                    used: s.used(),
                },
            )
        })
        .collect()
}

/// `used / capacity * 100` rounded to two decimals; `0` for an empty capacity.
pub fn disk_utilization(capacity: i64, used: i64) -> f64 {
    if capacity <= 0 {
        return 0.0;
    }
    unit_conversion(used as f64 / capacity as f64 * 100.0)
}

/// Utilization per host over every datastore it mounts.
///
/// Datastores missing from `stores` count as empty.
pub fn host_disk_utilization(
    hosts: &[HostProperties],
    stores: &HashMap<String, StoreSpace>,
) -> HashMap<String, f64> {
    hosts
        .iter()
        .map(|host| {
            let total = host
                .datastores
                .iter()
                .filter_map(|d| stores.get(&d.value))
                .fold(StoreSpace::default(), |acc, s| StoreSpace {
                    capacity: acc.capacity + s.capacity,
                    used: acc.used + s.used,
                });
            (host.reference.value.clone(), total.utilization())
        })
        .collect()
}

/// Utilization of each datastore on its own.
pub fn datastore_utilization(stores: &HashMap<String, StoreSpace>) -> HashMap<String, f64> {
    stores
        .iter()
        .map(|(id, space)| (id.clone(), space.utilization()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ManagedObjectRef, ManagedType};

    fn store(id: &str, capacity: i64, free_space: i64) -> DatastoreSummary {
        DatastoreSummary {
            reference: ManagedObjectRef::new(ManagedType::Datastore, id),
            capacity,
            free_space,
        }
    }

    fn host(id: &str, datastores: &[&str]) -> HostProperties {
        HostProperties {
            reference: ManagedObjectRef::new(ManagedType::HostSystem, id),
            memory_size_bytes: 0,
            datastores: datastores
                .iter()
                .map(|d| ManagedObjectRef::new(ManagedType::Datastore, *d))
                .collect(),
        }
    }

    #[test]
    fn test_host_utilization_sums_attached_stores() {
        // 200 capacity, 50 used across two stores.
        let stores = store_space_map(&[
            store("datastore-1", 120, 90),
            store("datastore-2", 80, 60),
            store("datastore-3", 1000, 0),
        ]);
        let hosts = [host("host-10", &["datastore-1", "datastore-2"])];

        let utilization = host_disk_utilization(&hosts, &stores);
        assert_eq!(utilization["host-10"], 25.0);
    }

    #[test]
    fn test_zero_capacity_is_zero() {
        assert_eq!(disk_utilization(0, 0), 0.0);
        assert_eq!(disk_utilization(0, 50), 0.0);

        let stores = store_space_map(&[]);
        let hosts = [host("host-11", &["datastore-9"])];
        assert_eq!(host_disk_utilization(&hosts, &stores)["host-11"], 0.0);
    }

    #[test]
    fn test_utilization_is_rounded() {
        assert_eq!(disk_utilization(3, 1), 33.33);
        assert_eq!(disk_utilization(3, 2), 66.67);
    }

    #[test]
    fn test_datastore_utilization() {
        let stores = store_space_map(&[store("datastore-1", 400, 100), store("datastore-2", 0, 0)]);
        let utilization = datastore_utilization(&stores);
        assert_eq!(utilization["datastore-1"], 75.0);
        assert_eq!(utilization["datastore-2"], 0.0);
    }
}
