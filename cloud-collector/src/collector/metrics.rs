//! Performance counter sampling for one sub-collection.

use std::collections::HashMap;

use metric_units::{convert_metric_value, transform_metric_alias, unit_conversion};
use tracing::{debug, error};

use super::envelope::{MetricDimension, MetricEnvelope, target_id};
use super::storage::{datastore_utilization, host_disk_utilization, store_space_map};
use crate::Result;
use crate::config::SubCollectionConfig;
use crate::inventory::{EntityKind, InventoryReference};
use crate::provider::{CounterValue, EntitySeries, ManagedObjectRef, PerfQuery, ProviderSession};

/// Alias of the derived disk utilization metric. Never sent to the performance query.
pub const DISK_USED_ALIAS: &str = "disk.used.average";

/// Derived host memory total, in GiB.
pub const MEM_TOTAL_METRIC: &str = "mem_totalmb_average";

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Inputs of one metric pass.
pub struct MetricScope<'a> {
    pub account_id: i64,
    pub kind: EntityKind,
    pub config: &'a SubCollectionConfig,
    pub references: &'a [InventoryReference],
    pub skipped_aliases: &'a [String],
    /// Shared cycle timestamp, seconds.
    pub timestamp: i64,
}

/// Host memory in GiB, rounded to two decimals.
pub fn memory_total_gb(bytes: i64) -> f64 {
    unit_conversion(bytes as f64 / BYTES_PER_GIB)
}

/// Aliases to request from the performance manager.
pub fn perf_aliases(config: &SubCollectionConfig, skipped: &[String]) -> Vec<String> {
    config
        .metrics
        .iter()
        .map(|m| m.alias.as_str())
        .filter(|alias| *alias != DISK_USED_ALIAS)
        .filter(|alias| !skipped.iter().any(|s| s == alias))
        .map(str::to_string)
        .collect()
}

/// Most recent sample of a comma separated series.
pub fn latest_sample(value_csv: &str) -> &str {
    value_csv.rsplit(',').next().unwrap_or_default().trim()
}

/// One reading per counter: the entity-wide aggregate if reported, otherwise
/// the last instance returned.
pub fn select_counter_values(values: &[CounterValue]) -> Vec<&CounterValue> {
    let mut chosen: Vec<&CounterValue> = Vec::new();
    for value in values {
        match chosen.iter_mut().find(|c| c.name == value.name) {
            Some(current) if current.instance.is_empty() => {}
            Some(current) => *current = value,
            None => chosen.push(value),
        }
    }
    chosen
}

/// Convert every counter of `series` to its canonical name and value.
pub fn normalize_series(series: &EntitySeries) -> HashMap<String, f64> {
    let mut metrics = HashMap::new();
    for value in select_counter_values(&series.values) {
        let name = transform_metric_alias(&value.name);
        if name.is_empty() {
            error!(entity = %series.entity, "Empty metric name, sample dropped");
            continue;
        }
        let converted = convert_metric_value(latest_sample(&value.value_csv), &value.unit_label);
        metrics.insert(name, converted);
    }
    metrics
}

/// Sample counters and derived metrics for every resolved entity.
///
/// Listing host properties and sampling are fatal to the pass; a datastore
/// summary failure only zeroes the disk utilization.
pub async fn collect_metrics(
    session: &dyn ProviderSession,
    scope: &MetricScope<'_>,
) -> Result<Vec<MetricEnvelope>> {
    let entities: Vec<ManagedObjectRef> =
        scope.references.iter().map(|r| r.object.clone()).collect();

    let hosts = if scope.kind == EntityKind::Host {
        session.host_properties(&entities).await?
    } else {
        Vec::new()
    };
    let memory: HashMap<&str, i64> = hosts
        .iter()
        .map(|h| (h.reference.value.as_str(), h.memory_size_bytes))
        .collect();

    let disk = if scope.config.has_alias(DISK_USED_ALIAS) {
        derive_disk_utilization(session, scope.kind, &hosts).await
    } else {
        None
    };

    let aliases = perf_aliases(scope.config, scope.skipped_aliases);
    let series = if aliases.is_empty() {
        entities
            .iter()
            .map(|entity| EntitySeries {
                entity: entity.clone(),
                values: Vec::new(),
            })
            .collect()
    } else {
        session
            .sample_counters(&PerfQuery::latest(entities, aliases))
            .await?
    };

    let disk_metric = transform_metric_alias(DISK_USED_ALIAS);
    let envelopes = series
        .iter()
        .map(|series| {
            let value = series.entity.value.as_str();
            let mut metrics = normalize_series(series);

            if let Some(bytes) = memory.get(value) {
                metrics.insert(MEM_TOTAL_METRIC.to_string(), memory_total_gb(*bytes));
            }
            if let Some(disk) = &disk {
                metrics.insert(disk_metric.clone(), disk.get(value).copied().unwrap_or(0.0));
            }

            MetricEnvelope {
                metrics,
                target: target_id(scope.account_id, value),
                dimension: MetricDimension {
                    cloud_id: scope.account_id,
                    instanceid: value.to_string(),
                    entity_type: scope.kind.as_str().to_string(),
                    device_name: String::new(),
                },
                timestamp: scope.timestamp,
            }
        })
        .collect();

    Ok(envelopes)
}

async fn derive_disk_utilization(
    session: &dyn ProviderSession,
    kind: EntityKind,
    hosts: &[crate::provider::HostProperties],
) -> Option<HashMap<String, f64>> {
    if !matches!(kind, EntityKind::Host | EntityKind::Storage) {
        debug!(kind = %kind, "Disk utilization is only derived for hosts and datastores");
        return None;
    }

    let stores = match session.datastore_summaries().await {
        Ok(summaries) => store_space_map(&summaries),
        Err(e) => {
            error!(error = %e, "Failed to fetch datastore summaries");
            HashMap::new()
        }
    };

    Some(match kind {
        EntityKind::Host => host_disk_utilization(hosts, &stores),
        _ => datastore_utilization(&stores),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricAlias;
    use crate::provider::ManagedType;

    fn counter(name: &str, instance: &str, csv: &str, unit: &str) -> CounterValue {
        CounterValue {
            name: name.into(),
            instance: instance.into(),
            value_csv: csv.into(),
            unit_label: unit.into(),
        }
    }

    fn sub_config(aliases: &[&str]) -> SubCollectionConfig {
        SubCollectionConfig {
            metric_namespace: String::new(),
            metric_data_id: 1,
            event_data_id: 2,
            instances: vec!["host-10".into()],
            metrics: aliases
                .iter()
                .map(|a| MetricAlias {
                    alias: a.to_string(),
                    metric: String::new(),
                })
                .collect(),
            period: None,
        }
    }

    #[test]
    fn test_memory_total() {
        assert_eq!(memory_total_gb(8_589_934_592), 8.0);
        assert_eq!(memory_total_gb(0), 0.0);
        assert_eq!(memory_total_gb(1_610_612_736), 1.5);
    }

    #[test]
    fn test_perf_aliases_skip_derived_and_configured() {
        let config = sub_config(&[
            "cpu.usage.average",
            "disk.used.average",
            "mem.totalCapacity.average",
            "mem.usage.average",
        ]);
        let skipped = vec!["mem.totalCapacity.average".to_string()];

        assert_eq!(
            perf_aliases(&config, &skipped),
            vec!["cpu.usage.average", "mem.usage.average"]
        );
        assert_eq!(perf_aliases(&config, &[]).len(), 3);
    }

    #[test]
    fn test_latest_sample() {
        assert_eq!(latest_sample("10,20,30"), "30");
        assert_eq!(latest_sample("42"), "42");
        assert_eq!(latest_sample(""), "");
    }

    #[test]
    fn test_aggregate_instance_preferred() {
        let values = vec![
            counter("net.usage.average", "vmnic0", "5", "KBps"),
            counter("net.usage.average", "", "12", "KBps"),
            counter("net.usage.average", "vmnic1", "7", "KBps"),
            counter("disk.read.average", "naa.1", "3", "KBps"),
            counter("disk.read.average", "naa.2", "4", "KBps"),
        ];

        let chosen = select_counter_values(&values);
        assert_eq!(chosen.len(), 2);
        assert_eq!(chosen[0].value_csv, "12");
        assert_eq!(chosen[1].instance, "naa.2");
    }

    #[test]
    fn test_normalize_series() {
        let series = EntitySeries {
            entity: ManagedObjectRef::new(ManagedType::HostSystem, "host-10"),
            values: vec![
                counter("cpu.usage.average", "", "10,42.5", "%"),
                counter("mem.consumed.average", "", "2097152", "KB"),
                counter("", "", "1", "%"),
            ],
        };

        let metrics = normalize_series(&series);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["cpu_usage_average"], 42.5);
        assert_eq!(metrics["mem_consumed_average"], 2.0);
    }
}
