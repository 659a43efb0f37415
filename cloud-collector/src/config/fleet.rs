//! Fleet task configuration: the accounts to poll and how to poll them.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::inventory::EntityKind;
use crate::{Error, Result};

/// Default scheduling period when an account does not configure one.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Alias excluded from performance queries unless configured otherwise.
pub const DEFAULT_SKIPPED_ALIAS: &str = "mem.totalCapacity.average";

fn default_concurrency() -> usize {
    1
}

fn default_skipped_aliases() -> Vec<String> {
    vec![DEFAULT_SKIPPED_ALIAS.to_string()]
}

/// Orientation of the time window used for event queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventWindowMode {
    /// `[now - period, now]`.
    #[default]
    Trailing,
    /// `[now, now - period]`, the begin time after the end time.
    Inverted,
}

/// The complete task for one provider type.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Maximum number of accounts scheduled at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Accounts in configuration order.
    #[serde(default)]
    pub clouds: Vec<AccountSource>,
    /// Aliases never sent to the performance query.
    #[serde(default = "default_skipped_aliases")]
    pub skipped_aliases: Vec<String>,
    #[serde(default)]
    pub event_window: EventWindowMode,
}

impl FleetConfig {
    /// Decode a raw task table, as found under `[cloud_collect_task.vm_ware]`.
    pub fn decode(raw: toml::Value) -> Result<Self> {
        let config = raw
            .try_into::<FleetConfig>()
            .map_err(|e| Error::config(format!("unable to decode fleet task: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        for account in &self.clouds {
            for (kind, sub) in account.sub_collections() {
                if sub.metric_data_id < 0 || sub.event_data_id < 0 {
                    return Err(Error::config(format!(
                        "account {} {}: data ids must not be negative",
                        account.id, kind
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One configured tenant/endpoint.
#[derive(Clone, Deserialize)]
pub struct AccountSource {
    pub id: i64,
    /// Endpoint address (`host[:port]`).
    pub server: String,
    pub account: String,
    /// Stored credential, resolved through a [`SecretResolver`](crate::credentials::SecretResolver).
    pub password: String,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub cluster: Option<SubCollectionConfig>,
    #[serde(default)]
    pub host: Option<SubCollectionConfig>,
    #[serde(default)]
    pub storage: Option<SubCollectionConfig>,
    #[serde(default)]
    pub vm: Option<SubCollectionConfig>,
}

impl AccountSource {
    /// Scheduling period, falling back to [`DEFAULT_PERIOD`].
    pub fn period(&self) -> Duration {
        parse_period(self.period.as_deref())
    }

    /// Configured sub-collections paired with their entity kind.
    pub fn sub_collections(&self) -> Vec<(EntityKind, &SubCollectionConfig)> {
        [
            (EntityKind::Cluster, self.cluster.as_ref()),
            (EntityKind::Host, self.host.as_ref()),
            (EntityKind::Storage, self.storage.as_ref()),
            (EntityKind::VirtualMachine, self.vm.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, config)| config.map(|c| (kind, c)))
        .collect()
    }
}

impl fmt::Debug for AccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSource")
            .field("id", &self.id)
            .field("server", &self.server)
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .field("period", &self.period)
            .field("cluster", &self.cluster)
            .field("host", &self.host)
            .field("storage", &self.storage)
            .field("vm", &self.vm)
            .finish()
    }
}

/// Collection settings for one entity kind of an account.
#[derive(Debug, Clone, Deserialize)]
pub struct SubCollectionConfig {
    /// Informational namespace carried over from the agent configuration.
    #[serde(default)]
    pub metric_namespace: String,
    pub metric_data_id: i32,
    pub event_data_id: i32,
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricAlias>,
    /// Event look-back period; defaults to the account period.
    #[serde(default)]
    pub period: Option<String>,
}

impl SubCollectionConfig {
    pub fn has_alias(&self, alias: &str) -> bool {
        self.metrics.iter().any(|m| m.alias == alias)
    }
}

/// A counter alias and the metric it is reported as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricAlias {
    pub alias: String,
    #[serde(default)]
    pub metric: String,
}

/// Parse a period string such as `"5m"` or `"90s"`.
///
/// Missing, unparsable and zero periods fall back to [`DEFAULT_PERIOD`].
pub fn parse_period(raw: Option<&str>) -> Duration {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_PERIOD;
    };
    match humantime::parse_duration(raw) {
        Ok(period) if !period.is_zero() => period,
        Ok(_) => {
            warn!(period = %raw, "Zero period configured, using default");
            DEFAULT_PERIOD
        }
        Err(e) => {
            warn!(period = %raw, error = %e, "Unparsable period, using default");
            DEFAULT_PERIOD
        }
    }
}
