//! Configuration: the process-level TOML file and the fleet task decoded from it.

mod app;
mod fleet;

pub use app::{
    AppConfig, CloudCollectTask, CredentialsConfig, DEFAULT_LOG_PATH, DEFAULT_LOG_RETENTION_DAYS,
    DEFAULT_SECRET_KEY_ENV, DEFAULT_SOCKET_PATH, LoggerConfig, ProviderConfig, SecretScheme,
    SocketConfig,
};
pub use fleet::{
    AccountSource, DEFAULT_PERIOD, DEFAULT_SKIPPED_ALIAS, EventWindowMode, FleetConfig,
    MetricAlias, SubCollectionConfig, parse_period,
};
