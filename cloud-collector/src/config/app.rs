//! Process configuration loaded from the TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::delivery::DeliveryConfig;
use crate::{Error, Result};

/// Default log file.
pub const DEFAULT_LOG_PATH: &str = "/var/log/gse/cloud_collection.log";

/// Default IPC socket of the telemetry agent.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/gse/ipc.state.report";

/// Default number of days rolled log files are kept.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// Environment variable holding the credential key unless configured otherwise.
pub const DEFAULT_SECRET_KEY_ENV: &str = "CLOUD_COLLECTOR_SECRET_KEY";

fn default_retention_days() -> u32 {
    DEFAULT_LOG_RETENTION_DAYS
}

fn default_key_env() -> String {
    DEFAULT_SECRET_KEY_ENV.to_string()
}

fn default_provider_kind() -> String {
    "fixture".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cloud_collect_task: CloudCollectTask,
}

impl AppConfig {
    /// Load the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }
}

/// `[logger]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    /// One of `ERROR`, `WARN`, `INFO`, `DEBUG`.
    #[serde(default)]
    pub level: Option<String>,
    /// Log file path; the directory is created when missing.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: None,
            path: None,
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl LoggerConfig {
    /// Tracing level name for the configured level, `info` when unset or unknown.
    pub fn level_name(&self) -> &'static str {
        match self.level.as_deref().map(str::trim) {
            Some("ERROR") => "error",
            Some("WARN") => "warn",
            Some("INFO") | None => "info",
            Some("DEBUG") => "debug",
            Some(other) => {
                warn!(level = %other, "Unknown log level, using INFO");
                "info"
            }
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
    }
}

/// `[socket]` section: agent socket and delivery pipeline sizing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketConfig {
    #[serde(default)]
    pub socket_path: Option<String>,
    /// Queue capacity; `0` selects the default.
    #[serde(default)]
    pub queue_buffer: usize,
    /// Delivery worker count; `0` selects the default.
    #[serde(default)]
    pub worker: usize,
}

impl SocketConfig {
    pub fn socket_path(&self) -> &str {
        match self.socket_path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => {
                warn!(path = DEFAULT_SOCKET_PATH, "Using default socket path");
                DEFAULT_SOCKET_PATH
            }
        }
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig::default()
            .with_queue_capacity(self.queue_buffer)
            .with_workers(self.worker)
    }
}

/// How stored account credentials are turned into passwords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretScheme {
    /// Credentials are stored verbatim.
    #[default]
    Plain,
    /// Credentials are AES-256-GCM encrypted with a key read from the environment.
    AesGcm,
}

/// `[credentials]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub scheme: SecretScheme,
    /// Name of the environment variable holding the base64 key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            scheme: SecretScheme::default(),
            key_env: default_key_env(),
        }
    }
}

/// `[provider]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            fixture_path: None,
        }
    }
}

/// `[cloud_collect_task]` section: raw per-provider tasks.
///
/// Tasks stay undecoded here; the supervisor decodes them so a malformed task
/// disables collection without stopping the process.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudCollectTask {
    #[serde(default)]
    pub vm_ware: Option<toml::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetConfig;
    use std::io::Write;

    const CONFIG: &str = r#"
        [logger]
        level = "DEBUG"
        path = "/tmp/cloud-collector/cloud_collection.log"

        [socket]
        socket_path = "/tmp/agent.sock"
        queue_buffer = 64
        worker = 2

        [credentials]
        scheme = "aes-gcm"
        key_env = "MY_KEY"

        [provider]
        kind = "fixture"
        fixture_path = "inventory.json"

        [cloud_collect_task.vm_ware]
        concurrency = 1

        [[cloud_collect_task.vm_ware.clouds]]
        id = 1
        server = "vc01"
        account = "a"
        password = "p"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.logger.level_name(), "debug");
        assert_eq!(config.logger.retention_days, DEFAULT_LOG_RETENTION_DAYS);
        assert_eq!(config.socket.socket_path(), "/tmp/agent.sock");
        assert_eq!(config.credentials.scheme, SecretScheme::AesGcm);
        assert_eq!(config.credentials.key_env, "MY_KEY");
        assert_eq!(
            config.provider.fixture_path.as_deref(),
            Some(Path::new("inventory.json"))
        );

        let delivery = config.socket.delivery_config();
        assert_eq!(delivery.queue_capacity, 64);
        assert_eq!(delivery.workers, 2);

        let raw = config.cloud_collect_task.vm_ware.unwrap();
        let fleet = FleetConfig::decode(raw).unwrap();
        assert_eq!(fleet.clouds.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.logger.level_name(), "info");
        assert_eq!(config.logger.log_path(), PathBuf::from(DEFAULT_LOG_PATH));
        assert_eq!(config.socket.socket_path(), DEFAULT_SOCKET_PATH);
        assert_eq!(config.credentials.scheme, SecretScheme::Plain);
        assert_eq!(config.credentials.key_env, DEFAULT_SECRET_KEY_ENV);
        assert_eq!(config.provider.kind, "fixture");
        assert!(config.cloud_collect_task.vm_ware.is_none());

        let delivery = config.socket.delivery_config();
        assert_eq!(delivery, DeliveryConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.socket.worker, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/cloud-collector.toml")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let logger = LoggerConfig {
            level: Some("TRACE-ALL".to_string()),
            ..Default::default()
        };
        assert_eq!(logger.level_name(), "info");
    }
}
