use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};

use cloud_collector::config::AppConfig;
use cloud_collector::credentials::resolver_from_config;
use cloud_collector::logging::init_logging;
use cloud_collector::provider::{FixtureInventory, FixtureProvider, InventoryProvider};
use cloud_collector::services::ServiceController;
use cloud_collector::sink::{LogSink, TelemetrySink, UnixSocketSink};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the TOML configuration file
    #[arg(short, long, env = "CLOUD_COLLECTOR_CONFIG")]
    config: PathBuf,

    /// Log messages instead of sending them to the agent socket
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let (logging, _guard) = init_logging(&config.logger).context("Failed to initialize logging")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        log_dir = %logging.log_dir().display(),
        "cloud-collector starting"
    );

    let secrets =
        resolver_from_config(&config.credentials).context("Failed to set up credentials")?;
    let provider = build_provider(&config)?;
    let sink: Arc<dyn TelemetrySink> = if args.check {
        Arc::new(LogSink)
    } else {
        Arc::new(UnixSocketSink::new(config.socket.socket_path()))
    };

    let controller = ServiceController::new(
        config.socket.delivery_config(),
        config.cloud_collect_task.vm_ware.clone(),
        provider,
        secrets,
        sink,
    );
    logging.start_retention_cleanup(controller.cancellation_token().child_token());

    let report = controller.run().await?;
    info!(
        cycles = report.collection.cycles,
        sent = report.delivery.sent,
        "cloud-collector exited, bye"
    );
    Ok(())
}

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn InventoryProvider>> {
    match config.provider.kind.as_str() {
        "fixture" => {
            let provider = match &config.provider.fixture_path {
                Some(path) => FixtureProvider::from_json_file(path)
                    .with_context(|| format!("Failed to load fixture {}", path.display()))?,
                None => {
                    warn!("No fixture inventory configured, collecting from an empty inventory");
                    FixtureProvider::new(FixtureInventory::default())
                }
            };
            Ok(Arc::new(provider))
        }
        other => bail!("Unsupported provider kind: {}", other),
    }
}
