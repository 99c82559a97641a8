//! Plate Gate Monitor - Main Entry Point

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use monitor::{init_logging, MonitorConfig};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "plate-monitor.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = MonitorConfig::load(&path).with_context(|| format!("loading {}", path))?;
    init_logging(&config.logging).context("initializing logging")?;

    info!("=== Plate Gate Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {} ({} cameras)", path, config.cameras.len());

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder unavailable: {}", e);
            None
        }
    };

    monitor::run(config, metrics).await.context("monitor stopped with an error")?;
    info!("Shutdown complete");
    Ok(())
}
