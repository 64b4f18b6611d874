//! Beamline service daemon.
//!
//! ```bash
//! beamline-server --config config/beamline.toml --log-level debug
//! beamline-server --list-adapters
//! ```

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use beamline_server::config::{ServiceConfig, DEFAULT_CONFIG_PATH};
use beamline_server::logging::{self, LogSettings, OutputFormat};
use beamline_server::App;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "beamline-server")]
#[command(about = "Hardware adapter layer and operator/observer control service", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level, overriding the configuration (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format, overriding the configuration
    #[arg(long, value_enum)]
    log_format: Option<OutputFormat>,

    /// Print the adapter table and exit
    #[arg(long)]
    list_adapters: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::load_from(&cli.config)?;

    let log_settings = LogSettings::from_service_config(&config)
        .and_then(|s| s.with_overrides(cli.log_level.as_deref(), cli.log_format))
        .map_err(anyhow::Error::msg)?;
    logging::init(&log_settings).map_err(anyhow::Error::msg)?;

    info!(
        name = %config.application.name,
        beamline = %config.session.beamline_name,
        config = %cli.config.display(),
        "Starting beamline service"
    );

    let app = match App::build(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, source = ?e, "Startup failed");
            std::process::exit(1);
        }
    };

    if cli.list_adapters {
        print!("{}", app.adapter_table());
        return Ok(());
    }

    let event_log = app.spawn_event_log();
    info!(adapters = app.registry().len(), "Beamline service ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    event_log.abort();

    Ok(())
}
