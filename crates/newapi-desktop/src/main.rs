mod app;
mod cli;
mod config;
mod notifier;

use app::AppContext;
use clap::Parser;
use cli::{init_logging, Cli};
use config::{default_config_path, DesktopConfig};
use notifier::ConsoleNotifier;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = DesktopConfig::load(&config_path)?;
    config.apply_cli(&cli);
    config.validate()?;

    init_logging(&cli, &config.logging)?;
    debug!("Using config {:?}", config_path);

    let notifier = Arc::new(ConsoleNotifier::new(cli.on_failure.into(), config.export_dir()));
    debug!("Crash logs go to {:?}", notifier.export_dir());

    let app = AppContext::new(config, notifier.clone())?;
    debug!("Server will listen on {}", app.supervisor().base_url());
    let reason = app.run().await;

    if let Some(path) = notifier.last_export() {
        info!("Crash log saved to {}", path.display());
    }

    if reason.is_failure() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
