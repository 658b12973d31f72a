use anyhow::Context;
use clap::{Parser, ValueEnum};
use newapi_types::UserChoice;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "new-api-desktop")]
#[command(version = BUILD_VERSION)]
#[command(about = "New API Desktop - Runs and supervises the local New API server")]
#[command(long_about = None)]
pub struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Launch the server from the source tree (development mode)")]
    pub dev: bool,

    #[arg(short, long, value_name = "PORT", help = "Port the server listens on")]
    pub port: Option<u16>,

    #[arg(short = 'd', long, value_name = "DIR", env = "NEWAPI_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Server executable to launch")]
    pub executable: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory crash logs are written to")]
    pub export_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "exit", help = "What to do when the server fails")]
    pub on_failure: FailureAction,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FailureAction {
    Exit,
    ViewLog,
}

impl From<FailureAction> for UserChoice {
    fn from(action: FailureAction) -> Self {
        match action {
            FailureAction::Exit => UserChoice::DismissAndExit,
            FailureAction::ViewLog => UserChoice::ViewFullLog,
        }
    }
}

fn filter_directive(cli: &Cli, logging: &LoggingConfig) -> String {
    if cli.quiet {
        return "warn".to_string();
    }
    match cli.verbose {
        0 => logging.level.to_string(),
        1 => "info,newapi_sidecar=debug,new_api_desktop=debug".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

pub fn init_logging(cli: &Cli, logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(cli, logging)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let log_file = cli.log_file.as_ref().or(logging.file.as_ref());
    if let Some(log_file) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false);
        subscriber.with(file_layer).init();
    } else {
        let stdout_layer = fmt::layer().with_target(cli.verbose >= 2 || logging.show_target);
        subscriber.with(stdout_layer).init();
    }

    Ok(())
}
