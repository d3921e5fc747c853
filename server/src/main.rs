//! Standalone withdraw server binary. Run with --config and --port, or use defaults.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{prelude::*, EnvFilter};
use withdraw_core::config::{self, Config};

fn main() -> anyhow::Result<()> {
    init_logging();

    let mut config_path = PathBuf::from(config::DEFAULT_SETTINGS_FILE);
    let mut port: Option<u16> = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            config_path = PathBuf::from(&args[i + 1]);
            i += 2;
            continue;
        }
        if args[i] == "--port" && i + 1 < args.len() {
            port = args[i + 1].parse().ok();
            i += 2;
            continue;
        }
        i += 1;
    }

    let mut settings = Config::load(&config_path)?;
    if let Some(port) = port {
        settings.port = port;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(withdraw_server::run_web_server(Arc::new(settings)))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
