//! HacxGPT relay bot - main entry point.

use anyhow::Result;
use hacx_bot::start_server;
use hacx_common::config::Config;
use hacx_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration; any problem aborts before startup
    let config = match Config::load_and_validate() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("HacxGPT Telegram Bot v{} is starting...", env!("CARGO_PKG_VERSION"));

    start_server(&config).await
}
