use anyhow::Result;
use colored::Colorize;
use gemini_proxy::{config::Config, server};
use tracing::info;

/// Execute the start command
///
/// Configuration is already loaded and tracing initialized by the caller.
pub async fn execute(cfg: Config) -> Result<()> {
    println!("{}", "Starting Gemini proxy...".green());
    info!(
        host = %cfg.server.host,
        port = cfg.server.port,
        "Starting Gemini proxy in foreground mode"
    );

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
