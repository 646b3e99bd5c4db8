//! musa-proxy - authenticated proxy for the planting and task routes
//!
//! Forwards `/api/tasks/...` and `/api/plantings...` to the farm backend
//! configured as `proxy.upstream_url` (or `MUSA_BACKEND_URL`).

use anyhow::{Context, Result};
use clap::Parser;
use musa_core::Config;

#[derive(Parser)]
#[command(name = "musa-proxy")]
#[command(about = "Authenticated proxy for musa planting and task routes")]
#[command(version)]
struct Args {
    /// Address to listen on (default: proxy.listen from config)
    #[arg(short, long)]
    listen: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (file and stdout)
    let _log_guard = musa_core::logging::init_server(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!("musa-proxy starting up");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    runtime
        .block_on(musa_core::proxy::serve(&config.proxy, args.listen.as_deref()))
        .context("proxy server failed")?;

    tracing::info!("musa-proxy shutting down");
    Ok(())
}
