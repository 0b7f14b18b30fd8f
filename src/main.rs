use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use toolmux::cli::{Args, Repl};
use toolmux::config::Config;
use toolmux::logging::init_tracing;
use toolmux::registry::SessionRegistry;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let log_file = args.log_file.as_deref().or(config.defaults.log_file.as_deref());
    init_tracing(log_file).context("failed to open log file")?;

    let registry = Arc::new(
        SessionRegistry::from_config(&config).context("invalid tool configuration")?,
    );
    tracing::info!(tools = registry.catalog().len(), "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let mut repl = Repl::new(Arc::clone(&registry), config.defaults.clone());
    let result = runtime.block_on(repl.run(args.tool.clone()));

    registry.kill_all();
    // A prompt read may still be blocked on stdin; don't wait for it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
