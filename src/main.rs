use clap::Parser;
use tracing::info;

use arena_server::config::Config;
use arena_server::{logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging; the guard keeps the file writer flushing
    let _guard = logging::init(&config)?;

    let listener = server::bind(&config)?;
    info!("Arena server listening on {}", config.addr());

    server::run(listener, config).await
}
