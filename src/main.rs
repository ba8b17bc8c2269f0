use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use eventgate::emit::{StdoutSink, SystemClock};
use eventgate::{Config, Dispatcher, Server};

#[derive(Debug, Parser)]
#[command(name = "eventgate", about = "HTTP event ingestion endpoint")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (host:port), overrides the config file
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(listen) = &args.listen {
        cfg.set_listen(listen)?;
    }

    let dispatcher = Dispatcher::from_config(&cfg, Arc::new(SystemClock), Arc::new(StdoutSink));
    let server = Server::start(&cfg, dispatcher)?;
    tracing::info!(addr = %server.local_addr(), "eventgate started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watchdog = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = watchdog.tick() => {
                if !server.is_running() {
                    tracing::error!("reactor exited unexpectedly");
                    break;
                }
            }
        }
    }

    // Blocks on the reactor thread join.
    tokio::task::block_in_place(|| server.shutdown())
}
