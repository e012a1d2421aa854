use clap::Parser;
use tracing::{error, info};

use shadow_server::startup;

/// Shadow Hunter: real-time Shadow AI traffic detection.
#[derive(Parser, Debug)]
#[command(name = "shadow-hunter", version)]
struct Args {
    /// Capture live traffic instead of running the synthetic generator.
    /// Requires elevated privileges.
    #[arg(long)]
    live: bool,

    /// Network interface to capture on (auto-detected when omitted).
    #[arg(long)]
    interface: Option<String>,

    /// Delete the persistent graph before starting.
    #[arg(long)]
    reset: bool,

    /// Use a non-persistent in-memory graph store.
    #[arg(long)]
    inmemory: bool,

    /// HTTP/WebSocket bind port (default 8000).
    #[arg(long)]
    port: Option<u16>,

    /// Deterministic seed for the synthetic generator.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    shadow_core::config::load_dotenv();
    let mut config = shadow_core::Config::from_env();

    let args = Args::parse();
    config.capture.live = config.capture.live || args.live;
    if args.interface.is_some() {
        config.capture.interface = args.interface;
    }
    config.storage.reset = args.reset;
    config.storage.inmemory = config.storage.inmemory || args.inmemory;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(seed) = args.seed {
        config.generator.seed = seed;
    }

    // Exit codes: 0 normal shutdown, 1 configuration error,
    // 2 capture init failure, 3 bind failure.
    match startup::run(config).await {
        Ok(()) => info!("shutdown complete"),
        Err(e) => {
            error!("fatal: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
