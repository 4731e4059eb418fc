use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use lanerush_server::net::start_websocket_server;
use lanerush_server::state::SharedGameState;
use lanerush_server::SimConfig;

#[derive(Parser, Debug)]
#[command(name = "lanerush-server")]
#[command(about = "Authoritative endless-road simulation over WebSocket")]
struct Cli {
    /// TOML config; every field is optional
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,
    /// Simulation rate, overrides `server.tick_hz`
    #[arg(long)]
    tick_hz: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lanerush_server=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(hz) = cli.tick_hz {
        config.server.tick_hz = hz;
    }
    config.validate().context("invalid configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind,
        tick_hz = config.server.tick_hz,
        "starting lanerush server"
    );

    let dt = config.dt();
    let bind = config.server.bind.clone();
    let state = Arc::new(Mutex::new(SharedGameState::new(config)));

    let mut server = tokio::spawn(start_websocket_server(Arc::clone(&state), bind));

    // Fixed timestep
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.lock().await.tick_all(dt);
            }
            joined = &mut server => {
                joined.context("websocket task panicked")?.context("websocket server stopped")?;
                return Ok(());
            }
        }
    }
}
