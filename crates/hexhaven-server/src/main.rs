//! Hexhaven multiplayer game server.

use hexhaven_server::ServerConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    info!(
        players_per_game = config.players_per_game,
        seed = ?config.seed,
        "Starting Hexhaven server..."
    );

    hexhaven_server::run_server(config).await?;
    Ok(())
}
