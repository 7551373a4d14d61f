//! Trace Duel Game Server
//!
//! Authoritative server binary: validates identities, pairs waiting
//! participants, and keeps both sides of every duel in lockstep.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trace_duel::game::movement::MoveRules;
use trace_duel::network::auth::AuthConfig;
use trace_duel::network::server::{GameServer, ServerConfig};
use trace_duel::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();
    let rules = MoveRules::default();

    info!("Trace Duel Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!(
        "Movement rules: max magnitude {}, start {}",
        rules.max_magnitude, rules.start_position
    );
    if !auth.is_configured() {
        info!("Auth not configured; set AUTH_SECRET or AUTH_PUBLIC_KEY_PEM");
    }

    let server = GameServer::new(config, auth, rules);
    server.run().await.context("server terminated abnormally")
}
