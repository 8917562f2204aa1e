//! Crash Game Server
//!
//! Wires the ledger, the round store, the engine actor and the WebSocket
//! server together, then serves until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crash_game::game::engine::EngineConfig;
use crash_game::network::server::{GameServer, ServerConfig};
use crash_game::runtime::EngineActor;
use crash_game::settlement::{
    InMemoryLedger, InMemoryRoundStore, JsonlRoundStore, RoundStore, RoundWriter, WalletSeed,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "crash_game=debug,crash_server=debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "crash_game=info,crash_server=info";

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_target(false)
        .init();

    info!("Crash Server v{}", crash_game::VERSION);

    let seeds = match std::env::var("CRASH_LEDGER_SEED") {
        Ok(path) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading ledger seed {path}"))?;
            WalletSeed::parse_list(&raw).with_context(|| format!("parsing ledger seed {path}"))?
        }
        Err(_) => {
            warn!("CRASH_LEDGER_SEED not set, using demo wallets");
            WalletSeed::demo()
        }
    };
    let ledger = Arc::new(InMemoryLedger::with_seeds(seeds));
    info!("Ledger ready with {} wallets", ledger.len().await);

    let store: Arc<dyn RoundStore> = match std::env::var("CRASH_ROUND_LOG") {
        Ok(path) => {
            let jsonl = JsonlRoundStore::new(&path);
            match jsonl.load().await {
                Ok(rounds) => info!("Persisting closed rounds to {} ({} on record)", path, rounds.len()),
                Err(e) => warn!("Round log {} unreadable, appending anyway: {}", path, e),
            }
            Arc::new(jsonl)
        }
        Err(_) => Arc::new(InMemoryRoundStore::new()),
    };
    let (writer, writer_task) = RoundWriter::spawn(store);

    let engine_config = EngineConfig::from_env();
    info!(
        tick_ms = engine_config.tick_interval.as_millis() as u64,
        betting_window_s = engine_config.betting_window.as_secs(),
        cooldown_s = engine_config.cooldown.as_secs(),
        "Engine configured"
    );
    let (actor, engine) = EngineActor::new(engine_config, ledger, writer);
    let actor_task = actor.start();

    let server = Arc::new(GameServer::new(ServerConfig::from_env(), engine));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server stopped")?;

    // The actor exits once the last handle is gone, then the writer drains.
    drop(server);
    match tokio::time::timeout(DRAIN_TIMEOUT, async {
        let _ = actor_task.await;
        writer_task.await
    })
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Round writer failed: {}", e),
        Err(_) => warn!("Timed out draining closed rounds"),
    }

    info!("Server stopped");
    Ok(())
}
