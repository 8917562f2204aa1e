//! WebSocket Game Server
//!
//! Async WebSocket server for crash game clients. Each connection gets a
//! task that forwards round events, routes requests to the engine actor,
//! and reports joins and leaves to the lifecycle controller.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::engine::env_or;
use crate::game::error::ErrorCode;
use crate::game::round::{ConnectionId, ParticipantId};
use crate::network::protocol::{ClientMessage, ServerError, ServerMessage};
use crate::runtime::ingress::EngineHandle;
use crate::runtime::lifecycle::LifecycleController;

/// Outbound frames buffered per client.
const CLIENT_QUEUE: usize = 256;

/// How long a closing connection gets to flush its last frames.
const FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("CRASH_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("CRASH_MAX_CONNECTIONS", defaults.max_connections),
            version: defaults.version,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
#[derive(Debug)]
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Player id, once the client names one.
    participant_id: Option<ParticipantId>,
    /// Connection time.
    connected_at: Instant,
}

type Clients = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Engine actor handle.
    engine: EngineHandle,
    /// Starts and halts the engine with the population.
    lifecycle: Arc<LifecycleController>,
    /// Connected clients.
    clients: Clients,
    /// Connection id source.
    next_connection_id: Arc<AtomicU64>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server in front of an engine actor.
    pub fn new(config: ServerConfig, engine: EngineHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let lifecycle = Arc::new(LifecycleController::new(engine.clone()));

        Self {
            config,
            engine,
            lifecycle,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            shutdown_tx,
        }
    }

    /// Lifecycle controller shared by every connection.
    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener until shutdown.
    #[instrument(skip_all, fields(version = %self.config.version))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Crash server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => match self.reserve_slot(addr).await {
                            Some(connection_id) => {
                                info!("New connection {} from {}", connection_id, addr);
                                self.handle_connection(stream, addr, connection_id);
                            }
                            None => {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(async move {
                                    if let Err(e) = reject_connection(stream).await {
                                        debug!("Refusing {} failed: {}", addr, e);
                                    }
                                });
                            }
                        },
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Claim a client slot under the lock, or `None` when the server is full.
    async fn reserve_slot(&self, addr: SocketAddr) -> Option<ConnectionId> {
        let mut clients = self.clients.write().await;
        if clients.len() >= self.config.max_connections {
            return None;
        }

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        clients.insert(connection_id, ConnectedClient {
            addr,
            participant_id: None,
            connected_at: Instant::now(),
        });
        Some(connection_id)
    }

    /// Handle a new WebSocket connection on a reserved slot.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, connection_id: ConnectionId) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let lifecycle = self.lifecycle.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    clients.write().await.remove(&connection_id);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_QUEUE);

            // Subscribe before joining so the first round_start is not missed
            let mut events = engine.subscribe();

            if let Err(e) = lifecycle.connect().await {
                error!("Could not register connection {}: {}", connection_id, e);
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    connection_id,
                                    client_msg,
                                    &clients,
                                    &engine,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // Ping/pong frames are answered by tungstenite
                            _ => {}
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                if msg_tx.send(ServerMessage::from(event)).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Connection {} lagged, skipped {} events", connection_id, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                let _ = msg_tx.send(ServerMessage::Shutdown {
                                    reason: "Engine stopped".to_string(),
                                }).await;
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            drop(msg_tx);
            if tokio::time::timeout(FLUSH_GRACE, sender_task).await.is_err() {
                debug!("Sender for {} did not flush in time", addr);
            }

            let removed = clients.write().await.remove(&connection_id);
            if let Err(e) = lifecycle.disconnect().await {
                error!("Could not unregister connection {}: {}", connection_id, e);
            }

            if let Some(client) = removed {
                info!(
                    "Client {} ({}, player {:?}) cleaned up after {:?}",
                    connection_id,
                    client.addr,
                    client.participant_id,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        connection_id: ConnectionId,
        msg: ClientMessage,
        clients: &Clients,
        engine: &EngineHandle,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let reply = match msg {
            ClientMessage::Join { player_id } => {
                if let Some(ref id) = player_id {
                    Self::remember_participant(clients, connection_id, id).await;
                }
                Some(ServerMessage::Welcome {
                    message: match player_id {
                        Some(id) => format!("Welcome to the crash game, {}", id),
                        None => "Welcome to the crash game".to_string(),
                    },
                    connection_id,
                })
            }
            ClientMessage::PlaceBet(bet) => {
                Self::remember_participant(clients, connection_id, &bet.player_id).await;
                Some(match engine.place_bet(connection_id, bet.into()).await {
                    Ok(bet) => ServerMessage::bet_accepted(&bet),
                    Err(e) => {
                        if e.is_server_error() {
                            warn!("Bet from connection {} failed server side: {}", connection_id, e);
                        }
                        ServerMessage::bet_rejected(&e)
                    }
                })
            }
            ClientMessage::Cashout => match engine.cashout(connection_id).await {
                // Success is announced to everyone via player_cashout
                Ok(_) => None,
                Err(e) => {
                    if e.is_server_error() {
                        warn!("Cash-out for connection {} failed server side: {}", connection_id, e);
                    }
                    Some(ServerMessage::cashout_failed(&e))
                }
            },
            ClientMessage::Balance { player_id } => {
                Some(match engine.balance(player_id.clone()).await {
                    Ok(wallet) => ServerMessage::balance(player_id, wallet),
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                })
            }
            ClientMessage::Ping { timestamp } => Some(ServerMessage::pong(timestamp)),
        };

        if let Some(reply) = reply {
            let _ = sender.send(reply).await;
        }
    }

    async fn remember_participant(clients: &Clients, connection_id: ConnectionId, id: &str) {
        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&connection_id) {
            client.participant_id = Some(id.to_string());
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

}

/// Complete the handshake only to say the server is full.
async fn reject_connection(stream: TcpStream) -> Result<(), GameServerError> {
    let mut ws = accept_async(stream).await?;

    let refusal = ServerMessage::error(
        ErrorCode::ServerOverloaded,
        GameServerError::ConnectionLimitReached.to_string(),
    );
    if let Ok(text) = refusal.to_json() {
        ws.send(Message::Text(text)).await?;
    }
    ws.close(None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::net::TcpStream as ClientStream;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
    use crate::game::engine::{EngineConfig, SeedPolicy};
    use crate::game::round::RoundPhase;
    use crate::runtime::actor::EngineActor;
    use crate::settlement::ledger::{InMemoryLedger, WalletSeed};
    use crate::settlement::store::{InMemoryRoundStore, RoundWriter};

    type Client = WebSocketStream<MaybeTlsStream<ClientStream>>;

    struct TestServer {
        server: Arc<GameServer>,
        engine: EngineHandle,
        addr: SocketAddr,
    }

    async fn start_server(max_connections: usize) -> TestServer {
        let ledger = Arc::new(InMemoryLedger::with_seeds(WalletSeed::demo()));
        let (writer, _) = RoundWriter::spawn(Arc::new(InMemoryRoundStore::new()));
        let config = EngineConfig {
            tick_interval: Duration::from_millis(20),
            betting_window: Duration::from_millis(400),
            cooldown: Duration::from_millis(200),
            ledger_timeout: Duration::from_secs(1),
            seed_policy: SeedPolicy::Fixed("seed-1456".into()),
            ..Default::default()
        };
        let (actor, engine) = EngineActor::new(config, ledger, writer);
        actor.start();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(
            ServerConfig {
                bind_addr: addr,
                max_connections,
                ..Default::default()
            },
            engine.clone(),
        ));

        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });

        TestServer { server, engine, addr }
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, json: &str) {
        ws.send(Message::Text(json.to_string())).await.unwrap();
    }

    /// Next frame of the given type, skipping others.
    async fn next_of_type(ws: &mut Client, kind: &str) -> Value {
        let wait = async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let value: Value = serde_json::from_str(&text).unwrap();
                        if value["type"] == kind {
                            return value;
                        }
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended waiting for {}: {:?}", kind, other),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
    }

    async fn wait_for_phase(engine: &EngineHandle, phase: RoundPhase) {
        let mut status = engine.watch_status();
        tokio::time::timeout(Duration::from_secs(5), async {
            while status.borrow_and_update().phase != phase {
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_round_flow_over_socket() {
        let t = start_server(10).await;
        let mut ws = connect(t.addr).await;

        let start = next_of_type(&mut ws, "round_start").await;
        assert_eq!(start["roundNumber"], 1);
        assert_eq!(start["commitment"].as_str().unwrap().len(), 64);
        assert!(start.get("crashPoint").is_none());

        send(&mut ws, r#"{"type":"join","playerId":"player1"}"#).await;
        let welcome = next_of_type(&mut ws, "welcome").await;
        assert!(welcome["message"].as_str().unwrap().contains("player1"));

        send(&mut ws, r#"{"type":"place_bet","playerId":"player1","usdAmount":10,"cryptoAmount":0.002,"cryptoType":"BTC"}"#).await;
        let placed = next_of_type(&mut ws, "bet_placed").await;
        assert_eq!(placed["success"], true);
        assert!(placed["transactionId"].is_string());

        next_of_type(&mut ws, "multiplier_update").await;
        send(&mut ws, r#"{"type":"cashout"}"#).await;
        let cashout = next_of_type(&mut ws, "player_cashout").await;
        assert_eq!(cashout["playerId"], "player1");
        assert_eq!(cashout["currency"], "BTC");
        assert!(cashout["multiplier"].as_f64().unwrap() < 2.0);

        send(&mut ws, r#"{"type":"cashout"}"#).await;
        let failed = next_of_type(&mut ws, "cashout_failed").await;
        assert_eq!(failed["reason"], "already_cashed_out");

        let crash = next_of_type(&mut ws, "round_crash").await;
        assert_eq!(crash["crashPoint"], 2.0);
        assert_eq!(crash["seed"], "seed-1456");

        let waiting = next_of_type(&mut ws, "waiting").await;
        assert!(waiting["message"].as_str().unwrap().starts_with("Next round starts in"));
    }

    #[tokio::test]
    async fn test_late_bet_and_bad_input() {
        let t = start_server(10).await;
        let mut ws = connect(t.addr).await;
        next_of_type(&mut ws, "multiplier_update").await;

        send(&mut ws, r#"{"type":"place_bet","playerId":"player2","usdAmount":5,"cryptoAmount":0.01,"cryptoType":"ETH"}"#).await;
        let placed = next_of_type(&mut ws, "bet_placed").await;
        assert_eq!(placed["success"], false);
        assert_eq!(placed["reason"], "already_started");

        send(&mut ws, r#"{"type":"cashout"}"#).await;
        let failed = next_of_type(&mut ws, "cashout_failed").await;
        assert_eq!(failed["reason"], "no_active_bet");

        send(&mut ws, "garbage").await;
        let error = next_of_type(&mut ws, "error").await;
        assert_eq!(error["code"], "invalid_input");
    }

    #[tokio::test]
    async fn test_balance_and_ping() {
        let t = start_server(10).await;
        let mut ws = connect(t.addr).await;

        send(&mut ws, r#"{"type":"balance","playerId":"player3"}"#).await;
        let balance = next_of_type(&mut ws, "balance").await;
        assert_eq!(balance["btc"], 0.005);
        assert_eq!(balance["eth"], 1.0);

        send(&mut ws, r#"{"type":"balance","playerId":"nobody"}"#).await;
        let error = next_of_type(&mut ws, "error").await;
        assert_eq!(error["code"], "unknown_player");

        send(&mut ws, r#"{"type":"ping","timestamp":99}"#).await;
        let pong = next_of_type(&mut ws, "pong").await;
        assert_eq!(pong["timestamp"], 99);
    }

    #[tokio::test]
    async fn test_last_disconnect_halts_engine() {
        let t = start_server(10).await;
        let mut a = connect(t.addr).await;
        let mut b = connect(t.addr).await;
        next_of_type(&mut a, "round_start").await;
        next_of_type(&mut b, "round_start").await;

        a.close(None).await.unwrap();
        drop(a);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_ne!(t.engine.status().phase, RoundPhase::Idle);

        b.close(None).await.unwrap();
        drop(b);
        wait_for_phase(&t.engine, RoundPhase::Idle).await;
        assert_eq!(t.server.lifecycle().population().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let t = start_server(1).await;
        let mut first = connect(t.addr).await;
        next_of_type(&mut first, "round_start").await;

        let mut second = connect(t.addr).await;
        let refusal = next_of_type(&mut second, "error").await;
        assert_eq!(refusal["code"], "server_overloaded");
        assert_eq!(t.server.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_connection_burst_respects_limit() {
        let t = start_server(2).await;

        let clients = futures_util::future::join_all((0..5).map(|_| connect(t.addr))).await;

        let mut refused = 0;
        let mut admitted = Vec::new();
        for mut ws in clients {
            let first = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => {
                            return serde_json::from_str::<Value>(&text).unwrap();
                        }
                        Some(Ok(_)) => continue,
                        other => panic!("connection ended before first frame: {:?}", other),
                    }
                }
            })
            .await
            .unwrap();

            if first["type"] == "error" {
                assert_eq!(first["code"], "server_overloaded");
                refused += 1;
            } else {
                admitted.push(ws);
            }
        }

        assert_eq!(refused, 3);
        assert_eq!(admitted.len(), 2);
        assert_eq!(t.server.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_clients() {
        let t = start_server(10).await;
        let mut ws = connect(t.addr).await;
        next_of_type(&mut ws, "round_start").await;

        t.server.shutdown();
        let notice = next_of_type(&mut ws, "shutdown").await;
        assert_eq!(notice["reason"], "Server shutting down");
    }
}
