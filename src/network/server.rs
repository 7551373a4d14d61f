//! WebSocket Game Server
//!
//! Async WebSocket server for duel connections.
//! Handles authentication, queue entry, and message routing into the
//! sync engine; delivers each resolved path only to its named recipient.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::duel::ParticipantId;
use crate::game::movement::MoveRules;
use crate::network::auth::{validate_token, AuthConfig, AuthError};
use crate::network::protocol::{
    AuthResult, ClientMessage, DuelStartInfo, ErrorCode, MoveSubmission, PathUpdate,
    ServerError, ServerMessage,
};
use crate::sync::engine::SyncEngine;
use crate::sync::registry::{Pairing, Removal, SessionRegistry};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle connection eviction threshold.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static bind address"),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: std::env::var("IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
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
}

/// Connected client state.
struct ConnectedClient {
    /// Participant identity (after auth).
    participant_id: Option<ParticipantId>,
    /// Last activity.
    last_activity: Instant,
}

/// Outbound channels keyed by participant, for targeted delivery.
type SenderMap = Arc<RwLock<BTreeMap<ParticipantId, mpsc::Sender<ServerMessage>>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Auth configuration.
    auth: AuthConfig,
    /// Matchmaking and duel lookup.
    registry: Arc<SessionRegistry>,
    /// Turn resolution.
    engine: Arc<SyncEngine>,
    /// Connected clients by peer address.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Outbound message channels by participant.
    senders: SenderMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, auth: AuthConfig, rules: MoveRules) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(SessionRegistry::new(rules));

        Self {
            config,
            auth,
            engine: Arc::new(SyncEngine::new(registry.clone())),
            registry,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            senders: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Duel server listening on {}", self.config.bind_addr);

        let cleanup_clients = self.clients.clone();
        let cleanup_registry = self.registry.clone();
        let cleanup_senders = self.senders.clone();
        let idle_timeout = self.config.idle_timeout;

        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_registry, cleanup_senders, idle_timeout)
                .await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
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

        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let senders = self.senders.clone();
        let registry = self.registry.clone();
        let engine = self.engine.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    participant_id: None,
                    last_activity: Instant::now(),
                });
            }

            // Outbound pump: one task serializes and writes this client's
            // messages so game code never touches the socket directly.
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
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        // Log and drop; the client gets an
                                        // error frame but no resend prompt.
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidInput,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &senders,
                                    &registry,
                                    &engine,
                                    &auth,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(data))) => {
                                // Binary path: a bare movement submission.
                                if let Ok(submission) = MoveSubmission::from_bytes(&data) {
                                    Self::handle_client_message(
                                        addr,
                                        ClientMessage::Move(submission),
                                        &clients,
                                        &senders,
                                        &registry,
                                        &engine,
                                        &auth,
                                        &config,
                                        &msg_tx,
                                    ).await;
                                }
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: unix_millis(),
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
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

            sender_task.abort();

            // Tear down the participant's duel (if any) and notify the
            // opponent before forgetting the connection.
            let participant = {
                let mut clients = clients.write().await;
                clients.remove(&addr).and_then(|c| c.participant_id)
            };
            if let Some(participant) = participant {
                Self::teardown_participant(participant, &registry, &senders).await;
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    #[allow(clippy::too_many_arguments)]
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        senders: &SenderMap,
        registry: &Arc<SessionRegistry>,
        engine: &Arc<SyncEngine>,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Auth(req) => {
                match validate_token(&req.token, auth) {
                    Ok(claims) => {
                        let participant_id = claims.participant_id();

                        {
                            let mut clients = clients.write().await;
                            if let Some(client) = clients.get_mut(&addr) {
                                client.participant_id = Some(participant_id);
                            }
                        }
                        {
                            let mut senders = senders.write().await;
                            senders.insert(participant_id, sender.clone());
                        }

                        let _ = sender.send(ServerMessage::AuthResult(AuthResult {
                            success: true,
                            participant_id: Some(participant_id.0),
                            error: None,
                            server_version: config.version.clone(),
                        })).await;

                        debug!("Client {} authenticated as {}", addr, participant_id);
                    }
                    Err(err) => {
                        warn!("Auth failed for {}: {}", addr, err);
                        let code = match err {
                            AuthError::Expired => ErrorCode::TokenExpired,
                            AuthError::NotConfigured => ErrorCode::InternalError,
                            AuthError::InvalidSignature
                            | AuthError::InvalidFormat
                            | AuthError::InvalidIssuer
                            | AuthError::InvalidAudience
                            | AuthError::MissingClaim(_)
                            | AuthError::DecodeError(_) => ErrorCode::InvalidToken,
                        };
                        let _ = sender.send(ServerMessage::AuthResult(AuthResult {
                            success: false,
                            participant_id: None,
                            error: Some(err.to_string()),
                            server_version: config.version.clone(),
                        })).await;
                        let _ = sender.send(ServerMessage::Error(ServerError {
                            code,
                            message: err.to_string(),
                        })).await;
                    }
                }
            }
            ClientMessage::Play => {
                let Some(participant) = Self::authenticated(addr, clients, sender).await else {
                    return;
                };

                match registry.enqueue(participant).await {
                    Some(pairing) => Self::announce_duel(&pairing, senders).await,
                    None => {
                        let _ = sender.send(ServerMessage::Queued).await;
                    }
                }
            }
            ClientMessage::Move(submission) => {
                let Some(participant) = Self::authenticated(addr, clients, sender).await else {
                    return;
                };

                engine.submit(participant, &submission.path).await;
                let broadcasts = engine.advance().await;

                let senders = senders.read().await;
                for (recipient, path) in broadcasts {
                    if let Some(tx) = senders.get(&recipient) {
                        let _ = tx.send(ServerMessage::Path(PathUpdate { path })).await;
                    } else {
                        debug!("No connection for broadcast recipient {}", recipient);
                    }
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: unix_millis(),
                }).await;
            }
            ClientMessage::Leave => {
                let participant = {
                    let clients = clients.read().await;
                    clients.get(&addr).and_then(|c| c.participant_id)
                };
                if let Some(participant) = participant {
                    Self::teardown_participant(participant, registry, senders).await;
                }
            }
        }
    }

    /// Resolve the authenticated participant for a connection, replying
    /// with an error frame if there is none.
    async fn authenticated(
        addr: SocketAddr,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<ParticipantId> {
        let participant = {
            let clients = clients.read().await;
            clients.get(&addr).and_then(|c| c.participant_id)
        };
        if participant.is_none() {
            let _ = sender.send(ServerMessage::Error(ServerError {
                code: ErrorCode::NotAuthenticated,
                message: "Must authenticate first".to_string(),
            })).await;
        }
        participant
    }

    /// Send both sides of a fresh pairing their duel-start frames.
    async fn announce_duel(pairing: &Pairing, senders: &SenderMap) {
        let start = {
            let state = pairing.duel.lock().await;
            state.position_of(pairing.first).unwrap_or_default()
        };

        let senders = senders.read().await;
        let frames = [
            (pairing.first, pairing.second, true),
            (pairing.second, pairing.first, false),
        ];
        for (recipient, opponent, your_turn) in frames {
            if let Some(tx) = senders.get(&recipient) {
                let _ = tx.send(ServerMessage::DuelStart(DuelStartInfo {
                    duel_id: pairing.duel_id,
                    opponent_id: opponent.0,
                    your_turn,
                    start,
                })).await;
            }
        }
    }

    /// Remove a participant and notify the abandoned opponent.
    async fn teardown_participant(
        participant: ParticipantId,
        registry: &Arc<SessionRegistry>,
        senders: &SenderMap,
    ) {
        let removal = registry.remove(participant).await;

        {
            let mut senders = senders.write().await;
            senders.remove(&participant);
        }

        if let Removal::Ended { opponent } = removal {
            let senders = senders.read().await;
            if let Some(tx) = senders.get(&opponent) {
                let _ = tx.send(ServerMessage::OpponentLeft).await;
            }
        }
    }

    /// Run cleanup loop: evict idle connections and their duels.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        registry: Arc<SessionRegistry>,
        senders: SenderMap,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let to_remove: Vec<_> = {
                let clients = clients.read().await;
                clients.iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            for addr in to_remove {
                let participant = {
                    let mut clients = clients.write().await;
                    clients.remove(&addr).and_then(|c| c.participant_id)
                };
                if let Some(participant) = participant {
                    Self::teardown_participant(participant, &registry, &senders).await;
                }
                info!("Removed idle client {}", addr);
            }
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

    /// Get active duel count.
    pub async fn duel_count(&self) -> usize {
        self.registry.duel_count().await
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.registry.waiting_count().await
    }
}

/// Current wall-clock time in Unix milliseconds.
fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
