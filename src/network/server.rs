//! WebSocket Ledger Server
//!
//! Async WebSocket front end for the ledger. Each connection authenticates,
//! then issues ledger operations as JSON messages; every operation is
//! forwarded to the shared [`LedgerService`] and answered on the same socket.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ConfigError;
use crate::ledger::account::AccountId;
use crate::network::auth::Authenticator;
use crate::network::protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, PlacementInfo, ServerError, ServerMessage,
};
use crate::network::service::LedgerService;

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
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("MULTIBET_BIND_ADDR") {
            config.bind_addr = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "MULTIBET_BIND_ADDR",
                value: raw.clone(),
            })?;
        }
        if let Ok(raw) = std::env::var("MULTIBET_MAX_CONNECTIONS") {
            config.max_connections = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "MULTIBET_MAX_CONNECTIONS",
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }
}

/// Ledger server errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client bookkeeping.
struct ConnectedClient {
    /// Account after auth.
    account: Option<AccountId>,
    /// Connection time.
    connected_at: Instant,
}

/// Per-connection state owned by the connection task.
struct ClientState {
    addr: SocketAddr,
    account: Option<AccountId>,
    sender: mpsc::Sender<ServerMessage>,
    forwarder: Option<JoinHandle<()>>,
}

impl ClientState {
    fn new(addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { addr, account: None, sender, forwarder: None }
    }

    fn stop_forwarding(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

/// The ledger server.
pub struct LedgerServer {
    config: ServerConfig,
    auth: Arc<Authenticator>,
    service: LedgerService,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl LedgerServer {
    /// Create a new ledger server.
    ///
    /// `auth` must have been built for `service`'s authority.
    pub fn new(config: ServerConfig, auth: Authenticator, service: LedgerService) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            auth: Arc::new(auth),
            service,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), LedgerServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), LedgerServerError> {
        info!("Ledger server listening on {}", listener.local_addr()?);
        if !self.auth.verifies_tokens() {
            warn!("JWT validation not configured; bettors declare their own account id");
        }
        if self.auth.allows_declared_authority() {
            warn!("Development mode: the authority account can be claimed without a token");
        }

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

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let service = self.service.clone();
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

            clients.write().await.insert(addr, ConnectedClient {
                account: None,
                connected_at: Instant::now(),
            });

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

            let mut state = ClientState::new(addr, msg_tx.clone());

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let parsed = match msg {
                            Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
                            Some(Ok(Message::Binary(data))) => ClientMessage::from_slice(&data),
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => continue,
                        };

                        let reply = match parsed {
                            Ok(client_msg) => {
                                let before = state.account;
                                let reply = Self::handle_client_message(
                                    &mut state,
                                    client_msg,
                                    &service,
                                    &auth,
                                    &config,
                                ).await;
                                if state.account != before {
                                    if let Some(client) = clients.write().await.get_mut(&addr) {
                                        client.account = state.account;
                                    }
                                }
                                reply
                            }
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                Some(ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format"))
                            }
                        };

                        if let Some(reply) = reply {
                            if msg_tx.send(reply).await.is_err() {
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

            state.stop_forwarding();
            drop(state);
            drop(msg_tx);
            // Let queued replies (including Shutdown) drain before closing.
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({}) cleaned up after {:?}",
                    addr,
                    client.account.map(|a| a.short()).unwrap_or_else(|| "anonymous".into()),
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Handle one client message, returning the direct reply.
    async fn handle_client_message(
        state: &mut ClientState,
        msg: ClientMessage,
        service: &LedgerService,
        auth: &Authenticator,
        config: &ServerConfig,
    ) -> Option<ServerMessage> {
        if msg.is_mutation() && state.account.is_none() {
            return Some(ServerMessage::error(ErrorCode::NotAuthenticated, "Must authenticate first"));
        }

        let reply = match msg {
            ClientMessage::Auth(request) => Self::handle_auth(state, request, auth, config),

            ClientMessage::CreateBet { topic, options } => {
                let caller = state.account?;
                match service.create_bet(&caller, &topic, &options).await {
                    Ok(bet_id) => ServerMessage::BetCreated { bet_id },
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }

            ClientMessage::PlaceBet { bet_id, option, amount } => {
                let participant = state.account?;
                match service.place_bet(bet_id, &option, &participant, amount).await {
                    Ok(placement) => ServerMessage::BetPlaced(PlacementInfo {
                        bet_id: placement.bet_id,
                        option_index: placement.option_index,
                        option_total: placement.option_total,
                        total_pot: placement.total_pot,
                    }),
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }

            ClientMessage::ResolveBet { bet_id, winning_option } => {
                let caller = state.account?;
                match service.resolve(bet_id, &winning_option, &caller).await {
                    Ok(report) => ServerMessage::BetResolved(report),
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }

            ClientMessage::Fund { account, amount } => {
                let caller = state.account?;
                match AccountId::parse(&account) {
                    Some(target) => match service.fund(&caller, target, amount).await {
                        Ok(balance) => ServerMessage::Balance { account: target, balance },
                        Err(e) => ServerMessage::Error(ServerError::from(&e)),
                    },
                    None => ServerMessage::error(ErrorCode::InvalidInput, "Invalid account id"),
                }
            }

            ClientMessage::GetBet { bet_id } => match service.get_bet(bet_id).await {
                Ok(view) => ServerMessage::Bet(view),
                Err(e) => ServerMessage::Error(ServerError::from(&e)),
            },

            ClientMessage::GetOptionInfo { bet_id } => match service.get_option_info(bet_id).await {
                Ok(info) => ServerMessage::OptionInfo { bet_id, info },
                Err(e) => ServerMessage::Error(ServerError::from(&e)),
            },

            ClientMessage::GetUserBet { bet_id, participant } => {
                match Self::target_account(state, participant.as_deref()) {
                    Ok(participant) => match service.get_user_bet(bet_id, &participant).await {
                        Ok(user_bet) => ServerMessage::UserBet { bet_id, participant, user_bet },
                        Err(e) => ServerMessage::Error(ServerError::from(&e)),
                    },
                    Err(reply) => reply,
                }
            }

            ClientMessage::BetCount => ServerMessage::BetCount { count: service.count().await },

            ClientMessage::Balance { account } => {
                match Self::target_account(state, account.as_deref()) {
                    Ok(account) => ServerMessage::Balance {
                        account,
                        balance: service.balance(&account).await,
                    },
                    Err(reply) => reply,
                }
            }

            ClientMessage::Subscribe => {
                if state.forwarder.is_none() {
                    state.forwarder = Some(Self::spawn_forwarder(state.addr, service, state.sender.clone()));
                }
                ServerMessage::Subscription { active: true }
            }

            ClientMessage::Unsubscribe => {
                state.stop_forwarding();
                ServerMessage::Subscription { active: false }
            }

            ClientMessage::StateHash => {
                let (hash, bet_count) = service.state_hash().await;
                ServerMessage::StateHash { hash: hex::encode(hash), bet_count }
            }

            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            },
        };

        if let ServerMessage::Error(ref err) = reply {
            debug!("Request from {} failed: {:?} {}", state.addr, err.code, err.message);
        }

        Some(reply)
    }

    /// Handle authentication.
    fn handle_auth(
        state: &mut ClientState,
        request: AuthRequest,
        auth: &Authenticator,
        config: &ServerConfig,
    ) -> ServerMessage {
        match auth.authenticate(request.token.as_deref(), request.account_id.as_deref()) {
            Ok(identity) => {
                state.account = Some(identity.account);
                debug!(
                    "Client {} authenticated as {}{} (client {})",
                    state.addr,
                    identity.account.short(),
                    if identity.is_authority { " [authority]" } else { "" },
                    request.client_version
                );
                ServerMessage::AuthResult(AuthResult {
                    success: true,
                    account_id: Some(identity.account),
                    is_authority: identity.is_authority,
                    error: None,
                    server_version: config.version.clone(),
                })
            }
            Err(err) => {
                warn!("Authentication failed for {}: {}", state.addr, err);
                ServerMessage::AuthResult(AuthResult {
                    success: false,
                    account_id: None,
                    is_authority: false,
                    error: Some(ServerError::from(&err)),
                    server_version: config.version.clone(),
                })
            }
        }
    }

    /// Resolve an explicit account argument, or fall back to the caller.
    fn target_account(state: &ClientState, raw: Option<&str>) -> Result<AccountId, ServerMessage> {
        match raw {
            Some(raw) => AccountId::parse(raw)
                .ok_or_else(|| ServerMessage::error(ErrorCode::InvalidInput, "Invalid account id")),
            None => state
                .account
                .ok_or_else(|| ServerMessage::error(ErrorCode::NotAuthenticated, "Must authenticate first")),
        }
    }

    /// Forward ledger events to one client until it unsubscribes or leaves.
    fn spawn_forwarder(
        addr: SocketAddr,
        service: &LedgerService,
        sender: mpsc::Sender<ServerMessage>,
    ) -> JoinHandle<()> {
        let mut events = service.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if sender.send(ServerMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber {} lagged, {} events dropped", addr, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// The shared ledger.
    pub fn service(&self) -> &LedgerService {
        &self.service
    }
}
