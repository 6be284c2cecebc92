//! Stream connection manager
//!
//! Owns the single upstream WebSocket session and keeps one healthy logical
//! subscription alive at all times:
//! - fixed-delay reconnect on any connection error (never fatal)
//! - CONNECTING attempts stuck past a timeout are force-terminated
//! - staleness detection: no inbound traffic for a threshold triggers a
//!   liveness probe; no traffic within the grace window force-closes
//! - the subscribed mint set survives reconnects and is replayed in batches
//!   on every successful open, along with the global and account watches

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::stream::events::{parse_message, StreamEvent, SubscriptionMessage};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// Commands accepted by the connection manager
#[derive(Debug, Clone)]
pub enum StreamCommand {
    /// Subscribe to trades for a mint (idempotent)
    Subscribe(String),
    /// Unsubscribe from trades for a mint
    Unsubscribe(String),
    /// Add wallets to the counterparty watch list
    WatchAccounts(Vec<String>),
    /// Tear down the session and stop
    Shutdown,
}

/// Cloneable handle for issuing commands to the running client
#[derive(Clone)]
pub struct StreamHandle {
    tx: mpsc::Sender<StreamCommand>,
}

impl StreamHandle {
    pub async fn subscribe(&self, mint: &str) {
        let _ = self.tx.send(StreamCommand::Subscribe(mint.to_string())).await;
    }

    pub async fn unsubscribe(&self, mint: &str) {
        let _ = self
            .tx
            .send(StreamCommand::Unsubscribe(mint.to_string()))
            .await;
    }

    pub async fn watch_accounts(&self, wallets: Vec<String>) {
        let _ = self.tx.send(StreamCommand::WatchAccounts(wallets)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(StreamCommand::Shutdown).await;
    }
}

/// Build the full replay message sequence for a fresh OPEN session:
/// global subscriptions first, then the subscribed mint set and the
/// counterparty watch list in batches of at most `batch_size` keys.
pub fn build_resubscribe_messages(
    subscribed: &HashSet<String>,
    accounts: &[String],
    batch_size: usize,
) -> Vec<SubscriptionMessage> {
    let mut messages = vec![
        SubscriptionMessage::subscribe_new_tokens(),
        SubscriptionMessage::subscribe_migrations(),
    ];

    let mut mints: Vec<String> = subscribed.iter().cloned().collect();
    mints.sort_unstable();
    for chunk in mints.chunks(batch_size.max(1)) {
        messages.push(SubscriptionMessage::subscribe_token_trades(chunk.to_vec()));
    }

    for chunk in accounts.chunks(batch_size.max(1)) {
        messages.push(SubscriptionMessage::subscribe_account_trades(chunk.to_vec()));
    }

    messages
}

/// WebSocket stream client
pub struct StreamClient {
    config: StreamConfig,
    event_tx: mpsc::Sender<StreamEvent>,
    command_rx: mpsc::Receiver<StreamCommand>,
    subscribed: HashSet<String>,
    watched_accounts: Vec<String>,
    state: ConnectionState,
    reconnect_attempts: u32,
}

/// Why a session loop ended
enum SessionEnd {
    /// Connection lost or went stale; reconnect
    Reconnect,
    /// Shutdown requested; stop the client
    Shutdown,
}

impl StreamClient {
    /// Create a client and its command handle
    pub fn new(config: StreamConfig, event_tx: mpsc::Sender<StreamEvent>) -> (Self, StreamHandle) {
        let (tx, command_rx) = mpsc::channel(256);
        (
            Self {
                config,
                event_tx,
                command_rx,
                subscribed: HashSet::new(),
                watched_accounts: Vec::new(),
                state: ConnectionState::Disconnected,
                reconnect_attempts: 0,
            },
            StreamHandle { tx },
        )
    }

    /// Seed the subscribed set before the first connect (warm restart)
    pub fn preload_subscriptions(&mut self, mints: impl IntoIterator<Item = String>) {
        self.subscribed.extend(mints);
    }

    /// Seed the counterparty watch list before the first connect
    pub fn preload_accounts(&mut self, wallets: Vec<String>) {
        self.watched_accounts = wallets;
    }

    /// Run the connection loop until shutdown. Connection errors are
    /// recovered with a fixed-delay reconnect and never propagate.
    pub async fn run(mut self) {
        info!(url = %self.config.ws_url, "Starting stream client");

        loop {
            self.state = ConnectionState::Connecting;

            match self.connect().await {
                Ok(ws) => {
                    self.reconnect_attempts = 0;
                    let end = self.session(ws).await;
                    self.state = ConnectionState::Closed;
                    let _ = self.event_tx.send(StreamEvent::Disconnected).await;

                    if matches!(end, SessionEnd::Shutdown) {
                        info!("Stream client shut down");
                        return;
                    }
                }
                Err(e) => {
                    self.reconnect_attempts += 1;
                    warn!(
                        attempt = self.reconnect_attempts,
                        error = %e,
                        "Stream connect failed"
                    );
                }
            }

            self.state = ConnectionState::Disconnected;
            let delay = Duration::from_millis(self.config.reconnect_delay_ms);
            debug!("Reconnecting in {:?}", delay);

            // Keep servicing subscription commands while disconnected so the
            // set is current when the session reopens.
            if self.wait_before_reconnect(delay).await {
                info!("Stream client shut down while disconnected");
                return;
            }
        }
    }

    /// Connect with the stuck-CONNECTING guard
    async fn connect(&self) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let url = url::Url::parse(&self.config.ws_url)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        match timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok((ws, _))) => Ok(ws),
            Ok(Err(e)) => Err(Error::StreamConnection(e.to_string())),
            Err(_) => Err(Error::StreamConnection(format!(
                "connect stuck for {}s, force-terminated",
                self.config.connect_timeout_secs
            ))),
        }
    }

    /// One OPEN session: replay subscriptions, then pump events until the
    /// connection closes, goes stale, or a shutdown arrives.
    async fn session(&mut self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> SessionEnd {
        let (mut write, mut read) = ws.split();

        if let Err(e) = self.replay_subscriptions(&mut write).await {
            warn!(error = %e, "Subscription replay failed");
            return SessionEnd::Reconnect;
        }

        self.state = ConnectionState::Open;
        info!(
            subscribed = self.subscribed.len(),
            accounts = self.watched_accounts.len(),
            "Stream session open, subscriptions replayed"
        );
        let _ = self.event_tx.send(StreamEvent::Connected).await;

        let mut last_activity = Instant::now();
        let mut probe_sent_at: Option<Instant> = None;
        let stale_after = Duration::from_secs(self.config.stale_after_secs);
        let grace = Duration::from_secs(self.config.ping_grace_secs);
        let mut ping_timer = interval(Duration::from_secs(self.config.ping_interval_secs));
        // First tick fires immediately; skip it
        ping_timer.tick().await;

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if let Some(sent) = probe_sent_at {
                        if sent.elapsed() > grace {
                            warn!("Stale session: no traffic since liveness probe, force-closing");
                            return SessionEnd::Reconnect;
                        }
                    } else if last_activity.elapsed() > stale_after {
                        debug!("No inbound traffic for {:?}, sending liveness probe", stale_after);
                        probe_sent_at = Some(Instant::now());
                        if write.send(Message::Ping(vec![])).await.is_err() {
                            warn!("Liveness probe send failed");
                            return SessionEnd::Reconnect;
                        }
                    } else if write.send(Message::Ping(vec![])).await.is_err() {
                        warn!("Keep-alive ping failed");
                        return SessionEnd::Reconnect;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(StreamCommand::Shutdown) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            return SessionEnd::Shutdown;
                        }
                        Some(cmd) => {
                            if let Err(e) = self.apply_command(cmd, &mut write).await {
                                warn!(error = %e, "Subscription update failed");
                                return SessionEnd::Reconnect;
                            }
                        }
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            probe_sent_at = None;
                            match parse_message(&text) {
                                Some(event) => {
                                    let _ = self.event_tx.send(event).await;
                                }
                                None => {
                                    debug!("Dropped unclassified frame: {}", &text[..text.len().min(120)]);
                                }
                            }
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                            last_activity = Instant::now();
                            probe_sent_at = None;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Stream closed by server");
                            return SessionEnd::Reconnect;
                        }
                        Some(Ok(_)) => {
                            last_activity = Instant::now();
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Stream read error");
                            return SessionEnd::Reconnect;
                        }
                        None => {
                            info!("Stream ended");
                            return SessionEnd::Reconnect;
                        }
                    }
                }
            }
        }
    }

    /// Apply a subscription command to local state and the live session
    async fn apply_command(&mut self, cmd: StreamCommand, write: &mut WsSink) -> Result<()> {
        match cmd {
            StreamCommand::Subscribe(mint) => {
                if self.subscribed.insert(mint.clone()) {
                    self.send_message(write, &SubscriptionMessage::subscribe_token_trades(vec![mint]))
                        .await?;
                }
            }
            StreamCommand::Unsubscribe(mint) => {
                if self.subscribed.remove(&mint) {
                    self.send_message(
                        write,
                        &SubscriptionMessage::unsubscribe_token_trades(vec![mint]),
                    )
                    .await?;
                }
            }
            StreamCommand::WatchAccounts(wallets) => {
                let new: Vec<String> = wallets
                    .into_iter()
                    .filter(|w| !self.watched_accounts.contains(w))
                    .collect();
                if !new.is_empty() {
                    self.watched_accounts.extend(new.iter().cloned());
                    self.send_message(write, &SubscriptionMessage::subscribe_account_trades(new))
                        .await?;
                }
            }
            StreamCommand::Shutdown => unreachable!("handled by caller"),
        }
        Ok(())
    }

    /// Re-issue every subscription after a (re)connect, batched
    async fn replay_subscriptions(&mut self, write: &mut WsSink) -> Result<()> {
        let messages = build_resubscribe_messages(
            &self.subscribed,
            &self.watched_accounts,
            self.config.subscribe_batch_size,
        );
        for msg in &messages {
            self.send_message(write, msg).await?;
        }
        Ok(())
    }

    async fn send_message(&self, write: &mut WsSink, msg: &SubscriptionMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| Error::Subscription(e.to_string()))
    }

    /// Sleep out the reconnect delay while still mutating the subscription
    /// set from incoming commands. Returns true on shutdown.
    async fn wait_before_reconnect(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            tokio::select! {
                _ = sleep(remaining) => return false,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(StreamCommand::Shutdown) | None => return true,
                        Some(StreamCommand::Subscribe(mint)) => {
                            self.subscribed.insert(mint);
                        }
                        Some(StreamCommand::Unsubscribe(mint)) => {
                            self.subscribed.remove(&mint);
                        }
                        Some(StreamCommand::WatchAccounts(wallets)) => {
                            for w in wallets {
                                if !self.watched_accounts.contains(&w) {
                                    self.watched_accounts.push(w);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Current connection state (used by tests and status reporting)
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}
