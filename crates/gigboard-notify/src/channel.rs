//! Real-time notification channel.
//!
//! [`ChannelManager`] keeps at most one live connection for the signed-in
//! identity. Each identity gets a background task that connects, feeds
//! inbound events into the [`NotificationStore`], forwards outbound commands
//! from the [`ChannelHandle`], and reconnects with bounded exponential
//! backoff after the connection drops.
//!
//! ```text
//! set_identity(Some(id)) ──► spawn task ──► connect ──► getUnreadCount (ack)
//!                                  ▲              │
//!                                  │   backoff    ▼
//!                                  └──────── disconnected
//! set_identity(None) ──► shutdown + await task ──► store.clear()
//! ```
//!
//! The transport sits behind [`ChannelConnector`]; production uses
//! [`WsConnector`] (WebSocket with a bearer token in the handshake).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use gigboard_core::events::parse_unread_ack;
use gigboard_core::{
    defaults, ChannelCommand, ChannelFrame, Error, Identity, InboundEvent, LiveChannel, Result,
    TokenProvider,
};

use crate::store::NotificationStore;

// =============================================================================
// Configuration
// =============================================================================

/// Connection and reconnection settings for the channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    pub connect_timeout: Duration,
    /// Consecutive failed reconnects before giving up.
    pub reconnect_attempts: u32,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub ack_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            reconnect_attempts: defaults::RECONNECT_ATTEMPTS,
            reconnect_base: Duration::from_millis(defaults::RECONNECT_BASE_MS),
            reconnect_max: Duration::from_millis(defaults::RECONNECT_MAX_MS),
            ack_timeout: Duration::from_millis(defaults::ACK_TIMEOUT_MS),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, attempts: u32, base: Duration, max: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_base = base;
        self.reconnect_max = max;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

// =============================================================================
// Transport
// =============================================================================

/// Opens connections to the channel endpoint.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &str, token: &str) -> Result<Box<dyn ChannelConnection>>;
}

/// One open, bidirectional frame stream.
#[async_trait]
pub trait ChannelConnection: Send {
    async fn send(&mut self, frame: ChannelFrame) -> Result<()>;

    /// Next inbound frame. `Ok(None)` once the peer closed the connection.
    async fn recv(&mut self) -> Result<Option<ChannelFrame>>;

    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, url: &str, token: &str) -> Result<Box<dyn ChannelConnection>> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Config(format!("invalid socket URL {}: {}", url, e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Channel(format!("invalid token header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Channel(format!("WebSocket handshake failed: {}", e)))?;
        debug!(status = response.status().as_u16(), "WebSocket handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChannelConnection for WsConnection {
    async fn send(&mut self, frame: ChannelFrame) -> Result<()> {
        let text = frame.to_json()?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Channel(format!("send failed: {}", e)))
    }

    async fn recv(&mut self) -> Result<Option<ChannelFrame>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => match ChannelFrame::from_json(&text) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => warn!(error = %e, "Ignoring malformed channel frame"),
                },
                Ok(Message::Close(reason)) => {
                    debug!(?reason, "Server closed channel");
                    return Ok(None);
                }
                // Pings are answered by tungstenite on the next write.
                Ok(_) => {}
                Err(e) => return Err(Error::Channel(format!("receive failed: {}", e))),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| Error::Channel(format!("close failed: {}", e)))
    }
}

// =============================================================================
// Handle
// =============================================================================

enum Outbound {
    /// Command without an ack; `done` resolves once the frame is written.
    /// Fire-and-forget command; `done` resolves once the frame is written.
    Emit {
        command: ChannelCommand,
        done: oneshot::Sender<Result<()>>,
    },
    Request {
        command: ChannelCommand,
        reply: oneshot::Sender<Result<JsonValue>>,
    },
}

/// Sending side of the live channel, attached to the notification store.
pub struct ChannelHandle {
    connected: Arc<AtomicBool>,
    outbound: mpsc::Sender<Outbound>,
    ack_timeout: Duration,
}

#[async_trait]
impl LiveChannel for ChannelHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn emit(&self, command: ChannelCommand) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Channel("not connected".to_string()));
        }
        let (done, rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Emit { command, done })
            .await
            .map_err(|_| Error::Channel("channel task stopped".to_string()))?;

        timeout(self.ack_timeout, rx)
            .await
            .map_err(|_| Error::Timeout("channel send".to_string()))?
            .map_err(|_| Error::Channel("connection lost before send".to_string()))?
    }

    async fn request_unread_count(&self) -> Result<u64> {
        if !self.is_connected() {
            return Err(Error::Channel("not connected".to_string()));
        }
        let (reply, rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Request {
                command: ChannelCommand::GetUnreadCount,
                reply,
            })
            .await
            .map_err(|_| Error::Channel("channel task stopped".to_string()))?;

        let data = timeout(self.ack_timeout, rx)
            .await
            .map_err(|_| Error::Timeout("unread count ack".to_string()))?
            .map_err(|_| Error::Channel("connection lost before ack".to_string()))??;
        parse_unread_ack(&data)
    }
}

// =============================================================================
// Manager
// =============================================================================

struct ActiveChannel {
    identity: Identity,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ActiveChannel {
    /// Signal the task and wait until its connection is closed.
    async fn stop(self) {
        // Fails only if the task already exited.
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Channel task ended abnormally");
        }
    }
}

/// Owns the live connection for the current identity.
pub struct ChannelManager {
    config: ChannelConfig,
    connector: Arc<dyn ChannelConnector>,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<NotificationStore>,
    connected: Arc<AtomicBool>,
    live_connections: Arc<AtomicUsize>,
    active: Mutex<Option<ActiveChannel>>,
}

impl ChannelManager {
    pub fn new(
        config: ChannelConfig,
        connector: Arc<dyn ChannelConnector>,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<NotificationStore>,
    ) -> Self {
        Self {
            config,
            connector,
            tokens,
            store,
            connected: Arc::new(AtomicBool::new(false)),
            live_connections: Arc::new(AtomicUsize::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Manager using the WebSocket transport.
    pub fn websocket(
        config: ChannelConfig,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<NotificationStore>,
    ) -> Self {
        Self::new(config, Arc::new(WsConnector), tokens, store)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of currently open connections (0 or 1).
    pub fn live_connections(&self) -> usize {
        self.live_connections.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Follow the authenticated identity.
    ///
    /// `Some` opens a connection for that identity, replacing (and awaiting)
    /// any connection for a different one. Repeating the same identity while
    /// its task is running is a no-op; a finished task (gave up, or no token
    /// was available) is started again. `None` closes the connection and
    /// clears all notification state.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let mut active = self.active.lock().await;

        match identity {
            Some(identity) => {
                if let Some(current) = active.as_ref() {
                    if current.identity == identity && !current.task.is_finished() {
                        debug!(user_id = %identity.user_id, "Channel already running");
                        return;
                    }
                }
                if let Some(previous) = active.take() {
                    info!(user_id = %previous.identity.user_id, "Stopping previous channel");
                    previous.stop().await;
                }
                *active = Some(self.spawn(identity).await);
            }
            None => {
                if let Some(previous) = active.take() {
                    previous.stop().await;
                }
                self.store.detach_channel().await;
                self.store.clear().await;
                info!("Channel closed for logout");
            }
        }
    }

    /// Stop the current connection without clearing state.
    pub async fn shutdown(&self) {
        if let Some(previous) = self.active.lock().await.take() {
            previous.stop().await;
        }
        self.store.detach_channel().await;
    }

    async fn spawn(&self, identity: Identity) -> ActiveChannel {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(defaults::CHANNEL_COMMAND_CAPACITY);

        let handle = Arc::new(ChannelHandle {
            connected: self.connected.clone(),
            outbound: outbound_tx,
            ack_timeout: self.config.ack_timeout,
        });
        self.store.attach_channel(handle).await;

        let worker = ChannelWorker {
            user_id: identity.user_id.clone(),
            config: self.config.clone(),
            connector: self.connector.clone(),
            tokens: self.tokens.clone(),
            store: self.store.clone(),
            connected: self.connected.clone(),
            live_connections: self.live_connections.clone(),
        };
        let task = tokio::spawn(worker.run(shutdown_rx, outbound_rx));

        ActiveChannel {
            identity,
            shutdown_tx,
            task,
        }
    }
}

// =============================================================================
// Connection task
// =============================================================================

enum ServeOutcome {
    Shutdown,
    Disconnected,
}

enum PendingAck {
    /// Connect-time unread count sync, applied straight to the store.
    UnreadSync,
    Reply(oneshot::Sender<Result<JsonValue>>),
}

/// Decrements the live-connection counter when the connection is dropped.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct ChannelWorker {
    user_id: String,
    config: ChannelConfig,
    connector: Arc<dyn ChannelConnector>,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<NotificationStore>,
    connected: Arc<AtomicBool>,
    live_connections: Arc<AtomicUsize>,
}

impl ChannelWorker {
    #[instrument(skip_all, fields(subsystem = "channel", user_id = %self.user_id))]
    async fn run(
        self,
        mut shutdown_rx: mpsc::Receiver<()>,
        mut outbound_rx: mpsc::Receiver<Outbound>,
    ) {
        let mut failures: u32 = 0;

        loop {
            let fetched = tokio::select! {
                _ = shutdown_rx.recv() => break,
                fetched = self.tokens.access_token() => fetched,
            };
            let token = match fetched {
                Ok(Some(token)) => token,
                Ok(None) => {
                    warn!("No access token, channel not opened");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to obtain access token, channel not opened");
                    break;
                }
            };

            let attempt = tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = timeout(
                    self.config.connect_timeout,
                    self.connector.connect(&self.config.url, &token),
                ) => result,
            };

            match attempt {
                Ok(Ok(conn)) => {
                    failures = 0;
                    match self.serve(conn, &mut shutdown_rx, &mut outbound_rx).await {
                        ServeOutcome::Shutdown => break,
                        ServeOutcome::Disconnected => {}
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "Channel connect failed"),
                Err(_) => warn!(
                    timeout_ms = self.config.connect_timeout.as_millis() as u64,
                    "Channel connect timed out"
                ),
            }

            failures += 1;
            if failures > self.config.reconnect_attempts {
                warn!(
                    attempts = self.config.reconnect_attempts,
                    "Giving up on channel reconnection"
                );
                break;
            }

            let delay = backoff_delay(
                failures,
                self.config.reconnect_base,
                self.config.reconnect_max,
            );
            info!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting channel"
            );
            if !self.wait_backoff(delay, &mut shutdown_rx, &mut outbound_rx).await {
                break;
            }
        }

        self.connected.store(false, Ordering::Release);
        self.store.set_connected(false).await;
        debug!("Channel task finished");
    }

    /// Sleep for `delay`, rejecting commands meanwhile. Returns false on
    /// shutdown.
    async fn wait_backoff(
        &self,
        delay: Duration,
        shutdown_rx: &mut mpsc::Receiver<()>,
        outbound_rx: &mut mpsc::Receiver<Outbound>,
    ) -> bool {
        let backoff = sleep(delay);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => return true,
                _ = shutdown_rx.recv() => return false,
                Some(outbound) = outbound_rx.recv() => reject(outbound),
            }
        }
    }

    async fn serve(
        &self,
        mut conn: Box<dyn ChannelConnection>,
        shutdown_rx: &mut mpsc::Receiver<()>,
        outbound_rx: &mut mpsc::Receiver<Outbound>,
    ) -> ServeOutcome {
        let _live = LiveGuard::new(self.live_connections.clone());
        let mut pending: HashMap<u64, PendingAck> = HashMap::new();
        let mut next_ack: u64 = 0;

        self.connected.store(true, Ordering::Release);
        self.store.set_connected(true).await;
        info!("Channel connected");

        // Never trust the cached count after a (re)connect.
        next_ack += 1;
        pending.insert(next_ack, PendingAck::UnreadSync);
        let outcome = match conn
            .send(ChannelCommand::GetUnreadCount.to_frame(Some(next_ack)))
            .await
        {
            Ok(()) => loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        if let Err(e) = conn.close().await {
                            debug!(error = %e, "Close on shutdown failed");
                        }
                        break ServeOutcome::Shutdown;
                    }
                    outbound = outbound_rx.recv() => {
                        let Some(outbound) = outbound else {
                            break ServeOutcome::Shutdown;
                        };
                        let (frame, done) = match outbound {
                            Outbound::Emit { command, done } => {
                                (command.to_frame(None), Some(done))
                            }
                            Outbound::Request { command, reply } => {
                                prune_abandoned(&mut pending);
                                next_ack += 1;
                                pending.insert(next_ack, PendingAck::Reply(reply));
                                (command.to_frame(Some(next_ack)), None)
                            }
                        };
                        let sent = conn.send(frame).await;
                        if let Err(e) = &sent {
                            warn!(error = %e, "Channel send failed");
                        }
                        let failed = sent.is_err();
                        if let Some(done) = done {
                            let _ = done.send(sent);
                        }
                        if failed {
                            break ServeOutcome::Disconnected;
                        }
                    }
                    inbound = conn.recv() => match inbound {
                        Ok(Some(frame)) => self.dispatch(frame, &mut pending).await,
                        Ok(None) => {
                            info!("Channel closed by server");
                            break ServeOutcome::Disconnected;
                        }
                        Err(e) => {
                            warn!(error = %e, "Channel receive failed");
                            break ServeOutcome::Disconnected;
                        }
                    },
                }
            },
            Err(e) => {
                warn!(error = %e, "Unread count request failed");
                ServeOutcome::Disconnected
            }
        };

        self.connected.store(false, Ordering::Release);
        if matches!(outcome, ServeOutcome::Disconnected) {
            self.store.set_connected(false).await;
        }
        outcome
    }

    async fn dispatch(&self, frame: ChannelFrame, pending: &mut HashMap<u64, PendingAck>) {
        if frame.is_ack_reply() {
            let Some(ack_id) = frame.ack_id else { return };
            match pending.remove(&ack_id) {
                Some(PendingAck::UnreadSync) => match parse_unread_ack(&frame.data) {
                    Ok(count) => self.store.apply_unread_count(count).await,
                    Err(e) => warn!(error = %e, "Bad unread count ack"),
                },
                Some(PendingAck::Reply(reply)) => {
                    let _ = reply.send(Ok(frame.data));
                }
                None => debug!(ack_id, "Ack for unknown or expired request"),
            }
            return;
        }

        match InboundEvent::from_frame(&frame) {
            Ok(Some(InboundEvent::NotificationNew(notification))) => {
                self.store.receive_push(*notification).await;
            }
            Ok(Some(InboundEvent::UnreadCount(count))) => {
                self.store.apply_unread_count(count).await;
            }
            Ok(None) => debug!(event = ?frame.event, "Ignoring channel event"),
            Err(e) => warn!(event = ?frame.event, error = %e, "Malformed channel event"),
        }
    }
}

/// Drop replies whose caller already gave up waiting for the ack.
fn prune_abandoned(pending: &mut HashMap<u64, PendingAck>) {
    pending.retain(|_, ack| match ack {
        PendingAck::UnreadSync => true,
        PendingAck::Reply(reply) => !reply.is_closed(),
    });
}

fn reject(outbound: Outbound) {
    match outbound {
        Outbound::Emit { command, done } => {
            debug!(event = command.event_name(), "Rejecting command while disconnected");
            let _ = done.send(Err(Error::Channel("not connected".to_string())));
        }
        Outbound::Request { reply, .. } => {
            let _ = reply.send(Err(Error::Channel("not connected".to_string())));
        }
    }
}
