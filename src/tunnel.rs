// CacheLink Agent - Hub Tunnel (Connection Manager)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Owns the single outbound WebSocket to the hub.
// Disconnected -> Connecting -> Connected -> Registered -> Disconnected.
// On connect: send register. On ack: store + print session token.
// On close/error: clear token, wait the fixed delay, reconnect.
// Requests run on the blocking pool; responses go back through the Outbox,
// which silently drops anything sent while the socket is not open.

use crate::config::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::protocol::{self, Inbound, Outbound, Register, RequestEnvelope};
use crate::session::AgentSession;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

/// How long a closing socket gets to flush its close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Registered,
}

/// Why a connection ended
enum Disconnect {
    /// Hub closed the socket or the stream ended
    Closed,
    /// Local shutdown requested
    Shutdown,
}

// ============================================================================
// OUTBOX — send gate
// ============================================================================

/// Cloneable handle for outbound frames. Sends are dropped, not queued,
/// once the connection is no longer open.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Message>, open: Arc<AtomicBool>) -> Self {
        Self { tx, open }
    }

    /// Returns true if the frame was handed to the writer
    pub fn send(&self, msg: &Outbound) -> bool {
        match msg.encode() {
            Ok(text) => self.send_frame(Message::Text(text.into())),
            Err(e) => {
                log::error!("failed to encode outbound message: {}", e);
                false
            }
        }
    }

    fn send_frame(&self, frame: Message) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            log::debug!("connection not open, dropping outbound frame");
            return false;
        }
        self.tx.send(frame).is_ok()
    }
}

// ============================================================================
// RECONNECT TIMER
// ============================================================================

/// Fixed-delay reconnect schedule. Arming while a wait is already pending
/// is a no-op so two reconnects can never overlap.
pub struct ReconnectTimer {
    delay: Duration,
    pending: bool,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: false }
    }

    /// Returns false if a reconnect is already scheduled
    pub fn arm(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Sleep out the delay and clear the pending flag
    pub async fn elapsed(&mut self) {
        tokio::time::sleep(self.delay).await;
        self.pending = false;
    }
}

// ============================================================================
// TUNNEL
// ============================================================================

pub struct Tunnel {
    config: AgentConfig,
    dispatcher: Arc<Dispatcher>,
    session: AgentSession,
    state: watch::Sender<ConnectionState>,
    reconnect: ReconnectTimer,
    token: watch::Sender<Option<String>>,
}

impl Tunnel {
    pub fn new(config: AgentConfig, dispatcher: Dispatcher) -> Self {
        let session = AgentSession::new(dispatcher.fs().root().path());
        let reconnect = ReconnectTimer::new(config.reconnect_delay());
        let (token, _) = watch::channel(None);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            session,
            state,
            reconnect,
            token,
        }
    }

    /// Observe connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Observe the current session token (None while unregistered)
    pub fn subscribe_token(&self) -> watch::Receiver<Option<String>> {
        self.token.subscribe()
    }

    /// Connect, serve, reconnect. Returns once `shutdown` flips to true or
    /// its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            log::info!("connecting to hub at {}", self.config.hub_url);

            let outcome = self.connect_and_serve(&mut shutdown).await;
            self.on_disconnect();

            match outcome {
                Ok(Disconnect::Shutdown) => break,
                Ok(Disconnect::Closed) => log::info!("hub connection closed"),
                Err(e) => log::warn!("hub connection error: {}", e),
            }

            if !self.reconnect.arm() {
                continue;
            }
            log::info!("reconnecting in {}s", self.config.reconnect_delay_secs);
            tokio::select! {
                _ = self.reconnect.elapsed() => {}
                _ = shutdown.changed() => break,
            }
        }

        log::info!("tunnel stopped");
    }

    /// One connection: connect, register, handle frames until disconnect.
    async fn connect_and_serve(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Disconnect> {
        let connect = tokio_tungstenite::connect_async_with_config(
            self.config.hub_url.as_str(),
            Some(socket_config()),
            false,
        );
        let (ws, _response) = tokio::select! {
            res = connect => res?,
            _ = shutdown.changed() => return Ok(Disconnect::Shutdown),
        };
        let (mut sink, mut stream) = ws.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let open = Arc::new(AtomicBool::new(true));
        let outbox = Outbox::new(tx, open.clone());

        let mut writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = sink.send(frame).await {
                    log::debug!("write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        self.set_state(ConnectionState::Connected);
        self.session.connected();
        self.register(&outbox);

        let mut reason = Disconnect::Closed;
        let mut result: Result<()> = Ok(());
        loop {
            tokio::select! {
                frame = stream.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            result = Err(e.into());
                            break;
                        }
                        None => break,
                    };
                    match frame {
                        Message::Text(text) => self.handle_frame(text.as_str(), &outbox),
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                _ = shutdown.changed() => {
                    reason = Disconnect::Shutdown;
                    break;
                }
            }
        }

        // Writer exits after the close frame, or on the write error if the
        // hub already closed its side
        outbox.send_frame(Message::Close(None));
        open.store(false, Ordering::SeqCst);
        drop(outbox);
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }

        result.map(|_| reason)
    }

    fn register(&mut self, outbox: &Outbox) {
        let cache_files = self.dispatcher.fs()
            .preview(self.config.register_preview_limit)
            .unwrap_or_else(|e| {
                log::warn!("could not list cache root for registration: {}", e);
                Vec::new()
            });

        let msg = Outbound::Register(Register {
            agent_id: self.session.agent_id.clone(),
            cache_path: self.session.cache_root.to_string_lossy().to_string(),
            cache_files,
        });
        outbox.send(&msg);
        log::info!("connected, registering as {}", self.session.agent_id);
    }

    fn handle_frame(&mut self, text: &str, outbox: &Outbox) {
        let inbound = match protocol::decode(text) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("dropping inbound frame: {}", e);
                return;
            }
        };

        match inbound {
            Inbound::Registered(r) => {
                self.session.registered(r.session_token.clone());
                self.set_state(ConnectionState::Registered);
                self.token.send_replace(Some(r.session_token.clone()));

                println!();
                println!("  Connected to CacheLink hub");
                println!("  Session token: {}", r.session_token);
                println!("  Enter this token in the editor to open {}", self.session.cache_root.display());
                println!();
            }
            Inbound::Request(req) => {
                self.session.record_request();
                self.spawn_request(req, outbox.clone());
            }
            Inbound::Error(e) => log::error!("hub error: {}", e.message),
            Inbound::Other(kind) => log::info!("ignoring message type: {}", kind),
        }
    }

    fn spawn_request(&self, req: RequestEnvelope, outbox: Outbox) {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::task::spawn_blocking(move || {
            let response = dispatcher.dispatch(&req);
            outbox.send(&Outbound::Response(response));
        });
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        log::debug!("connection state {:?} -> {:?}", prev, next);
    }

    fn on_disconnect(&mut self) {
        if self.session.connected_at.is_some() {
            log::info!("session ended: {}", self.session.status_summary());
        }
        self.set_state(ConnectionState::Disconnected);
        self.session.disconnected();
        self.token.send_replace(None);
    }
}

/// No frame or message cap: a writeFile carries a whole cache file
fn socket_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(None)
        .max_frame_size(None)
}

// ============================================================================
// TESTS
// ============================================================================
