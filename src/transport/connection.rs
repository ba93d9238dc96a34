//! WebSocket connection and event loop.
//!
//! This module handles the single duplex connection to the remote sandbox,
//! including request/response correlation and push-event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the sandbox (responses, push events)
//! - Outgoing requests and notifications from the Rust API
//! - Request/response correlation by UUID
//! - Event routing to the handler registered for each [`EventKind`]
//!
//! When the loop terminates, every pending request is rejected with
//! [`Error::ConnectionClosed`] and every handler is told the connection is
//! gone, so nothing waits on a dead socket.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Event, EventKind, Notification, Operation, Request, Response};

use super::EventHandler;
use super::correlator::{Correlator, PendingRequest};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a correlated request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum pending requests before rejecting new ones.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 256;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of the duplex channel.
///
/// `Connecting → Open → Closed | Errored`. A connection never reopens;
/// reconnecting means booting a new container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, boot handshake not yet complete.
    Connecting,
    /// Ready for traffic.
    Open,
    /// Closed by either side.
    Closed,
    /// Terminated by a transport error.
    Errored,
}

impl ConnectionState {
    /// Returns `true` once the connection can no longer carry traffic.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Deadline applied to every correlated request.
    pub request_timeout: Duration,
    /// Back-pressure limit on in-flight requests.
    pub max_pending_requests: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Send a notification; nothing to wait for.
    Notify(Notification),
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Handlers
// ============================================================================

/// Event handler table shared with the event loop.
#[derive(Default)]
struct Handlers {
    /// Dispatch table.
    by_kind: FxHashMap<EventKind, Arc<dyn EventHandler>>,
    /// Each distinct handler once, for disconnect notification.
    unique: Vec<Arc<dyn EventHandler>>,
    /// Set when the event loop has terminated.
    closed: bool,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the remote sandbox.
///
/// Handles request/response correlation and event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone; clones share one
/// socket. Dropping a clone never closes the socket; only
/// `Container::teardown` or the remote side does.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Pending requests (shared with event loop).
    correlator: Arc<Correlator>,
    /// Event handlers (shared with event loop).
    handlers: Arc<RwLock<Handlers>>,
    /// Lifecycle state (written by event loop).
    state: Arc<RwLock<ConnectionState>>,
    /// Limits.
    settings: ConnectionSettings,
}

impl Connection {
    /// Creates a new connection from an open WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub fn new<S>(ws_stream: WebSocketStream<S>, settings: ConnectionSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new());
        let handlers = Arc::new(RwLock::new(Handlers::default()));
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlator),
            Arc::clone(&handlers),
            Arc::clone(&state),
        ));

        Self {
            command_tx,
            correlator,
            handlers,
            state,
            settings,
        }
    }

    /// Registers `handler` for each of `kinds`, replacing any previous one.
    ///
    /// If the connection has already terminated, the handler is told so
    /// immediately.
    pub(crate) fn set_event_handler(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) {
        {
            let mut guard = self.handlers.write();
            if !guard.closed {
                for kind in kinds {
                    guard.by_kind.insert(*kind, Arc::clone(&handler));
                }
                let known = guard
                    .unique
                    .iter()
                    .any(|h| std::ptr::addr_eq(Arc::as_ptr(h), Arc::as_ptr(&handler)));
                if !known {
                    guard.unique.push(handler);
                }
                return;
            }
        }

        handler.disconnected();
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Returns the configured limits.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Sends an operation and returns the response data.
    ///
    /// # Errors
    ///
    /// - Everything [`Connection::send`] returns
    /// - [`Error::Remote`] if the sandbox reports a failure
    pub async fn call(&self, operation: Operation) -> Result<Value> {
        self.send(Request::new(operation)).await?.into_result()
    }

    /// Sends a request and waits for response with the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::RequestTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending requests
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_with_timeout(request, self.settings.request_timeout)
            .await
    }

    /// Sends a request and waits for response with custom timeout.
    ///
    /// # Arguments
    ///
    /// * `request` - The request to send
    /// * `request_timeout` - Maximum time to wait for response
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::RequestTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending requests
    pub async fn send_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Response> {
        let request_id = request.id;

        // Check pending request limit
        let pending = self.correlator.len();
        if pending >= self.settings.max_pending_requests {
            warn!(
                pending,
                max = self.settings.max_pending_requests,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                pending, self.settings.max_pending_requests
            )));
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // A late response must find nothing to resolve.
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Sends a notification without waiting for anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if connection is closed.
    pub fn notify(&self, notification: Notification) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Notify(notification))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlator.len()
    }

    /// Moves `Connecting` to `Open`. A terminal state is left alone.
    pub(crate) fn mark_open(&self) {
        let mut state = self.state.write();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
        }
    }

    /// Shuts down the connection gracefully.
    pub(crate) fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlator: Arc<Correlator>,
        handlers: Arc<RwLock<Handlers>>,
        state: Arc<RwLock<ConnectionState>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let final_state = loop {
            tokio::select! {
                // Incoming messages from the sandbox
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let replies = Self::handle_incoming_message(
                                &text,
                                &correlator,
                                &handlers,
                            );

                            if !Self::write_notifications(replies, &mut ws_write).await {
                                break ConnectionState::Errored;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break ConnectionState::Closed;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break ConnectionState::Errored;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break ConnectionState::Closed;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            if !Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &correlator,
                            ).await {
                                break ConnectionState::Errored;
                            }
                        }

                        Some(ConnectionCommand::Notify(notification)) => {
                            if !Self::write_notifications(vec![notification], &mut ws_write).await {
                                break ConnectionState::Errored;
                            }
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            if correlator.remove(request_id) {
                                debug!(%request_id, "Removed timed-out correlation");
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break ConnectionState::Closed;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break ConnectionState::Closed;
                        }
                    }
                }
            }
        };

        // New sends fail fast from here on.
        command_rx.close();
        *state.write() = final_state;

        let to_notify = {
            let mut guard = handlers.write();
            guard.closed = true;
            guard.by_kind.clear();
            std::mem::take(&mut guard.unique)
        };
        for handler in to_notify {
            handler.disconnected();
        }

        correlator.fail_all();

        debug!(state = ?final_state, "Event loop terminated");
    }

    /// Handles an incoming text message from the sandbox.
    ///
    /// Returns notifications the handler wants written back.
    fn handle_incoming_message(
        text: &str,
        correlator: &Correlator,
        handlers: &RwLock<Handlers>,
    ) -> Vec<Notification> {
        // Try to parse as Response first
        if let Ok(response) = from_str::<Response>(text) {
            correlator.resolve(response);
            return Vec::new();
        }

        // Try to parse as Event
        if let Ok(event) = from_str::<Event>(text) {
            let Some(kind) = event.kind() else {
                warn!(event = %event.name, "Event for unknown subsystem");
                return Vec::new();
            };

            let handler = handlers.read().by_kind.get(&kind).cloned();
            return match handler {
                Some(handler) => handler.handle(&event.parse()),
                None => {
                    debug!(event = %event.name, ?kind, "No handler registered for event");
                    Vec::new()
                }
            };
        }

        warn!(text = %text, "Failed to parse incoming message");
        Vec::new()
    }

    /// Handles a send command from the Rust API.
    ///
    /// Returns `false` if the socket is no longer writable.
    async fn handle_send_command<S>(
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlator: &Correlator,
    ) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request_id = request.id;
        let operation = request.operation.name();

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return true;
            }
        };

        // Store correlation before sending
        correlator.register(request_id, PendingRequest::new(operation, response_tx));

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            correlator.reject(request_id, Error::connection(e.to_string()));
            return false;
        }

        trace!(%request_id, operation, "Request sent");
        true
    }

    /// Writes notifications in order.
    ///
    /// Returns `false` if the socket is no longer writable.
    async fn write_notifications<S>(
        notifications: Vec<Notification>,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
    ) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        for notification in notifications {
            let json = match to_string(&notification) {
                Ok(j) => j,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize notification");
                    continue;
                }
            };

            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                warn!(error = %e, "Failed to send notification");
                return false;
            }

            trace!(operation = notification.operation.name(), "Notification sent");
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
