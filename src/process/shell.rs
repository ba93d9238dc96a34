//! Interactive shell sessions.
//!
//! # State Machine
//!
//! ```text
//! Created ──shell.ready──► Ready ──shell.exit──► Closed
//!    │                                              ▲
//!    └──────────── connection lost ─────────────────┘
//! ```
//!
//! Input written while `Created` is queued and flushed in order when the
//! shell becomes ready, ahead of any later write. Input written once
//! `Closed` fails with [`Error::ShellClosed`]. Output goes straight to the
//! caller's [`Terminal`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ShellId;
use crate::protocol::{Notification, Operation, TerminalSize};
use crate::transport::Connection;

// ============================================================================
// Terminal
// ============================================================================

/// Terminal-like consumer of shell output.
///
/// Called on the connection's event loop; implementations must not block.
/// Closures `Fn(&str)` implement it with no fixed size.
pub trait Terminal: Send + Sync {
    /// Receives one chunk of output.
    fn write(&self, data: &str);

    /// Initial size to allocate the shell with.
    fn dimensions(&self) -> Option<TerminalSize> {
        None
    }
}

impl<F> Terminal for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write(&self, data: &str) {
        self(data)
    }
}

// ============================================================================
// ShellState
// ============================================================================

/// Lifecycle of a shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Requested; not yet accepting input.
    Created,
    /// Accepting input.
    Ready,
    /// Exited or disconnected.
    Closed,
}

// ============================================================================
// ShellShared
// ============================================================================

struct ShellInner {
    state: ShellState,
    /// Input and resizes issued before `Ready`.
    queue: Vec<Operation>,
    reached_ready: bool,
    exit_code: Option<i32>,
}

/// State shared between a session's handles and the process registry.
pub(crate) struct ShellShared {
    id: ShellId,
    terminal: Arc<dyn Terminal>,
    inner: Mutex<ShellInner>,
    state_tx: watch::Sender<ShellState>,
}

impl ShellShared {
    pub fn new(id: ShellId, terminal: Arc<dyn Terminal>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ShellState::Created);
        Arc::new(Self {
            id,
            terminal,
            inner: Mutex::new(ShellInner {
                state: ShellState::Created,
                queue: Vec::new(),
                reached_ready: false,
                exit_code: None,
            }),
            state_tx,
        })
    }

    /// `Created → Ready`. Returns the queued input for the event loop to
    /// write before anything else.
    pub fn mark_ready(&self) -> Vec<Notification> {
        let mut inner = self.inner.lock();
        if inner.state != ShellState::Created {
            trace!(shell_id = %self.id, state = ?inner.state, "Ignoring repeated shell.ready");
            return Vec::new();
        }

        inner.state = ShellState::Ready;
        inner.reached_ready = true;
        let flushed: Vec<Notification> = inner.queue.drain(..).map(Notification::new).collect();
        self.state_tx.send_replace(ShellState::Ready);

        debug!(shell_id = %self.id, flushed = flushed.len(), "Shell ready");
        flushed
    }

    /// `* → Closed`. Drops any input still queued.
    pub fn mark_closed(&self, exit_code: Option<i32>) {
        let mut inner = self.inner.lock();
        if inner.state == ShellState::Closed {
            return;
        }
        if !inner.queue.is_empty() {
            debug!(shell_id = %self.id, dropped = inner.queue.len(), "Dropping queued shell input");
        }
        inner.state = ShellState::Closed;
        inner.queue.clear();
        inner.exit_code = exit_code;
        self.state_tx.send_replace(ShellState::Closed);

        debug!(shell_id = %self.id, ?exit_code, "Shell closed");
    }

    /// Forwards output to the terminal.
    pub fn output(&self, data: &str) {
        self.terminal.write(data);
    }
}

// ============================================================================
// ShellSession
// ============================================================================

/// An interactive shell.
///
/// Cheap to clone; clones drive the same session.
///
/// # Example
///
/// ```ignore
/// let shell = container.spawn_shell(|out: &str| print!("{out}")).await?;
/// shell.write("ls -la\n")?;
/// shell.ready().await?;
/// shell.write("exit\n")?;
/// let code = shell.closed().await;
/// ```
#[derive(Clone)]
pub struct ShellSession {
    shared: Arc<ShellShared>,
    connection: Connection,
}

impl ShellSession {
    pub(crate) fn new(shared: Arc<ShellShared>, connection: Connection) -> Self {
        Self { shared, connection }
    }

    /// Returns the shell ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ShellId {
        self.shared.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ShellState {
        self.shared.inner.lock().state
    }

    /// Returns the exit code once closed, if the sandbox reported one.
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.shared.inner.lock().exit_code
    }

    /// Waits until the shell accepts input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShellClosed`] if the shell closed without ever
    /// becoming ready.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.shared.state_tx.subscribe();
        rx.wait_for(|state| *state != ShellState::Created)
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        if self.shared.inner.lock().reached_ready {
            Ok(())
        } else {
            Err(Error::shell_closed(self.id()))
        }
    }

    /// Waits until the shell closes and returns its exit code.
    pub async fn closed(&self) -> Option<i32> {
        let mut rx = self.shared.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == ShellState::Closed).await;
        self.exit_code()
    }

    /// Sends input to the shell.
    ///
    /// Queued while the shell is starting.
    ///
    /// # Errors
    ///
    /// - [`Error::ShellClosed`] once the shell has closed
    /// - [`Error::ConnectionClosed`] if the connection is gone
    pub fn write(&self, data: impl Into<String>) -> Result<()> {
        self.submit(Operation::ShellInput {
            shell_id: self.id(),
            data: data.into(),
        })
    }

    /// Resizes the shell's terminal.
    ///
    /// # Errors
    ///
    /// Same as [`ShellSession::write`].
    pub fn resize(&self, size: TerminalSize) -> Result<()> {
        self.submit(Operation::ShellResize {
            shell_id: self.id(),
            size,
        })
    }

    /// Queues, sends, or rejects per the current state.
    ///
    /// The lock is held across the send so concurrent writers reach the
    /// wire in lock order.
    fn submit(&self, operation: Operation) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            ShellState::Created => {
                inner.queue.push(operation);
                Ok(())
            }
            ShellState::Ready => self.connection.notify(Notification::new(operation)),
            ShellState::Closed => Err(Error::shell_closed(self.id())),
        }
    }
}

impl fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
