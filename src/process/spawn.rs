//! One-shot processes.
//!
//! A [`Process`] splits into a [`ProcessOutput`] stream and a
//! [`ProcessExit`] future. Output is buffered without bound, so it can be
//! read before or after the process exits. The stream ends once the exit
//! arrives.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::ProcessId;
use crate::protocol::{Operation, TerminalSize};
use crate::transport::Connection;

// ============================================================================
// SpawnOptions
// ============================================================================

/// Extra settings for a spawned process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Working directory, relative to the container's workdir.
    pub cwd: Option<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Run under a pseudo-terminal of this size.
    pub terminal: Option<TerminalSize>,
}

impl SpawnOptions {
    /// Creates default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Allocates a pseudo-terminal.
    #[must_use]
    pub fn terminal(mut self, size: TerminalSize) -> Self {
        self.terminal = Some(size);
        self
    }
}

// ============================================================================
// ProcessOutput
// ============================================================================

/// Output chunks of a process, in arrival order.
///
/// Finite and not restartable. Ends when the process exits or the
/// connection drops.
pub struct ProcessOutput {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ProcessOutput {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self { rx }
    }

    /// Reads the remaining output into one string.
    pub async fn read_to_string(&mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk);
        }
        text
    }
}

impl Stream for ProcessOutput {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

impl fmt::Debug for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOutput").finish_non_exhaustive()
    }
}

// ============================================================================
// ProcessExit
// ============================================================================

/// Resolves with the exit code.
///
/// Resolves to [`Error::ConnectionClosed`] if the connection drops first.
/// The outcome is kept, so awaiting again yields it immediately.
pub struct ProcessExit {
    rx: oneshot::Receiver<Result<i32>>,
    resolved: Option<Option<i32>>,
}

impl ProcessExit {
    pub(crate) fn new(rx: oneshot::Receiver<Result<i32>>) -> Self {
        Self { rx, resolved: None }
    }
}

impl Future for ProcessExit {
    type Output = Result<i32>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(code) = self.resolved {
            return Poll::Ready(code.ok_or(Error::ConnectionClosed));
        }
        // The registry only ever fails an exit with `ConnectionClosed`.
        let code = ready!(Pin::new(&mut self.rx).poll(cx))
            .ok()
            .and_then(Result::ok);
        self.resolved = Some(code);
        Poll::Ready(code.ok_or(Error::ConnectionClosed))
    }
}

impl fmt::Debug for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessExit").finish_non_exhaustive()
    }
}

// ============================================================================
// Process
// ============================================================================

/// Output and exit code of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedProcess {
    /// Everything the process wrote.
    pub output: String,
    /// Exit code.
    pub exit_code: i32,
}

impl CompletedProcess {
    /// Returns `true` for exit code 0.
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A spawned one-shot process.
///
/// # Example
///
/// ```ignore
/// let mut process = container.spawn("npm", ["install"]).await?;
/// while let Some(chunk) = process.output().next().await {
///     print!("{chunk}");
/// }
/// let code = process.wait().await?;
/// ```
pub struct Process {
    id: ProcessId,
    command: String,
    output: ProcessOutput,
    exit: ProcessExit,
    connection: Connection,
}

impl Process {
    pub(crate) fn new(
        id: ProcessId,
        command: String,
        output: ProcessOutput,
        exit: ProcessExit,
        connection: Connection,
    ) -> Self {
        Self {
            id,
            command,
            output,
            exit,
            connection,
        }
    }

    /// Returns the process ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Returns the command that was spawned.
    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the output stream.
    #[inline]
    pub fn output(&mut self) -> &mut ProcessOutput {
        &mut self.output
    }

    /// Returns the exit future.
    #[inline]
    pub fn exit(&mut self) -> &mut ProcessExit {
        &mut self.exit
    }

    /// Splits into output stream and exit future.
    #[must_use]
    pub fn into_parts(self) -> (ProcessOutput, ProcessExit) {
        (self.output, self.exit)
    }

    /// Waits for the exit code, discarding unread output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection dropped first.
    pub async fn wait(self) -> Result<i32> {
        self.exit.await
    }

    /// Reads all output, then waits for the exit code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection dropped first.
    pub async fn wait_with_output(mut self) -> Result<CompletedProcess> {
        let output = self.output.read_to_string().await;
        let exit_code = self.exit.await?;
        Ok(CompletedProcess { output, exit_code })
    }

    /// Asks the sandbox to terminate the process.
    ///
    /// The exit code still arrives through [`Process::exit`].
    ///
    /// # Errors
    ///
    /// Returns the remote error if the process is unknown to the sandbox.
    pub async fn kill(&self) -> Result<()> {
        debug!(process_id = %self.id, command = %self.command, "Killing process");
        self.connection
            .call(Operation::Kill {
                process_id: self.id,
            })
            .await?;
        Ok(())
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
