//! Processes and interactive shells.
//!
//! [`Processes`] spawns one-shot [`Process`]es and [`ShellSession`]s over
//! the connection. Every process and shell gets a client-generated ID that
//! is registered before the request is sent, so output that races ahead of
//! the spawn response is never lost.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Routes process/shell events to handles |
//! | `shell` | [`ShellSession`], [`Terminal`] |
//! | `spawn` | [`Process`], [`ProcessOutput`], [`ProcessExit`] |

// ============================================================================
// Submodules
// ============================================================================

/// Event routing for processes and shells.
mod registry;

/// Interactive shell sessions.
pub mod shell;

/// One-shot processes.
pub mod spawn;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::Result;
use crate::identifiers::{ProcessId, ShellId};
use crate::protocol::{EventKind, Operation};
use crate::transport::Connection;

use self::registry::{ProcessEntry, ProcessRegistry};
use self::shell::ShellShared;

// ============================================================================
// Re-exports
// ============================================================================

pub use shell::{ShellSession, ShellState, Terminal};
pub use spawn::{CompletedProcess, Process, ProcessExit, ProcessOutput, SpawnOptions};

// ============================================================================
// Processes
// ============================================================================

/// Process and shell spawning against the remote sandbox.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Processes {
    connection: Connection,
    registry: Arc<ProcessRegistry>,
}

impl Processes {
    /// Creates a process client and routes process/shell events to it.
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        connection.set_event_handler(
            &[EventKind::Process, EventKind::Shell],
            Arc::clone(&registry) as _,
        );
        Self {
            connection,
            registry,
        }
    }

    /// Spawns `command` with `args`.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the sandbox cannot start the command.
    pub async fn spawn<I, S>(&self, command: &str, args: I) -> Result<Process>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spawn_with(command, args, SpawnOptions::default())
            .await
    }

    /// Spawns `command` with `args` and extra options.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the sandbox cannot start the command.
    pub async fn spawn_with<I, S>(
        &self,
        command: &str,
        args: I,
        options: SpawnOptions,
    ) -> Result<Process>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = ProcessId::generate();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        debug!(process_id = %id, command, ?args, "Spawning process");

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        self.registry
            .insert_process(id, ProcessEntry { output_tx, exit_tx });

        let operation = Operation::Spawn {
            process_id: id,
            command: command.to_string(),
            args,
            cwd: options.cwd,
            env: options.env,
            terminal: options.terminal,
        };
        if let Err(e) = self.connection.call(operation).await {
            self.registry.remove_process(id);
            return Err(e);
        }

        Ok(Process::new(
            id,
            command.to_string(),
            ProcessOutput::new(output_rx),
            ProcessExit::new(exit_rx),
            self.connection.clone(),
        ))
    }

    /// Allocates an interactive shell bound to `terminal`.
    ///
    /// Returns as soon as the sandbox accepts the request; the session
    /// starts in [`ShellState::Created`]. Await [`ShellSession::ready`]
    /// before relying on the prompt.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the sandbox cannot allocate a shell.
    pub async fn spawn_shell<T>(&self, terminal: T) -> Result<ShellSession>
    where
        T: Terminal + 'static,
    {
        let id = ShellId::generate();
        let size = terminal.dimensions();
        debug!(shell_id = %id, ?size, "Spawning shell");

        let shared = ShellShared::new(id, Arc::new(terminal));
        self.registry.insert_shell(id, Arc::clone(&shared));

        let operation = Operation::SpawnShell {
            shell_id: id,
            terminal: size,
        };
        if let Err(e) = self.connection.call(operation).await {
            self.registry.remove_shell(id);
            return Err(e);
        }

        Ok(ShellSession::new(shared, self.connection.clone()))
    }

    /// Number of processes still running.
    #[must_use]
    pub fn running(&self) -> usize {
        self.registry.len().0
    }

    /// Number of shells still open.
    #[must_use]
    pub fn open_shells(&self) -> usize {
        self.registry.len().1
    }
}

impl fmt::Debug for Processes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (processes, shells) = self.registry.len();
        f.debug_struct("Processes")
            .field("running", &processes)
            .field("shells", &shells)
            .finish()
    }
}
