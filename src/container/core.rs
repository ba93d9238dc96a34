//! The booted container.
//!
//! Each [`Container`] owns:
//! - One WebSocket connection and its event loop
//! - One [`FileSystem`] client with its watch registry
//! - One [`Processes`] client with its process/shell registry
//! - One event bus for port and server-ready notifications
//!
//! # Example
//!
//! ```no_run
//! use remote_container::{Container, ContainerEventKind};
//!
//! # async fn example() -> remote_container::Result<()> {
//! let container = Container::builder()
//!     .url("ws://127.0.0.1:9000")
//!     .workdir_name("todo-app")
//!     .boot()
//!     .await?;
//!
//! container.on(ContainerEventKind::ServerReady, |event| println!("{event:?}"));
//!
//! container.fs().write_file("index.js", "console.log('hi')").await?;
//! let result = container.spawn("node", ["index.js"]).await?.wait_with_output().await?;
//! println!("{}", result.output);
//!
//! container.teardown();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fs::{FileSystem, FileSystemTree};
use crate::identifiers::ListenerId;
use crate::process::{Process, Processes, ShellSession, SpawnOptions, Terminal};
use crate::protocol::{EventKind, Operation};
use crate::transport::{Connection, ConnectionState};

use super::builder::ContainerBuilder;
use super::config::ContainerConfig;
use super::events::{ContainerEvent, ContainerEventKind, EventBus};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a container.
pub(crate) struct ContainerInner {
    /// Duplex connection to the sandbox.
    connection: Connection,
    /// Filesystem client.
    fs: FileSystem,
    /// Process and shell client.
    processes: Processes,
    /// Port / server-ready fan-out.
    events: Arc<EventBus>,
    /// Absolute working directory reported by the sandbox.
    workdir: String,
}

// ============================================================================
// Container
// ============================================================================

/// A handle to a booted remote container.
///
/// Cheap to clone; clones share one connection. Nothing is torn down on
/// drop: [`Container::teardown`] is the only way to close the connection.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

/// Entry-point alias for [`Container`].
pub type RemoteContainerFactory = Container;

// ============================================================================
// Container - Display
// ============================================================================

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("workdir", &self.inner.workdir)
            .field("state", &self.inner.connection.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Container - Boot
// ============================================================================

impl Container {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Connects to the sandbox and boots a container.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the config is invalid
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the deadline
    /// - [`Error::Connection`] if the WebSocket cannot be opened
    /// - Any error the sandbox returns for `boot`
    pub async fn boot(config: ContainerConfig) -> Result<Self> {
        let url = config.validate()?;
        info!(url = %url, workdir_name = %config.workdir_name, "Booting container");

        let connect_timeout = config.connect_timeout();
        let (ws_stream, _) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;
        debug!(url = %url, "WebSocket connection established");

        let connection = Connection::new(ws_stream, config.connection_settings());
        Self::attach(connection, &config.workdir_name).await
    }

    /// Boots a container over an already-open connection.
    ///
    /// The connection is shut down if the boot handshake fails.
    ///
    /// # Errors
    ///
    /// - Any error the sandbox returns for `boot`
    /// - [`Error::Protocol`] if the response lacks the working directory
    pub async fn attach(connection: Connection, workdir_name: &str) -> Result<Self> {
        let fs = FileSystem::new(connection.clone());
        let processes = Processes::new(connection.clone());
        let events = Arc::new(EventBus::new());
        connection.set_event_handler(&[EventKind::Container], Arc::clone(&events) as _);

        let workdir = match Self::handshake(&connection, workdir_name).await {
            Ok(workdir) => workdir,
            Err(e) => {
                connection.shutdown();
                return Err(e);
            }
        };

        connection.mark_open();
        info!(workdir = %workdir, "Container booted");
        Ok(Self {
            inner: Arc::new(ContainerInner {
                connection,
                fs,
                processes,
                events,
                workdir,
            }),
        })
    }

    async fn handshake(connection: &Connection, workdir_name: &str) -> Result<String> {
        let data = connection
            .call(Operation::Boot {
                workdir_name: workdir_name.to_string(),
            })
            .await?;

        data.get("workdir")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::protocol("Expected workdir in boot response"))
    }
}

// ============================================================================
// Container - Accessors
// ============================================================================

impl Container {
    /// Returns the filesystem client.
    #[inline]
    #[must_use]
    pub fn fs(&self) -> &FileSystem {
        &self.inner.fs
    }

    /// Returns the process client.
    #[inline]
    #[must_use]
    pub fn processes(&self) -> &Processes {
        &self.inner.processes
    }

    /// Returns the absolute working directory on the sandbox.
    #[inline]
    #[must_use]
    pub fn workdir(&self) -> &str {
        &self.inner.workdir
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }
}

// ============================================================================
// Container - Files
// ============================================================================

impl Container {
    /// Materializes `tree` at the working directory root.
    ///
    /// # Errors
    ///
    /// See [`FileSystem::mount`].
    pub async fn mount(&self, tree: &FileSystemTree) -> Result<()> {
        self.inner.fs.mount(tree).await
    }

    /// Materializes `tree` under `mount_point`.
    ///
    /// # Errors
    ///
    /// See [`FileSystem::mount_at`].
    pub async fn mount_at(&self, tree: &FileSystemTree, mount_point: &str) -> Result<()> {
        self.inner.fs.mount_at(tree, mount_point).await
    }
}

// ============================================================================
// Container - Processes
// ============================================================================

impl Container {
    /// Spawns a one-shot process.
    ///
    /// # Errors
    ///
    /// See [`Processes::spawn`].
    pub async fn spawn<I, S>(&self, command: &str, args: I) -> Result<Process>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.processes.spawn(command, args).await
    }

    /// Spawns a one-shot process with extra options.
    ///
    /// # Errors
    ///
    /// See [`Processes::spawn_with`].
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
        self.inner.processes.spawn_with(command, args, options).await
    }

    /// Allocates an interactive shell bound to `terminal`.
    ///
    /// # Errors
    ///
    /// See [`Processes::spawn_shell`].
    pub async fn spawn_shell<T>(&self, terminal: T) -> Result<ShellSession>
    where
        T: Terminal + 'static,
    {
        self.inner.processes.spawn_shell(terminal).await
    }
}

// ============================================================================
// Container - Events
// ============================================================================

impl Container {
    /// Calls `listener` for every event of `kind`.
    pub fn on<F>(&self, kind: ContainerEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ContainerEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    /// Returns a receiver for every future container event.
    ///
    /// The receiver reports `Closed` once the connection drops.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.inner.events.subscribe()
    }
}

// ============================================================================
// Container - Lifecycle
// ============================================================================

impl Container {
    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.connection.pending_count()
    }

    /// Closes the connection.
    ///
    /// In-flight calls fail with [`Error::ConnectionClosed`], process exits
    /// reject, shells close and watchers stop. There is no reconnect; boot a
    /// new container instead.
    pub fn teardown(&self) {
        info!(workdir = %self.inner.workdir, "Tearing down container");
        self.inner.connection.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_container_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Container>();
    }

    #[test]
    fn test_container_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<Container>();
    }

    #[test]
    fn test_container_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Container>();
    }

    #[tokio::test]
    async fn test_boot_refused_connection() {
        // Port 1 is never listening in test environments.
        let config = ContainerBuilder::new()
            .url("ws://127.0.0.1:1")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("valid config");

        let err = Container::boot(config).await.expect_err("no server");
        assert!(err.is_connection_error(), "{err}");
    }
}
