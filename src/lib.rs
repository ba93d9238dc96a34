//! Remote Container - Client for remote development sandboxes.
//!
//! This library drives a remote development container over a single
//! WebSocket: read and write files, watch for changes, spawn processes and
//! attach interactive shells.
//!
//! # Architecture
//!
//! The client follows a request/event model:
//!
//! - **Local End (Rust)**: Sends operations, receives responses and push events
//! - **Remote End (Sandbox)**: Executes operations, emits watch/process/shell events
//!
//! Key design principles:
//!
//! - Each [`Container`] owns: WebSocket connection + event loop + registries
//! - Requests carry a correlation ID; responses resolve exactly one caller
//! - Push events route by kind to the filesystem, process, or container layer
//! - No reconnect: a dropped connection fails everything; boot again
//!
//! # Quick Start
//!
//! ```no_run
//! use remote_container::{Container, FileSystemTree, Result, WatchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let container = Container::builder()
//!         .url("ws://127.0.0.1:9000")
//!         .workdir_name("todo-app")
//!         .boot()
//!         .await?;
//!
//!     // Lay out a project
//!     let tree = FileSystemTree::new()
//!         .file("package.json", r#"{ "name": "todo-app" }"#)
//!         .directory("src", FileSystemTree::new().file("index.js", "console.log('hi')"));
//!     container.mount(&tree).await?;
//!
//!     // Watch it
//!     let watcher = container.fs().watch("src/**/*.js", WatchOptions::default()).await?;
//!     watcher.add_listener(|event| println!("{:?} {}", event.kind, event.path));
//!
//!     // Run it
//!     let result = container.spawn("node", ["src/index.js"]).await?.wait_with_output().await?;
//!     println!("exit {}: {}", result.exit_code, result.output);
//!
//!     container.teardown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`container`] | [`Container`] facade, builder and event bus |
//! | [`fs`] | [`FileSystem`] client, mount and watchers |
//! | [`process`] | [`Processes`] client, processes and shells |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types (internal) |
//! | [`transport`] | Connection and correlation (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Container facade.
///
/// Use [`Container::builder()`] to configure and boot a container.
pub mod container;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Remote filesystem client.
///
/// - [`FileSystem`] - Reads, writes, directories, mount
/// - [`WatcherHandle`] - Pattern watcher with listeners
/// - [`PathWatcher`] - Batched include/exclude watcher
pub mod fs;

/// Type-safe identifiers for remote entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Remote process client.
///
/// - [`Process`] - One-shot command with output stream and exit future
/// - [`ShellSession`] - Interactive shell bound to a [`Terminal`]
pub mod process;

/// WebSocket protocol message types.
///
/// Internal module defining request/response/event structures.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling the connection, its event loop, and request
/// correlation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Container types
pub use container::{
    Container, ContainerBuilder, ContainerConfig, ContainerEvent, ContainerEventKind,
    RemoteContainerFactory,
};

// Filesystem types
pub use fs::{
    DirEntry, DirEntryKind, FileContents, FileNode, FileSystem, FileSystemTree, GlobPattern,
    MkdirOptions, PathWatcher, RmOptions, WatcherHandle,
};

// Process types
pub use process::{
    CompletedProcess, Process, ProcessExit, ProcessOutput, Processes, ShellSession, ShellState,
    SpawnOptions, Terminal,
};

// Protocol types surfaced in the public API
pub use protocol::{
    PathEventKind, PathWatcherEvent, PortEventKind, TerminalSize, WatchOptions, WatchPathsOptions,
};

// Error types
pub use error::{Error, MountFailure, Result};

// Identifier types
pub use identifiers::{ListenerId, ProcessId, RequestId, ShellId, WatcherId};
