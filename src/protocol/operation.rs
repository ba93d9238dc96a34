//! Operation definitions.
//!
//! Every remote action is one [`Operation`] variant, serialized as an
//! internally tagged object:
//!
//! ```json
//! { "type": "readFile", "path": "src/index.js", "encoding": "utf-8" }
//! ```
//!
//! # Operations
//!
//! | Group | Types |
//! |-------|-------|
//! | Lifecycle | `boot` |
//! | Filesystem | `readFile`, `writeFile`, `mkdir`, `readdir`, `rm` |
//! | Watch | `watch`, `watch-paths`, `unwatch` |
//! | Process | `spawn`, `kill` |
//! | Shell | `spawnShell`, `shellInput`, `shellResize` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::{ProcessId, ShellId, WatcherId};

// ============================================================================
// Encoding
// ============================================================================

/// Content encoding for file payloads on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Plain UTF-8 text.
    #[serde(rename = "utf-8")]
    Utf8,
    /// Base64 of the raw bytes.
    #[serde(rename = "base64")]
    Base64,
}

// ============================================================================
// Option Types
// ============================================================================

/// Options for a single-pattern watch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    /// Also report changes below the watched directory.
    #[serde(default)]
    pub recursive: bool,
}

impl WatchOptions {
    /// Recursive watch options.
    #[inline]
    #[must_use]
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// Include/exclude glob sets for a multi-path watch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchPathsOptions {
    /// Glob patterns to report.
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob patterns to suppress, applied after `include`.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Forward the file content with each change.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_content: bool,
}

impl WatchPathsOptions {
    /// Creates options that include the given patterns.
    #[must_use]
    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds exclude patterns.
    #[must_use]
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Columns.
    pub cols: u16,
    /// Rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Creates a terminal size.
    #[inline]
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

// ============================================================================
// Operation
// ============================================================================

/// One remote action.
///
/// Immutable once constructed; the client builds one per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Operation {
    /// Handshake that binds the session to a working directory.
    #[serde(rename = "boot")]
    Boot {
        /// Name of the working directory to create or reuse.
        workdir_name: String,
    },

    /// Read a file.
    #[serde(rename = "readFile")]
    ReadFile {
        /// Path relative to the working directory.
        path: String,
        /// Requested encoding of the returned content.
        #[serde(skip_serializing_if = "Option::is_none")]
        encoding: Option<Encoding>,
    },

    /// Create or overwrite a file.
    #[serde(rename = "writeFile")]
    WriteFile {
        /// Path relative to the working directory.
        path: String,
        /// Content, encoded per `encoding`.
        content: String,
        /// How `content` is encoded.
        encoding: Encoding,
    },

    /// Create a directory.
    #[serde(rename = "mkdir")]
    Mkdir {
        /// Directory path.
        path: String,
        /// Create missing parents.
        #[serde(default)]
        recursive: bool,
    },

    /// List a directory.
    #[serde(rename = "readdir")]
    Readdir {
        /// Directory path.
        path: String,
    },

    /// Remove a file or directory.
    #[serde(rename = "rm")]
    Rm {
        /// Path to remove.
        path: String,
        /// Remove directories and their contents.
        #[serde(default)]
        recursive: bool,
        /// Succeed when the path is missing.
        #[serde(default)]
        force: bool,
    },

    /// Watch a single glob pattern.
    #[serde(rename = "watch")]
    Watch {
        /// Client-generated subscription ID.
        watcher_id: WatcherId,
        /// Glob pattern to watch.
        path: String,
        /// Watch options.
        #[serde(default)]
        options: WatchOptions,
    },

    /// Watch an include/exclude path set, delivered in batches.
    #[serde(rename = "watch-paths")]
    WatchPaths {
        /// Client-generated subscription ID.
        watcher_id: WatcherId,
        /// Include/exclude sets.
        options: WatchPathsOptions,
    },

    /// Cancel a watch subscription.
    #[serde(rename = "unwatch")]
    Unwatch {
        /// Subscription to cancel.
        watcher_id: WatcherId,
    },

    /// Spawn a one-shot process.
    #[serde(rename = "spawn")]
    Spawn {
        /// Client-generated process ID.
        process_id: ProcessId,
        /// Executable.
        command: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Working directory override.
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        /// Extra environment variables.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env: Vec<(String, String)>,
        /// Pseudo-terminal size, if the process should get one.
        #[serde(skip_serializing_if = "Option::is_none")]
        terminal: Option<TerminalSize>,
    },

    /// Terminate a spawned process.
    #[serde(rename = "kill")]
    Kill {
        /// Process to terminate.
        process_id: ProcessId,
    },

    /// Allocate an interactive shell.
    #[serde(rename = "spawnShell")]
    SpawnShell {
        /// Client-generated shell ID.
        shell_id: ShellId,
        /// Initial terminal size.
        #[serde(skip_serializing_if = "Option::is_none")]
        terminal: Option<TerminalSize>,
    },

    /// Forward keystrokes to a shell. Sent as a notification.
    #[serde(rename = "shellInput")]
    ShellInput {
        /// Target shell.
        shell_id: ShellId,
        /// Raw input.
        data: String,
    },

    /// Resize a shell's terminal. Sent as a notification.
    #[serde(rename = "shellResize")]
    ShellResize {
        /// Target shell.
        shell_id: ShellId,
        /// New size.
        size: TerminalSize,
    },
}

impl Operation {
    /// Returns the wire `type` tag, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boot { .. } => "boot",
            Self::ReadFile { .. } => "readFile",
            Self::WriteFile { .. } => "writeFile",
            Self::Mkdir { .. } => "mkdir",
            Self::Readdir { .. } => "readdir",
            Self::Rm { .. } => "rm",
            Self::Watch { .. } => "watch",
            Self::WatchPaths { .. } => "watch-paths",
            Self::Unwatch { .. } => "unwatch",
            Self::Spawn { .. } => "spawn",
            Self::Kill { .. } => "kill",
            Self::SpawnShell { .. } => "spawnShell",
            Self::ShellInput { .. } => "shellInput",
            Self::ShellResize { .. } => "shellResize",
        }
    }

    /// Returns the filesystem path this operation targets, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::ReadFile { path, .. }
            | Self::WriteFile { path, .. }
            | Self::Mkdir { path, .. }
            | Self::Readdir { path }
            | Self::Rm { path, .. }
            | Self::Watch { path, .. } => Some(path),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
