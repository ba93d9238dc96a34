//! Error types for the remote container client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use remote_container::{Container, Result};
//!
//! async fn example(container: &Container) -> Result<()> {
//!     container.fs().write_file("index.js", "console.log(1)").await?;
//!     let text = container.fs().read_to_string("index.js").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidPattern`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Remote`] |
//! | Filesystem | [`Error::NotFound`], [`Error::PermissionDenied`], [`Error::Mount`] |
//! | Execution | [`Error::RequestTimeout`], [`Error::ShellClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, ShellId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// MountFailure
// ============================================================================

/// A single entry that could not be materialized during a mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountFailure {
    /// Remote path of the failed entry.
    pub path: String,
    /// Why it failed.
    pub message: String,
}

impl fmt::Display for MountFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Formats the failure list for the [`Error::Mount`] message.
fn join_failures(failures: &[MountFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the container configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// A watch pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// Why compilation failed.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the connection cannot be established or a frame
    /// cannot be written.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout while connecting or booting.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection lost.
    ///
    /// Every in-flight operation fails with this when the transport goes
    /// away, and every call made after teardown returns it.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected response shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The remote side rejected the operation with an error code that has
    /// no dedicated variant.
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Error code reported by the sandbox (e.g. `EISDIR`).
        code: String,
        /// Error message reported by the sandbox.
        message: String,
    },

    // ========================================================================
    // Filesystem Errors
    // ========================================================================
    /// Path does not exist on the remote filesystem.
    #[error("No such file or directory: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// The sandbox refused access to the path.
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// The refused path.
        path: String,
    },

    /// One or more entries failed while mounting a file tree.
    #[error("Mount failed for {} path(s): {}", .failures.len(), join_failures(.failures))]
    Mount {
        /// Every entry that failed, in tree order.
        failures: Vec<MountFailure>,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Request timeout.
    ///
    /// Returned when no response arrives within the request deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Input was written to a shell session that has already exited.
    #[error("Shell session closed: {shell_id}")]
    ShellClosed {
        /// The closed shell.
        shell_id: ShellId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid pattern error.
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[inline]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a permission denied error.
    #[inline]
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// Creates a mount error.
    #[inline]
    pub fn mount(failures: Vec<MountFailure>) -> Self {
        Self::Mount { failures }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a shell closed error.
    #[inline]
    pub fn shell_closed(shell_id: ShellId) -> Self {
        Self::ShellClosed { shell_id }
    }

    /// Rewrites a remote errno-style error into a path-aware variant.
    ///
    /// `ENOENT` becomes [`Error::NotFound`], `EACCES`/`EPERM` become
    /// [`Error::PermissionDenied`]. Everything else is returned unchanged.
    #[must_use]
    pub fn at_path(self, path: &str) -> Self {
        match self {
            Self::Remote { code, .. } if code == "ENOENT" => Self::not_found(path),
            Self::Remote { code, .. } if code == "EACCES" || code == "EPERM" => {
                Self::permission_denied(path)
            }
            other => other,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the remote path was missing.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
