//! WebSocket protocol message types.
//!
//! This module defines the message format for communication between the
//! local end (Rust) and the remote sandbox.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Correlated operation |
//! | `Notification` | Local → Remote | Uncorrelated operation (shell I/O) |
//! | `Response` | Remote → Local | Operation result |
//! | `Event` | Remote → Local | Push notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `operation` | Operation variants and their options |
//! | `event` | Push events and typed parsing |
//! | `request` | Request, Notification and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Push event message types.
pub mod event;

/// Operation definitions.
pub mod operation;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{Event, EventKind, ParsedEvent, PathEventKind, PathWatcherEvent, PortEventKind};
pub use operation::{Encoding, Operation, TerminalSize, WatchOptions, WatchPathsOptions};
pub use request::{Notification, RemoteError, Request, Response};
