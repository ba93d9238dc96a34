//! WebSocket transport layer.
//!
//! This module handles communication between the local end (Rust) and the
//! remote sandbox over a single WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  Container (Rust)    │                         │  Remote sandbox │
//! │                      │        WebSocket        │                 │
//! │  FileSystem ─┐       │◄───────────────────────►│  fs / procs /   │
//! │  Processes  ─┼─► Connection                    │  shell / ports  │
//! │  Watchers   ─┘       │                         │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `connect_async` - Open the WebSocket
//! 2. `Connection::new` - Spawn the event loop (`Connecting`)
//! 3. `Container::attach` - Route push events, boot handshake (`Open`)
//! 4. `Connection::call` / `notify` - Traffic
//! 5. `Container::teardown` or remote close (`Closed` / `Errored`)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `correlator` | Pending-request map |
//! | `handler` | Event handler trait |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Request/response correlation.
mod correlator;

/// Event handler seam.
pub mod handler;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionSettings, ConnectionState};
pub use handler::EventHandler;
