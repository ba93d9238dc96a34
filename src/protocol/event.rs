//! Push event message types.
//!
//! Events are notifications the remote sandbox sends on its own initiative:
//! filesystem changes, process and shell output, and port lifecycle.
//!
//! # Event Types
//!
//! | Kind | Events |
//! |------|--------|
//! | [`EventKind::Watch`] | `watch`, `watch-paths` |
//! | [`EventKind::Process`] | `process.output`, `process.exit` |
//! | [`EventKind::Shell`] | `shell.ready`, `shell.output`, `shell.exit` |
//! | [`EventKind::Container`] | `port`, `server-ready`, `error` |

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::identifiers::{ProcessId, ShellId, WatcherId};

// ============================================================================
// Event
// ============================================================================

/// A push notification from remote end to local end.
///
/// # Format
///
/// ```json
/// {
///   "type": "event",
///   "event": "process.output",
///   "params": { "processId": "uuid", "data": "Hello\n" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name.
    #[serde(rename = "event")]
    pub name: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Creates an event frame.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            event_type: "event".to_string(),
            name: name.into(),
            params,
        }
    }

    /// Returns the subsystem this event is routed to.
    ///
    /// `None` for names no subsystem understands.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        match self.name.as_str() {
            "watch" | "watch-paths" => Some(EventKind::Watch),
            "port" | "server-ready" | "error" => Some(EventKind::Container),
            name if name.starts_with("process.") => Some(EventKind::Process),
            name if name.starts_with("shell.") => Some(EventKind::Shell),
            _ => None,
        }
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        self.parse_internal()
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Routing class of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Filesystem watch notifications.
    Watch,
    /// One-shot process output and exit.
    Process,
    /// Interactive shell lifecycle and output.
    Shell,
    /// Container-level lifecycle (ports, server-ready, errors).
    Container,
}

// ============================================================================
// Path Watcher Events
// ============================================================================

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathEventKind {
    /// File content changed.
    Change,
    /// File created.
    Add,
    /// Directory created.
    AddDir,
    /// File removed.
    Unlink,
    /// Directory removed.
    UnlinkDir,
    /// Entry renamed.
    Rename,
    /// Anything else the remote reports.
    #[serde(other)]
    Other,
}

/// One filesystem change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathWatcherEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: PathEventKind,

    /// Path relative to the working directory.
    pub path: String,

    /// New content, when the watcher asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl PathWatcherEvent {
    /// Creates an event without content.
    #[must_use]
    pub fn new(kind: PathEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            content: None,
        }
    }
}

// ============================================================================
// Port Events
// ============================================================================

/// Whether a port started or stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortEventKind {
    /// A socket started listening.
    Open,
    /// A socket stopped listening.
    Close,
}

// ============================================================================
// Param Shapes
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchParams {
    watcher_id: WatcherId,
    #[serde(flatten)]
    event: PathWatcherEvent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchPathsParams {
    watcher_id: WatcherId,
    #[serde(default)]
    events: Vec<PathWatcherEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessOutputParams {
    process_id: ProcessId,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessExitParams {
    process_id: ProcessId,
    exit_code: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShellParams {
    shell_id: ShellId,
    #[serde(default)]
    data: String,
    #[serde(default)]
    exit_code: Option<i32>,
}

#[derive(Deserialize)]
struct PortParams {
    port: u16,
    #[serde(rename = "type")]
    kind: PortEventKind,
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct ServerReadyParams {
    port: u16,
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct ErrorParams {
    #[serde(default)]
    message: String,
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Single change on a `watch` subscription.
    Watch {
        /// Subscription.
        watcher_id: WatcherId,
        /// The change.
        event: PathWatcherEvent,
    },

    /// Batch of changes on a `watch-paths` subscription.
    WatchPaths {
        /// Subscription.
        watcher_id: WatcherId,
        /// Changes, in emission order.
        events: Vec<PathWatcherEvent>,
    },

    /// Output chunk from a spawned process.
    ProcessOutput {
        /// Process.
        process_id: ProcessId,
        /// Output text.
        data: String,
    },

    /// A spawned process exited.
    ProcessExit {
        /// Process.
        process_id: ProcessId,
        /// Exit code.
        exit_code: i32,
    },

    /// A shell is accepting input.
    ShellReady {
        /// Shell.
        shell_id: ShellId,
    },

    /// Output chunk from a shell.
    ShellOutput {
        /// Shell.
        shell_id: ShellId,
        /// Output text.
        data: String,
    },

    /// A shell exited.
    ShellExit {
        /// Shell.
        shell_id: ShellId,
        /// Exit code, if reported.
        exit_code: Option<i32>,
    },

    /// A port opened or closed.
    Port {
        /// Port number.
        port: u16,
        /// Open or close.
        kind: PortEventKind,
        /// Preview URL for the port.
        url: String,
    },

    /// A dev server is ready to serve.
    ServerReady {
        /// Port number.
        port: u16,
        /// Preview URL.
        url: String,
    },

    /// The sandbox reported a container-level error.
    Error {
        /// Error message.
        message: String,
    },

    /// Unknown or malformed event.
    Unknown {
        /// Event name.
        name: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Event Parsing Implementation
// ============================================================================

impl Event {
    /// Internal parsing implementation.
    fn parse_internal(&self) -> ParsedEvent {
        let parsed = match self.name.as_str() {
            "watch" => self.params_as::<WatchParams>().map(|p| ParsedEvent::Watch {
                watcher_id: p.watcher_id,
                event: p.event,
            }),

            "watch-paths" => self
                .params_as::<WatchPathsParams>()
                .map(|p| ParsedEvent::WatchPaths {
                    watcher_id: p.watcher_id,
                    events: p.events,
                }),

            "process.output" => {
                self.params_as::<ProcessOutputParams>()
                    .map(|p| ParsedEvent::ProcessOutput {
                        process_id: p.process_id,
                        data: p.data,
                    })
            }

            "process.exit" => self
                .params_as::<ProcessExitParams>()
                .map(|p| ParsedEvent::ProcessExit {
                    process_id: p.process_id,
                    exit_code: p.exit_code,
                }),

            "shell.ready" => self
                .params_as::<ShellParams>()
                .map(|p| ParsedEvent::ShellReady {
                    shell_id: p.shell_id,
                }),

            "shell.output" => self
                .params_as::<ShellParams>()
                .map(|p| ParsedEvent::ShellOutput {
                    shell_id: p.shell_id,
                    data: p.data,
                }),

            "shell.exit" => self
                .params_as::<ShellParams>()
                .map(|p| ParsedEvent::ShellExit {
                    shell_id: p.shell_id,
                    exit_code: p.exit_code,
                }),

            "port" => self.params_as::<PortParams>().map(|p| ParsedEvent::Port {
                port: p.port,
                kind: p.kind,
                url: p.url,
            }),

            "server-ready" => self
                .params_as::<ServerReadyParams>()
                .map(|p| ParsedEvent::ServerReady {
                    port: p.port,
                    url: p.url,
                }),

            "error" => self
                .params_as::<ErrorParams>()
                .map(|p| ParsedEvent::Error { message: p.message }),

            _ => None,
        };

        parsed.unwrap_or_else(|| ParsedEvent::Unknown {
            name: self.name.clone(),
            params: self.params.clone(),
        })
    }

    /// Deserializes params, logging malformed payloads.
    fn params_as<T: DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_value(self.params.clone()) {
            Ok(params) => Some(params),
            Err(e) => {
                warn!(event = %self.name, error = %e, "Malformed event params");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
