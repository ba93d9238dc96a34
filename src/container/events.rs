//! Container-level event bus.
//!
//! Port and server-ready notifications are pushed by the sandbox without
//! any request. The [`EventBus`] handles
//! [`EventKind::Container`](crate::protocol::EventKind::Container) and
//! delivers each event two ways:
//!
//! - to callbacks registered with [`Container::on`](super::Container::on),
//!   filtered by [`ContainerEventKind`]
//! - to every [`broadcast`] receiver from
//!   [`Container::subscribe`](super::Container::subscribe)
//!
//! Broadcast receivers see `Closed` once the connection drops.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::identifiers::ListenerId;
use crate::protocol::{Notification, ParsedEvent, PortEventKind};
use crate::transport::EventHandler;

// ============================================================================
// Constants
// ============================================================================

/// Buffered events per broadcast receiver before it starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// ContainerEvent
// ============================================================================

/// An event about the container as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// A dev server is ready to serve.
    ServerReady {
        /// Port number.
        port: u16,
        /// Preview URL.
        url: String,
    },
    /// A port opened or closed.
    Port {
        /// Port number.
        port: u16,
        /// Open or close.
        kind: PortEventKind,
        /// Preview URL.
        url: String,
    },
    /// The sandbox reported an error.
    Error {
        /// Error message.
        message: String,
    },
}

impl ContainerEvent {
    /// Returns the kind used for `on` filtering.
    #[must_use]
    pub fn kind(&self) -> ContainerEventKind {
        match self {
            Self::ServerReady { .. } => ContainerEventKind::ServerReady,
            Self::Port { .. } => ContainerEventKind::Port,
            Self::Error { .. } => ContainerEventKind::Error,
        }
    }

    fn from_parsed(event: &ParsedEvent) -> Option<Self> {
        match event {
            ParsedEvent::ServerReady { port, url } => Some(Self::ServerReady {
                port: *port,
                url: url.clone(),
            }),
            ParsedEvent::Port { port, kind, url } => Some(Self::Port {
                port: *port,
                kind: *kind,
                url: url.clone(),
            }),
            ParsedEvent::Error { message } => Some(Self::Error {
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Event names accepted by [`Container::on`](super::Container::on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerEventKind {
    /// `server-ready`
    ServerReady,
    /// `port`
    Port,
    /// `error`
    Error,
}

impl ContainerEventKind {
    /// Returns the wire event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerReady => "server-ready",
            Self::Port => "port",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

type EventListener = Arc<dyn Fn(&ContainerEvent) + Send + Sync>;

/// Fan-out of container events to callbacks and broadcast receivers.
pub(crate) struct EventBus {
    listeners: Mutex<Vec<(ListenerId, ContainerEventKind, EventListener)>>,
    sender: Mutex<Option<broadcast::Sender<ContainerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            listeners: Mutex::new(Vec::new()),
            sender: Mutex::new(Some(sender)),
        }
    }

    pub fn on<F>(&self, kind: ContainerEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ContainerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners.lock().push((id, kind, Arc::new(listener)));
        debug!(listener = %id, event = kind.as_str(), "Container listener added");
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    /// A receiver for every future event. Already closed after disconnect.
    pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn emit(&self, event: ContainerEvent) {
        let kind = event.kind();
        let matching: Vec<EventListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, listener_kind, _)| *listener_kind == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        trace!(event = kind.as_str(), listeners = matching.len(), "Emitting container event");
        for listener in matching {
            listener(&event);
        }

        if let Some(sender) = self.sender.lock().as_ref() {
            // No receivers is fine.
            let _ = sender.send(event);
        }
    }
}

impl EventHandler for EventBus {
    fn handle(&self, event: &ParsedEvent) -> Vec<Notification> {
        match ContainerEvent::from_parsed(event) {
            Some(ContainerEvent::Error { message }) => {
                warn!(%message, "Sandbox reported an error");
                self.emit(ContainerEvent::Error { message });
            }
            Some(container_event) => self.emit(container_event),
            None => trace!(?event, "Non-container event routed to event bus"),
        }
        Vec::new()
    }

    fn disconnected(&self) {
        debug!("Closing container event channel");
        self.sender.lock().take();
    }
}

// ============================================================================
// Tests
// ============================================================================
