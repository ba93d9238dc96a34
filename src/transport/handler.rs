//! Event handler seam between the transport and the subsystems.
//!
//! The transport owns no subsystem state. It parses each push event,
//! looks up the handler registered for the event's
//! [`EventKind`](crate::protocol::EventKind), and calls
//! it inline on the event loop, so events for one subscription are delivered
//! in wire order.

use crate::protocol::{Notification, ParsedEvent};

/// Receives push events of one or more [`EventKind`](crate::protocol::EventKind)s.
///
/// Implementations run on the connection's event loop and must not block.
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    ///
    /// Returned notifications are written to the wire before the event loop
    /// processes any further outbound command.
    fn handle(&self, event: &ParsedEvent) -> Vec<Notification>;

    /// Called once when the connection terminates for any reason.
    fn disconnected(&self);
}

