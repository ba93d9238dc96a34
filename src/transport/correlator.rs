//! Request/response correlation.
//!
//! The [`Correlator`] owns the pending-request map. Each entry is resolved
//! or rejected exactly once: the entry is removed from the map before its
//! channel fires, so a duplicate or late response finds nothing and is
//! logged and dropped.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Channel the caller awaits for its response.
pub(crate) type ResponseSender = oneshot::Sender<Result<Response>>;

/// An in-flight request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    /// Operation type, for logging.
    pub operation: &'static str,
    /// When the request was registered.
    pub created_at: Instant,
    /// Resolves the caller.
    pub response_tx: ResponseSender,
}

impl PendingRequest {
    /// Creates a pending request stamped with the current time.
    pub fn new(operation: &'static str, response_tx: ResponseSender) -> Self {
        Self {
            operation,
            created_at: Instant::now(),
            response_tx,
        }
    }
}

// ============================================================================
// Correlator
// ============================================================================

/// Tracks in-flight requests until they resolve, time out, or the
/// connection drops.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    pending: Mutex<FxHashMap<RequestId, PendingRequest>>,
}

impl Correlator {
    /// Creates an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of in-flight requests.
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Registers a request. A reused ID replaces (and rejects) the old entry.
    pub fn register(&self, id: RequestId, pending: PendingRequest) {
        if let Some(previous) = self.pending.lock().insert(id, pending) {
            warn!(%id, "Duplicate request id registered");
            let _ = previous
                .response_tx
                .send(Err(Error::protocol(format!("Request id {id} reused"))));
        }
    }

    /// Delivers a response to its caller.
    ///
    /// Returns `false` when no request with that ID is pending (unknown,
    /// duplicate, or already timed out).
    pub fn resolve(&self, response: Response) -> bool {
        let id = response.id;
        let Some(pending) = self.pending.lock().remove(&id) else {
            warn!(%id, "Response for unknown request");
            return false;
        };

        trace!(
            %id,
            operation = pending.operation,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Response received"
        );

        // The caller may have given up already; nothing else to do then.
        let _ = pending.response_tx.send(Ok(response));
        true
    }

    /// Rejects one request with the given error.
    pub fn reject(&self, id: RequestId, error: Error) -> bool {
        match self.pending.lock().remove(&id) {
            Some(pending) => {
                let _ = pending.response_tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drops a request without notifying its caller (used after a timeout).
    pub fn remove(&self, id: RequestId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Rejects every pending request with [`Error::ConnectionClosed`].
    pub fn fail_all(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        let count = pending.len();

        for (_, request) in pending {
            let _ = request.response_tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
        count
    }
}

// ============================================================================
// Tests
// ============================================================================
