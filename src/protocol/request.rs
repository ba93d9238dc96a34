//! Request, notification and response message types.
//!
//! Defines the message format for correlated calls between the local end
//! (Rust) and the remote sandbox, plus uncorrelated notifications.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Operation;

// ============================================================================
// Request
// ============================================================================

/// A correlated request from local end to remote end.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "operation": { "type": "readFile", "path": "index.js" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// The remote action.
    pub operation: Operation,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            id: RequestId::generate(),
            operation,
        }
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, operation: Operation) -> Self {
        Self { id, operation }
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A fire-and-forget message from local end to remote end.
///
/// Carries no ID; the remote never answers it. Used for shell input and
/// resize, which have no request/response pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// The remote action.
    pub operation: Operation,
}

impl Notification {
    /// Creates a new notification.
    #[inline]
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Errno-style code (`ENOENT`, `EACCES`, ...).
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// A response from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "uuid", "success": true, "data": "file content" }
/// ```
///
/// Error:
/// ```json
/// { "id": "uuid", "success": false, "error": { "code": "ENOENT", "message": "..." } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Whether the operation succeeded.
    pub success: bool,

    /// Result data (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error payload (if failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: RequestId, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates a failure response.
    #[must_use]
    pub fn failure(id: RequestId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(RemoteError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Extracts the data value, returning error if response was a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying the remote code and message.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.data.unwrap_or(Value::Null));
        }

        let RemoteError { code, message } = self.error.unwrap_or_else(|| RemoteError {
            code: "EUNKNOWN".to_string(),
            message: "unknown error".to_string(),
        });
        let message = if message.is_empty() {
            code.clone()
        } else {
            message
        };
        Err(Error::remote(code, message))
    }

    /// Gets a string value from the data object.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 value from the data object.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
