//! Type-safe identifiers for container entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time: a
//! [`WatcherId`] can never be passed where a [`ProcessId`] is expected.
//!
//! All identifiers except [`ListenerId`] are UUID v4 tokens generated on the
//! client and shared with the remote side. Listener IDs never leave the
//! process and are a plain monotonic counter.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// UUID Identifiers
// ============================================================================

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_identifier!(
    /// Correlation token linking one outbound request to its response.
    RequestId
);

uuid_identifier!(
    /// Identifies one `watch` or `watchPaths` subscription.
    WatcherId
);

uuid_identifier!(
    /// Identifies one spawned process.
    ProcessId
);

uuid_identifier!(
    /// Identifies one interactive shell session.
    ShellId
);

// ============================================================================
// ListenerId
// ============================================================================

/// Monotonic source for [`ListenerId`].
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered callback, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
