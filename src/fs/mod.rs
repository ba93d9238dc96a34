//! Remote filesystem client.
//!
//! [`FileSystem`] wraps the connection with path-oriented operations on the
//! sandbox's working directory. Paths are relative to that directory.
//!
//! # Example
//!
//! ```ignore
//! let fs = container.fs();
//!
//! fs.mkdir("src", MkdirOptions::recursive()).await?;
//! fs.write_file("src/index.js", "console.log(1)").await?;
//!
//! for entry in fs.readdir("src").await? {
//!     println!("{} ({:?})", entry.name, entry.kind);
//! }
//!
//! let watcher = fs.watch("src", WatchOptions::recursive()).await?;
//! watcher.add_listener(|event| println!("{:?} {}", event.kind, event.path));
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `files` | read, write, mkdir, readdir, rm |
//! | `mount` | Bulk tree materialization |
//! | `pattern` | Glob matching for watch filters |
//! | `tree` | [`FileSystemTree`] and [`DirEntry`] |
//! | `watch` | Watch subscriptions and handles |

// ============================================================================
// Submodules
// ============================================================================

/// read, write, mkdir, readdir, rm.
mod files;

/// Bulk tree materialization.
mod mount;

/// Glob matching for watch filters.
pub mod pattern;

/// File trees and directory entries.
pub mod tree;

/// Watch subscriptions.
pub mod watch;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::protocol::{EventKind, PathWatcherEvent, WatchOptions, WatchPathsOptions};
use crate::transport::Connection;

use self::watch::WatchRegistry;

// ============================================================================
// Re-exports
// ============================================================================

pub use files::{MkdirOptions, RmOptions};
pub use mount::MOUNT_CONCURRENCY;
pub use pattern::GlobPattern;
pub use tree::{DirEntry, DirEntryKind, FileContents, FileNode, FileSystemTree};
pub use watch::{PathWatcher, WatcherHandle};

// ============================================================================
// FileSystem
// ============================================================================

/// Filesystem operations against the remote working directory.
///
/// Cheap to clone; clones share the connection and watch registry.
#[derive(Clone)]
pub struct FileSystem {
    connection: Connection,
    watchers: Arc<WatchRegistry>,
}

impl FileSystem {
    /// Creates a filesystem client and routes watch events to it.
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        let watchers = Arc::new(WatchRegistry::new());
        connection.set_event_handler(&[EventKind::Watch], Arc::clone(&watchers) as _);
        Self {
            connection,
            watchers,
        }
    }

    /// Number of live watch subscriptions.
    #[inline]
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Watches a path or glob pattern for single change events.
    ///
    /// A literal path reports changes to itself and its direct children,
    /// or all descendants with [`WatchOptions::recursive`]. Attach listeners
    /// with [`WatcherHandle::add_listener`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPattern`](crate::Error::InvalidPattern) for a malformed glob
    /// - [`Error::NotFound`](crate::Error::NotFound) if the sandbox reports the path missing
    pub async fn watch(&self, pattern: &str, options: WatchOptions) -> Result<WatcherHandle> {
        debug!(pattern, recursive = options.recursive, "Watching path");
        WatcherHandle::open(&self.connection, &self.watchers, pattern, options).await
    }

    /// Watches include/exclude path sets, delivering changes in batches.
    ///
    /// Each batch holds only the events that pass the include and exclude
    /// sets; batches left empty after filtering are not delivered.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPattern`](crate::Error::InvalidPattern) for a malformed glob
    /// - Any error the sandbox returns for the subscription
    pub async fn watch_paths<F>(
        &self,
        options: WatchPathsOptions,
        callback: F,
    ) -> Result<PathWatcher>
    where
        F: Fn(&[PathWatcherEvent]) + Send + Sync + 'static,
    {
        debug!(
            include = options.include.len(),
            exclude = options.exclude.len(),
            "Watching path set"
        );
        PathWatcher::open(&self.connection, &self.watchers, options, callback).await
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("state", &self.connection.state())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}
