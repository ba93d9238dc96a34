//! Bulk tree materialization.
//!
//! A mount creates every directory first, parents before children, then
//! writes files with bounded concurrency. Every entry is attempted; the
//! failures are collected into one [`Error::Mount`]. Entries below a
//! directory that could not be created are skipped.

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::{Error, MountFailure, Result};

use super::pattern::normalize_path;
use super::tree::FileSystemTree;
use super::{FileSystem, MkdirOptions};

/// Maximum concurrent file writes during a mount.
pub const MOUNT_CONCURRENCY: usize = 16;

impl FileSystem {
    /// Materializes `tree` at the working directory root.
    ///
    /// Existing files are overwritten and existing directories reused.
    ///
    /// # Errors
    ///
    /// - [`Error::Mount`] naming every entry that failed
    /// - A connection error if the connection drops mid-mount
    pub async fn mount(&self, tree: &FileSystemTree) -> Result<()> {
        self.mount_at(tree, "").await
    }

    /// Materializes `tree` under `mount_point`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`FileSystem::mount`].
    pub async fn mount_at(&self, tree: &FileSystemTree, mount_point: &str) -> Result<()> {
        let base = normalize_path(mount_point);
        let plan = tree.flatten(base);
        debug!(
            mount_point = base,
            directories = plan.directories.len(),
            files = plan.files.len(),
            "Mounting tree"
        );

        if !base.is_empty()
            && let Err(e) = self.mkdir(base, MkdirOptions::recursive()).await
        {
            return Err(abort_or_fail(base, e));
        }

        let mut failures = Vec::new();
        let mut failed_dirs: Vec<&str> = Vec::new();

        for dir in &plan.directories {
            if failed_dirs.iter().any(|failed| is_within(dir, failed)) {
                continue;
            }
            if let Err(e) = self.mkdir(dir, MkdirOptions::recursive()).await {
                if e.is_connection_error() {
                    return Err(e);
                }
                warn!(path = %dir, error = %e, "Mount directory failed");
                failures.push(MountFailure {
                    path: dir.clone(),
                    message: e.to_string(),
                });
                failed_dirs.push(dir.as_str());
            }
        }

        let pending = plan
            .files
            .iter()
            .enumerate()
            .filter(|(_, (path, _))| !failed_dirs.iter().any(|failed| is_within(path, failed)));

        let mut results: Vec<(usize, &str, Result<()>)> = stream::iter(pending)
            .map(|(index, (path, contents))| async move {
                (index, path.as_str(), self.write_file(path, contents.as_bytes()).await)
            })
            .buffer_unordered(MOUNT_CONCURRENCY)
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        for (_, path, result) in results {
            let Err(e) = result else { continue };
            if e.is_connection_error() {
                return Err(e);
            }
            warn!(path, error = %e, "Mount file failed");
            failures.push(MountFailure {
                path: path.to_string(),
                message: e.to_string(),
            });
        }

        if failures.is_empty() {
            debug!(mount_point = base, "Mounted tree");
            Ok(())
        } else {
            Err(Error::mount(failures))
        }
    }
}

/// Connection errors end the mount as-is; anything else becomes a failure.
fn abort_or_fail(path: &str, error: Error) -> Error {
    if error.is_connection_error() {
        return error;
    }
    Error::mount(vec![MountFailure {
        path: path.to_string(),
        message: error.to_string(),
    }])
}

/// `true` if `path` is `dir` itself or lies below it.
fn is_within(path: &str, dir: &str) -> bool {
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}
