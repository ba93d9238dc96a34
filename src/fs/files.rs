//! read, write, mkdir, readdir, rm.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Encoding, Operation};

use super::FileSystem;
use super::tree::DirEntry;

// ============================================================================
// Options
// ============================================================================

/// Options for [`FileSystem::mkdir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    /// Create missing parents; succeed if the directory exists.
    pub recursive: bool,
}

impl MkdirOptions {
    /// `mkdir -p`.
    #[inline]
    #[must_use]
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// Options for [`FileSystem::rm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmOptions {
    /// Remove directories and their contents.
    pub recursive: bool,
    /// Succeed when the path is missing.
    pub force: bool,
}

impl RmOptions {
    /// `rm -r`.
    #[inline]
    #[must_use]
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            force: false,
        }
    }

    /// Also ignore missing paths (`rm -f`).
    #[inline]
    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

// ============================================================================
// FileSystem - Files
// ============================================================================

impl FileSystem {
    /// Reads a file as raw bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path does not exist
    /// - [`Error::Remote`] with `EISDIR` if the path is a directory
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        debug!(path, "Reading file");

        let data = self
            .call_at(
                path,
                Operation::ReadFile {
                    path: path.to_string(),
                    encoding: Some(Encoding::Base64),
                },
            )
            .await?;

        let encoded = data
            .as_str()
            .ok_or_else(|| Error::protocol("readFile returned non-string content"))?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::protocol(format!("readFile returned invalid base64: {e}")))?;

        debug!(path, len = bytes.len(), "Read file");
        Ok(bytes)
    }

    /// Reads a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`FileSystem::read_file`].
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        debug!(path, "Reading file as text");

        let data = self
            .call_at(
                path,
                Operation::ReadFile {
                    path: path.to_string(),
                    encoding: Some(Encoding::Utf8),
                },
            )
            .await?;

        match data {
            Value::String(text) => Ok(text),
            other => Err(Error::protocol(format!(
                "readFile returned non-string content: {other}"
            ))),
        }
    }

    /// Creates or overwrites a file.
    ///
    /// Valid UTF-8 goes over the wire as text, anything else as base64.
    /// The parent directory must exist.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the parent directory does not exist
    pub async fn write_file(&self, path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let bytes = content.as_ref();
        let (content, encoding) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), Encoding::Utf8),
            Err(_) => (BASE64.encode(bytes), Encoding::Base64),
        };
        debug!(path, len = bytes.len(), ?encoding, "Writing file");

        self.call_at(
            path,
            Operation::WriteFile {
                path: path.to_string(),
                content,
                encoding,
            },
        )
        .await?;
        Ok(())
    }

    /// Creates a directory.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if a parent is missing and `recursive` is off
    /// - [`Error::Remote`] with `EEXIST` if it exists and `recursive` is off
    pub async fn mkdir(&self, path: &str, options: MkdirOptions) -> Result<()> {
        debug!(path, recursive = options.recursive, "Creating directory");

        self.call_at(
            path,
            Operation::Mkdir {
                path: path.to_string(),
                recursive: options.recursive,
            },
        )
        .await?;
        Ok(())
    }

    /// Lists a directory.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path does not exist
    /// - [`Error::Remote`] with `ENOTDIR` if the path is a file
    pub async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!(path, "Reading directory");

        let data = self
            .call_at(
                path,
                Operation::Readdir {
                    path: path.to_string(),
                },
            )
            .await?;

        let entries: Vec<DirEntry> = serde_json::from_value(data)?;
        debug!(path, count = entries.len(), "Read directory");
        Ok(entries)
    }

    /// Removes a file or directory.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path is missing and `force` is off
    /// - [`Error::Remote`] with `ENOTEMPTY` for a non-empty directory
    ///   without `recursive`
    pub async fn rm(&self, path: &str, options: RmOptions) -> Result<()> {
        debug!(
            path,
            recursive = options.recursive,
            force = options.force,
            "Removing path"
        );

        self.call_at(
            path,
            Operation::Rm {
                path: path.to_string(),
                recursive: options.recursive,
                force: options.force,
            },
        )
        .await?;
        Ok(())
    }

    /// Sends `operation` and maps errno-style failures onto `path`.
    async fn call_at(&self, path: &str, operation: Operation) -> Result<Value> {
        self.connection
            .call(operation)
            .await
            .map_err(|e| e.at_path(path))
    }
}

// ============================================================================
// Tests
// ============================================================================
