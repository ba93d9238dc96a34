//! File trees for bulk mounts, and directory listing entries.
//!
//! A [`FileSystemTree`] deserializes from the nested shape used by sandbox
//! fixtures:
//!
//! ```json
//! {
//!   "package.json": { "file": { "contents": "{}" } },
//!   "src": { "directory": { "index.js": { "file": { "contents": "" } } } }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// FileContents
// ============================================================================

/// Content of a file node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContents {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl FileContents {
    /// Returns the content as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for FileContents {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FileContents {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for FileContents {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

// ============================================================================
// FileNode
// ============================================================================

/// A file or a directory in a [`FileSystemTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileNode {
    /// A file with its content.
    File {
        /// File content.
        contents: FileContents,
    },
    /// A directory with its children.
    Directory(FileSystemTree),
}

// ============================================================================
// FileSystemTree
// ============================================================================

/// A nested map of names to files and directories.
///
/// Entries iterate in name order, which is also the order mount failures
/// are reported in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSystemTree(BTreeMap<String, FileNode>);

impl FileSystemTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, contents: impl Into<FileContents>) -> Self {
        self.0.insert(
            name.into(),
            FileNode::File {
                contents: contents.into(),
            },
        );
        self
    }

    /// Adds a directory.
    #[must_use]
    pub fn directory(mut self, name: impl Into<String>, tree: FileSystemTree) -> Self {
        self.0.insert(name.into(), FileNode::Directory(tree));
        self
    }

    /// Inserts a node, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, node: FileNode) -> Option<FileNode> {
        self.0.insert(name.into(), node)
    }

    /// Returns the top-level node named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FileNode> {
        self.0.get(name)
    }

    /// Iterates top-level entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileNode)> {
        self.0.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flattens the tree under `base` into mount steps.
    ///
    /// Directories come parents-first so each `mkdir` finds its parent.
    pub(crate) fn flatten(&self, base: &str) -> MountPlan<'_> {
        let mut plan = MountPlan::default();
        self.flatten_into(base, &mut plan);
        plan
    }

    fn flatten_into<'a>(&'a self, base: &str, plan: &mut MountPlan<'a>) {
        for (name, node) in &self.0 {
            let path = join_path(base, name);
            match node {
                FileNode::File { contents } => plan.files.push((path, contents)),
                FileNode::Directory(children) => {
                    plan.directories.push(path.clone());
                    children.flatten_into(&path, plan);
                }
            }
        }
    }
}

impl FromIterator<(String, FileNode)> for FileSystemTree {
    fn from_iter<I: IntoIterator<Item = (String, FileNode)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Directories and files to create for a mount.
#[derive(Debug, Default)]
pub(crate) struct MountPlan<'a> {
    /// Directory paths, parents first.
    pub directories: Vec<String>,
    /// File paths with their content, in tree order.
    pub files: Vec<(String, &'a FileContents)>,
}

/// Joins a relative name onto a base path. An empty base is the root.
pub(crate) fn join_path(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() || base == "." {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

// ============================================================================
// DirEntry
// ============================================================================

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirEntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// One entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name, without the parent path.
    pub name: String,
    /// File or directory.
    #[serde(rename = "type")]
    pub kind: DirEntryKind,
}

impl DirEntry {
    /// Returns `true` for files.
    #[inline]
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == DirEntryKind::File
    }

    /// Returns `true` for directories.
    #[inline]
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == DirEntryKind::Directory
    }
}

// ============================================================================
// Tests
// ============================================================================
