//! Path-based read-only filesystem over the published namespace.
//!
//! Every operation captures the live snapshot once and answers from it, so a refresh landing
//! mid-operation never mixes two trees.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument};

use super::{FileHandle, FsStats, NodeAttr, NodeKind, OpenFlags};
use crate::cache::BlockCache;
use crate::namespace::{self, NamespaceSnapshot, PublishedNamespace};
use crate::remote::{RemoteContent, RemoteError};

/// Errors returned by [`Vfs`] operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No node of the required kind exists at the path.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The request needs write access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Resolving a link or fetching bytes failed.
    #[error("I/O error: {0}")]
    Io(#[from] RemoteError),
}

impl VfsError {
    /// The errno reported to the kernel.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::PermissionDenied(_) => libc::EACCES,
            Self::Io(_) => libc::EIO,
        }
    }
}

impl From<VfsError> for i32 {
    fn from(e: VfsError) -> Self {
        e.errno()
    }
}

/// One entry of a [`DirListing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry<'a> {
    /// Entry name within the directory.
    pub name: &'a str,
    /// Whether the entry is a file or a directory.
    pub kind: NodeKind,
}

/// The contents of one directory, pinned to the snapshot it was read from.
///
/// [`iter`](Self::iter) may be called any number of times and always yields `.`, `..`, then the
/// children in sorted order.
#[derive(Debug, Clone)]
pub struct DirListing {
    snapshot: Arc<NamespaceSnapshot>,
    path: String,
}

impl DirListing {
    /// Normalized path of the listed directory.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Normalized path of the listed directory's parent. The root is its own parent.
    #[must_use]
    pub fn parent_path(&self) -> &str {
        namespace::parent(&self.path)
    }

    /// Full path of the child called `name`.
    #[must_use]
    pub fn child_path(&self, name: &str) -> String {
        join(&self.path, name)
    }

    /// The entries, lazily.
    pub fn iter(&self) -> impl Iterator<Item = DirEntry<'_>> + '_ {
        let children = self.snapshot.children(&self.path).unwrap_or_default();
        let dots = [".", ".."].into_iter().map(|name| DirEntry {
            name,
            kind: NodeKind::Directory,
        });
        dots.chain(children.iter().map(move |name| {
            let kind = if self.snapshot.is_dir(&join(&self.path, name)) {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            DirEntry { name, kind }
        }))
    }

    /// Number of entries, dots included.
    #[must_use]
    pub fn len(&self) -> usize {
        2 + self.snapshot.children(&self.path).map_or(0, <[String]>::len)
    }

    /// Always `false`: every listing carries `.` and `..`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Join a normalized directory path and a child name.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    if dir == namespace::ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Read-only filesystem operations by path.
pub struct Vfs<C> {
    namespace: Arc<PublishedNamespace>,
    blocks: Arc<BlockCache<C>>,
    next_fh: AtomicU64,
}

impl<C: RemoteContent> Vfs<C> {
    /// Serve `namespace`, reading file contents through `blocks`.
    #[must_use]
    pub fn new(namespace: Arc<PublishedNamespace>, blocks: Arc<BlockCache<C>>) -> Self {
        Self {
            namespace,
            blocks,
            next_fh: AtomicU64::new(1),
        }
    }

    /// The published namespace this filesystem reads.
    #[must_use]
    pub fn namespace(&self) -> &Arc<PublishedNamespace> {
        &self.namespace
    }

    /// The block cache reads go through.
    #[must_use]
    pub fn blocks(&self) -> &Arc<BlockCache<C>> {
        &self.blocks
    }

    /// Attributes of the node at `path`.
    pub fn stat(&self, path: &str) -> Result<NodeAttr, VfsError> {
        let snapshot = self.namespace.load();
        if snapshot.is_dir(path) {
            return Ok(NodeAttr::directory());
        }
        snapshot
            .file(path)
            .map(|record| NodeAttr::file(record.file_size))
            .ok_or_else(|| VfsError::NotFound(path.to_owned()))
    }

    /// List the directory at `path`.
    pub fn list_directory(&self, path: &str) -> Result<DirListing, VfsError> {
        let snapshot = self.namespace.load();
        let normalized = namespace::normalize(path).into_owned();
        if !snapshot.is_dir(&normalized) {
            return Err(VfsError::NotFound(path.to_owned()));
        }
        Ok(DirListing {
            snapshot,
            path: normalized,
        })
    }

    /// Open the node at `path`. Only read-only access is granted. No per-handle state is kept.
    pub fn open_file(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, VfsError> {
        if !flags.is_read_only() {
            debug!(path, ?flags, "refusing write access");
            return Err(VfsError::PermissionDenied(path.to_owned()));
        }
        self.stat(path)?;
        Ok(self.next_fh.fetch_add(1, Ordering::Relaxed))
    }

    /// Read up to `size` bytes at `offset` from the file at `path`.
    #[instrument(name = "Vfs::read", skip(self))]
    pub async fn read(&self, path: &str, size: u32, offset: u64) -> Result<Bytes, VfsError> {
        let snapshot = self.namespace.load();
        let normalized = namespace::normalize(path);
        let record = snapshot
            .file(&normalized)
            .ok_or_else(|| VfsError::NotFound(path.to_owned()))?;
        Ok(self
            .blocks
            .read_range(&normalized, record, u64::from(size), offset)
            .await?)
    }

    /// Close a handle. Always succeeds.
    pub fn release(&self, path: &str, handle: FileHandle) -> Result<(), VfsError> {
        debug!(path, handle, "released");
        Ok(())
    }

    /// Totals for the live snapshot.
    #[must_use]
    pub fn statfs(&self) -> FsStats {
        let snapshot = self.namespace.load();
        FsStats {
            files: snapshot.file_count() as u64,
            directories: snapshot.dir_count() as u64,
            total_bytes: snapshot.total_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_the_root() {
        assert_eq!(join("/", "movies"), "/movies");
        assert_eq!(join("/movies", "Foo"), "/movies/Foo");
    }

    #[test]
    fn errors_map_to_errno() {
        assert_eq!(VfsError::NotFound("/x".into()).errno(), libc::ENOENT);
        assert_eq!(VfsError::PermissionDenied("/x".into()).errno(), libc::EACCES);
        assert_eq!(VfsError::Io(RemoteError::Aborted).errno(), libc::EIO);
    }
}
