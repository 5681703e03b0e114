//! Bidirectional path to inode mapping.
//!
//! [`InodeTable`] hands out inode numbers to namespace paths on first sight. Numbers are never
//! reused or reclaimed, so a path keeps its inode across namespace refreshes and a kernel holding
//! a stale inode simply gets `ENOENT` once the path disappears.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::InodeAddr;
use crate::namespace::{self, ROOT};

/// The root directory's inode.
pub const ROOT_INODE: InodeAddr = 1;

/// Stable inode numbering for paths.
///
/// Uses two concurrent `scc::HashMap`s for lock-free reads. Allocation touches both maps and is
/// serialized by a `Mutex<()>` so no reader sees one direction without the other.
pub struct InodeTable {
    /// inode -> path
    fwd: scc::HashMap<InodeAddr, Arc<str>>,
    /// path -> inode
    bwd: scc::HashMap<Arc<str>, InodeAddr>,
    next: AtomicU64,
    mu: Mutex<()>,
}

impl InodeTable {
    /// A table holding only the root.
    #[must_use]
    pub fn new() -> Self {
        let table = Self {
            fwd: scc::HashMap::new(),
            bwd: scc::HashMap::new(),
            next: AtomicU64::new(ROOT_INODE + 1),
            mu: Mutex::new(()),
        };
        let root: Arc<str> = Arc::from(ROOT);
        drop(table.fwd.insert_sync(ROOT_INODE, Arc::clone(&root)));
        drop(table.bwd.insert_sync(root, ROOT_INODE));
        table
    }

    /// The path behind `ino`.
    #[must_use]
    pub fn path(&self, ino: InodeAddr) -> Option<Arc<str>> {
        self.fwd.read_sync(&ino, |_, p| Arc::clone(p))
    }

    /// The inode for `path`, if one was ever assigned.
    #[must_use]
    pub fn inode(&self, path: &str) -> Option<InodeAddr> {
        self.bwd.read_sync(namespace::normalize(path).as_ref(), |_, &ino| ino)
    }

    /// The inode for `path`, assigning the next free number on first sight.
    pub fn inode_or_insert(&self, path: &str) -> InodeAddr {
        let normalized = namespace::normalize(path);
        if let Some(ino) = self.bwd.read_sync(normalized.as_ref(), |_, &ino| ino) {
            return ino;
        }

        let _guard = self.mu.lock().unwrap_or_else(PoisonError::into_inner);
        let key: Arc<str> = Arc::from(normalized.as_ref());
        match self.bwd.entry_sync(Arc::clone(&key)) {
            scc::hash_map::Entry::Occupied(occ) => *occ.get(),
            scc::hash_map::Entry::Vacant(vac) => {
                let ino = self.next.fetch_add(1, Ordering::Relaxed);
                vac.insert_entry(ino);
                drop(self.fwd.insert_sync(ino, key));
                ino
            }
        }
    }

    /// Number of assigned inodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fwd.len()
    }

    /// Always `false`: the root is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
