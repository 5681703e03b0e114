//! FUSE adapter: maps [`fuser::Filesystem`] callbacks to [`Vfs`].
//!
//! Each callback translates inode numbers to paths through the [`InodeTable`]. Metadata calls are
//! answered inline from the live snapshot. Reads are spawned on the tokio runtime and reply from
//! the spawned task, so a slow remote never holds up the FUSE session loop.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, error, instrument};

use super::bridge::{InodeTable, ROOT_INODE};
use super::vfs::{Vfs, VfsError, join};
use super::{InodeAddr, NodeAttr, NodeKind, OpenFlags};
use crate::remote::RemoteContent;

const BLOCK_SIZE: u32 = 4096;
const MAX_NAME_LEN: u32 = 255;

impl From<NodeKind> for fuser::FileType {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => Self::RegularFile,
            NodeKind::Directory => Self::Directory,
        }
    }
}

/// Ownership and timestamps shared by every node.
#[derive(Debug, Clone, Copy)]
pub struct MountIdentity {
    /// Owner of every node.
    pub uid: u32,
    /// Group of every node.
    pub gid: u32,
    /// Reported as every node's access, modification and creation time.
    pub mounted_at: SystemTime,
}

impl MountIdentity {
    fn attr(&self, ino: InodeAddr, node: NodeAttr) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: node.size,
            blocks: node.size.div_ceil(512),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: node.kind.into(),
            perm: node.perm.bits(),
            nlink: node.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

/// Bridges a [`Vfs`] to the [`fuser::Filesystem`] trait.
pub struct FuserAdapter<C> {
    vfs: Arc<Vfs<C>>,
    inodes: Arc<InodeTable>,
    identity: MountIdentity,
    runtime: tokio::runtime::Handle,
}

impl<C: RemoteContent> FuserAdapter<C> {
    // The tree only changes on refresh, but the kernel has no way to hear about it, so attributes
    // and entries are only trusted for a short while.
    const ATTR_TTL: Duration = Duration::from_secs(1);

    /// Create an adapter serving `vfs`, spawning work onto `runtime`.
    pub fn new(vfs: Arc<Vfs<C>>, identity: MountIdentity, runtime: tokio::runtime::Handle) -> Self {
        Self {
            vfs,
            inodes: Arc::new(InodeTable::new()),
            identity,
            runtime,
        }
    }

    fn path_of(&self, ino: InodeAddr) -> Result<Arc<str>, VfsError> {
        self.inodes
            .path(ino)
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))
    }
}

impl<C: RemoteContent> fuser::Filesystem for FuserAdapter<C> {
    #[instrument(name = "FuserAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let result = self.path_of(parent).and_then(|dir| {
            let name = name
                .to_str()
                .ok_or_else(|| VfsError::NotFound(name.to_string_lossy().into_owned()))?;
            let path = join(&dir, name);
            let attr = self.vfs.stat(&path)?;
            Ok((self.inodes.inode_or_insert(&path), attr))
        });
        match result {
            Ok((ino, attr)) => {
                let f_attr = self.identity.attr(ino, attr);
                debug!(?f_attr, "replying...");
                reply.entry(&Self::ATTR_TTL, &f_attr, 0);
            }
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.into());
            }
        }
    }

    #[instrument(name = "FuserAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        match self.path_of(ino).and_then(|path| self.vfs.stat(&path)) {
            Ok(attr) => {
                let f_attr = self.identity.attr(ino, attr);
                debug!(?f_attr, "replying...");
                reply.attr(&Self::ATTR_TTL, &f_attr);
            }
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.into());
            }
        }
    }

    #[instrument(name = "FuserAdapter::readdir", skip(self, _req, _fh, offset, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let listing = match self
            .path_of(ino)
            .and_then(|path| self.vfs.list_directory(&path))
        {
            Ok(listing) => listing,
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.into());
                return;
            }
        };

        let parent_ino = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            self.inodes.inode_or_insert(listing.parent_path())
        };

        #[expect(
            clippy::cast_possible_truncation,
            reason = "fuser offset is i64 but always non-negative"
        )]
        for (i, entry) in listing
            .iter()
            .enumerate()
            .skip(offset.cast_unsigned() as usize)
        {
            let entry_ino = match entry.name {
                "." => ino,
                ".." => parent_ino,
                name => self.inodes.inode_or_insert(&listing.child_path(name)),
            };
            let Ok(idx): Result<i64, _> = (i + 1).try_into() else {
                error!("Directory entry index {} too large for fuser", i + 1);
                reply.error(libc::EIO);
                return;
            };

            debug!(?entry, "adding entry to reply...");
            if reply.add(entry_ino, idx, fuser::FileType::from(entry.kind), entry.name) {
                debug!("buffer full for now, stopping readdir");
                break;
            }
        }

        debug!("finalizing reply...");
        reply.ok();
    }

    #[instrument(name = "FuserAdapter::open", skip(self, _req, flags, reply))]
    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        let flags = OpenFlags::from(flags);
        match self
            .path_of(ino)
            .and_then(|path| self.vfs.open_file(&path, flags))
        {
            Ok(fh) => {
                debug!(handle = fh, "replying...");
                reply.opened(fh, fuser::consts::FOPEN_KEEP_CACHE);
            }
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.into());
            }
        }
    }

    #[instrument(
        name = "FuserAdapter::read",
        skip(self, _req, _fh, _flags, _lock_owner, reply)
    )]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.into());
                return;
            }
        };
        let vfs = Arc::clone(&self.vfs);
        self.runtime.spawn(async move {
            match vfs.read(&path, size, offset.cast_unsigned()).await {
                Ok(data) => {
                    debug!(read_bytes = data.len(), "replying...");
                    reply.data(&data);
                }
                Err(e) => {
                    error!(path = %path, error = %e, "read failed");
                    reply.error(e.into());
                }
            }
        });
    }

    #[instrument(name = "FuserAdapter::release", skip(self, _req, _flags, _lock_owner, _flush, reply))]
    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        let path = self.inodes.path(ino).unwrap_or_else(|| Arc::from(""));
        match self.vfs.release(&path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.into()),
        }
    }

    #[instrument(name = "FuserAdapter::statfs", skip(self, _req, _ino, reply))]
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let stats = self.vfs.statfs();
        debug!(?stats, "replying...");
        let blocks = stats.total_bytes.div_ceil(u64::from(BLOCK_SIZE));
        reply.statfs(
            blocks,
            0,
            0,
            stats.files + stats.directories,
            0,
            BLOCK_SIZE,
            MAX_NAME_LEN,
            BLOCK_SIZE,
        );
    }
}
