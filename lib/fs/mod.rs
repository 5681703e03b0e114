//! The read-only filesystem surface.
/// Stable path-to-inode numbering.
pub mod bridge;
/// FUSE adapter: maps [`fuser::Filesystem`] callbacks to [`vfs::Vfs`].
pub mod fuser;
/// Path-based filesystem operations over the published namespace.
pub mod vfs;

use bitflags::bitflags;

/// Type representing an inode identifier.
pub type InodeAddr = u64;

/// Type representing a file handle.
pub type FileHandle = u64;

bitflags! {
    /// Permission bits for an inode, similar to Unix file permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InodePerms: u16 {
        /// Other: execute permission.
        const OTHER_EXECUTE = 1 << 0;
        /// Other: write permission.
        const OTHER_WRITE   = 1 << 1;
        /// Other: read permission.
        const OTHER_READ    = 1 << 2;

        /// Group: execute permission.
        const GROUP_EXECUTE = 1 << 3;
        /// Group: write permission.
        const GROUP_WRITE   = 1 << 4;
        /// Group: read permission.
        const GROUP_READ    = 1 << 5;

        /// Owner: execute permission.
        const OWNER_EXECUTE = 1 << 6;
        /// Owner: write permission.
        const OWNER_WRITE   = 1 << 7;
        /// Owner: read permission.
        const OWNER_READ    = 1 << 8;

        /// `r--r--r--`, used for every file.
        const READ_ONLY = Self::OWNER_READ.bits()
            | Self::GROUP_READ.bits()
            | Self::OTHER_READ.bits();
        /// `rwxr-xr-x`, used for every directory.
        const DIRECTORY = Self::READ_ONLY.bits()
            | Self::OWNER_WRITE.bits()
            | Self::OWNER_EXECUTE.bits()
            | Self::GROUP_EXECUTE.bits()
            | Self::OTHER_EXECUTE.bits();
    }
}

bitflags! {
    /// Flags for opening a file, similar to Unix open(2) flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: i32 {
        /// Open for reading only.
        const RDONLY = libc::O_RDONLY;
        /// Open for writing only.
        const WRONLY = libc::O_WRONLY;
        /// Open for reading and writing.
        const RDWR = libc::O_RDWR;

        /// Append on each write.
        const APPEND = libc::O_APPEND;
        /// Truncate to zero length.
        const TRUNC = libc::O_TRUNC;
        /// Create file if it does not exist.
        const CREAT = libc::O_CREAT;

        /// Non-blocking mode.
        const NONBLOCK = libc::O_NONBLOCK;
        /// Do not follow symlinks.
        const NOFOLLOW = libc::O_NOFOLLOW;
        /// Set close-on-exec.
        const CLOEXEC = libc::O_CLOEXEC;
        /// Fail if not a directory.
        const DIRECTORY = libc::O_DIRECTORY;
    }
}

impl OpenFlags {
    /// Whether the access mode is read-only. Any write access is refused by this filesystem.
    #[must_use]
    pub fn is_read_only(self) -> bool {
        self.bits() & libc::O_ACCMODE == libc::O_RDONLY
    }
}

impl From<i32> for OpenFlags {
    fn from(flags: i32) -> Self {
        Self::from_bits_retain(flags)
    }
}

/// Whether a node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A regular, read-only file.
    File,
    /// A directory.
    Directory,
}

/// Attributes of a node, independent of inode numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAttr {
    /// File or directory.
    pub kind: NodeKind,
    /// Permission bits.
    pub perm: InodePerms,
    /// Link count: 2 for directories, 1 for files.
    pub nlink: u32,
    /// Size in bytes. Zero for directories.
    pub size: u64,
}

impl NodeAttr {
    /// Attributes of a directory.
    #[must_use]
    pub const fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            perm: InodePerms::DIRECTORY,
            nlink: 2,
            size: 0,
        }
    }

    /// Attributes of a file of `size` bytes.
    #[must_use]
    pub const fn file(size: u64) -> Self {
        Self {
            kind: NodeKind::File,
            perm: InodePerms::READ_ONLY,
            nlink: 1,
            size,
        }
    }
}

/// Filesystem-wide statistics for the live snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsStats {
    /// Indexed files.
    pub files: u64,
    /// Directories, root included.
    pub directories: u64,
    /// Sum of every file's size.
    pub total_bytes: u64,
}
