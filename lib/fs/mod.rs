//! Filesystem vocabulary shared by the path graph and its providers.
/// The filesystem primitives the path graph consumes.
pub mod provider;

pub use provider::{FsProvider, RealFs};

use std::fmt;
use std::io;
use std::time::SystemTime;

use bitflags::bitflags;

/// The type of a filesystem entry, as far as it is known.
///
/// Kinds are mutually exclusive. `Unknown` means the entry has not been classified yet (or its
/// classification was withdrawn); it says nothing about existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileKind {
    /// Not yet known. The entry may not even exist.
    #[default]
    Unknown,
    /// A named pipe.
    Fifo,
    /// A character device.
    CharDevice,
    /// A directory.
    Directory,
    /// A block device.
    BlockDevice,
    /// A regular file.
    File,
    /// A symbolic link.
    SymbolicLink,
    /// A unix domain socket.
    Socket,
}

impl FileKind {
    /// Classifies a [`std::fs::FileType`] without following links.
    #[must_use]
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_file() {
            return Self::File;
        }
        if ft.is_dir() {
            return Self::Directory;
        }
        if ft.is_symlink() {
            return Self::SymbolicLink;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt as _;
            if ft.is_char_device() {
                return Self::CharDevice;
            }
            if ft.is_block_device() {
                return Self::BlockDevice;
            }
            if ft.is_socket() {
                return Self::Socket;
            }
            if ft.is_fifo() {
                return Self::Fifo;
            }
        }
        Self::Unknown
    }

    /// Returns `true` for kinds that may have directory entries beneath them: directories,
    /// symlinks (which may point at one) and entries not classified yet.
    #[must_use]
    pub fn may_have_children(self) -> bool {
        matches!(self, Self::Unknown | Self::Directory | Self::SymbolicLink)
    }

    /// The human readable type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Fifo => "FIFO",
            Self::CharDevice => "CharacterDevice",
            Self::Directory => "Directory",
            Self::BlockDevice => "BlockDevice",
            Self::File => "File",
            Self::SymbolicLink => "SymbolicLink",
            Self::Socket => "Socket",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Knowledge a path node has accumulated about itself, independent of its [`FileKind`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// The cached child list reflects a completed directory read.
        const READDIR_CALLED = 1 << 0;
        /// An lstat succeeded and its result is cached.
        const LSTAT_CALLED   = 1 << 1;
        /// This entry, or an ancestor, is known not to be a directory.
        const ENOTDIR        = 1 << 2;
        /// This entry is known not to exist.
        const ENOENT         = 1 << 3;
        /// readlink failed for a reason other than "not a link".
        const ENOREADLINK    = 1 << 4;
        /// realpath failed.
        const ENOREALPATH    = 1 << 5;

        /// Any of these means the entry cannot have children.
        const ENOCHILD = Self::ENOTDIR.bits()
            | Self::ENOENT.bits()
            | Self::ENOREALPATH.bits();
    }
}

/// How the path graph interprets a failed filesystem call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    /// The entry does not exist.
    NotFound,
    /// A path component is not a directory.
    NotADirectory,
    /// `EPERM`: treated as an unreadable directory.
    PermissionDenied,
    /// `EINVAL`: for readlink, the entry exists but is not a link.
    InvalidArgument,
    /// Anything else. Assumed transient.
    Other,
}

impl FsErrorKind {
    /// Classifies an I/O error, preferring the raw OS code and falling back to the portable kind.
    #[must_use]
    pub fn classify(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOENT) => return Self::NotFound,
            Some(libc::ENOTDIR) => return Self::NotADirectory,
            Some(libc::EPERM) => return Self::PermissionDenied,
            Some(libc::EINVAL) => return Self::InvalidArgument,
            Some(_) => return Self::Other,
            None => {}
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::NotADirectory => Self::NotADirectory,
            io::ErrorKind::InvalidInput => Self::InvalidArgument,
            _ => Self::Other,
        }
    }
}

/// A snapshot of `lstat` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// The entry type, links not followed.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u64,
    /// Raw mode bits, 0 where the platform has none.
    pub mode: u32,
    /// Device id.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Hard link count.
    pub nlink: u64,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Last access time.
    pub atime: Option<SystemTime>,
    /// Last modification time.
    pub mtime: Option<SystemTime>,
    /// Creation time, where the platform records one.
    pub birthtime: Option<SystemTime>,
}

impl Stats {
    /// A snapshot carrying only a type, for providers with no other metadata.
    #[must_use]
    pub fn of_kind(kind: FileKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Builds a snapshot from `std::fs::symlink_metadata` output.
    #[must_use]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mut stats = Self {
            kind: FileKind::from_file_type(meta.file_type()),
            size: meta.len(),
            atime: meta.accessed().ok(),
            mtime: meta.modified().ok(),
            birthtime: meta.created().ok(),
            ..Self::default()
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt as _;
            stats.mode = meta.mode();
            stats.dev = meta.dev();
            stats.ino = meta.ino();
            stats.nlink = meta.nlink();
            stats.uid = meta.uid();
            stats.gid = meta.gid();
        }
        stats
    }
}

/// A directory entry as returned by a provider's directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    /// The entry name with its on-disk casing.
    pub name: String,
    /// The type hint from the listing. `Unknown` if the platform did not report one.
    pub kind: FileKind,
}

impl RawDirEntry {
    /// Creates an entry.
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}
