//! A caching filesystem path graph.
//!
//! Path strings resolve to shared nodes that lazily learn their type, directory contents, link
//! targets and real paths, and keep that knowledge in bounded caches so repeated traversals of the
//! same tree cost as few syscalls as possible. Filesystem failures never surface as errors; they
//! are recorded on the nodes and turn later queries into cheap no-ops.

/// Caching primitives.
pub mod cache;
pub mod error;
/// Filesystem vocabulary and providers.
pub mod fs;
pub mod path;
pub mod scurry;
pub mod walk;

pub use error::ScurryError;
pub use fs::{FileKind, FsErrorKind, FsProvider, NodeFlags, RawDirEntry, RealFs, Stats};
pub use path::{CacheStats, NodeId, PathEntry, Platform, Schedule};
pub use scurry::{PathScurry, ScurryOptions, Target};
pub use walk::{EntryFilter, WalkOptions};
