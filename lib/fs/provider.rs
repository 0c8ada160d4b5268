//! The filesystem primitives consumed by the path graph.

use std::future::Future;
use std::io;

use super::{FileKind, RawDirEntry, Stats};

/// Source of filesystem metadata for a path graph.
///
/// Every primitive has a blocking and an async form. Paths are full path strings rendered by the
/// graph for its platform. Implementations report failures as plain [`io::Error`]s; the graph
/// classifies them with [`FsErrorKind`](super::FsErrorKind) and never surfaces them to callers.
pub trait FsProvider: Clone + Send + Sync + 'static {
    /// Metadata for `path` without following a final symlink.
    fn lstat_sync(&self, path: &str) -> io::Result<Stats>;

    /// Names and type hints of the entries in the directory at `path`, excluding `.` and `..`.
    fn readdir_sync(&self, path: &str) -> io::Result<Vec<RawDirEntry>>;

    /// The raw target text of the symlink at `path`.
    fn readlink_sync(&self, path: &str) -> io::Result<String>;

    /// The canonical absolute form of `path`, with every symlink resolved.
    fn realpath_sync(&self, path: &str) -> io::Result<String>;

    /// Async form of [`lstat_sync`](Self::lstat_sync).
    fn lstat(&self, path: &str) -> impl Future<Output = io::Result<Stats>> + Send;

    /// Async form of [`readdir_sync`](Self::readdir_sync).
    ///
    /// The whole listing is collected before the future resolves.
    fn readdir(&self, path: &str) -> impl Future<Output = io::Result<Vec<RawDirEntry>>> + Send;

    /// Async form of [`readlink_sync`](Self::readlink_sync).
    fn readlink(&self, path: &str) -> impl Future<Output = io::Result<String>> + Send;

    /// Async form of [`realpath_sync`](Self::realpath_sync).
    fn realpath(&self, path: &str) -> impl Future<Output = io::Result<String>> + Send;
}

/// The host filesystem, through `std::fs` and `tokio::fs`.
///
/// Non UTF-8 names and link targets are converted lossily.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

fn lossy(path: impl AsRef<std::path::Path>) -> String {
    path.as_ref().to_string_lossy().into_owned()
}

impl FsProvider for RealFs {
    fn lstat_sync(&self, path: &str) -> io::Result<Stats> {
        std::fs::symlink_metadata(path).map(|m| Stats::from_metadata(&m))
    }

    fn readdir_sync(&self, path: &str) -> io::Result<Vec<RawDirEntry>> {
        let mut out = Vec::new();
        for dirent in std::fs::read_dir(path)? {
            let dirent = dirent?;
            let kind = dirent
                .file_type()
                .map_or(FileKind::Unknown, FileKind::from_file_type);
            out.push(RawDirEntry::new(
                dirent.file_name().to_string_lossy(),
                kind,
            ));
        }
        Ok(out)
    }

    fn readlink_sync(&self, path: &str) -> io::Result<String> {
        std::fs::read_link(path).map(lossy)
    }

    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        std::fs::canonicalize(path).map(lossy)
    }

    async fn lstat(&self, path: &str) -> io::Result<Stats> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        Ok(Stats::from_metadata(&meta))
    }

    async fn readdir(&self, path: &str) -> io::Result<Vec<RawDirEntry>> {
        let mut out = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let kind = dirent
                .file_type()
                .await
                .map_or(FileKind::Unknown, FileKind::from_file_type);
            out.push(RawDirEntry::new(
                dirent.file_name().to_string_lossy(),
                kind,
            ));
        }
        Ok(out)
    }

    async fn readlink(&self, path: &str) -> io::Result<String> {
        tokio::fs::read_link(path).await.map(lossy)
    }

    async fn realpath(&self, path: &str) -> io::Result<String> {
        tokio::fs::canonicalize(path).await.map(lossy)
    }
}
