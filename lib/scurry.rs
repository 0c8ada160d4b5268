//! The root context: caches, a working directory and path-string entry points.

use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ScurryError;
use crate::fs::{FsProvider, RealFs};
use crate::path::node::PathNode;
use crate::path::tree::Tree;
use crate::path::{CacheStats, PathEntry, Platform};

/// Tuning for a [`PathScurry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScurryOptions {
    /// Path rules to apply. Defaults to the host's.
    pub platform: Platform,
    /// Case-insensitive name matching. `None` uses the platform default.
    pub nocase: Option<bool>,
    /// Budget of the children cache, counted as one per cached list plus one per child.
    pub children_cache_size: usize,
    /// Number of memoized resolutions.
    pub resolve_cache_size: usize,
    /// Win32 drive for the initial root.
    pub default_drive: char,
}

impl Default for ScurryOptions {
    fn default() -> Self {
        Self {
            platform: Platform::host(),
            nocase: None,
            children_cache_size: 16 * 1024,
            resolve_cache_size: 256,
            default_drive: 'C',
        }
    }
}

impl ScurryOptions {
    /// Options for `platform` with its defaults.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }

    /// Checks the options for values no tree can work with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ScurryError> {
        if self.children_cache_size == 0 {
            return Err(ScurryError::ZeroCapacity("children-cache-size"));
        }
        if self.resolve_cache_size == 0 {
            return Err(ScurryError::ZeroCapacity("resolve-cache-size"));
        }
        if !self.default_drive.is_ascii_alphabetic() {
            return Err(ScurryError::InvalidDrive(self.default_drive));
        }
        Ok(())
    }

    /// The effective case sensitivity.
    #[must_use]
    pub fn effective_nocase(&self) -> bool {
        self.nocase.unwrap_or(self.platform.default_nocase())
    }
}

/// Something to operate on: a path string resolved against the working directory, or an entry.
#[derive(Debug)]
pub enum Target<'a, P: FsProvider = RealFs> {
    /// A path, relative to the working directory unless absolute.
    Path(&'a str),
    /// An already resolved entry.
    Entry(&'a PathEntry<P>),
}

impl<'a, P: FsProvider> From<&'a str> for Target<'a, P> {
    fn from(path: &'a str) -> Self {
        Self::Path(path)
    }
}

impl<'a, P: FsProvider> From<&'a String> for Target<'a, P> {
    fn from(path: &'a String) -> Self {
        Self::Path(path)
    }
}

impl<'a, P: FsProvider> From<&'a PathEntry<P>> for Target<'a, P> {
    fn from(entry: &'a PathEntry<P>) -> Self {
        Self::Entry(entry)
    }
}

/// A working directory over a shared, cached path tree.
///
/// Several contexts created with [`share`](Self::share) use the same tree and caches, each with
/// its own working directory.
pub struct PathScurry<P: FsProvider = RealFs> {
    tree: Arc<Tree<P>>,
    cwd: Arc<PathNode>,
    /// Results of [`resolve`](Self::resolve), keyed by `(posix, joined input)`.
    strings: Mutex<LruCache<(bool, String), Arc<str>>>,
}

impl PathScurry<RealFs> {
    /// A context over the host filesystem.
    ///
    /// A relative `cwd` is taken relative to the process working directory.
    ///
    /// # Errors
    ///
    /// Fails if the options are invalid or the working directory cannot be anchored.
    pub fn new(cwd: &str, options: ScurryOptions) -> Result<Self, ScurryError> {
        Self::with_provider(cwd, options, RealFs)
    }
}

impl<P: FsProvider> PathScurry<P> {
    /// A context over an arbitrary provider.
    ///
    /// # Errors
    ///
    /// Fails if the options are invalid or the working directory cannot be anchored.
    pub fn with_provider(cwd: &str, options: ScurryOptions, fs: P) -> Result<Self, ScurryError> {
        options.validate()?;
        let platform = options.platform;
        let cwd = anchor_cwd(platform, cwd)?;
        let tree = Arc::new(Tree::new(
            fs,
            platform,
            options.effective_nocase(),
            options.children_cache_size,
            options.resolve_cache_size,
        ));
        let root = tree.root_named(&platform.default_root(options.default_drive));
        let cwd = tree.resolve(&root, &cwd);
        tracing::debug!(%platform, nocase = tree.nocase(), cwd = %tree.fullpath(&cwd), "path scurry ready");
        Ok(Self {
            tree,
            cwd,
            strings: Mutex::new(LruCache::new(options.resolve_cache_size)),
        })
    }

    /// A context over the same tree and caches, with its own working directory.
    #[must_use]
    pub fn share<'a>(&self, cwd: impl Into<Target<'a, P>>) -> Self {
        let cwd = self.node_of(cwd.into());
        let capacity = self.strings.lock().capacity();
        Self {
            tree: Arc::clone(&self.tree),
            cwd,
            strings: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The path rules in use.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.tree.platform()
    }

    /// Whether names compare case-insensitively.
    #[must_use]
    pub fn nocase(&self) -> bool {
        self.tree.nocase()
    }

    /// The filesystem provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        self.tree.provider()
    }

    /// Occupancy of the shared caches.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.tree.cache_stats()
    }

    fn wrap(&self, node: Arc<PathNode>) -> PathEntry<P> {
        PathEntry::new(Arc::clone(&self.tree), node)
    }

    fn node_of(&self, target: Target<'_, P>) -> Arc<PathNode> {
        match target {
            Target::Path(path) => self.tree.resolve(&self.cwd, path),
            Target::Entry(entry) => Arc::clone(entry.node()),
        }
    }

    /// The working directory.
    #[must_use]
    pub fn cwd(&self) -> PathEntry<P> {
        self.wrap(Arc::clone(&self.cwd))
    }

    /// The root of the working directory's tree.
    #[must_use]
    pub fn root(&self) -> PathEntry<P> {
        self.wrap(self.cwd.root())
    }

    /// The entry for `target`.
    #[must_use]
    pub fn entry<'a>(&self, target: impl Into<Target<'a, P>>) -> PathEntry<P> {
        self.wrap(self.node_of(target.into()))
    }

    /// Moves the working directory. Relative renderings are computed against the new one from
    /// now on; entries already handed out are unaffected.
    pub fn chdir<'a>(&mut self, target: impl Into<Target<'a, P>>) {
        self.cwd = self.node_of(target.into());
        self.strings.get_mut().clear();
    }

    /// Resolves path segments to an absolute path string, like a shell would: segments are
    /// joined right to left until one is absolute, and the result is taken relative to the
    /// working directory if none is.
    #[must_use]
    pub fn resolve(&self, segments: &[&str]) -> String {
        self.resolve_string(segments, false)
    }

    /// Like [`resolve`](Self::resolve), rendered with `/` separators.
    #[must_use]
    pub fn resolve_posix(&self, segments: &[&str]) -> String {
        self.resolve_string(segments, true)
    }

    fn resolve_string(&self, segments: &[&str], posix: bool) -> String {
        let joined = self.join_segments(segments);
        let key = (posix, joined);
        if let Some(hit) = self.strings.lock().get(&key) {
            return hit.to_string();
        }
        let node = self.tree.resolve(&self.cwd, &key.1);
        let rendered = if posix {
            self.tree.fullpath_posix(&node)
        } else {
            self.tree.fullpath(&node)
        };
        let out = rendered.to_string();
        self.strings.lock().insert(key, rendered);
        out
    }

    fn join_segments(&self, segments: &[&str]) -> String {
        let platform = self.tree.platform();
        let mut joined = String::new();
        for segment in segments.iter().rev().filter(|s| !s.is_empty()) {
            joined = if joined.is_empty() {
                (*segment).to_owned()
            } else {
                format!("{segment}/{joined}")
            };
            if platform.is_absolute(segment) {
                break;
            }
        }
        joined
    }

    /// Last component of `target`.
    #[must_use]
    pub fn basename<'a>(&self, target: impl Into<Target<'a, P>>) -> String {
        self.node_of(target.into()).name().to_string()
    }

    /// Full path of the directory containing `target`; roots are their own dirname.
    #[must_use]
    pub fn dirname<'a>(&self, target: impl Into<Target<'a, P>>) -> String {
        let node = self.node_of(target.into());
        let dir = node.parent().unwrap_or(&node);
        self.tree.fullpath(dir).to_string()
    }

    /// `target` relative to the working directory, computed now.
    #[must_use]
    pub fn relative<'a>(&self, target: impl Into<Target<'a, P>>) -> String {
        let node = self.node_of(target.into());
        self.tree.relative(&self.cwd, &node, false)
    }

    /// Like [`relative`](Self::relative), with `/` separators.
    #[must_use]
    pub fn relative_posix<'a>(&self, target: impl Into<Target<'a, P>>) -> String {
        let node = self.node_of(target.into());
        self.tree.relative(&self.cwd, &node, true)
    }

    /// Distance of `target` from its root.
    #[must_use]
    pub fn depth<'a>(&self, target: impl Into<Target<'a, P>>) -> usize {
        self.node_of(target.into()).depth()
    }

    /// See [`PathEntry::lstat_sync`].
    pub fn lstat_sync<'a>(&self, target: impl Into<Target<'a, P>>) -> Option<PathEntry<P>> {
        self.entry(target).lstat_sync()
    }

    /// See [`PathEntry::lstat`].
    pub async fn lstat<'a>(&self, target: impl Into<Target<'a, P>>) -> Option<PathEntry<P>> {
        self.entry(target).lstat().await
    }

    /// See [`PathEntry::readdir_sync`].
    pub fn readdir_sync<'a>(&self, target: impl Into<Target<'a, P>>) -> Vec<PathEntry<P>> {
        self.entry(target).readdir_sync()
    }

    /// See [`PathEntry::readdir`].
    pub async fn readdir<'a>(&self, target: impl Into<Target<'a, P>>) -> Vec<PathEntry<P>> {
        self.entry(target).readdir().await
    }

    /// Directory contents as full path strings instead of entries.
    pub fn readdir_paths_sync<'a>(&self, target: impl Into<Target<'a, P>>) -> Vec<String> {
        self.readdir_sync(target)
            .iter()
            .map(PathEntry::fullpath)
            .collect()
    }

    /// Async form of [`readdir_paths_sync`](Self::readdir_paths_sync).
    pub async fn readdir_paths<'a>(&self, target: impl Into<Target<'a, P>>) -> Vec<String> {
        self.readdir(target)
            .await
            .iter()
            .map(PathEntry::fullpath)
            .collect()
    }

    /// See [`PathEntry::readlink_sync`].
    pub fn readlink_sync<'a>(&self, target: impl Into<Target<'a, P>>) -> Option<PathEntry<P>> {
        self.entry(target).readlink_sync()
    }

    /// See [`PathEntry::readlink`].
    pub async fn readlink<'a>(&self, target: impl Into<Target<'a, P>>) -> Option<PathEntry<P>> {
        self.entry(target).readlink().await
    }

    /// See [`PathEntry::realpath_sync`].
    pub fn realpath_sync<'a>(&self, target: impl Into<Target<'a, P>>) -> Option<PathEntry<P>> {
        self.entry(target).realpath_sync()
    }

    /// See [`PathEntry::realpath`].
    pub async fn realpath<'a>(&self, target: impl Into<Target<'a, P>>) -> Option<PathEntry<P>> {
        self.entry(target).realpath().await
    }
}

/// Makes `cwd` absolute for `platform`, anchoring relative input at the process directory.
fn anchor_cwd(platform: Platform, cwd: &str) -> Result<String, ScurryError> {
    if platform.is_absolute(cwd) {
        return Ok(cwd.to_owned());
    }
    let here = std::env::current_dir().map_err(ScurryError::CurrentDir)?;
    let joined = here.join(cwd).to_string_lossy().into_owned();
    if platform.is_absolute(&joined) {
        Ok(joined)
    } else {
        Err(ScurryError::RelativeCwd {
            cwd: cwd.to_owned(),
            platform,
        })
    }
}
