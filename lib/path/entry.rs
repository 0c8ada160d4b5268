//! [`PathEntry`]: the public handle on a node of a path tree.

use std::collections::HashSet;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crate::fs::{FileKind, FsProvider, NodeFlags, RealFs, Stats};

use super::node::{NodeId, PathNode};
use super::tree::Tree;

/// How [`PathEntry::readdir_cb`] delivers results that are already cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// Call back before `readdir_cb` returns when nothing has to be read.
    ///
    /// Callers that depend on the callback running after they return must not use this.
    Immediate,
    /// Always call back from a spawned task.
    #[default]
    Deferred,
}

/// A path in a tree, with everything the tree has learned about it.
///
/// Entries compare equal when they refer to the same node. Resolving the same path twice yields
/// equal entries for as long as the parent's child list stays cached.
pub struct PathEntry<P: FsProvider = RealFs> {
    tree: Arc<Tree<P>>,
    node: Arc<PathNode>,
}

impl<P: FsProvider> Clone for PathEntry<P> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            node: Arc::clone(&self.node),
        }
    }
}

impl<P: FsProvider> PartialEq for PathEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<P: FsProvider> Eq for PathEntry<P> {}

impl<P: FsProvider> Hash for PathEntry<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.id().hash(state);
    }
}

impl<P: FsProvider> fmt::Debug for PathEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathEntry")
            .field("path", &self.fullpath())
            .field("kind", &self.kind())
            .field("flags", &self.flags())
            .finish()
    }
}

impl<P: FsProvider> PathEntry<P> {
    pub(crate) fn new(tree: Arc<Tree<P>>, node: Arc<PathNode>) -> Self {
        Self { tree, node }
    }

    pub(crate) fn node(&self) -> &Arc<PathNode> {
        &self.node
    }

    fn wrap(&self, node: Arc<PathNode>) -> Self {
        Self::new(Arc::clone(&self.tree), node)
    }

    fn wrap_all(&self, nodes: Vec<Arc<PathNode>>) -> Vec<Self> {
        nodes.into_iter().map(|n| self.wrap(n)).collect()
    }

    /// Process-unique identity of the underlying node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// The last path component. For roots, the root string itself (`/`, `C:\`).
    #[must_use]
    pub fn name(&self) -> String {
        self.node.name().to_string()
    }

    /// Returns `true` if `name` names this entry under the tree's case rules.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        *self.tree.match_name(name) == **self.node.match_name()
    }

    /// The containing directory, or `None` for roots.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.node.parent().map(|p| self.wrap(Arc::clone(p)))
    }

    /// The root of this entry's tree.
    #[must_use]
    pub fn root(&self) -> Self {
        self.wrap(self.node.root())
    }

    /// Returns `true` for filesystem roots.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    /// Distance from the root. Roots are at depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.node.depth()
    }

    /// The absolute path in platform form.
    #[must_use]
    pub fn fullpath(&self) -> String {
        self.tree.fullpath(&self.node).to_string()
    }

    /// The absolute path with `/` separators. On Win32, drive roots render as `//?/C:/`.
    #[must_use]
    pub fn fullpath_posix(&self) -> String {
        self.tree.fullpath_posix(&self.node).to_string()
    }

    /// This path relative to `base`, computed from the tree as it is now.
    #[must_use]
    pub fn relative_to(&self, base: &Self) -> String {
        self.tree.relative(&base.node, &self.node, false)
    }

    /// Like [`relative_to`](Self::relative_to), with `/` separators.
    #[must_use]
    pub fn relative_posix_to(&self, base: &Self) -> String {
        self.tree.relative(&base.node, &self.node, true)
    }

    /// The known file type.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.node.kind()
    }

    /// The name of the known file type, such as `"Directory"`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// What the tree has learned about this entry so far.
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.node.flags()
    }

    /// Returns `true` if the type is not known yet.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.kind() == FileKind::Unknown
    }

    /// Returns `true` for regular files.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind() == FileKind::File
    }

    /// Returns `true` for directories.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub fn is_symbolic_link(&self) -> bool {
        self.kind() == FileKind::SymbolicLink
    }

    /// Returns `true` for named pipes.
    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.kind() == FileKind::Fifo
    }

    /// Returns `true` for character devices.
    #[must_use]
    pub fn is_character_device(&self) -> bool {
        self.kind() == FileKind::CharDevice
    }

    /// Returns `true` for block devices.
    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.kind() == FileKind::BlockDevice
    }

    /// Returns `true` for sockets.
    #[must_use]
    pub fn is_socket(&self) -> bool {
        self.kind() == FileKind::Socket
    }

    /// Returns `true` if this entry is known not to exist.
    #[must_use]
    pub fn is_enoent(&self) -> bool {
        self.flags().contains(NodeFlags::ENOENT)
    }

    /// Returns `true` if the cached child list reflects a completed read.
    #[must_use]
    pub fn called_readdir(&self) -> bool {
        self.flags().contains(NodeFlags::READDIR_CALLED)
    }

    /// Returns `true` if an lstat has succeeded.
    #[must_use]
    pub fn lstat_called(&self) -> bool {
        self.flags().contains(NodeFlags::LSTAT_CALLED)
    }

    /// `false` when a directory read is known to be pointless.
    #[must_use]
    pub fn can_readdir(&self) -> bool {
        self.node.can_readdir()
    }

    /// `false` when a readlink is known to be pointless.
    #[must_use]
    pub fn can_readlink(&self) -> bool {
        self.node.can_readlink()
    }

    /// Whether a traversal should descend into this entry: a directory that can have children,
    /// not yet `visited`, and accepted by `filter`.
    #[must_use]
    pub fn should_walk<S: BuildHasher>(
        &self,
        visited: &HashSet<Self, S>,
        filter: Option<&dyn Fn(&Self) -> bool>,
    ) -> bool {
        self.kind() == FileKind::Directory
            && !self.flags().intersects(NodeFlags::ENOCHILD)
            && !visited.contains(self)
            && filter.is_none_or(|accept| accept(self))
    }

    /// The child named `name`, created provisionally if it is not known yet.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        self.wrap(self.tree.child(&self.node, name))
    }

    /// Resolves `path` against this entry. Absolute paths ignore it.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Self {
        self.wrap(self.tree.resolve(&self.node, path))
    }

    /// The confirmed children, reading the directory if needed. Empty on any failure.
    pub fn readdir_sync(&self) -> Vec<Self> {
        let nodes = self.tree.readdir_sync(&self.node);
        self.wrap_all(nodes)
    }

    /// Async form of [`readdir_sync`](Self::readdir_sync). Concurrent calls share one read.
    pub async fn readdir(&self) -> Vec<Self> {
        let nodes = self.tree.readdir(&self.node).await;
        self.wrap_all(nodes)
    }

    /// The confirmed children known right now, without I/O.
    #[must_use]
    pub fn readdir_cached(&self) -> Vec<Self> {
        let nodes = self.tree.peek_confirmed(&self.node);
        self.wrap_all(nodes)
    }

    /// Reads the directory and hands the children to `cb`.
    ///
    /// With [`Schedule::Immediate`], a result that needs no I/O is delivered before this returns.
    /// Anything else runs on a spawned tokio task, so a runtime must be available.
    pub fn readdir_cb<F>(&self, schedule: Schedule, cb: F)
    where
        F: FnOnce(Vec<Self>) + Send + 'static,
    {
        let ready = if self.node.can_readdir() {
            self.tree
                .cached_readdir(&self.node)
                .map(|nodes| self.wrap_all(nodes))
        } else {
            Some(Vec::new())
        };
        match (ready, schedule) {
            (Some(children), Schedule::Immediate) => cb(children),
            (Some(children), Schedule::Deferred) => {
                tokio::spawn(async move { cb(children) });
            }
            (None, _) => {
                let entry = self.clone();
                tokio::spawn(async move {
                    let children = entry.readdir().await;
                    cb(children);
                });
            }
        }
    }

    /// Refreshes type and stat information. `None` if the entry could not be stat'ed.
    pub fn lstat_sync(&self) -> Option<Self> {
        self.tree.lstat_sync(&self.node).then(|| self.clone())
    }

    /// Async form of [`lstat_sync`](Self::lstat_sync).
    pub async fn lstat(&self) -> Option<Self> {
        self.tree.lstat(&self.node).await.then(|| self.clone())
    }

    /// The stat snapshot from the last successful lstat, without I/O.
    #[must_use]
    pub fn lstat_cached(&self) -> Option<Stats> {
        self.node.state().stats
    }

    /// The entry this symlink points at, resolved against the link's directory.
    pub fn readlink_sync(&self) -> Option<Self> {
        self.tree.readlink_sync(&self.node).map(|n| self.wrap(n))
    }

    /// Async form of [`readlink_sync`](Self::readlink_sync).
    pub async fn readlink(&self) -> Option<Self> {
        self.tree.readlink(&self.node).await.map(|n| self.wrap(n))
    }

    /// The cached link target, without I/O.
    #[must_use]
    pub fn readlink_cached(&self) -> Option<Self> {
        self.node.link_target().map(|n| self.wrap(n))
    }

    /// The canonical entry for this path, every symlink resolved.
    pub fn realpath_sync(&self) -> Option<Self> {
        self.tree.realpath_sync(&self.node).map(|n| self.wrap(n))
    }

    /// Async form of [`realpath_sync`](Self::realpath_sync).
    pub async fn realpath(&self) -> Option<Self> {
        self.tree.realpath(&self.node).await.map(|n| self.wrap(n))
    }

    /// The cached canonical entry, without I/O.
    #[must_use]
    pub fn realpath_cached(&self) -> Option<Self> {
        self.node.realpath_target().map(|n| self.wrap(n))
    }
}
