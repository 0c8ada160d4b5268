//! The path node: one path component and what is known about it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::fs::{FileKind, NodeFlags, Stats};

/// Process-unique identity of a [`PathNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mutable knowledge about a node. Guarded by the node's own lock.
#[derive(Debug)]
pub(crate) struct NodeState {
    /// On-disk casing once a directory read confirmed it, otherwise the casing first asked for.
    pub name: Arc<str>,
    pub kind: FileKind,
    pub flags: NodeFlags,
    pub fullpath: Option<Arc<str>>,
    pub fullpath_posix: Option<Arc<str>>,
    pub link_target: Weak<PathNode>,
    pub realpath: Weak<PathNode>,
    pub stats: Option<Stats>,
}

impl NodeState {
    fn new(name: Arc<str>, kind: FileKind) -> Self {
        Self {
            name,
            kind,
            flags: NodeFlags::empty(),
            fullpath: None,
            fullpath_posix: None,
            link_target: Weak::new(),
            realpath: Weak::new(),
            stats: None,
        }
    }

    /// `false` when the node is known to be unable to hold directory entries.
    pub fn can_readdir(&self) -> bool {
        !self.flags.intersects(NodeFlags::ENOCHILD) && self.kind.may_have_children()
    }
}

/// One component of a path tree.
///
/// Identity, parent and match name never change after creation. Children are not stored here;
/// they live in the tree's children cache keyed by [`NodeId`].
pub(crate) struct PathNode {
    id: NodeId,
    parent: Option<Arc<PathNode>>,
    /// `None` for roots.
    root: Option<Arc<PathNode>>,
    match_name: Arc<str>,
    depth: usize,
    state: Mutex<NodeState>,
}

impl PathNode {
    pub fn new_root(name: &str, match_name: Arc<str>, kind: FileKind) -> Arc<Self> {
        let name: Arc<str> = Arc::from(name);
        let mut state = NodeState::new(Arc::clone(&name), kind);
        state.fullpath = Some(name);
        Arc::new(Self {
            id: NodeId::next(),
            parent: None,
            root: None,
            match_name,
            depth: 0,
            state: Mutex::new(state),
        })
    }

    pub fn new_child(
        parent: &Arc<Self>,
        name: &str,
        match_name: Arc<str>,
        kind: FileKind,
        fullpath: Option<Arc<str>>,
    ) -> Arc<Self> {
        let mut state = NodeState::new(Arc::from(name), kind);
        state.fullpath = fullpath;
        Arc::new(Self {
            id: NodeId::next(),
            parent: Some(Arc::clone(parent)),
            root: Some(parent.root()),
            match_name,
            depth: parent.depth + 1,
            state: Mutex::new(state),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    pub fn root(self: &Arc<Self>) -> Arc<Self> {
        self.root.clone().unwrap_or_else(|| Arc::clone(self))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn match_name(&self) -> &Arc<str> {
        &self.match_name
    }

    /// Locks the mutable state. Never hold this while taking the children cache lock.
    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock()
    }

    pub fn name(&self) -> Arc<str> {
        Arc::clone(&self.state().name)
    }

    pub fn kind(&self) -> FileKind {
        self.state().kind
    }

    pub fn flags(&self) -> NodeFlags {
        self.state().flags
    }

    pub fn can_readdir(&self) -> bool {
        self.state().can_readdir()
    }

    /// Roots are never links, and a node with a known type other than a link cannot be read as
    /// one.
    pub fn can_readlink(&self) -> bool {
        if self.is_root() {
            return false;
        }
        let st = self.state();
        let kind_ok = matches!(st.kind, FileKind::Unknown | FileKind::SymbolicLink);
        kind_ok && !st.flags.intersects(NodeFlags::ENOREADLINK | NodeFlags::ENOENT)
    }

    pub fn cached_fullpath(&self) -> Option<Arc<str>> {
        self.state().fullpath.clone()
    }

    pub fn link_target(&self) -> Option<Arc<Self>> {
        self.state().link_target.upgrade()
    }

    pub fn realpath_target(&self) -> Option<Arc<Self>> {
        self.state().realpath.upgrade()
    }

    /// Drops the memoized path renderings. Used when an ancestor learns its on-disk casing.
    pub fn forget_fullpaths(&self) {
        let mut st = self.state();
        st.fullpath = None;
        st.fullpath_posix = None;
    }
}

impl fmt::Debug for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state();
        f.debug_struct("PathNode")
            .field("id", &self.id)
            .field("name", &st.name)
            .field("kind", &st.kind)
            .field("flags", &st.flags)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
