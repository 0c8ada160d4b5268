//! The shared path graph: roots, caches, the filesystem provider and every state transition.
//!
//! Lock order is children cache, then node state, then resolve cache. A node's state lock is
//! never held while taking the children cache lock, and no lock is held across an await.

use std::io;
use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::cache::inflight::InFlight;
use crate::fs::{FileKind, FsErrorKind, FsProvider, NodeFlags, RawDirEntry, Stats};

use super::children::{ChildSlot, Children, ChildrenCache, EvictedChildren};
use super::node::{NodeId, PathNode};
use super::platform::{Platform, RootSpec};

/// Occupancy of a tree's caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Nodes whose child list is cached.
    pub child_lists: usize,
    /// Total cost of cached child lists: one per list plus one per child.
    pub children_weight: usize,
    /// Configured cost budget of the children cache.
    pub children_capacity: usize,
    /// Memoized `(base, path)` resolutions.
    pub resolves: usize,
    /// Distinct roots seen (drives and UNC shares on Win32).
    pub roots: usize,
}

/// Owner of everything shared between the contexts of one tree.
pub(crate) struct Tree<P> {
    fs: P,
    platform: Platform,
    nocase: bool,
    roots: Mutex<FxHashMap<String, Arc<PathNode>>>,
    children: Mutex<ChildrenCache>,
    resolves: Mutex<LruCache<(NodeId, String), Arc<PathNode>>>,
    readdirs: InFlight<NodeId, Vec<Arc<PathNode>>>,
    lstats: InFlight<NodeId, bool>,
    readlinks: InFlight<NodeId, Option<Arc<PathNode>>>,
    realpaths: InFlight<NodeId, Option<Arc<PathNode>>>,
}

impl<P: FsProvider> Tree<P> {
    pub fn new(
        fs: P,
        platform: Platform,
        nocase: bool,
        children_capacity: usize,
        resolve_capacity: usize,
    ) -> Self {
        Self {
            fs,
            platform,
            nocase,
            roots: Mutex::new(FxHashMap::default()),
            children: Mutex::new(ChildrenCache::new(children_capacity)),
            resolves: Mutex::new(LruCache::new(resolve_capacity)),
            readdirs: InFlight::default(),
            lstats: InFlight::default(),
            readlinks: InFlight::default(),
            realpaths: InFlight::default(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn nocase(&self) -> bool {
        self.nocase
    }

    pub fn provider(&self) -> &P {
        &self.fs
    }

    pub fn cache_stats(&self) -> CacheStats {
        let (child_lists, children_weight, children_capacity) = {
            let cache = self.children.lock();
            (cache.len(), cache.total_weight(), cache.capacity())
        };
        CacheStats {
            child_lists,
            children_weight,
            children_capacity,
            resolves: self.resolves.lock().len(),
            roots: self.roots.lock().len(),
        }
    }

    /// The name used for lookups: lowercased when the tree is case-insensitive.
    pub fn match_name(&self, name: &str) -> Arc<str> {
        if self.nocase {
            Arc::from(name.to_lowercase())
        } else {
            Arc::from(name)
        }
    }

    /// Returns the root with canonical name `name`, creating it on first use.
    pub fn root_named(&self, name: &str) -> Arc<PathNode> {
        let mut roots = self.roots.lock();
        if let Some(root) = roots.get(name) {
            return Arc::clone(root);
        }
        trace!(root = name, "new root");
        let root = PathNode::new_root(name, self.match_name(name), FileKind::Directory);
        roots.insert(name.to_owned(), Arc::clone(&root));
        root
    }

    fn root_for(&self, base: &Arc<PathNode>, spec: RootSpec) -> Arc<PathNode> {
        match spec {
            RootSpec::Current => base.root(),
            RootSpec::Named(name) => self.root_named(&name),
        }
    }

    /// Resolves `path` against `base`. Never fails: unknown components become provisional
    /// children.
    pub fn resolve(&self, base: &Arc<PathNode>, path: &str) -> Arc<PathNode> {
        if path.is_empty() {
            return Arc::clone(base);
        }
        let key = (base.id(), path.to_owned());
        if let Some(hit) = self.resolves.lock().get(&key) {
            return Arc::clone(hit);
        }

        let (root, rest) = self.platform.split_root(path);
        let mut node = match root {
            Some(spec) => self.root_for(base, spec),
            None => Arc::clone(base),
        };
        for segment in self.platform.segments(rest) {
            node = self.child(&node, segment);
        }

        self.resolves.lock().insert(key, Arc::clone(&node));
        node
    }

    /// Looks up or creates the child of `parent` named `part`.
    ///
    /// A new child is provisional. If `parent` is known to be unable to hold entries, the new
    /// child is born nonexistent.
    pub fn child(&self, parent: &Arc<PathNode>, part: &str) -> Arc<PathNode> {
        match part {
            "" | "." => return Arc::clone(parent),
            ".." => return Arc::clone(parent.parent().unwrap_or(parent)),
            _ => {}
        }

        let match_name = self.match_name(part);
        let mut cache = self.children.lock();
        let (child, evicted) = cache.upsert(
            parent.id(),
            || fresh_slot(parent),
            |slot| {
                if let Some(found) = slot
                    .children
                    .position(&match_name)
                    .and_then(|pos| slot.children.get(pos))
                {
                    return Arc::clone(found);
                }
                let (fullpath, doomed) = {
                    let st = parent.state();
                    (st.fullpath.clone(), !st.can_readdir())
                };
                let fullpath = fullpath.map(|base| self.join(&base, parent.is_root(), part));
                let node =
                    PathNode::new_child(parent, part, match_name, FileKind::Unknown, fullpath);
                if doomed {
                    node.state().flags.insert(NodeFlags::ENOENT);
                }
                slot.children.push_provisional(Arc::clone(&node));
                node
            },
        );
        self.release(evicted);
        child
    }

    fn join(&self, base: &str, parent_is_root: bool, name: &str) -> Arc<str> {
        if parent_is_root {
            Arc::from(format!("{base}{name}"))
        } else {
            Arc::from(format!("{base}{}{name}", self.platform.sep()))
        }
    }

    /// The absolute path of `node` in platform form. Memoized per node.
    pub fn fullpath(&self, node: &Arc<PathNode>) -> Arc<str> {
        self.render(node, false)
    }

    /// The absolute path of `node` with `/` separators.
    pub fn fullpath_posix(&self, node: &Arc<PathNode>) -> Arc<str> {
        if self.platform == Platform::Win32 {
            self.render(node, true)
        } else {
            self.fullpath(node)
        }
    }

    fn render(&self, node: &Arc<PathNode>, posix: bool) -> Arc<str> {
        let cached = |n: &PathNode| {
            let st = n.state();
            if posix {
                st.fullpath_posix.clone()
            } else {
                st.fullpath.clone()
            }
        };

        let mut pending = Vec::new();
        let mut rendered = None;
        let mut cur = Some(Arc::clone(node));
        while let Some(n) = cur {
            if let Some(path) = cached(&n) {
                rendered = Some(path);
                break;
            }
            cur = n.parent().cloned();
            pending.push(n);
        }

        for n in pending.into_iter().rev() {
            let name = n.name();
            let path: Arc<str> = match (&rendered, n.parent()) {
                (Some(base), Some(parent)) if posix => {
                    let sep = if parent.is_root() { "" } else { "/" };
                    Arc::from(format!("{base}{sep}{name}"))
                }
                (Some(base), Some(parent)) => self.join(base, parent.is_root(), &name),
                _ if posix => Arc::from(self.platform.posix_root(&name)),
                _ => name,
            };
            {
                let mut st = n.state();
                if posix {
                    st.fullpath_posix = Some(Arc::clone(&path));
                } else {
                    st.fullpath = Some(Arc::clone(&path));
                }
            }
            rendered = Some(path);
        }
        rendered.unwrap_or_else(|| Arc::from(""))
    }

    /// `target` expressed relative to `base`, computed from the current shape of the tree.
    ///
    /// When the only common ancestor is a filesystem root other than `base` itself, or the two
    /// are in different roots, the absolute path is returned instead.
    pub fn relative(&self, base: &Arc<PathNode>, target: &Arc<PathNode>, posix: bool) -> String {
        if Arc::ptr_eq(base, target) {
            return String::new();
        }
        let absolute = || {
            if posix {
                self.fullpath_posix(target).to_string()
            } else {
                self.fullpath(target).to_string()
            }
        };

        let mut up = Arc::clone(base);
        let mut down = Arc::clone(target);
        let mut ups = 0usize;
        let mut names: Vec<Arc<str>> = Vec::new();
        while down.depth() > up.depth() {
            names.push(down.name());
            let Some(parent) = down.parent().cloned() else {
                break;
            };
            down = parent;
        }
        while up.depth() > down.depth() {
            ups += 1;
            let Some(parent) = up.parent().cloned() else {
                break;
            };
            up = parent;
        }
        while !Arc::ptr_eq(&up, &down) {
            match (up.parent().cloned(), down.parent().cloned()) {
                (Some(a), Some(b)) => {
                    ups += 1;
                    names.push(down.name());
                    up = a;
                    down = b;
                }
                _ => return absolute(),
            }
        }
        if up.is_root() && !Arc::ptr_eq(&up, base) {
            return absolute();
        }

        let sep = if posix || self.platform.sep() == '/' {
            "/"
        } else {
            "\\"
        };
        let mut parts: Vec<&str> = vec![".."; ups];
        parts.extend(names.iter().rev().map(|name| &**name));
        parts.join(sep)
    }

    /// Confirmed children, if a completed read is cached. Refreshes the list's recency.
    pub fn cached_readdir(&self, node: &Arc<PathNode>) -> Option<Vec<Arc<PathNode>>> {
        if !node.flags().contains(NodeFlags::READDIR_CALLED) {
            return None;
        }
        let mut cache = self.children.lock();
        cache
            .get(&node.id())
            .map(|slot| slot.children.confirmed().to_vec())
    }

    /// Confirmed children as currently cached, without I/O and without touching recency.
    pub fn peek_confirmed(&self, node: &Arc<PathNode>) -> Vec<Arc<PathNode>> {
        self.children
            .lock()
            .peek(&node.id())
            .map(|slot| slot.children.confirmed().to_vec())
            .unwrap_or_default()
    }

    pub fn readdir_sync(&self, node: &Arc<PathNode>) -> Vec<Arc<PathNode>> {
        if !node.can_readdir() {
            return Vec::new();
        }
        if let Some(hit) = self.cached_readdir(node) {
            return hit;
        }
        let path = self.fullpath(node);
        trace!(path = %path, "readdir");
        let listing = self.fs.readdir_sync(&path);
        self.apply_readdir(node, &path, listing)
    }

    /// Concurrent calls for the same node share one listing.
    pub async fn readdir(self: &Arc<Self>, node: &Arc<PathNode>) -> Vec<Arc<PathNode>> {
        if !node.can_readdir() {
            return Vec::new();
        }
        if let Some(hit) = self.cached_readdir(node) {
            return hit;
        }
        let tree = Arc::clone(self);
        let target = Arc::clone(node);
        self.readdirs
            .run(node.id(), move || async move {
                if !target.can_readdir() {
                    return Vec::new();
                }
                if let Some(hit) = tree.cached_readdir(&target) {
                    return hit;
                }
                let path = tree.fullpath(&target);
                trace!(path = %path, "readdir");
                let listing = tree.fs.readdir(&path).await;
                tree.apply_readdir(&target, &path, listing)
            })
            .await
    }

    fn apply_readdir(
        &self,
        node: &Arc<PathNode>,
        path: &str,
        listing: io::Result<Vec<RawDirEntry>>,
    ) -> Vec<Arc<PathNode>> {
        let mut cache = self.children.lock();
        let entries = match listing {
            Ok(entries) => entries,
            Err(err) => {
                let kind = FsErrorKind::classify(&err);
                debug!(path, ?kind, error = %err, "readdir failed");
                match kind {
                    FsErrorKind::NotADirectory | FsErrorKind::PermissionDenied => {
                        self.mark_enotdir(&mut cache, node);
                    }
                    FsErrorKind::NotFound => self.mark_enoent(&mut cache, node),
                    FsErrorKind::InvalidArgument | FsErrorKind::Other => {
                        if let Some(slot) = cache.peek_mut(&node.id()) {
                            slot.children.demote_all();
                        }
                    }
                }
                return Vec::new();
            }
        };

        // A concurrent reader may have finished first.
        if node.flags().contains(NodeFlags::READDIR_CALLED) {
            if let Some(slot) = cache.get(&node.id()) {
                return slot.children.confirmed().to_vec();
            }
        }

        let ((confirmed, stale, renamed), evicted) = cache.upsert(
            node.id(),
            || fresh_slot(node),
            |slot| {
                let children = &mut slot.children;
                children.demote_all();
                let mut renamed = Vec::new();
                for entry in entries {
                    self.add_entry(node, children, entry, &mut renamed);
                }
                (
                    children.confirmed().to_vec(),
                    children.unconfirmed().to_vec(),
                    renamed,
                )
            },
        );
        node.state().flags.insert(NodeFlags::READDIR_CALLED);
        trace!(
            path,
            entries = confirmed.len(),
            stale = stale.len(),
            "readdir reconciled"
        );

        self.cascade_enoent(&mut cache, stale);
        for moved in &renamed {
            forget_subtree_paths(&cache, moved);
        }
        self.release(evicted);
        confirmed
    }

    /// Promotes the provisional child matching `entry`, or adds a new confirmed child.
    fn add_entry(
        &self,
        parent: &Arc<PathNode>,
        children: &mut Children,
        entry: RawDirEntry,
        renamed: &mut Vec<Arc<PathNode>>,
    ) {
        let match_name = self.match_name(&entry.name);
        if let Some(pos) = children.position(&match_name) {
            if pos >= children.provisional() {
                let node = children.promote(pos);
                let mut st = node.state();
                st.kind = entry.kind;
                st.flags.remove(NodeFlags::ENOENT | NodeFlags::ENOTDIR);
                if *st.name != *entry.name {
                    trace!(from = %st.name, to = %entry.name, "adopting on-disk casing");
                    st.name = Arc::from(entry.name);
                    renamed.push(Arc::clone(node));
                }
                return;
            }
        }

        let fullpath = parent
            .cached_fullpath()
            .map(|base| self.join(&base, parent.is_root(), &entry.name));
        let node = PathNode::new_child(parent, &entry.name, match_name, entry.kind, fullpath);
        children.push_confirmed(node);
    }

    pub fn lstat_sync(&self, node: &Arc<PathNode>) -> bool {
        if node.flags().contains(NodeFlags::ENOENT) {
            return false;
        }
        let path = self.fullpath(node);
        trace!(path = %path, "lstat");
        let result = self.fs.lstat_sync(&path);
        self.apply_lstat(node, &path, result)
    }

    pub async fn lstat(self: &Arc<Self>, node: &Arc<PathNode>) -> bool {
        if node.flags().contains(NodeFlags::ENOENT) {
            return false;
        }
        let tree = Arc::clone(self);
        let target = Arc::clone(node);
        self.lstats
            .run(node.id(), move || async move {
                let path = tree.fullpath(&target);
                trace!(path = %path, "lstat");
                let result = tree.fs.lstat(&path).await;
                tree.apply_lstat(&target, &path, result)
            })
            .await
    }

    fn apply_lstat(&self, node: &Arc<PathNode>, path: &str, result: io::Result<Stats>) -> bool {
        match result {
            Ok(stats) => {
                let mut st = node.state();
                st.kind = stats.kind;
                st.flags.insert(NodeFlags::LSTAT_CALLED);
                if !stats.kind.may_have_children() {
                    st.flags.insert(NodeFlags::ENOTDIR);
                }
                st.stats = Some(stats);
                true
            }
            Err(err) => {
                let kind = FsErrorKind::classify(&err);
                debug!(path, ?kind, error = %err, "lstat failed");
                let mut cache = self.children.lock();
                match kind {
                    // The parent path is what could not be walked.
                    FsErrorKind::NotADirectory => {
                        let blocked = node.parent().unwrap_or(node);
                        self.mark_enotdir(&mut cache, blocked);
                    }
                    FsErrorKind::NotFound => self.mark_enoent(&mut cache, node),
                    FsErrorKind::PermissionDenied
                    | FsErrorKind::InvalidArgument
                    | FsErrorKind::Other => {}
                }
                false
            }
        }
    }

    pub fn readlink_sync(&self, node: &Arc<PathNode>) -> Option<Arc<PathNode>> {
        if let Some(target) = node.link_target() {
            return Some(target);
        }
        if !node.can_readlink() {
            return None;
        }
        let parent = node.parent().cloned()?;
        let path = self.fullpath(node);
        trace!(path = %path, "readlink");
        let result = self.fs.readlink_sync(&path);
        self.apply_readlink(node, &parent, &path, result)
    }

    pub async fn readlink(self: &Arc<Self>, node: &Arc<PathNode>) -> Option<Arc<PathNode>> {
        if let Some(target) = node.link_target() {
            return Some(target);
        }
        if !node.can_readlink() {
            return None;
        }
        let parent = node.parent().cloned()?;
        let tree = Arc::clone(self);
        let target = Arc::clone(node);
        self.readlinks
            .run(node.id(), move || async move {
                let path = tree.fullpath(&target);
                trace!(path = %path, "readlink");
                let result = tree.fs.readlink(&path).await;
                tree.apply_readlink(&target, &parent, &path, result)
            })
            .await
    }

    fn apply_readlink(
        &self,
        node: &Arc<PathNode>,
        parent: &Arc<PathNode>,
        path: &str,
        result: io::Result<String>,
    ) -> Option<Arc<PathNode>> {
        match result {
            Ok(text) => {
                // Link text is relative to the directory holding the link.
                let target = self.resolve(parent, &text);
                let mut st = node.state();
                if st.kind == FileKind::Unknown {
                    st.kind = FileKind::SymbolicLink;
                }
                st.link_target = Arc::downgrade(&target);
                Some(target)
            }
            Err(err) => {
                let kind = FsErrorKind::classify(&err);
                debug!(path, ?kind, error = %err, "readlink failed");
                let mut cache = self.children.lock();
                {
                    let mut st = node.state();
                    st.flags.insert(NodeFlags::ENOREADLINK);
                    if kind == FsErrorKind::InvalidArgument {
                        // Exists but is not a link; whatever kind was assumed is now in doubt.
                        st.kind = FileKind::Unknown;
                    }
                }
                match kind {
                    FsErrorKind::NotFound => self.mark_enoent(&mut cache, node),
                    FsErrorKind::NotADirectory => self.mark_enotdir(&mut cache, parent),
                    FsErrorKind::PermissionDenied
                    | FsErrorKind::InvalidArgument
                    | FsErrorKind::Other => {}
                }
                None
            }
        }
    }

    fn realpath_blocked(node: &PathNode) -> bool {
        node.flags()
            .intersects(NodeFlags::ENOREALPATH | NodeFlags::ENOREADLINK | NodeFlags::ENOENT)
    }

    pub fn realpath_sync(&self, node: &Arc<PathNode>) -> Option<Arc<PathNode>> {
        if let Some(target) = node.realpath_target() {
            return Some(target);
        }
        if Self::realpath_blocked(node) {
            return None;
        }
        let path = self.fullpath(node);
        trace!(path = %path, "realpath");
        let result = self.fs.realpath_sync(&path);
        self.apply_realpath(node, &path, result)
    }

    pub async fn realpath(self: &Arc<Self>, node: &Arc<PathNode>) -> Option<Arc<PathNode>> {
        if let Some(target) = node.realpath_target() {
            return Some(target);
        }
        if Self::realpath_blocked(node) {
            return None;
        }
        let tree = Arc::clone(self);
        let target = Arc::clone(node);
        self.realpaths
            .run(node.id(), move || async move {
                let path = tree.fullpath(&target);
                trace!(path = %path, "realpath");
                let result = tree.fs.realpath(&path).await;
                tree.apply_realpath(&target, &path, result)
            })
            .await
    }

    fn apply_realpath(
        &self,
        node: &Arc<PathNode>,
        path: &str,
        result: io::Result<String>,
    ) -> Option<Arc<PathNode>> {
        match result {
            Ok(text) => {
                let target = self.resolve(node, &text);
                node.state().realpath = Arc::downgrade(&target);
                Some(target)
            }
            Err(err) => {
                debug!(path, kind = ?FsErrorKind::classify(&err), error = %err, "realpath failed");
                let mut cache = self.children.lock();
                node.state().flags.insert(NodeFlags::ENOREALPATH);
                self.mark_enotdir(&mut cache, node);
                None
            }
        }
    }

    fn mark_enoent(&self, cache: &mut ChildrenCache, node: &Arc<PathNode>) {
        self.cascade_enoent(cache, vec![Arc::clone(node)]);
    }

    /// Marks `node` as not a directory and everything below it as nonexistent.
    fn mark_enotdir(&self, cache: &mut ChildrenCache, node: &Arc<PathNode>) {
        {
            let mut st = node.state();
            if st.flags.contains(NodeFlags::ENOTDIR) {
                return;
            }
            if st.kind == FileKind::Directory {
                st.kind = FileKind::Unknown;
            }
            st.flags.insert(NodeFlags::ENOTDIR);
        }
        trace!(node = %node.id(), "marked not a directory");
        let mut below = Vec::new();
        demote_children(cache, node, &mut below);
        self.cascade_enoent(cache, below);
    }

    /// Marks every node in `stack`, and every known descendant, as nonexistent.
    ///
    /// Iterative so that deep trees cannot overflow the stack.
    fn cascade_enoent(&self, cache: &mut ChildrenCache, mut stack: Vec<Arc<PathNode>>) {
        let mut marked = 0usize;
        while let Some(node) = stack.pop() {
            {
                let mut st = node.state();
                if st.flags.contains(NodeFlags::ENOENT) {
                    continue;
                }
                st.flags.insert(NodeFlags::ENOENT);
                st.kind = FileKind::Unknown;
            }
            marked += 1;
            demote_children(cache, &node, &mut stack);
        }
        if marked > 0 {
            trace!(marked, "marked nonexistent");
        }
    }

    /// Undoes the bookkeeping of child lists pushed out of the cache.
    ///
    /// Must be called with the children cache lock held.
    fn release(&self, evicted: EvictedChildren) {
        if evicted.is_empty() {
            return;
        }
        let mut owners = FxHashSet::default();
        for (id, slot) in &evicted {
            if let Some(owner) = slot.owner.upgrade() {
                owner.state().flags.remove(NodeFlags::READDIR_CALLED);
            }
            trace!(node = %id, children = slot.children.len(), "evicted child list");
            owners.insert(*id);
        }

        // A resolution is stale once any list on the way down to its result is gone.
        let mut resolves = self.resolves.lock();
        let stale: Vec<(NodeId, String)> = resolves
            .iter()
            .filter(|(_, node)| below_any(node, &owners))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            resolves.remove(key);
        }
        if !stale.is_empty() {
            trace!(dropped = stale.len(), "dropped stale resolutions");
        }
    }
}

fn fresh_slot(owner: &Arc<PathNode>) -> ChildSlot {
    // No cached list means no completed read.
    owner.state().flags.remove(NodeFlags::READDIR_CALLED);
    ChildSlot::new(owner)
}

fn below_any(node: &PathNode, owners: &FxHashSet<NodeId>) -> bool {
    let mut up = node.parent();
    while let Some(parent) = up {
        if owners.contains(&parent.id()) {
            return true;
        }
        up = parent.parent();
    }
    false
}

fn demote_children(cache: &mut ChildrenCache, node: &PathNode, out: &mut Vec<Arc<PathNode>>) {
    if let Some(slot) = cache.peek_mut(&node.id()) {
        slot.children.demote_all();
        out.extend(slot.children.iter().cloned());
    }
}

fn forget_subtree_paths(cache: &ChildrenCache, node: &Arc<PathNode>) {
    let mut stack = vec![Arc::clone(node)];
    while let Some(n) = stack.pop() {
        n.forget_fullpaths();
        if let Some(slot) = cache.peek(&n.id()) {
            stack.extend(slot.children.iter().cloned());
        }
    }
}
