//! Breadth-first traversal over a [`PathScurry`].

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;

use crate::fs::{FsProvider, RealFs};
use crate::path::PathEntry;
use crate::scurry::{PathScurry, Target};

/// A predicate over entries.
pub type EntryFilter<P = RealFs> = Arc<dyn Fn(&PathEntry<P>) -> bool + Send + Sync>;

/// Traversal settings.
pub struct WalkOptions<P: FsProvider = RealFs> {
    /// Descend into symlinked directories, through their real path.
    pub follow: bool,
    /// Entries that appear in the results. Everything when `None`.
    pub filter: Option<EntryFilter<P>>,
    /// Directories that are descended into. Everything when `None`.
    pub walk_filter: Option<EntryFilter<P>>,
}

impl<P: FsProvider> Default for WalkOptions<P> {
    fn default() -> Self {
        Self {
            follow: false,
            filter: None,
            walk_filter: None,
        }
    }
}

impl<P: FsProvider> Clone for WalkOptions<P> {
    fn clone(&self) -> Self {
        Self {
            follow: self.follow,
            filter: self.filter.clone(),
            walk_filter: self.walk_filter.clone(),
        }
    }
}

impl<P: FsProvider> fmt::Debug for WalkOptions<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkOptions")
            .field("follow", &self.follow)
            .field("filter", &self.filter.is_some())
            .field("walk_filter", &self.walk_filter.is_some())
            .finish()
    }
}

impl<P: FsProvider> WalkOptions<P> {
    /// Sets [`follow`](Self::follow).
    #[must_use]
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Sets [`filter`](Self::filter).
    #[must_use]
    pub fn filter(mut self, f: impl Fn(&PathEntry<P>) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(f));
        self
    }

    /// Sets [`walk_filter`](Self::walk_filter).
    #[must_use]
    pub fn walk_filter(
        mut self,
        f: impl Fn(&PathEntry<P>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.walk_filter = Some(Arc::new(f));
        self
    }

    fn accepts(&self, entry: &PathEntry<P>) -> bool {
        self.filter.as_ref().is_none_or(|f| f(entry))
    }

    fn walk_predicate(&self) -> Option<&dyn Fn(&PathEntry<P>) -> bool> {
        let f: &dyn Fn(&PathEntry<P>) -> bool = self.walk_filter.as_deref()?;
        Some(f)
    }
}

impl<P: FsProvider> PathScurry<P> {
    /// Every entry under `target`, `target` included, in breadth-first order.
    pub fn walk_sync<'a>(
        &self,
        target: impl Into<Target<'a, P>>,
        opts: &WalkOptions<P>,
    ) -> Vec<PathEntry<P>> {
        let start = self.entry(target);
        let mut results = Vec::new();
        if opts.accepts(&start) {
            results.push(start.clone());
        }
        let mut visited = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([start]);

        while let Some(dir) = queue.pop_front() {
            for entry in dir.readdir_sync() {
                if opts.accepts(&entry) {
                    results.push(entry.clone());
                }
                let Some(next) = descent_sync(entry, opts.follow) else {
                    continue;
                };
                if next.should_walk(&visited, opts.walk_predicate()) {
                    visited.insert(next.clone());
                    queue.push_back(next);
                }
            }
        }
        results
    }

    /// Async form of [`walk_sync`](Self::walk_sync). Each level's directories are read
    /// concurrently.
    pub async fn walk<'a>(
        &self,
        target: impl Into<Target<'a, P>>,
        opts: &WalkOptions<P>,
    ) -> Vec<PathEntry<P>> {
        let start = self.entry(target);
        let mut results = Vec::new();
        if opts.accepts(&start) {
            results.push(start.clone());
        }
        let mut visited = HashSet::from([start.clone()]);
        let mut level = vec![start];

        while !level.is_empty() {
            let listings = join_all(level.iter().map(PathEntry::readdir)).await;
            let mut next_level = Vec::new();
            for entry in listings.into_iter().flatten() {
                if opts.accepts(&entry) {
                    results.push(entry.clone());
                }
                let Some(next) = descent(entry, opts.follow).await else {
                    continue;
                };
                if next.should_walk(&visited, opts.walk_predicate()) {
                    visited.insert(next.clone());
                    next_level.push(next);
                }
            }
            level = next_level;
        }
        results
    }
}

/// The directory to descend into for `entry`, if any: its real path when following a link, and
/// with its type learned if the listing did not report one.
fn descent_sync<P: FsProvider>(entry: PathEntry<P>, follow: bool) -> Option<PathEntry<P>> {
    let dir = if follow && entry.is_symbolic_link() {
        entry.realpath_sync()?
    } else {
        entry
    };
    if dir.is_unknown() {
        return dir.lstat_sync();
    }
    Some(dir)
}

async fn descent<P: FsProvider>(entry: PathEntry<P>, follow: bool) -> Option<PathEntry<P>> {
    let dir = if follow && entry.is_symbolic_link() {
        entry.realpath().await?
    } else {
        entry
    };
    if dir.is_unknown() {
        return dir.lstat().await;
    }
    Some(dir)
}
