#![allow(missing_docs, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scurry::{FileKind, FsProvider, RawDirEntry, Stats};

/// Maximum number of symlinks followed while walking a path, like `MAXSYMLINKS`.
const MAX_HOPS: usize = 40;

/// One entry of the in-memory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockNode {
    Dir,
    File,
    Fifo,
    /// Raw link text, relative to the directory holding the link unless absolute.
    Symlink(String),
}

impl MockNode {
    fn kind(&self) -> FileKind {
        match self {
            Self::Dir => FileKind::Directory,
            Self::File => FileKind::File,
            Self::Fifo => FileKind::Fifo,
            Self::Symlink(_) => FileKind::SymbolicLink,
        }
    }
}

/// The primitive a call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Lstat,
    Readdir,
    Readlink,
    Realpath,
}

/// Shared state backing `MockFs`.
#[derive(Debug, Default)]
pub struct MockFsState {
    /// Absolute posix path -> entry. `/` is an implicit directory.
    pub nodes: BTreeMap<String, MockNode>,
    /// Errors to return instead of consulting `nodes`, as raw errno values.
    pub failures: HashMap<(Op, String), i32>,
    /// Every call, by primitive and path.
    pub calls: HashMap<(Op, String), usize>,
    /// Report `Unknown` for every listed entry, like filesystems without `d_type`.
    pub hide_types: bool,
    /// Delay applied to every async call before it touches the tree.
    pub latency: Option<Duration>,
}

/// A clonable in-memory posix filesystem. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    pub state: Arc<Mutex<MockFsState>>,
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(i) => path[..i].to_owned(),
    }
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, path: &str, node: MockNode) -> &Self {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        let mut dir = parent_of(&path);
        while dir != "/" {
            state.nodes.entry(dir.clone()).or_insert(MockNode::Dir);
            dir = parent_of(&dir);
        }
        state.nodes.insert(path, node);
        self
    }

    /// Creates a directory and any missing parents.
    pub fn dir(&self, path: &str) -> &Self {
        self.insert(path, MockNode::Dir)
    }

    /// Creates a regular file and any missing parents.
    pub fn file(&self, path: &str) -> &Self {
        self.insert(path, MockNode::File)
    }

    /// Creates a named pipe and any missing parents.
    pub fn fifo(&self, path: &str) -> &Self {
        self.insert(path, MockNode::Fifo)
    }

    /// Creates a symlink holding `target` verbatim.
    pub fn symlink(&self, path: &str, target: &str) -> &Self {
        self.insert(path, MockNode::Symlink(target.to_owned()))
    }

    /// Deletes `path` and everything below it.
    pub fn remove(&self, path: &str) -> &Self {
        let path = normalize(path);
        let prefix = join(&path, "");
        self.state
            .lock()
            .unwrap()
            .nodes
            .retain(|p, _| *p != path && !p.starts_with(&prefix));
        self
    }

    /// Makes every future `op` on exactly `path` fail with `code`.
    pub fn fail(&self, op: Op, path: &str, code: i32) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, normalize(path)), code);
        self
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn hide_types(&self, hide: bool) {
        self.state.lock().unwrap().hide_types = hide;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    /// Number of `op` calls made against `path`.
    pub fn calls(&self, op: Op, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&(op, normalize(path)))
            .copied()
            .unwrap_or(0)
    }

    /// Number of `op` calls made against any path.
    pub fn total_calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|((o, _), _)| *o == op)
            .map(|(_, n)| n)
            .sum()
    }

    /// Records the call and returns the injected failure, if any.
    fn enter(&self, op: Op, path: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = (op, normalize(path));
        let injected = state.failures.get(&key).copied();
        *state.calls.entry(key).or_default() += 1;
        match injected {
            Some(code) => Err(errno(code)),
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        let latency = self.state.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Walks `path` component by component, following intermediate symlinks and the final one
    /// when `follow_last` is set. Returns the canonical path and its entry.
    fn walk(&self, path: &str, follow_last: bool) -> io::Result<(String, MockNode)> {
        let state = self.state.lock().unwrap();
        let node_at = |p: &str| -> Option<MockNode> {
            if p == "/" {
                Some(MockNode::Dir)
            } else {
                state.nodes.get(p).cloned()
            }
        };

        let mut pending: VecDeque<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let mut cur = "/".to_owned();
        let mut hops = 0;

        while let Some(part) = pending.pop_front() {
            match part.as_str() {
                "." => continue,
                ".." => {
                    cur = parent_of(&cur);
                    continue;
                }
                _ => {}
            }
            let next = join(&cur, &part);
            let node = node_at(&next).ok_or_else(|| errno(libc::ENOENT))?;
            match node {
                MockNode::Symlink(target) if follow_last || !pending.is_empty() => {
                    hops += 1;
                    if hops > MAX_HOPS {
                        return Err(errno(libc::ELOOP));
                    }
                    if target.starts_with('/') {
                        cur = "/".to_owned();
                    }
                    let mut expanded: VecDeque<String> = target
                        .split('/')
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect();
                    expanded.extend(pending);
                    pending = expanded;
                }
                MockNode::Dir => cur = next,
                other => {
                    if !pending.is_empty() {
                        return Err(errno(libc::ENOTDIR));
                    }
                    return Ok((next, other));
                }
            }
        }
        let node = node_at(&cur).ok_or_else(|| errno(libc::ENOENT))?;
        Ok((cur, node))
    }

    fn list(&self, dir: &str) -> Vec<RawDirEntry> {
        let state = self.state.lock().unwrap();
        let prefix = join(dir, "");
        state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| !p[prefix.len()..].contains('/'))
            .map(|(p, node)| {
                let kind = if state.hide_types {
                    FileKind::Unknown
                } else {
                    node.kind()
                };
                RawDirEntry::new(&p[prefix.len()..], kind)
            })
            .collect()
    }
}

impl FsProvider for MockFs {
    fn lstat_sync(&self, path: &str) -> io::Result<Stats> {
        self.enter(Op::Lstat, path)?;
        let (_, node) = self.walk(path, false)?;
        Ok(Stats::of_kind(node.kind()))
    }

    fn readdir_sync(&self, path: &str) -> io::Result<Vec<RawDirEntry>> {
        self.enter(Op::Readdir, path)?;
        match self.walk(path, true)? {
            (dir, MockNode::Dir) => Ok(self.list(&dir)),
            _ => Err(errno(libc::ENOTDIR)),
        }
    }

    fn readlink_sync(&self, path: &str) -> io::Result<String> {
        self.enter(Op::Readlink, path)?;
        match self.walk(path, false)? {
            (_, MockNode::Symlink(target)) => Ok(target),
            _ => Err(errno(libc::EINVAL)),
        }
    }

    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        self.enter(Op::Realpath, path)?;
        self.walk(path, true).map(|(canonical, _)| canonical)
    }

    async fn lstat(&self, path: &str) -> io::Result<Stats> {
        self.pause().await;
        self.lstat_sync(path)
    }

    async fn readdir(&self, path: &str) -> io::Result<Vec<RawDirEntry>> {
        self.pause().await;
        self.readdir_sync(path)
    }

    async fn readlink(&self, path: &str) -> io::Result<String> {
        self.pause().await;
        self.readlink_sync(path)
    }

    async fn realpath(&self, path: &str) -> io::Result<String> {
        self.pause().await;
        self.realpath_sync(path)
    }
}
