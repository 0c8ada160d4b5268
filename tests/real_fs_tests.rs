#![cfg(unix)]
#![allow(clippy::unwrap_used, missing_docs)]

use std::os::unix::fs::symlink;

use tempfile::TempDir;

use scurry::{FileKind, PathEntry, PathScurry, Platform, ScurryOptions, WalkOptions};

fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("dir/sub")).unwrap();
    std::fs::write(root.join("hello"), "world").unwrap();
    std::fs::write(root.join("dir/sub/file"), "x").unwrap();
    symlink("./hello", root.join("link")).unwrap();
    symlink("dir", root.join("dirlink")).unwrap();
    dir
}

/// Opens a context at the canonical form of `dir`, so realpath results land on the same nodes.
fn open(dir: &TempDir) -> PathScurry {
    let cwd = std::fs::canonicalize(dir.path()).unwrap();
    PathScurry::new(
        cwd.to_str().unwrap(),
        ScurryOptions::for_platform(Platform::Posix),
    )
    .unwrap()
}

fn sorted_names(entries: &[PathEntry]) -> Vec<String> {
    let mut out: Vec<String> = entries.iter().map(PathEntry::name).collect();
    out.sort();
    out
}

#[test]
fn readdir_reports_names_and_types() {
    let dir = fixture();
    let s = open(&dir);

    let listed = s.readdir_sync(".");
    assert_eq!(sorted_names(&listed), ["dir", "dirlink", "hello", "link"]);
    assert!(s.entry("hello").is_file());
    assert!(s.entry("dir").is_directory());
    assert!(s.entry("link").is_symbolic_link());
    assert!(s.entry("dirlink").is_symbolic_link());
}

#[test]
fn lstat_records_metadata() {
    let dir = fixture();
    let s = open(&dir);

    let hello = s.lstat_sync("hello").unwrap();
    let stats = hello.lstat_cached().unwrap();
    assert_eq!(stats.kind, FileKind::File);
    assert_eq!(stats.size, 5);
    assert_ne!(stats.mode, 0);
    assert!(stats.mtime.is_some());
    assert!(s.lstat_sync("nope").is_none());
    assert!(s.entry("nope").is_enoent());
}

#[test]
fn links_resolve_to_shared_nodes() {
    let dir = fixture();
    let s = open(&dir);

    assert_eq!(s.readlink_sync("link"), Some(s.entry("hello")));
    assert_eq!(s.readlink_sync("hello"), None);
    assert_eq!(
        s.realpath_sync("dirlink/sub/file"),
        Some(s.entry("dir/sub/file"))
    );
    assert_eq!(s.realpath_sync("missing"), None);
}

#[test]
fn deleted_directories_read_as_missing() {
    let dir = fixture();
    let s = open(&dir);

    let sub = s.entry("dir/sub");
    let file = s.entry("dir/sub/file");
    std::fs::remove_dir_all(dir.path().join("dir")).unwrap();

    assert!(sub.readdir_sync().is_empty());
    assert!(sub.is_enoent());
    assert!(file.is_enoent());
}

#[test]
fn following_walk_reads_each_directory_once() {
    let dir = fixture();
    let s = open(&dir);

    let found = s.walk_sync(".", &WalkOptions::default().follow(true));
    let rel: Vec<String> = {
        let mut rel: Vec<String> = found.iter().map(|e| s.relative(e)).collect();
        rel.sort();
        rel
    };
    assert_eq!(
        rel,
        ["", "dir", "dir/sub", "dir/sub/file", "dirlink", "hello", "link"]
    );
}

#[tokio::test]
async fn async_primitives_match_sync_ones() {
    let dir = fixture();
    let s = open(&dir);

    let listed = s.readdir(".").await;
    assert_eq!(sorted_names(&listed), ["dir", "dirlink", "hello", "link"]);
    assert!(s.lstat("hello").await.unwrap().is_file());
    assert_eq!(s.readlink("link").await, Some(s.entry("hello")));
    assert_eq!(s.realpath("dirlink").await, Some(s.entry("dir")));

    let walked = s.walk(".", &WalkOptions::default()).await;
    assert_eq!(walked.len(), 7, "dirlink is listed but not followed");
}
