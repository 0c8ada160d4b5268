#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{MockFs, Op, names, posix_options, posix_scurry, scurry_with};
use scurry::{FileKind, NodeFlags, PathEntry, Platform, ScurryOptions};

fn dir_abcd() -> MockFs {
    let fs = MockFs::new();
    fs.file("/t/dir/a")
        .file("/t/dir/b")
        .file("/t/dir/c")
        .file("/t/dir/d");
    fs
}

#[test]
fn provisional_children_are_promoted_in_place() {
    let fs = dir_abcd();
    let s = posix_scurry(&fs, "/t");

    let a = s.entry("dir/a");
    let b = s.entry("dir/b");
    assert!(a.is_unknown(), "nothing has been read yet");
    assert!(!s.entry("dir").called_readdir());

    let listed = s.readdir_sync("dir");
    assert_eq!(names(&listed), ["a", "b", "c", "d"]);
    assert!(listed.contains(&a), "a must be promoted, not replaced");
    assert!(listed.contains(&b), "b must be promoted, not replaced");
    assert!(a.is_file());
    assert_eq!(s.entry("dir/a"), a);
    assert_eq!(fs.calls(Op::Readdir, "/t/dir"), 1);
}

#[test]
fn listing_reports_entry_types() {
    let fs = MockFs::new();
    fs.file("/t/file")
        .dir("/t/sub")
        .symlink("/t/link", "file")
        .fifo("/t/pipe");
    let s = posix_scurry(&fs, "/t");

    let listed = s.readdir_sync(".");
    let kind_of = |name: &str| listed.iter().find(|e| e.name() == name).unwrap().kind();
    assert_eq!(kind_of("file"), FileKind::File);
    assert_eq!(kind_of("sub"), FileKind::Directory);
    assert_eq!(kind_of("link"), FileKind::SymbolicLink);
    assert_eq!(kind_of("pipe"), FileKind::Fifo);
    assert_eq!(s.entry("pipe").type_name(), "FIFO");
    assert!(s.entry("pipe").is_fifo());
}

#[test]
fn second_read_is_served_from_cache() {
    let fs = dir_abcd();
    let s = posix_scurry(&fs, "/t");
    let dir = s.entry("dir");

    let first = dir.readdir_sync();
    let second = dir.readdir_sync();
    assert_eq!(first, second);
    assert!(dir.called_readdir());
    assert_eq!(dir.readdir_cached(), first);
    assert_eq!(fs.calls(Op::Readdir, "/t/dir"), 1);
}

#[test]
fn guessed_children_missing_from_listing_become_nonexistent() {
    let fs = dir_abcd();
    let s = posix_scurry(&fs, "/t");

    let ghost = s.entry("dir/ghost/deeper");
    let listed = s.readdir_sync("dir");
    assert_eq!(listed.len(), 4);
    assert!(s.entry("dir/ghost").is_enoent());
    assert!(ghost.is_enoent(), "descendants of a missing entry are missing too");

    assert!(ghost.lstat_sync().is_none());
    assert_eq!(fs.total_calls(Op::Lstat), 0, "known-missing entries are never stat'ed");
}

#[test]
fn promotion_adopts_on_disk_casing() {
    let fs = MockFs::new();
    fs.file("/t/Foo.TXT").file("/t/Sub/x");
    let s = scurry_with(&fs, "/t", ScurryOptions::for_platform(Platform::Darwin));

    let foo = s.entry("foo.txt");
    let x = s.entry("sub/x");
    assert_eq!(foo.name(), "foo.txt");
    assert_eq!(x.fullpath(), "/t/sub/x");

    s.readdir_sync(".");
    assert_eq!(foo.name(), "Foo.TXT");
    assert!(foo.is_file());
    assert_eq!(foo.fullpath(), "/t/Foo.TXT");
    assert_eq!(x.fullpath(), "/t/Sub/x", "renamed ancestors re-render descendants");

    assert_eq!(s.entry("FOO.txt"), foo);
    assert!(foo.is_named("foo.TXT"));
}

#[test]
fn reading_a_file_marks_it_not_a_directory() {
    let fs = MockFs::new();
    fs.file("/t/f");
    let s = posix_scurry(&fs, "/t");
    let f = s.entry("f");

    assert!(f.readdir_sync().is_empty());
    assert!(f.flags().contains(NodeFlags::ENOTDIR));
    assert!(!f.can_readdir());
    assert!(f.readdir_sync().is_empty());
    assert_eq!(fs.calls(Op::Readdir, "/t/f"), 1);

    assert!(s.entry("f/inside").is_enoent(), "children of a non-directory are born missing");
}

#[test]
fn missing_directory_cascades_to_known_descendants() {
    let fs = MockFs::new();
    fs.dir("/t");
    let s = posix_scurry(&fs, "/t");

    let deep = s.entry("gone/a/b");
    assert!(s.readdir_sync("gone").is_empty());
    assert!(s.entry("gone").is_enoent());
    assert!(s.entry("gone/a").is_enoent());
    assert!(deep.is_enoent());
    assert!(deep.is_unknown());

    assert!(deep.lstat_sync().is_none());
    assert!(s.readdir_sync("gone/a").is_empty());
    assert_eq!(fs.total_calls(Op::Lstat), 0);
    assert_eq!(fs.total_calls(Op::Readdir), 1);
}

#[test]
fn permission_denied_is_an_unreadable_directory() {
    let fs = MockFs::new();
    fs.file("/t/locked/secret");
    fs.fail(Op::Readdir, "/t/locked", libc::EPERM);
    let s = posix_scurry(&fs, "/t");

    let locked = s.entry("locked");
    let secret = s.entry("locked/secret");
    assert!(locked.readdir_sync().is_empty());
    assert!(locked.flags().contains(NodeFlags::ENOTDIR));
    assert!(!locked.is_enoent());
    assert!(secret.is_enoent());

    assert!(locked.readdir_sync().is_empty());
    assert_eq!(fs.calls(Op::Readdir, "/t/locked"), 1);
}

#[test]
fn unknown_errors_leave_the_directory_retryable() {
    let fs = MockFs::new();
    fs.file("/t/flaky/one");
    fs.fail(Op::Readdir, "/t/flaky", libc::EACCES);
    let s = posix_scurry(&fs, "/t");

    let flaky = s.entry("flaky");
    let one = s.entry("flaky/one");
    assert!(flaky.readdir_sync().is_empty());
    assert!(!flaky.flags().intersects(NodeFlags::ENOCHILD));
    assert!(!flaky.called_readdir());
    assert!(!one.is_enoent());

    fs.clear_failures();
    assert_eq!(flaky.readdir_sync(), vec![one.clone()]);
    assert!(one.is_file());
    assert_eq!(fs.calls(Op::Readdir, "/t/flaky"), 2);
}

fn snapshot(entries: &[PathEntry<MockFs>]) -> Vec<(String, FileKind)> {
    let mut out: Vec<(String, FileKind)> = entries.iter().map(|e| (e.name(), e.kind())).collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[test]
fn evicted_listings_are_read_again() {
    let fs = MockFs::new();
    for i in 0..10 {
        for j in 0..3 {
            fs.file(&format!("/d{i}/f{j}"));
        }
    }
    let s = scurry_with(
        &fs,
        "/",
        ScurryOptions {
            children_cache_size: 16,
            ..posix_options()
        },
    );

    let first = s.entry("/d0");
    let held = s.entry("/d0/f1");
    let before = snapshot(&first.readdir_sync());

    for i in 1..10 {
        s.readdir_sync(&format!("/d{i}"));
        let stats = s.cache_stats();
        assert!(
            stats.children_weight <= stats.children_capacity,
            "cache weight {} exceeds budget {}",
            stats.children_weight,
            stats.children_capacity
        );
    }
    assert!(!first.called_readdir(), "eviction clears the completed-read flag");

    let after = snapshot(&first.readdir_sync());
    assert_eq!(before, after);
    assert_eq!(fs.calls(Op::Readdir, "/d0"), 2);
    assert_eq!(held.fullpath(), "/d0/f1", "detached nodes still render");
}

#[test]
fn large_provisional_lists_reconcile_without_duplicates() {
    let fs = MockFs::new();
    fs.file("/big/n7").file("/big/n99999").dir("/big/extra");
    let s = scurry_with(
        &fs,
        "/big",
        ScurryOptions {
            children_cache_size: 1 << 20,
            ..posix_options()
        },
    );
    let cwd = s.cwd();
    let held: Vec<_> = (0..100_000).map(|i| cwd.child(&format!("n{i}"))).collect();

    let listed = cwd.readdir_sync();
    assert_eq!(names(&listed), ["extra", "n7", "n99999"]);
    assert!(listed.contains(&held[7]));
    assert!(listed.contains(&held[99_999]));
    assert_eq!(held.iter().filter(|e| e.is_enoent()).count(), 99_998);
    assert_eq!(cwd.child("n5"), held[5], "lookups still find the demoted nodes");
    assert!(held[5].is_enoent());
}

#[test]
fn default_budget_pushes_out_oversized_lists() {
    let fs = MockFs::new();
    fs.file("/big/n7").file("/big/n99999").file("/other/x");
    let s = posix_scurry(&fs, "/big");
    let other = s.entry("/other");
    assert_eq!(names(&other.readdir_sync()), ["x"]);
    assert!(other.called_readdir());

    let cwd = s.cwd();
    let held: Vec<_> = (0..100_000).map(|i| cwd.child(&format!("n{i}"))).collect();
    assert!(!other.called_readdir(), "pushed out by the growing list");
    let stats = s.cache_stats();
    assert_eq!(stats.children_capacity, 16 * 1024);
    assert_eq!(stats.child_lists, 1, "an oversized list is kept alone");
    assert_eq!(stats.children_weight, 100_001);

    let listed = cwd.readdir_sync();
    assert_eq!(names(&listed), ["n7", "n99999"]);
    assert!(listed.contains(&held[7]));
    assert!(cwd.called_readdir());

    assert_eq!(names(&other.readdir_sync()), ["x"]);
    assert_eq!(fs.calls(Op::Readdir, "/other"), 2);
    assert!(!cwd.called_readdir(), "the oversized list goes first");
    let stats = s.cache_stats();
    assert_eq!(stats.child_lists, 1);
    assert!(stats.children_weight <= stats.children_capacity);
}

#[test]
fn eviction_drops_only_resolutions_below_the_evicted_list() {
    let fs = MockFs::new();
    for i in 0..8 {
        fs.file(&format!("/big/f{i}"));
    }
    let s = scurry_with(
        &fs,
        "/",
        ScurryOptions {
            children_cache_size: 16,
            ..posix_options()
        },
    );

    // Lists, coldest first: /a (2), /b (2), / (4).
    let x = s.entry("a/x");
    let y = s.entry("b/y");
    let big = s.entry("big");
    let before = s.cache_stats();
    assert_eq!(before.children_weight, 8);

    // Nine more units push out /a and nothing else.
    assert_eq!(big.readdir_sync().len(), 8);
    let after = s.cache_stats();
    assert_eq!(after.child_lists, 3);
    assert_eq!(after.resolves, before.resolves - 1, "only a/x is forgotten");

    assert_eq!(s.entry("b/y"), y);
    assert_eq!(s.entry("big"), big);
    assert_ne!(s.entry("a/x"), x, "a fresh list holds a fresh node");
    assert_eq!(x.fullpath(), "/a/x");
}
