#![allow(dead_code, missing_docs, clippy::unwrap_used)]

pub mod mock_fs;

use scurry::{PathScurry, Platform, ScurryOptions};

pub use mock_fs::{MockFs, Op};

/// Posix options regardless of the host, so the mock's paths are understood everywhere.
pub fn posix_options() -> ScurryOptions {
    ScurryOptions::for_platform(Platform::Posix)
}

/// A posix context over `fs` rooted at `cwd`.
pub fn posix_scurry(fs: &MockFs, cwd: &str) -> PathScurry<MockFs> {
    PathScurry::with_provider(cwd, posix_options(), fs.clone()).unwrap()
}

/// A context over `fs` with explicit options.
pub fn scurry_with(fs: &MockFs, cwd: &str, options: ScurryOptions) -> PathScurry<MockFs> {
    PathScurry::with_provider(cwd, options, fs.clone()).unwrap()
}

/// Sorted names of `entries`.
pub fn names<P: scurry::FsProvider>(entries: &[scurry::PathEntry<P>]) -> Vec<String> {
    let mut out: Vec<String> = entries.iter().map(scurry::PathEntry::name).collect();
    out.sort();
    out
}
