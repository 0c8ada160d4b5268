//! Path-string rules per platform: separators, roots and case sensitivity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The path flavour a tree is built for.
///
/// Chosen once when a [`PathScurry`](crate::PathScurry) is built, independent of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// `/`-separated paths, case-sensitive by default.
    Posix,
    /// POSIX path syntax, case-insensitive by default.
    Darwin,
    /// Drive letters and UNC roots, `\` or `/` separators, case-insensitive by default.
    Win32,
}

/// A root prefix split off the front of a path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RootSpec {
    /// A root with a canonical name, such as `/`, `C:\` or `\\HOST\SHARE\`.
    Named(String),
    /// A bare leading separator on Win32: the root of whatever tree the walk starts in.
    Current,
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

impl Platform {
    /// The platform this process runs on.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(windows) {
            Self::Win32
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Posix
        }
    }

    /// The separator used when rendering paths.
    #[must_use]
    pub const fn sep(self) -> char {
        match self {
            Self::Posix | Self::Darwin => '/',
            Self::Win32 => '\\',
        }
    }

    /// Whether names compare case-insensitively unless configured otherwise.
    #[must_use]
    pub const fn default_nocase(self) -> bool {
        matches!(self, Self::Darwin | Self::Win32)
    }

    /// Returns `true` if `c` separates path segments on this platform.
    #[must_use]
    pub fn is_sep(self, c: char) -> bool {
        match self {
            Self::Posix | Self::Darwin => c == '/',
            Self::Win32 => c == '/' || c == '\\',
        }
    }

    /// Returns `true` if `path` does not depend on a working directory.
    ///
    /// On Win32 a path with a leading separator counts as absolute even without a drive.
    #[must_use]
    pub fn is_absolute(self, path: &str) -> bool {
        match self {
            Self::Posix | Self::Darwin => path.starts_with('/'),
            Self::Win32 => {
                let b = path.as_bytes();
                matches!(b.first(), Some(b'/' | b'\\'))
                    || (b.len() >= 3
                        && b[0].is_ascii_alphabetic()
                        && b[1] == b':'
                        && matches!(b[2], b'/' | b'\\'))
            }
        }
    }

    /// Iterates the segments of a root-less path. Empty segments are kept; the graph treats them
    /// like `.`.
    pub(crate) fn segments(self, rest: &str) -> impl Iterator<Item = &str> {
        rest.split(move |c| self.is_sep(c))
    }

    /// Splits a path into its root prefix, if any, and the remainder.
    pub(crate) fn split_root(self, path: &str) -> (Option<RootSpec>, &str) {
        match self {
            Self::Posix | Self::Darwin => match path.strip_prefix('/') {
                Some(rest) => (Some(RootSpec::Named("/".to_owned())), rest),
                None => (None, path),
            },
            Self::Win32 => split_win32_root(path),
        }
    }

    /// The root a tree starts with when nothing else is known.
    pub(crate) fn default_root(self, drive: char) -> String {
        match self {
            Self::Posix | Self::Darwin => "/".to_owned(),
            Self::Win32 => format!("{}:\\", drive.to_ascii_uppercase()),
        }
    }

    /// Renders a root name with `/` separators.
    ///
    /// Drive roots take the `//?/C:/` form so the result is still unambiguous.
    pub(crate) fn posix_root(self, root: &str) -> String {
        match self {
            Self::Posix | Self::Darwin => root.to_owned(),
            Self::Win32 => {
                let p = root.replace('\\', "/");
                if is_drive_prefix(p.as_bytes()) && p.as_bytes().get(2) == Some(&b'/') {
                    format!("//?/{p}")
                } else {
                    p
                }
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Posix => "posix",
            Self::Darwin => "darwin",
            Self::Win32 => "win32",
        })
    }
}

fn is_win_sep(b: u8) -> bool {
    b == b'/' || b == b'\\'
}

fn is_drive_prefix(b: &[u8]) -> bool {
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Length of the segment starting at `from`, up to the next separator.
fn segment_end(b: &[u8], from: usize) -> usize {
    b[from..]
        .iter()
        .position(|&c| is_win_sep(c))
        .map_or(b.len(), |n| from + n)
}

fn drive_root(letter: u8) -> String {
    format!("{}:\\", char::from(letter.to_ascii_uppercase()))
}

/// `\\server\share\` with separators folded and names uppercased.
fn unc_root(server: &str, share: &str) -> String {
    let mut root = String::with_capacity(server.len() + share.len() + 4);
    root.push_str("\\\\");
    root.push_str(&server.to_uppercase());
    root.push('\\');
    root.push_str(&share.to_uppercase());
    root.push('\\');
    root
}

fn split_win32_root(path: &str) -> (Option<RootSpec>, &str) {
    let b = path.as_bytes();

    if b.len() >= 2 && is_win_sep(b[0]) && is_win_sep(b[1]) {
        // \\?\C:\ and \\.\C:\ name the plain drive root.
        if b.len() >= 4 && matches!(b[2], b'?' | b'.') && is_win_sep(b[3]) {
            let rest = &b[4..];
            if is_drive_prefix(rest) {
                let skip = if rest.len() > 2 && is_win_sep(rest[2]) { 7 } else { 6 };
                return (
                    Some(RootSpec::Named(drive_root(rest[0]))),
                    path.get(skip..).unwrap_or(""),
                );
            }
        }
        let server_end = segment_end(b, 2);
        let server = &path[2..server_end];
        let share_end = if server_end < b.len() {
            segment_end(b, server_end + 1)
        } else {
            server_end
        };
        let share = path.get(server_end + 1..share_end).unwrap_or("");
        // Without both a server and a share this is not UNC, just a rooted path.
        if server.is_empty() || share.is_empty() {
            return (Some(RootSpec::Current), &path[1..]);
        }
        let rest = path.get(share_end + 1..).unwrap_or("");
        return (Some(RootSpec::Named(unc_root(server, share))), rest);
    }

    if b.first().copied().is_some_and(is_win_sep) {
        return (Some(RootSpec::Current), &path[1..]);
    }

    if is_drive_prefix(b) {
        // `C:` without a separator still lands on the drive root.
        let rest = if b.len() > 2 && is_win_sep(b[2]) {
            &path[3..]
        } else {
            &path[2..]
        };
        return (Some(RootSpec::Named(drive_root(b[0]))), rest);
    }

    (None, path)
}
