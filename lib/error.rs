//! Errors raised while building a [`PathScurry`](crate::PathScurry).
//!
//! Filesystem failures during resolution and traversal are never errors; they become node flags.

use std::io;

use thiserror::Error;

use crate::path::Platform;

/// Construction and configuration failures.
#[derive(Debug, Error)]
pub enum ScurryError {
    /// The process working directory was needed to anchor a relative cwd and could not be read.
    #[error("failed to read the process working directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The working directory does not start at a root of the configured platform.
    #[error("working directory {cwd:?} is not absolute on {platform}")]
    RelativeCwd {
        /// The rejected directory.
        cwd: String,
        /// The platform it was checked against.
        platform: Platform,
    },

    /// A cache was configured with no room at all.
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    /// The default Win32 drive is not a letter.
    #[error("default drive {0:?} is not an ASCII letter")]
    InvalidDrive(char),
}
