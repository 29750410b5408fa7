//! Error types for the tail library.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when opening or reading files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// A line that is not valid UTF-8.
    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// File path errors.
    #[error("Invalid file path: {message}")]
    InvalidPath { message: String },

    /// The file to tail does not exist.
    #[error("File does not exist: {path}")]
    FileNotFound { path: String },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Line separators must be at least one byte long.
    #[error("Line separator must not be empty")]
    InvalidSeparator,

    /// A read cycle failed; tailing resumes on the next change.
    #[error("Read of {} at offset {offset} failed: {source}", path.display())]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The file reappeared but could not be opened; the session ends.
    #[error("Reopening {} failed: {source}", path.display())]
    Reopen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A convenient Result type for tail operations.
pub type Result<T> = std::result::Result<T, Error>;
