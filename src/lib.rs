//! Follow a growing file the way `tail -f` does.
//!
//! A background task watches the file and its directory, reads whatever is
//! appended, and hands the bytes to a [`Tail`] through a bounded queue. The
//! file may be truncated, removed, or replaced: a following session picks up
//! the new file where the old one left off, and a non-following session
//! ends when the file is removed.
//!
//! # Example
//!
//! ```rust,no_run
//! use tail_follow::tail_file;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut lines = tail_file("app.log", true).await?.lines();
//!
//!     while let Some(line) = lines.next().await {
//!         match line {
//!             Ok(line) => println!("{}", line),
//!             Err(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod config;
mod controller;
mod error;
mod lines;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_ERROR_CAPACITY, DEFAULT_EVENT_CAPACITY, DEFAULT_QUEUE_CAPACITY,
    TailConfig,
};
pub use error::{Error, Result};
pub use lines::Lines;
pub use stream::Tail;

use std::path::Path;

/// Starts tailing a file.
///
/// # Arguments
///
/// * `path` - File to tail; it must exist
/// * `follow` - Keep going when the file is removed, waiting for it to be recreated
///
/// # Example
///
/// ```rust,no_run
/// use tail_follow::tail_file;
/// use tokio::io::AsyncReadExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut tail = tail_file("app.log", false).await?;
///
///     // Ends once app.log is removed
///     let mut everything = Vec::new();
///     tail.read_to_end(&mut everything).await?;
///
///     Ok(())
/// }
/// ```
pub async fn tail_file<P: AsRef<Path>>(path: P, follow: bool) -> Result<Tail> {
    Tail::open(path, follow).await
}
