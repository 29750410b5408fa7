//! The consumer side of a tail session: a byte stream fed by a background
//! follow loop through a bounded queue.

use crate::config::TailConfig;
use crate::controller::FollowController;
use crate::error::{Error, Result};
use crate::lines::Lines;
use crate::reader::{OffsetTracker, open_file};
use crate::watcher::FileWatcher;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// A live view of the bytes appended to a file.
///
/// `Tail` implements [`AsyncRead`]. A read waits until the file grows,
/// then returns the new bytes. A session that is not following reaches end
/// of stream once the file is removed and everything written before that
/// has been read; a following session only ends after [`shutdown`](Self::shutdown).
///
/// Dropping the `Tail` stops the background task and releases the file
/// watch and handle.
pub struct Tail {
    path: PathBuf,
    follow: bool,
    receiver: mpsc::Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    consumed: usize,
    errors: Option<mpsc::Receiver<Error>>,
    shutdown_tx: broadcast::Sender<()>,
    _task_handle: JoinHandle<()>,
}

impl Tail {
    /// Starts tailing `path` with default settings.
    ///
    /// Fails if the file does not exist, or if it cannot be watched.
    pub async fn open<P: AsRef<Path>>(path: P, follow: bool) -> Result<Self> {
        Self::with_config(path, TailConfig::new().follow(follow)).await
    }

    /// Starts tailing `path`.
    pub async fn with_config<P: AsRef<Path>>(path: P, config: TailConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        // The watcher checks the path names a file before anything is opened.
        let mut watcher = FileWatcher::with_capacity(&path, config.event_capacity)?;

        let initial = match open_file(&path).await {
            Ok(opened) => {
                let offset = if config.start_at_end { opened.len } else { 0 };
                Some(OffsetTracker::new(path.clone(), opened, offset))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !config.allow_missing {
                    return Err(Error::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                debug!(path = %path.display(), "file missing, waiting for it to be created");
                None
            }
            Err(e) => return Err(e.into()),
        };

        watcher.watch_directory()?;
        if initial.is_some() {
            watcher.watch_file()?;
        }

        let (tx, receiver) = mpsc::channel(config.queue_capacity);
        let (error_tx, errors) = mpsc::channel(config.error_capacity);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let controller = FollowController::new(watcher, initial, &config, tx, error_tx);
        let task_handle = tokio::spawn(controller.run(shutdown_rx));

        Ok(Tail {
            path,
            follow: config.follow,
            receiver,
            chunk: Vec::new(),
            consumed: 0,
            errors: Some(errors),
            shutdown_tx,
            _task_handle: task_handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Returns the next chunk of raw bytes, or `None` at end of stream.
    ///
    /// Chunk boundaries follow the reads made on the file and say nothing
    /// about line boundaries.
    pub async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        if self.consumed < self.chunk.len() {
            let rest = self.chunk.split_off(self.consumed);
            self.chunk.clear();
            self.consumed = 0;
            return Some(rest);
        }
        self.receiver.recv().await
    }

    /// Takes the channel on which errors the session recovered from (or
    /// died of) are reported.
    ///
    /// Only the first call returns the receiver. Errors that arrive while
    /// the channel is full are dropped; they are always logged.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<Error>> {
        self.errors.take()
    }

    /// Asks the background task to stop.
    ///
    /// Bytes already queued can still be read; after them the stream ends.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Splits the stream into newline-terminated lines.
    pub fn lines(self) -> Lines<Self> {
        Lines::new(self)
    }

    /// Splits the stream on a custom separator.
    pub fn lines_with_separator(self, separator: impl Into<Vec<u8>>) -> Result<Lines<Self>> {
        Lines::with_separator(self, separator)
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        // Ignore errors if the task has already finished
        let _ = self.shutdown_tx.send(());
    }
}

impl AsyncRead for Tail {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.consumed >= this.chunk.len() {
            match ready!(this.receiver.poll_recv(cx)) {
                Some(chunk) => {
                    this.chunk = chunk;
                    this.consumed = 0;
                }
                // Queue closed and drained: end of stream.
                None => return Poll::Ready(Ok(())),
            }
        }

        let available = &this.chunk[this.consumed..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.consumed += n;
        Poll::Ready(Ok(()))
    }
}
