//! Incremental, position-based reading of the tailed file.

use std::fs::{File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Identifies the file behind a handle, so a replaced path can be told apart
/// from the file we still hold open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub(crate) fn of(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn of(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// A freshly opened file along with what was known about it at open time.
#[derive(Debug)]
pub(crate) struct OpenedFile {
    pub(crate) file: File,
    pub(crate) len: u64,
    pub(crate) identity: Option<FileIdentity>,
}

/// Open `path` for tailing.
pub(crate) async fn open_file(path: &Path) -> io::Result<OpenedFile> {
    let file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    Ok(OpenedFile {
        file: file.into_std().await,
        len: metadata.len(),
        identity: FileIdentity::of(&metadata),
    })
}

/// Result of one drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drained {
    /// Every byte available at the time of reading was delivered.
    CaughtUp,
    /// The consumer is gone; nothing more can be delivered.
    Closed,
}

/// Owns the open handle and the offset of the last delivered byte.
#[derive(Debug)]
pub(crate) struct OffsetTracker {
    path: PathBuf,
    file: Arc<File>,
    offset: u64,
    identity: Option<FileIdentity>,
}

impl OffsetTracker {
    pub(crate) fn new(path: PathBuf, opened: OpenedFile, offset: u64) -> Self {
        Self {
            path,
            file: Arc::new(opened.file),
            offset,
            identity: opened.identity,
        }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn identity(&self) -> Option<FileIdentity> {
        self.identity
    }

    /// Deliver every byte appended since the last drain.
    ///
    /// `scratch` is reused for every read and must not be empty. Each chunk
    /// sent on `tx` is an independent copy of the bytes read.
    pub(crate) async fn drain(
        &mut self,
        scratch: &mut Vec<u8>,
        tx: &mpsc::Sender<Vec<u8>>,
    ) -> Result<Drained> {
        let file = Arc::clone(&self.file);
        let size = blocking(move || file.metadata())
            .await
            .map_err(|source| self.read_error(source))?
            .len();

        if detect_file_truncation(size, self.offset) {
            info!(
                path = %self.path.display(),
                size,
                offset = self.offset,
                "file shrank, reading from the start"
            );
            self.offset = 0;
        }

        if size == self.offset {
            return Ok(Drained::CaughtUp);
        }

        loop {
            let file = Arc::clone(&self.file);
            let offset = self.offset;
            let mut buf = std::mem::take(scratch);
            let (buf, read) = blocking(move || {
                let read = read_at(&file, &mut buf, offset);
                Ok((buf, read))
            })
            .await
            .map_err(|source| self.read_error(source))?;
            *scratch = buf;

            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(source) => return Err(self.read_error(source)),
            };

            self.offset += n as u64;
            debug!(path = %self.path.display(), bytes = n, offset = self.offset, "read chunk");

            if tx.send(scratch[..n].to_vec()).await.is_err() {
                return Ok(Drained::Closed);
            }
        }

        Ok(Drained::CaughtUp)
    }

    fn read_error(&self, source: io::Error) -> Error {
        Error::Read {
            path: self.path.clone(),
            offset: self.offset,
            source,
        }
    }
}

/// Detect if the file was truncated by comparing current size with last position
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}

/// Run a blocking file operation off the async worker threads.
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Read at an absolute position without touching any shared cursor.
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    loop {
        match positional_read(file, buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
