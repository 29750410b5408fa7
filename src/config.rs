//! Session configuration.

use crate::error::{Error, Result};

/// Default number of chunks the delivery queue holds before the reader stalls.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// Default size of the buffer used for each positional read.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default number of undelivered errors kept for [`Tail::take_errors`](crate::Tail::take_errors).
pub const DEFAULT_ERROR_CAPACITY: usize = 64;

/// Default number of file system events buffered for the follow loop.
///
/// Once full, further events are dropped and the loop rechecks the file
/// after catching up.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Options for a tail session.
///
/// ```
/// use tail_follow::TailConfig;
///
/// let config = TailConfig::new()
///     .follow(true)
///     .allow_missing(true)
///     .chunk_size(4096);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    pub(crate) follow: bool,
    pub(crate) queue_capacity: usize,
    pub(crate) chunk_size: usize,
    pub(crate) error_capacity: usize,
    pub(crate) event_capacity: usize,
    pub(crate) allow_missing: bool,
    pub(crate) start_at_end: bool,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            follow: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_capacity: DEFAULT_ERROR_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            allow_missing: false,
            start_at_end: false,
        }
    }
}

impl TailConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep tailing across removal and recreation of the file.
    ///
    /// When disabled, the session ends the first time the file is removed.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Maximum number of chunks buffered between the reader task and the consumer.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Size in bytes of each read, and therefore the largest chunk delivered.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Maximum number of runtime errors held for [`Tail::take_errors`](crate::Tail::take_errors).
    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    /// Maximum number of file system events waiting for the follow loop.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Start without the file and wait for it to be created instead of failing.
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    /// Skip content already in the file when the session opens.
    ///
    /// Files opened later (after rotation) are always read from the start.
    pub fn start_at_end(mut self, start_at_end: bool) -> Self {
        self.start_at_end = start_at_end;
        self
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Checks that every size is usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("queue_capacity", self.queue_capacity),
            ("chunk_size", self.chunk_size),
            ("error_capacity", self.error_capacity),
            ("event_capacity", self.event_capacity),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }
}
