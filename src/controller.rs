//! The follow loop: a state machine that reacts to file changes, owns the
//! file handle and feeds the delivery queue.
//!
//! The controller is the only writer of the handle and offset. Consumers
//! see nothing but the chunks it sends, and the queue closes when the
//! controller is dropped at the end of [`FollowController::run`].

use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::TailConfig;
use crate::error::Error;
use crate::reader::{Drained, FileIdentity, OffsetTracker, open_file};
use crate::watcher::{FileChange, FileWatcher};

/// Where the session stands with respect to the file on disk.
#[derive(Debug)]
pub(crate) enum State {
    /// The file is open and being tailed.
    Open(OffsetTracker),
    /// The file is gone; waiting for it to come back.
    Absent,
    /// Nothing more will be delivered.
    Terminated,
}

/// Whether the loop keeps going after handling a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Terminate,
}

/// What the path currently points at, relative to the open handle.
enum PathNow {
    Same,
    Replaced,
    Missing,
}

pub(crate) struct FollowController {
    path: PathBuf,
    follow: bool,
    state: State,
    scratch: Vec<u8>,
    chunk_size: usize,
    watcher: FileWatcher,
    tx: mpsc::Sender<Vec<u8>>,
    errors: mpsc::Sender<Error>,
}

impl FollowController {
    pub(crate) fn new(
        watcher: FileWatcher,
        initial: Option<OffsetTracker>,
        config: &TailConfig,
        tx: mpsc::Sender<Vec<u8>>,
        errors: mpsc::Sender<Error>,
    ) -> Self {
        let state = match initial {
            Some(tracker) => State::Open(tracker),
            None => State::Absent,
        };

        Self {
            path: watcher.file_path().to_path_buf(),
            follow: config.follow,
            state,
            scratch: vec![0; config.chunk_size],
            chunk_size: config.chunk_size,
            watcher,
            tx,
            errors,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &State {
        &self.state
    }

    /// Runs until the file is removed (when not following), the consumer
    /// goes away, or shutdown is signalled.
    pub(crate) async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!(path = %self.path.display(), follow = self.follow, "follow loop started");

        // Pick up whatever the file held before the watch was active.
        let mut step = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => Step::Terminate,
            step = self.enter() => step,
        };

        while step == Step::Continue {
            let event = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!(path = %self.path.display(), "shutdown requested");
                    break;
                }
                event = self.watcher.next_event() => event,
            };

            step = match event {
                Some(Ok(event)) => {
                    let Some(change) = self.watcher.classify(&event) else {
                        continue;
                    };
                    debug!(path = %self.path.display(), ?change, kind = ?event.kind, "file event");

                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            debug!(path = %self.path.display(), "shutdown requested");
                            break;
                        }
                        step = self.on_change(change) => step,
                    }
                }
                Some(Err(e)) => {
                    warn!(path = %self.path.display(), error = %e, "file watcher error");
                    self.report(Error::Watcher(e));
                    Step::Continue
                }
                None => {
                    debug!(path = %self.path.display(), "file watcher closed");
                    Step::Terminate
                }
            };
        }

        self.terminate();
        debug!(path = %self.path.display(), "follow loop stopped");
    }

    /// First step of the loop: drain the open file, or look for a missing one.
    pub(crate) async fn enter(&mut self) -> Step {
        match self.state {
            State::Open(_) => self.drain().await,
            State::Absent => self.reopen().await,
            State::Terminated => Step::Terminate,
        }
    }

    pub(crate) async fn on_change(&mut self, change: FileChange) -> Step {
        match change {
            FileChange::Modified => self.drain().await,
            FileChange::Created => self.on_created().await,
            FileChange::Removed => self.on_removed().await,
            FileChange::Renamed => {
                if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                    self.on_created().await
                } else {
                    self.on_removed().await
                }
            }
        }
    }

    async fn on_created(&mut self) -> Step {
        let identity = match &self.state {
            State::Terminated => return Step::Terminate,
            State::Absent => None,
            State::Open(tracker) => Some(tracker.identity()),
        };
        let Some(identity) = identity else {
            return self.reopen().await;
        };

        match inspect_path(&self.path, identity).await {
            PathNow::Same | PathNow::Missing => self.drain().await,
            PathNow::Replaced => {
                info!(path = %self.path.display(), "file replaced");
                self.switch_files().await
            }
        }
    }

    async fn on_removed(&mut self) -> Step {
        let identity = match &self.state {
            State::Terminated => return Step::Terminate,
            State::Absent => return Step::Continue,
            State::Open(tracker) => tracker.identity(),
        };

        match inspect_path(&self.path, identity).await {
            // The open file is still in place; the event is about one we already let go of.
            PathNow::Same => Step::Continue,
            PathNow::Replaced => {
                info!(path = %self.path.display(), "file removed and recreated");
                self.switch_files().await
            }
            PathNow::Missing => {
                if self.release().await == Step::Terminate {
                    return self.terminate();
                }
                info!(path = %self.path.display(), follow = self.follow, "file removed");
                if self.follow {
                    Step::Continue
                } else {
                    self.terminate()
                }
            }
        }
    }

    /// The path names a new file while the old one is still open.
    async fn switch_files(&mut self) -> Step {
        if self.release().await == Step::Terminate || !self.follow {
            return self.terminate();
        }
        self.reopen().await
    }

    /// Delivers the rest of the open file, then closes it.
    ///
    /// Every byte of the old file is queued before the new file is opened.
    async fn release(&mut self) -> Step {
        let step = self.drain().await;
        if let State::Open(tracker) = &self.state {
            debug!(path = %self.path.display(), offset = tracker.offset(), "closing file");
        }
        if step == Step::Continue {
            self.state = State::Absent;
        }
        step
    }

    async fn reopen(&mut self) -> Step {
        match open_file(&self.path).await {
            Ok(opened) => {
                info!(path = %self.path.display(), "file opened");
                if let Err(e) = self.watcher.watch_file() {
                    debug!(
                        path = %self.path.display(),
                        error = %e,
                        "could not watch file, relying on the directory watch"
                    );
                }
                self.state = State::Open(OffsetTracker::new(self.path.clone(), opened, 0));
                self.drain().await
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "file not there yet");
                Step::Continue
            }
            Err(source) => {
                error!(path = %self.path.display(), error = %source, "could not reopen file");
                self.report(Error::Reopen {
                    path: self.path.clone(),
                    source,
                });
                self.terminate()
            }
        }
    }

    async fn drain(&mut self) -> Step {
        let tracker = match &mut self.state {
            State::Open(tracker) => tracker,
            State::Absent => return Step::Continue,
            State::Terminated => return Step::Terminate,
        };
        if self.scratch.len() != self.chunk_size {
            self.scratch.resize(self.chunk_size, 0);
        }

        match tracker.drain(&mut self.scratch, &self.tx).await {
            Ok(Drained::CaughtUp) => Step::Continue,
            Ok(Drained::Closed) => {
                debug!(path = %self.path.display(), "consumer went away");
                self.terminate()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "read failed, retrying on next change");
                self.report(e);
                Step::Continue
            }
        }
    }

    fn terminate(&mut self) -> Step {
        self.state = State::Terminated;
        Step::Terminate
    }

    /// Hands a runtime error to the consumer's error channel, if it has room.
    fn report(&self, error: Error) {
        let _ = self.errors.try_send(error);
    }
}

async fn inspect_path(path: &Path, identity: Option<FileIdentity>) -> PathNow {
    match tokio::fs::metadata(path).await {
        Err(_) => PathNow::Missing,
        Ok(metadata) => match (identity, FileIdentity::of(&metadata)) {
            (Some(open), Some(now)) if open == now => PathNow::Same,
            _ => PathNow::Replaced,
        },
    }
}
