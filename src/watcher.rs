//! File watching functionality using the notify crate.

use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::error::{Error, Result};
use notify::event::{Flag, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// What happened to the tailed file, as far as the follow loop cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileChange {
    /// Content was written or the file was truncated.
    Modified,
    /// A file appeared at the path (created or renamed into place).
    Created,
    /// The file left the path (deleted or renamed away).
    Removed,
    /// The file was renamed in an unknown direction, or events were lost.
    /// Only the file system can say what happened.
    Renamed,
}

/// Watches a file and its parent directory.
///
/// Events are buffered in a bounded queue. When it is full, further events
/// are dropped and a single rescan event is reported once the queue drains.
///
/// Dropping the watcher releases every watch it registered.
pub(crate) struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<notify::Result<Event>>,
    overflowed: Arc<AtomicBool>,
    file_path: PathBuf,
    file_name: OsString,
}

impl FileWatcher {
    /// Creates a new file watcher for the specified path.
    ///
    /// Nothing is watched until [`watch_directory`](Self::watch_directory) or
    /// [`watch_file`](Self::watch_file) is called.
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_capacity(path, DEFAULT_EVENT_CAPACITY)
    }

    /// Like [`new`](Self::new), buffering at most `capacity` events.
    pub(crate) fn with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let file_name = file_path
            .file_name()
            .ok_or_else(|| Error::InvalidPath {
                message: format!("{} does not name a file", file_path.display()),
            })?
            .to_os_string();

        let (tx, rx) = mpsc::channel(capacity);
        let overflowed = Arc::new(AtomicBool::new(false));
        let overflow_flag = Arc::clone(&overflowed);

        // Runs on notify's thread, which must never block.
        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(TrySendError::Full(_)) = tx.try_send(res) {
                    overflow_flag.store(true, Ordering::Release);
                }
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
            overflowed,
            file_path,
            file_name,
        })
    }

    /// Watches the containing directory so the file can be seen coming back after removal.
    pub(crate) fn watch_directory(&mut self) -> Result<()> {
        let dir = parent_dir(&self.file_path);
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Watches the file itself. The file must exist.
    pub(crate) fn watch_file(&mut self) -> Result<()> {
        self.watcher
            .watch(&self.file_path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Returns the next file system event.
    ///
    /// Buffered events come first. If any were dropped, a rescan event
    /// follows them.
    pub(crate) async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        match self.receiver.try_recv() {
            Ok(event) => return Some(event),
            Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) => {}
        }
        if self.overflowed.swap(false, Ordering::AcqRel) {
            return Some(Ok(rescan_event()));
        }
        self.receiver.recv().await
    }

    /// Maps a raw event onto the tailed file, ignoring events for other files.
    pub(crate) fn classify(&self, event: &Event) -> Option<FileChange> {
        classify_event(event, &self.file_name)
    }

    pub(crate) fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn rescan_event() -> Event {
    Event::new(EventKind::Other).set_flag(Flag::Rescan)
}

/// Directory to watch for `path`; bare file names live in the current directory.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Classify a notify event for the file called `file_name`.
///
/// Paths are matched on their final component only, so events reported
/// through the directory watch and the file watch are treated alike.
pub(crate) fn classify_event(event: &Event, file_name: &OsStr) -> Option<FileChange> {
    if event.need_rescan() {
        return Some(FileChange::Renamed);
    }

    let names_target = |path: &PathBuf| path.file_name() == Some(file_name);

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.get(1).is_some_and(names_target) {
                Some(FileChange::Created)
            } else if event.paths.first().is_some_and(names_target) {
                Some(FileChange::Removed)
            } else {
                None
            }
        }
        _ if !event.paths.iter().any(names_target) => None,
        EventKind::Create(_) => Some(FileChange::Created),
        EventKind::Remove(_) => Some(FileChange::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileChange::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileChange::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileChange::Renamed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileChange::Modified),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::io::Write;
    use std::time::Duration;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    fn classify(kind: EventKind, paths: &[&str]) -> Option<FileChange> {
        classify_event(&event(kind, paths), OsStr::new("test.log"))
    }

    #[test]
    fn test_file_watcher_creation() {
        let file_path = PathBuf::from("/tmp/test.log");
        let watcher = FileWatcher::new(&file_path).unwrap();
        assert_eq!(watcher.file_path(), file_path.as_path());
    }

    #[test]
    fn test_file_watcher_rejects_path_without_file_name() {
        let result = FileWatcher::new("/");
        assert!(matches!(result, Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("/var/log/app.log")), Path::new("/var/log"));
        assert_eq!(parent_dir(Path::new("logs/app.log")), Path::new("logs"));
        assert_eq!(parent_dir(Path::new("app.log")), Path::new("."));
    }

    #[test]
    fn test_classify_write() {
        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert_eq!(classify(kind, &["/tmp/test.log"]), Some(FileChange::Modified));
        assert_eq!(
            classify(EventKind::Modify(ModifyKind::Any), &["/tmp/test.log"]),
            Some(FileChange::Modified)
        );
    }

    #[test]
    fn test_classify_create_and_remove() {
        assert_eq!(
            classify(EventKind::Create(CreateKind::File), &["/tmp/test.log"]),
            Some(FileChange::Created)
        );
        assert_eq!(
            classify(EventKind::Remove(RemoveKind::File), &["/tmp/test.log"]),
            Some(FileChange::Removed)
        );
    }

    #[test]
    fn test_classify_matches_on_file_name_only() {
        let kind = EventKind::Create(CreateKind::File);
        assert_eq!(classify(kind, &["test.log"]), Some(FileChange::Created));
        assert_eq!(
            classify(kind, &["/somewhere/else/test.log"]),
            Some(FileChange::Created)
        );
        assert_eq!(classify(kind, &["/tmp/test.log.1"]), None);
        assert_eq!(classify(kind, &["/tmp/Test.Log"]), None);
        assert_eq!(classify(kind, &["/"]), None);
        assert_eq!(classify(kind, &[]), None);
    }

    #[test]
    fn test_classify_renames() {
        assert_eq!(
            classify(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/tmp/test.log"]
            ),
            Some(FileChange::Removed)
        );
        assert_eq!(
            classify(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/tmp/test.log"]
            ),
            Some(FileChange::Created)
        );
        assert_eq!(
            classify(
                EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
                &["/tmp/test.log"]
            ),
            Some(FileChange::Renamed)
        );
    }

    #[test]
    fn test_classify_rename_both_uses_direction() {
        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Both));

        // logrotate moving the live file aside
        assert_eq!(
            classify(kind, &["/tmp/test.log", "/tmp/test.log.1"]),
            Some(FileChange::Removed)
        );
        // atomic replace of the live file
        assert_eq!(
            classify(kind, &["/tmp/test.log.tmp", "/tmp/test.log"]),
            Some(FileChange::Created)
        );
        assert_eq!(classify(kind, &["/tmp/a.log", "/tmp/b.log"]), None);
    }

    #[test]
    fn test_classify_ignores_metadata_and_access() {
        assert_eq!(
            classify(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
                &["/tmp/test.log"]
            ),
            None
        );
        assert_eq!(
            classify(EventKind::Access(AccessKind::Any), &["/tmp/test.log"]),
            None
        );
    }

    #[test]
    fn test_classify_rescan_rechecks_the_file() {
        let rescan = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(
            classify_event(&rescan, OsStr::new("test.log")),
            Some(FileChange::Renamed)
        );
        assert_eq!(classify(EventKind::Other, &[]), None);
    }

    #[tokio::test]
    async fn test_event_queue_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "").unwrap();

        let mut watcher = FileWatcher::with_capacity(&path, 4).unwrap();
        watcher.watch_directory().unwrap();
        watcher.watch_file().unwrap();

        // Nobody reads events while the file is written to.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        for i in 0..50 {
            writeln!(file, "line {i}").unwrap();
            file.sync_data().unwrap();
        }
        drop(file);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), watcher.next_event()).await
        {
            events.push(event.unwrap());
        }

        assert!(events.len() <= 5, "buffered {} events", events.len());
        let last = events.last().unwrap();
        assert!(last.need_rescan());
        assert_eq!(watcher.classify(last), Some(FileChange::Renamed));
    }

    #[tokio::test]
    async fn test_watch_directory_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new(dir.path().join("missing.log")).unwrap();

        // The directory watch works even though the file does not exist
        assert!(watcher.watch_directory().is_ok());
        assert!(watcher.watch_file().is_err());
    }

    #[tokio::test]
    async fn test_watch_directory_that_does_not_exist() {
        let mut watcher = FileWatcher::new("/definitely/not/a/real/dir/test.log").unwrap();
        assert!(matches!(watcher.watch_directory(), Err(Error::Watcher(_))));
    }

    #[tokio::test]
    async fn test_next_event_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new(dir.path().join("test.log")).unwrap();
        watcher.watch_directory().unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(10), watcher.next_event()).await;

        // Should timeout since no events are occurring
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_next_event_reports_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut watcher = FileWatcher::new(&path).unwrap();
        watcher.watch_directory().unwrap();

        std::fs::write(&path, "hello\n").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout_at(deadline, watcher.next_event()).await
        {
            if let Some(change) = watcher.classify(&event.unwrap()) {
                seen.push(change);
                if change == FileChange::Created {
                    break;
                }
            }
        }

        assert!(seen.contains(&FileChange::Created), "saw {seen:?}");
    }
}
