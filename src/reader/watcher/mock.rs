// src/reader/watcher/mock.rs
//! Mock [`Watcher`](crate::reader::watcher::Watcher) implementation.
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::reader::watcher;

/// The watch descriptor type for [`Watcher`].
///
/// Watched paths are unique per watcher, so the path itself identifies the watch.
type Descriptor = PathBuf;

impl watcher::Descriptor for Descriptor {}

/// Events carry the path of the written file.
type Event = PathBuf;

impl watcher::Event<Descriptor> for Event {
    fn descriptor(&self) -> &Descriptor {
        self
    }
}

/// A mock [`Watcher`](crate::reader::watcher::Watcher) implementation.
///
/// This watches no actual files. Tests drive it through a cloned handle: writes are announced with
/// [`simulate_write`](Self::simulate_write), and [`fail_reads`](Self::fail_reads) makes every
/// subsequent `read_events` call return an error.
#[derive(Clone)]
pub(crate) struct Watcher {
    mock: Arc<Mutex<Mock>>,
}

#[derive(Default)]
struct Mock {
    watched_paths: Vec<PathBuf>,
    pending_events: Vec<PathBuf>,
    failing: bool,
}

impl Watcher {
    /// Create a new instance.
    pub(crate) fn new() -> Self {
        Self {
            mock: Arc::new(Mutex::new(Mock::default())),
        }
    }

    /// Append `text` to the watched file at `path` and queue an event for it.
    ///
    /// # Panics
    ///
    /// This will panic if the given `path` is not being watched.
    pub(crate) fn simulate_write(&self, path: &Path, text: &str) -> io::Result<()> {
        let mut mock = self.mock.lock().unwrap();
        assert!(
            mock.watched_paths.iter().any(|watched| watched == path),
            "Can't simulate write in unwatched path: {:?}",
            path
        );

        write!(OpenOptions::new().append(true).open(path)?, "{}", text)?;
        mock.pending_events.push(path.to_path_buf());

        Ok(())
    }

    /// Make every subsequent `read_events` call fail.
    pub(crate) fn fail_reads(&self) {
        self.mock.lock().unwrap().failing = true;
    }

    /// Whether this is the last live clone, i.e. the one handed to a follower has been dropped.
    pub(crate) fn is_sole_owner(&self) -> bool {
        Arc::strong_count(&self.mock) == 1
    }
}

impl watcher::Watcher for Watcher {
    type Descriptor = PathBuf;
    type Event = PathBuf;

    fn new() -> io::Result<Self> {
        Ok(Self::new())
    }

    /// Record that `path` has been watched and return it as the descriptor.
    ///
    /// # Panics
    ///
    /// This will panic if `path` is already watched.
    fn watch_file(&mut self, path: &Path) -> io::Result<Self::Descriptor> {
        let mut mock = self.mock.lock().unwrap();
        assert!(
            !mock.watched_paths.iter().any(|watched| watched == path),
            "called watch_file with duplicate path {:?}",
            path
        );

        mock.watched_paths.push(path.to_path_buf());
        Ok(path.to_path_buf())
    }

    /// Pop whatever events have been queued through [`Watcher::simulate_write`].
    fn read_events(&mut self) -> io::Result<Vec<Self::Event>> {
        let mut mock = self.mock.lock().unwrap();
        if mock.failing {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated watch failure"));
        }
        Ok(std::mem::take(&mut mock.pending_events))
    }
}
