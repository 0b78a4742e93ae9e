// src/reader/watcher/inotify.rs
//! [`Watcher`] implementation for linux, based on `inotify`.
use std::io;
use std::path::Path;

use inotify::{Inotify, WatchDescriptor, WatchMask};

use crate::reader::watcher;

const INOTIFY_BUFFER_SIZE: usize = 1024;

type Descriptor = WatchDescriptor;

impl watcher::Descriptor for Descriptor {}

#[derive(Debug)]
pub(super) struct Event(WatchDescriptor);

impl watcher::Event<Descriptor> for Event {
    fn descriptor(&self) -> &Descriptor {
        &self.0
    }
}

impl<S> From<inotify::Event<S>> for Event {
    fn from(inotify_event: inotify::Event<S>) -> Self {
        Self(inotify_event.wd)
    }
}

/// An `inotify` instance dedicated to one follower.
///
/// Dropping it closes the inotify file descriptor, which removes every watch registered on it.
pub(super) struct Watcher {
    inner: Inotify,
    buffer: [u8; INOTIFY_BUFFER_SIZE],
}

impl watcher::Watcher for Watcher {
    type Descriptor = Descriptor;

    type Event = Event;

    fn new() -> io::Result<Self> {
        let inner = Inotify::init()?;
        Ok(Watcher {
            inner,
            buffer: [0; INOTIFY_BUFFER_SIZE],
        })
    }

    /// Watch a file for writes.
    ///
    /// `MODIFY` also fires on truncation. `DELETE_SELF` and `MOVE_SELF` are included so rotation
    /// wakes the follower up even though no further writes will reach the old inode.
    fn watch_file(&mut self, path: &Path) -> io::Result<Self::Descriptor> {
        let descriptor = self.inner.add_watch(
            path,
            WatchMask::MODIFY | WatchMask::DELETE_SELF | WatchMask::MOVE_SELF,
        )?;
        Ok(descriptor)
    }

    fn read_events(&mut self) -> io::Result<Vec<Self::Event>> {
        // `Inotify::init` opens the descriptor non-blocking, so "no events" is `WouldBlock`.
        match self.inner.read_events(&mut self.buffer) {
            Ok(inotify_events) => Ok(inotify_events.map(Event::from).collect()),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }
}
