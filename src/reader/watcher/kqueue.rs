// src/reader/watcher/kqueue.rs
//! [`Watcher`] implementation for `MacOS`, based on `kqueue`.
use std::fs::File;
use std::io;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use kqueue::{self, EventData, EventFilter, FilterFlag, Ident, Vnode};

use crate::reader::watcher;

type Descriptor = RawFd;

impl watcher::Descriptor for Descriptor {}

type Event = kqueue::Event;

impl watcher::Event<Descriptor> for Event {
    /// Get the `RawFd` for a [`kqueue::Event`].
    ///
    /// # Panics
    ///
    /// This will panic if the event is not a vnode event on a file descriptor, which can't happen
    /// for the filters registered in [`Watcher::watch_file`].
    fn descriptor(&self) -> &Descriptor {
        match (&self.ident, &self.data) {
            (Ident::Fd(fd), EventData::Vnode(_)) => fd,
            _ => panic!("kqueue returned an unexpected event: {:?}", self),
        }
    }
}

pub(super) struct Watcher {
    inner: kqueue::Watcher,
}

impl watcher::Watcher for Watcher {
    type Descriptor = Descriptor;
    type Event = Event;

    fn new() -> io::Result<Self> {
        let inner = kqueue::Watcher::new()?;
        Ok(Watcher { inner })
    }

    /// Watch a file for writes.
    ///
    /// `NOTE_WRITE` covers appends, `NOTE_EXTEND` covers size changes (including truncation), and
    /// `NOTE_DELETE`/`NOTE_RENAME` cover rotation.
    fn watch_file(&mut self, path: &Path) -> io::Result<Self::Descriptor> {
        let file = File::open(path)?;
        let fd = file.into_raw_fd();

        self.inner.add_fd(
            fd,
            EventFilter::EVFILT_VNODE,
            FilterFlag::NOTE_WRITE
                | FilterFlag::NOTE_EXTEND
                | FilterFlag::NOTE_DELETE
                | FilterFlag::NOTE_RENAME,
        )?;
        self.inner.watch()?;

        Ok(fd)
    }

    fn read_events(&mut self) -> io::Result<Vec<Self::Event>> {
        let mut events = Vec::new();
        while let Some(event) = self.inner.poll(Some(Duration::new(0, 0))) {
            events.push(event);
        }
        Ok(events)
    }
}
