// src/reader/watcher/unsupported.rs
//! Placeholder [`Watcher`] for platforms without a notification backend.
use std::io;
use std::path::Path;

use crate::reader::watcher;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(super) struct Descriptor;

impl watcher::Descriptor for Descriptor {}

#[derive(Debug)]
pub(super) struct Event(Descriptor);

impl watcher::Event<Descriptor> for Event {
    fn descriptor(&self) -> &Descriptor {
        &self.0
    }
}

pub(super) struct Watcher;

impl watcher::Watcher for Watcher {
    type Descriptor = Descriptor;
    type Event = Event;

    fn new() -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Other,
            "file notification is not supported on this platform",
        ))
    }

    fn watch_file(&mut self, _path: &Path) -> io::Result<Self::Descriptor> {
        Ok(Descriptor)
    }

    fn read_events(&mut self) -> io::Result<Vec<Self::Event>> {
        Ok(Vec::new())
    }
}
