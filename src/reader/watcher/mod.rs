// src/reader/watcher/mod.rs
//! Platform-agnostic file change notification.
//!
//! The [`Watcher`] trait defines a platform-agnostic interface for a file watcher, and the
//! [`watcher`] function returns an implementation of `Watcher` for the target platform. Platforms
//! without an implementation get a watcher that fails to construct, which makes followers fall
//! back to polling straight away.

#[cfg(target_os = "linux")]
mod inotify;
#[cfg(target_os = "macos")]
mod kqueue;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod unsupported;

use std::fmt::Debug;
use std::hash::Hash;
use std::io;
use std::path::Path;

#[cfg(target_os = "linux")]
use self::inotify as imp;

#[cfg(target_os = "macos")]
use self::kqueue as imp;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
use self::unsupported as imp;

/// Construct the watcher for the target platform.
pub(crate) fn watcher() -> io::Result<impl Watcher + Send + 'static> {
    <imp::Watcher as Watcher>::new()
}

/// A platform-agnostic description of a watched file descriptor.
pub(crate) trait Descriptor: Clone + Debug + Eq + Hash + PartialEq + Send {}

/// A platform-agnostic interface to file system events.
///
/// This only exposes the `Descriptor` of the registered watch, which callers can use to correlate
/// events with the corresponding `watch_file` call.
pub(crate) trait Event<D: Descriptor>: Debug {
    fn descriptor(&self) -> &D;
}

/// A platform-agnostic file watching API.
///
/// Each follower owns its own `Watcher`, so dropping the watcher must release every OS resource it
/// holds. Followers rely on this to make cancellation synchronous.
pub(crate) trait Watcher {
    /// An opaque reference to a watched file.
    type Descriptor: Descriptor;

    /// The type of events emitted by this watcher.
    type Event: Event<Self::Descriptor>;

    /// Construct a new instance of the `Watcher`.
    ///
    /// # Errors
    ///
    /// Propagates any `io::Error` caused when attempting to create the watcher.
    fn new() -> io::Result<Self>
    where
        Self: Sized;

    /// Watch a file for writes (including truncation).
    ///
    /// # Errors
    ///
    /// Propagates any `io::Error` caused when attempting to register the watch.
    fn watch_file(&mut self, path: &Path) -> io::Result<Self::Descriptor>;

    /// Read the events that are ready.
    ///
    /// This must never block, and should just return an empty `Vec` if no events are ready.
    ///
    /// # Errors
    ///
    /// Propagates any `io::Error` caused when attempting to read events.
    fn read_events(&mut self) -> io::Result<Vec<Self::Event>>;
}

#[cfg(all(test, any(target_os = "linux", target_os = "macos")))]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::thread;
    use std::time::Duration;

    use super::{imp, Event, Watcher as _};

    #[test]
    fn watch_file_events() {
        let tempdir = tempfile::tempdir().expect("unable to create tempdir");
        let file_path = tempdir.path().join("test.log");
        let mut file = File::create(&file_path).expect("failed to create temp file");

        let mut watcher = imp::Watcher::new().expect("unable to create watcher");
        let descriptor = watcher
            .watch_file(&file_path)
            .expect("unable to watch file");

        assert!(watcher.read_events().expect("failed to read events").is_empty());

        file.write_all(b"hello?").expect("unable to write to file");

        let mut events = Vec::new();
        for _ in 0..50 {
            events = watcher.read_events().expect("failed to read events");
            if !events.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let event_descriptors: Vec<_> = events.iter().map(Event::descriptor).collect();
        assert!(!event_descriptors.is_empty());
        assert!(event_descriptors.iter().all(|d| **d == descriptor));
    }
}
