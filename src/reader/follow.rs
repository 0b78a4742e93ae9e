// src/reader/follow.rs
//! Real-time delivery of lines appended to a file.
//!
//! Each follower runs as its own task with its own file descriptor and its own watcher. The task
//! is a two-state machine:
//!
//! - `Watching`: wake up on a short tick and ask the platform watcher whether the file changed.
//! - `Polling`: wake up on a longer interval and check the file regardless.
//!
//! A follower starts in `Watching` and moves to `Polling` once, for good, after
//! `max_watch_errors` consecutive watcher errors (or immediately if no watch can be established).
//! Cancelling drops the watcher on the spot and wakes the task so its timer goes away too.
//!
//! Followers track the path, not the inode: when rotation moves the file away, the rest of the old
//! file is delivered and the follower then reopens (and re-watches) whatever file appears at the
//! path, numbering its lines from 1. Rotation is only detected on Unix.

use std::fmt;
use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_std::channel::{self, Receiver, Sender};
use async_std::future;
use async_std::task;
use log::{debug, trace, warn};

use super::path::Compression;
use super::source::decode_line;
use super::watcher::{self, Watcher};
use super::{RawLine, ReadOptions};

/// Default delay between watcher checks.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Default delay between checks once a follower has fallen back to polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive watcher errors after which a follower falls back to polling.
pub const DEFAULT_MAX_WATCH_ERRORS: u32 = 3;

/// Options for [`follow`].
#[derive(Clone, Copy, Debug)]
pub struct FollowOptions {
    /// Lines with a number `<= from_line` that already exist are not delivered.
    pub from_line: usize,
    /// Decode (and deliver once) `.gz` files instead of delivering nothing for them.
    pub read_compressed: bool,
    /// Delay between watcher checks.
    pub tick: Duration,
    /// Delay between checks while polling.
    pub poll_interval: Duration,
    /// Consecutive watcher errors before falling back to polling.
    pub max_watch_errors: u32,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            from_line: 0,
            read_compressed: false,
            tick: DEFAULT_TICK,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_watch_errors: DEFAULT_MAX_WATCH_ERRORS,
        }
    }
}

/// The externally visible state of a follower.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FollowState {
    /// Woken by file change notifications.
    Watching,
    /// Checking the file on a fixed interval.
    Polling,
    /// Cancelled, or done delivering a compressed file.
    Finished,
}

enum Mode<W> {
    Watching { watcher: W, errors: u32 },
    Polling,
    Finished,
}

enum Check {
    Changed(bool),
    Failed,
    Finished,
}

/// State shared between a follower task and its [`FollowHandle`].
struct Shared<W> {
    mode: Mutex<Mode<W>>,
    max_watch_errors: u32,
}

impl<W: Watcher> Shared<W> {
    fn lock(&self) -> MutexGuard<'_, Mode<W>> {
        // A panic while holding the lock can't leave `Mode` half-updated.
        self.mode
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check(&self, path: &Path) -> Check {
        let mut mode = self.lock();
        let outcome = match &mut *mode {
            Mode::Finished => return Check::Finished,
            Mode::Polling => return Check::Changed(true),
            Mode::Watching { watcher, errors } => match watcher.read_events() {
                Ok(events) => {
                    *errors = 0;
                    return Check::Changed(!events.is_empty());
                }
                Err(error) => {
                    *errors += 1;
                    debug!(
                        "Watch error {} for {}: {}",
                        errors,
                        path.display(),
                        error
                    );
                    *errors >= self.max_watch_errors
                }
            },
        };
        if outcome {
            warn!(
                "Falling back to polling for {} after {} watch errors",
                path.display(),
                self.max_watch_errors
            );
            *mode = Mode::Polling;
        }
        Check::Failed
    }

    /// Watch `path` again after it has been replaced by a new file.
    fn rewatch(&self, path: &Path) {
        let mut mode = self.lock();
        if let Mode::Watching { watcher, .. } = &mut *mode {
            if let Err(error) = watcher.watch_file(path) {
                warn!(
                    "Unable to watch replaced {}, polling instead: {}",
                    path.display(),
                    error
                );
                *mode = Mode::Polling;
            }
        }
    }

    fn finish(&self) {
        *self.lock() = Mode::Finished;
    }
}

/// Type-erased access to [`Shared`], so handles don't carry the watcher type.
trait Control: Send + Sync {
    fn state(&self) -> FollowState;
    fn release(&self);
}

impl<W: Watcher + Send> Control for Shared<W> {
    fn state(&self) -> FollowState {
        match &*self.lock() {
            Mode::Watching { .. } => FollowState::Watching,
            Mode::Polling => FollowState::Polling,
            Mode::Finished => FollowState::Finished,
        }
    }

    fn release(&self) {
        self.finish();
    }
}

/// The cancel handle of a follower.
///
/// Cancelling (explicitly or by dropping the handle) releases the follower's watcher before
/// returning and wakes its task, which then exits without delivering further lines.
pub struct FollowHandle {
    stop: Option<Sender<()>>,
    control: Arc<dyn Control>,
}

impl FollowHandle {
    /// Stop following. Calling this more than once has no further effect.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            self.control.release();
            stop.close();
        }
    }

    /// The current state of the follower.
    #[must_use]
    pub fn state(&self) -> FollowState {
        self.control.state()
    }
}

impl Drop for FollowHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for FollowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Follow `path`, calling `on_line` for every existing line after `options.from_line` and then
/// for every line appended later.
///
/// Compressed files can't grow, so they are delivered once (when `read_compressed` allows it) and
/// the follower finishes. Truncation resets the read position (and line numbers) to the start of
/// the file. Incomplete trailing lines are held back until their newline arrives.
pub fn follow<F>(path: impl AsRef<Path>, on_line: F, options: FollowOptions) -> FollowHandle
where
    F: FnMut(RawLine) + Send + 'static,
{
    follow_with(path.as_ref(), watcher::watcher, on_line, options)
}

pub(super) fn follow_with<W, M, F>(
    path: &Path,
    make_watcher: M,
    on_line: F,
    options: FollowOptions,
) -> FollowHandle
where
    W: Watcher + Send + 'static,
    M: FnOnce() -> io::Result<W>,
    F: FnMut(RawLine) + Send + 'static,
{
    let path = path.to_path_buf();
    let (stop, stopped) = channel::bounded(1);

    if Compression::of(&path).is_compressed() {
        let shared = Arc::new(Shared::<W> {
            mode: Mutex::new(Mode::Polling),
            max_watch_errors: options.max_watch_errors,
        });
        task::spawn(deliver_once(path, Arc::clone(&shared), on_line, options));
        return FollowHandle {
            stop: Some(stop),
            control: shared,
        };
    }

    let mode = match make_watcher().and_then(|mut watcher| {
        watcher.watch_file(&path)?;
        Ok(watcher)
    }) {
        Ok(watcher) => Mode::Watching { watcher, errors: 0 },
        Err(error) => {
            warn!(
                "Unable to watch {}, polling instead: {}",
                path.display(),
                error
            );
            Mode::Polling
        }
    };
    let shared = Arc::new(Shared {
        mode: Mutex::new(mode),
        max_watch_errors: options.max_watch_errors,
    });

    task::spawn(run(
        Cursor::new(path, options.from_line),
        Arc::clone(&shared),
        stopped,
        on_line,
        options,
    ));

    FollowHandle {
        stop: Some(stop),
        control: shared,
    }
}

async fn deliver_once<W, F>(
    path: PathBuf,
    shared: Arc<Shared<W>>,
    mut on_line: F,
    options: FollowOptions,
) where
    W: Watcher + Send + 'static,
    F: FnMut(RawLine) + Send + 'static,
{
    let read_options = ReadOptions {
        max_lines: 0,
        from_line: options.from_line,
        read_compressed: options.read_compressed,
    };
    let lines = {
        let path = path.clone();
        blocking::unblock(move || super::read_lines(&path, &read_options)).await
    };
    match lines {
        Ok(lines) => {
            for line in lines {
                if shared.state() == FollowState::Finished {
                    return;
                }
                on_line(line);
            }
        }
        Err(error) => debug!("Unable to read {}: {}", path.display(), error),
    }
    shared.finish();
}

async fn run<W, F>(
    mut cursor: Cursor,
    shared: Arc<Shared<W>>,
    stopped: Receiver<()>,
    mut on_line: F,
    options: FollowOptions,
) where
    W: Watcher + Send + 'static,
    F: FnMut(RawLine) + Send + 'static,
{
    let mut changed = true;
    loop {
        if changed {
            let (returned, result) = blocking::unblock(move || {
                let result = cursor.read_available();
                (cursor, result)
            })
            .await;
            cursor = returned;

            match result {
                Ok(lines) => {
                    for line in lines {
                        if shared.state() == FollowState::Finished {
                            return;
                        }
                        on_line(line);
                    }
                }
                Err(error) => debug!("Unable to read {}: {}", cursor.path.display(), error),
            }
            if std::mem::take(&mut cursor.reopened) {
                shared.rewatch(&cursor.path);
            }
        }

        let wait = match shared.state() {
            FollowState::Watching => options.tick,
            FollowState::Polling => options.poll_interval,
            FollowState::Finished => break,
        };
        if future::timeout(wait, stopped.recv()).await.is_ok() {
            break;
        }

        // A moved-away file sends no more events, so keep looking until its successor appears.
        changed = match shared.check(&cursor.path) {
            Check::Changed(changed) => changed || cursor.detached,
            Check::Failed => cursor.detached,
            Check::Finished => break,
        };
    }
    trace!("Stopped following {}", cursor.path.display());
}

/// The read position of a follower within its file.
struct Cursor {
    path: PathBuf,
    file: Option<File>,
    offset: u64,
    line_number: usize,
    skip_through: usize,
    partial: Vec<u8>,
    /// The path no longer leads to the open file.
    detached: bool,
    /// A new file was opened at the path since the last look.
    reopened: bool,
}

impl Cursor {
    fn new(path: PathBuf, from_line: usize) -> Self {
        Self {
            path,
            file: None,
            offset: 0,
            line_number: 0,
            skip_through: from_line,
            partial: Vec::new(),
            detached: false,
            reopened: false,
        }
    }

    /// Read every complete line written since the last call, switching to a new file if the path
    /// has been rotated.
    fn read_available(&mut self) -> io::Result<Vec<RawLine>> {
        let mut lines = self.drain()?;
        if self.replaced() {
            debug!("{} was replaced, following the new file", self.path.display());
            self.file = None;
            self.offset = 0;
            self.line_number = 0;
            self.skip_through = 0;
            self.partial.clear();
            self.reopened = true;
            match self.drain() {
                Ok(more) => lines.extend(more),
                Err(error) => debug!("Unable to open new {}: {}", self.path.display(), error),
            }
        }
        Ok(lines)
    }

    /// Whether a different file than the open one now lives at the path.
    fn replaced(&mut self) -> bool {
        let open = match self.file.as_ref().map(File::metadata) {
            Some(Ok(open)) => open,
            _ => return false,
        };
        match fs::metadata(&self.path) {
            Ok(current) => {
                self.detached = false;
                !same_file(&open, &current)
            }
            Err(_) => {
                self.detached = true;
                false
            }
        }
    }

    fn drain(&mut self) -> io::Result<Vec<RawLine>> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Ok(Vec::new()),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            debug!("{} was truncated, reading from the start", self.path.display());
            self.offset = 0;
            self.line_number = 0;
            self.skip_through = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut reader = BufReader::new(file.by_ref().take(len - self.offset));
        let mut lines = Vec::new();
        loop {
            let read = reader.read_until(b'\n', &mut self.partial)?;
            if read == 0 {
                break;
            }
            self.offset += read as u64;
            if self.partial.last() == Some(&b'\n') {
                self.line_number += 1;
                if self.line_number > self.skip_through {
                    lines.push(RawLine {
                        content: decode_line(&self.partial),
                        line_number: self.line_number,
                        source_path: self.path.clone(),
                    });
                }
                self.partial.clear();
            }
        }

        Ok(lines)
    }
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;

    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_: &Metadata, _: &Metadata) -> bool {
    true
}
