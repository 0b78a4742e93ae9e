// src/reader/mod.rs
//! Raw access to log files.
//!
//! Everything here works on a single path and is recomputed on every call: nothing about a file
//! is cached between reads. The functions in this module block; async callers should go through
//! [`nonblocking`], which moves the work onto the `blocking` thread pool.

pub mod follow;
pub mod nonblocking;
pub mod path;
mod source;
mod watcher;

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use self::follow::{follow, FollowHandle, FollowOptions, FollowState};
pub use self::path::{is_archive, is_rotated, normalize_path, Compression};

use self::source::LineSource;
use crate::{Error, Result};

/// A single line read from a log file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLine {
    /// The line content, without its terminator.
    pub content: String,

    /// The 1-based position of the line in the file.
    pub line_number: usize,

    /// The file the line was read from.
    pub source_path: PathBuf,
}

/// A fresh description of a file on disk.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// The inspected path.
    pub path: PathBuf,
    /// Size in bytes (0 if the file doesn't exist).
    pub size: u64,
    /// Last modification time, if available.
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the path exists.
    pub exists: bool,
    /// Whether the file can be opened for reading.
    pub readable: bool,
    /// Whether the extension marks the file as compressed.
    pub compressed: bool,
    /// Whether the name carries a rotation suffix.
    pub rotated: bool,
}

/// Options for [`read_lines`] and [`read_last_lines`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    /// Maximum number of lines to return; `0` means unbounded.
    pub max_lines: usize,
    /// Skip lines whose 1-based number is `<= from_line`.
    pub from_line: usize,
    /// Decode `.gz` files instead of returning nothing for them.
    pub read_compressed: bool,
}

/// Inspect `path`.
///
/// This never fails: a missing file reports `exists = false` and a file we may not open reports
/// `readable = false`.
pub fn inspect(path: impl AsRef<Path>) -> FileInfo {
    let path = path.as_ref();
    let mut info = FileInfo {
        path: path.to_path_buf(),
        size: 0,
        modified_at: None,
        exists: false,
        readable: false,
        compressed: Compression::of(path).is_compressed(),
        rotated: is_rotated(path),
    };

    match fs::metadata(path) {
        Ok(metadata) => {
            info.exists = true;
            info.size = metadata.len();
            info.modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            info.readable = metadata.is_file() && File::open(path).is_ok();
        }
        Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
            info.exists = true;
        }
        Err(_) => {}
    }

    info
}

/// Read lines `from_line + 1 ..= from_line + max_lines` from `path`, in order.
///
/// Compressed files are only decoded when `read_compressed` is set and the format is supported;
/// otherwise the result is empty. A corrupted compressed stream yields whatever was decoded before
/// the corruption.
///
/// # Errors
///
/// [`Error::NotFound`] or [`Error::PermissionDenied`] if the file can't be opened, and
/// [`Error::Io`] for read failures on plain files.
pub fn read_lines(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Vec<RawLine>> {
    let path = path.as_ref();
    let source = match LineSource::open(path, options.read_compressed)? {
        Some(source) => source,
        None => return Ok(Vec::new()),
    };

    let mut lines = Vec::new();
    source.scan(|line_number, content| {
        if line_number <= options.from_line {
            return true;
        }
        lines.push(RawLine {
            content,
            line_number,
            source_path: path.to_path_buf(),
        });
        options.max_lines == 0 || lines.len() < options.max_lines
    })?;

    Ok(lines)
}

/// Read the final `max_lines` lines of `path`.
///
/// The file is scanned once, keeping a sliding window of at most `max_lines` lines, so memory use
/// does not depend on the size of the file. `options.max_lines` is ignored in favour of the
/// argument; `options.from_line` still excludes leading lines.
///
/// # Errors
///
/// As for [`read_lines`].
pub fn read_last_lines(
    path: impl AsRef<Path>,
    max_lines: usize,
    options: &ReadOptions,
) -> Result<Vec<RawLine>> {
    let path = path.as_ref();
    if max_lines == 0 {
        return Ok(Vec::new());
    }
    let source = match LineSource::open(path, options.read_compressed)? {
        Some(source) => source,
        None => return Ok(Vec::new()),
    };

    let mut window = VecDeque::with_capacity(max_lines);
    source.scan(|line_number, content| {
        if line_number > options.from_line {
            if window.len() == max_lines {
                window.pop_front();
            }
            window.push_back((line_number, content));
        }
        true
    })?;

    Ok(window
        .into_iter()
        .map(|(line_number, content)| RawLine {
            content,
            line_number,
            source_path: path.to_path_buf(),
        })
        .collect())
}
