// src/reader/nonblocking.rs
//! Async wrappers around the blocking reader functions.
//!
//! Each call moves its file I/O onto the `blocking` thread pool so executor threads never wait on
//! the filesystem.

use std::path::PathBuf;

use super::{FileInfo, RawLine, ReadOptions};
use crate::Result;

/// See [`super::inspect`].
pub async fn inspect(path: PathBuf) -> FileInfo {
    blocking::unblock(move || super::inspect(&path)).await
}

/// See [`super::read_lines`].
///
/// # Errors
///
/// As for [`super::read_lines`].
pub async fn read_lines(path: PathBuf, options: ReadOptions) -> Result<Vec<RawLine>> {
    blocking::unblock(move || super::read_lines(&path, &options)).await
}

/// See [`super::read_last_lines`].
///
/// # Errors
///
/// As for [`super::read_last_lines`].
pub async fn read_last_lines(
    path: PathBuf,
    max_lines: usize,
    options: ReadOptions,
) -> Result<Vec<RawLine>> {
    blocking::unblock(move || super::read_last_lines(&path, max_lines, &options)).await
}
