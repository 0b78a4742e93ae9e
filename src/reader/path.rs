// src/reader/path.rs
//! Compression and rotation detection, and path normalization.
//!
//! A *normalized* path has its compression extension and rotation suffix removed, so that
//! `access.log`, `access.log.1` and `access.log.1.gz` all share the key `access.log`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Compression formats recognised by file extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    /// Plain text.
    None,
    /// `.gz`, the only format we can decode.
    Gzip,
    /// `.bz2`
    Bzip2,
    /// `.xz`
    Xz,
}

impl Compression {
    /// Detect the compression of `path` from its extension.
    pub fn of(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            Some("xz") => Compression::Xz,
            _ => Compression::None,
        }
    }

    /// Whether the file is compressed at all.
    #[must_use]
    pub fn is_compressed(self) -> bool {
        self != Compression::None
    }

    /// Whether we are able to decode this format.
    #[must_use]
    pub fn is_supported(self) -> bool {
        matches!(self, Compression::None | Compression::Gzip)
    }
}

/// Archive extensions that are never scanned by fast-path summaries.
const ARCHIVE_EXTENSIONS: [&str; 7] = ["gz", "bz2", "xz", "zip", "tar", "tgz", "zst"];

/// Whether `path` looks like a compressed file or archive.
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ARCHIVE_EXTENSIONS.contains(&ext))
}

fn rotation_suffix() -> &'static Regex {
    static ROTATION_SUFFIX: OnceLock<Regex> = OnceLock::new();
    ROTATION_SUFFIX.get_or_init(|| {
        // `.1`, `.20240101`, `-20240101`, `-2024-01-01`
        Regex::new(r"(?:\.\d+|[.-]\d{8}|[.-]\d{4}-\d{2}-\d{2})$").unwrap()
    })
}

fn strip_compression(name: &str) -> &str {
    match Compression::of(name) {
        Compression::None => name,
        _ => name.rfind('.').map_or(name, |dot| &name[..dot]),
    }
}

/// Whether the file name carries a rotation suffix (after any compression extension).
pub fn is_rotated(path: impl AsRef<Path>) -> bool {
    file_name(path.as_ref())
        .map_or(false, |name| rotation_suffix().is_match(strip_compression(name)))
}

/// Strip the compression extension and rotation suffixes from the file name of `path`.
///
/// The directory part is preserved. A name that would become empty is left untouched.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let name = match file_name(path) {
        Some(name) => name,
        None => return path.to_path_buf(),
    };

    let mut stem = strip_compression(name);
    while let Some(found) = rotation_suffix().find(stem) {
        if found.start() == 0 {
            break;
        }
        stem = &stem[..found.start()];
    }

    path.with_file_name(stem)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{is_archive, is_rotated, normalize_path, Compression};

    #[test]
    fn detects_compression() {
        assert_eq!(Compression::of("/var/log/syslog.2.gz"), Compression::Gzip);
        assert_eq!(Compression::of("access.log.bz2"), Compression::Bzip2);
        assert_eq!(Compression::of("access.log.xz"), Compression::Xz);
        assert_eq!(Compression::of("access.log"), Compression::None);
        assert!(Compression::Gzip.is_supported());
        assert!(!Compression::Xz.is_supported());
        assert!(is_archive("old.tar"));
        assert!(!is_archive("error.log"));
    }

    #[test]
    fn detects_rotation() {
        assert!(is_rotated("/var/log/nginx/access.log.1"));
        assert!(is_rotated("/var/log/nginx/access.log.1.gz"));
        assert!(is_rotated("/var/log/nginx/access.log-20240101"));
        assert!(is_rotated("/var/log/nginx/access.log.2024-01-01"));
        assert!(!is_rotated("/var/log/nginx/access.log"));
        assert!(!is_rotated("/var/log/nginx/access.log.gz"));
    }

    #[test]
    fn normalizes_rotated_and_compressed_variants() {
        let expected = PathBuf::from("/var/log/apache2/access.log");
        for variant in &[
            "/var/log/apache2/access.log",
            "/var/log/apache2/access.log.1",
            "/var/log/apache2/access.log.1.gz",
            "/var/log/apache2/access.log.20240101",
            "/var/log/apache2/access.log-20240101.gz",
        ] {
            assert_eq!(normalize_path(variant), expected, "{}", variant);
        }
    }

    #[test]
    fn normalization_keeps_numeric_only_names() {
        assert_eq!(normalize_path("/tmp/.1"), PathBuf::from("/tmp/.1"));
    }
}
