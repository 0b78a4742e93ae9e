// src/reader/source.rs
//! Line sources over plain and gzip-compressed files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use log::debug;

use super::path::Compression;
use crate::{Error, Result};

/// A sequential source of raw line bytes.
///
/// Decoding errors in compressed sources are expected (rotated archives are frequently truncated)
/// so a `lenient` source stops quietly at the first error and keeps what it already produced.
pub(super) struct LineSource {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    lenient: bool,
}

impl LineSource {
    /// Open `path`, or return `Ok(None)` if it is compressed and can't (or may not) be decoded.
    pub(super) fn open(path: &Path, read_compressed: bool) -> Result<Option<Self>> {
        let compression = Compression::of(path);
        if compression.is_compressed() && !(read_compressed && compression.is_supported()) {
            debug!("Skipping compressed file {}", path.display());
            return Ok(None);
        }

        let file = File::open(path).map_err(|error| Error::from_io(path, error))?;
        let (reader, lenient): (Box<dyn BufRead + Send>, _) = match compression {
            Compression::Gzip => (Box::new(BufReader::new(MultiGzDecoder::new(file))), true),
            _ => (Box::new(BufReader::new(file)), false),
        };

        Ok(Some(Self {
            path: path.to_path_buf(),
            reader,
            lenient,
        }))
    }

    /// Visit every line in order with its 1-based line number.
    ///
    /// Reading stops early when `visit` returns `false`.
    pub(super) fn scan(mut self, mut visit: impl FnMut(usize, String) -> bool) -> io::Result<()> {
        let mut buf = Vec::new();
        let mut line_number = 0;
        loop {
            buf.clear();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    line_number += 1;
                    if !visit(line_number, decode_line(&buf)) {
                        return Ok(());
                    }
                }
                Err(error) if self.lenient => {
                    debug!(
                        "Stopped decoding {} after {} lines: {}",
                        self.path.display(),
                        line_number,
                        error
                    );
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Turn raw line bytes into a `String`, dropping the line terminator.
pub(super) fn decode_line(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    if end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && bytes[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::decode_line;

    #[test]
    fn strips_line_terminators() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"hello"), "hello");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"caf\xe9\n"), "caf\u{fffd}");
    }
}
