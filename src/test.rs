// src/test.rs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::plugin::PluginRegistry;
use crate::store::SettingsStore;

/// A convenient alias to use `?` in tests.
///
/// There is a blanket `impl From<E: Error> for Box<dyn Error>`, meaning anything that implements
/// [`std::error::Error`] can be propagated using `?`.
pub type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// An Apache/nginx combined-format access line.
pub const ACCESS_LINE: &str = r#"192.168.1.1 - - [01/Jan/2024:00:00:00 +0100] "GET /index.php HTTP/1.1" 200 1234"#;

/// Write `count` lines (`line 1` to `line {count}`) to `dir/name`.
///
/// # Errors
///
/// Propagates any `io::Error` from writing the file.
pub fn write_lines(dir: &Path, name: &str, count: usize) -> io::Result<PathBuf> {
    let contents: String = (1..=count).map(|i| format!("line {}\n", i)).collect();
    write_file(dir, name, &contents)
}

/// Write `contents` to `dir/name`, creating parent directories as needed.
///
/// # Errors
///
/// Propagates any `io::Error` from writing the file.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

/// Build a combined-format access line.
#[must_use]
pub fn access_line(
    ip: &str,
    timestamp: &str,
    method: &str,
    url: &str,
    status: u16,
    size: u64,
) -> String {
    format!(
        r#"{} - - [{}] "{} {} HTTP/1.1" {} {} "https://www.example.com/start" "Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0""#,
        ip, timestamp, method, url, status, size
    )
}

/// Open a settings store in a temporary directory.
///
/// This returns the handle to the temporary directory as well as the store, since the directory
/// will be unlinked when the `TempDir` value is dropped.
///
/// # Errors
///
/// Propagates any error that occurs when opening the store.
pub fn temp_store() -> std::result::Result<(TempDir, SettingsStore), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    let store = SettingsStore::open(tempdir.path())?;
    Ok((tempdir, store))
}

/// The built-in plugin registry.
#[must_use]
pub fn registry() -> PluginRegistry {
    PluginRegistry::with_defaults()
}
