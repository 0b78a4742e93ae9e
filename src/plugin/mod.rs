// src/plugin/mod.rs
//! Source-type adapters.
//!
//! A [`Plugin`] knows where a kind of log lives by default, how to tell its files apart (access vs.
//! error logs, for instance) and how to parse their lines. Plugins are registered in a
//! [`PluginRegistry`] and looked up by id once per operation.

mod formats;
mod system;
mod web;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::parser::ParsedEntry;
use crate::store::PluginSettings;
use crate::{Error, Result};

pub use self::formats::severity;
pub use self::system::System;
pub use self::web::WebServer;

/// The broad category of a plugin.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    /// HTTP servers, whose access logs carry status codes.
    WebServer,
    /// The host's own logs, where severity tags can appear anywhere.
    HostSystem,
}

/// A log file found by [`Plugin::scan_log_files`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFileInfo {
    /// Where the file is.
    pub path: PathBuf,
    /// The plugin-specific type of the file (e.g. `access`, `error`, `syslog`).
    pub log_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if available.
    pub modified_at: Option<DateTime<Utc>>,
}

/// A source-type adapter.
pub trait Plugin: Send + Sync {
    /// A stable identifier, used as the settings key.
    fn id(&self) -> &'static str;

    /// A display name.
    fn name(&self) -> &'static str;

    /// The broad category of the plugin.
    fn kind(&self) -> PluginKind;

    /// Where this plugin's logs live when no base path is configured.
    fn default_base_path(&self) -> PathBuf;

    /// Which files under the base path belong to this plugin when no patterns are configured.
    fn default_file_patterns(&self) -> Vec<String>;

    /// The log type of a file belonging to this plugin.
    fn log_type(&self, path: &Path) -> String;

    /// Parse one line of a file of the given `log_type`.
    fn parse_log_line(&self, line: &str, log_type: &str) -> Option<ParsedEntry>;

    /// The fields worth displaying for `log_type`, in order.
    fn columns(&self, log_type: &str) -> Vec<&'static str>;

    /// Enumerate the files under `base_path` matching any of `patterns`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] (or [`Error::PermissionDenied`]) if `base_path` can't be read, and
    /// [`Error::InvalidRequest`] for a malformed pattern.
    fn scan_log_files(&self, base_path: &Path, patterns: &[String]) -> Result<Vec<LogFileInfo>> {
        scan(base_path, patterns, |path| self.log_type(path))
    }

    /// Check plugin settings before they are saved.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] describing the first problem found.
    fn validate_config(&self, settings: &PluginSettings) -> Result<()> {
        if let Some(base_path) = &settings.base_path {
            if !base_path.is_absolute() {
                return Err(Error::InvalidRequest(format!(
                    "base path must be absolute: {}",
                    base_path.display()
                )));
            }
        }
        if let Some(patterns) = &settings.file_patterns {
            if patterns.is_empty() {
                return Err(Error::InvalidRequest(
                    "file patterns must not be empty".to_string(),
                ));
            }
            for pattern in patterns {
                validate_pattern(pattern)?;
            }
        }
        Ok(())
    }
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if Path::new(pattern)
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(Error::InvalidRequest(format!(
            "file pattern must stay under the base path: {}",
            pattern
        )));
    }
    glob::Pattern::new(pattern).map_err(|error| {
        Error::InvalidRequest(format!("invalid file pattern `{}`: {}", pattern, error))
    })?;
    Ok(())
}

/// Glob `patterns` under `base_path`, classifying each file with `log_type`.
///
/// Results are unique and sorted by path. Entries the glob can't read are skipped.
///
/// # Errors
///
/// As for [`Plugin::scan_log_files`].
pub fn scan(
    base_path: &Path,
    patterns: &[String],
    log_type: impl Fn(&Path) -> String,
) -> Result<Vec<LogFileInfo>> {
    fs::read_dir(base_path).map_err(|error| Error::from_io(base_path, error))?;

    let escaped_base = glob::Pattern::escape(&base_path.to_string_lossy());
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        validate_pattern(pattern)?;
        let full = format!("{}/{}", escaped_base.trim_end_matches('/'), pattern);
        let matches = glob::glob(&full).map_err(|error| {
            Error::InvalidRequest(format!("invalid file pattern `{}`: {}", pattern, error))
        })?;
        for entry in matches {
            match entry {
                Ok(path) => {
                    paths.insert(path);
                }
                Err(error) => debug!("Skipping unreadable glob entry: {}", error),
            }
        }
    }

    Ok(paths
        .into_iter()
        .filter_map(|path| {
            let metadata = fs::metadata(&path).ok().filter(fs::Metadata::is_file)?;
            Some(LogFileInfo {
                log_type: log_type(&path),
                size: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                path,
            })
        })
        .collect())
}

/// The base path to scan: an explicit override, else the saved setting, else the plugin default.
#[must_use]
pub fn effective_base_path(
    plugin: &dyn Plugin,
    settings: &PluginSettings,
    explicit: Option<&Path>,
) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| settings.base_path.clone())
        .unwrap_or_else(|| plugin.default_base_path())
}

/// The file patterns to scan with: the saved setting, else the plugin default.
#[must_use]
pub fn effective_patterns(plugin: &dyn Plugin, settings: &PluginSettings) -> Vec<String> {
    settings
        .file_patterns
        .clone()
        .unwrap_or_else(|| plugin.default_file_patterns())
}

/// Check that `path` lies under `base_path` without climbing out through `..`.
///
/// # Errors
///
/// [`Error::PathNotAllowed`] otherwise.
pub fn ensure_under(base_path: &Path, path: &Path) -> Result<()> {
    let climbs = path
        .components()
        .any(|component| component == Component::ParentDir);
    if climbs || !path.starts_with(base_path) {
        return Err(Error::PathNotAllowed(path.to_path_buf()));
    }
    Ok(())
}

/// Whether a file is an error log, by type or by name.
#[must_use]
pub fn is_error_log(file: &LogFileInfo) -> bool {
    file.log_type == "error"
        || file
            .path
            .file_name()
            .map_or(false, |name| name.to_string_lossy().contains("error"))
}

/// The registered plugins, by id.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<&'static str, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `apache`, `nginx` and `system` plugins.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WebServer::apache()));
        registry.register(Arc::new(WebServer::nginx()));
        registry.register(Arc::new(System));
        registry
    }

    /// Add `plugin`, replacing any plugin with the same id.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.id(), plugin);
    }

    /// Look up a plugin.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPlugin`] if no plugin has the given id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownPlugin(id.to_string()))
    }

    /// All plugins, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.values()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use crate::store::PluginSettings;
    use crate::test::{self, registry, write_file};
    use crate::Error;

    use super::{ensure_under, is_error_log, PluginKind};

    #[test]
    fn registry_lookup() {
        let registry = registry();
        let ids: Vec<_> = registry.iter().map(|plugin| plugin.id()).collect();
        assert_eq!(ids, vec!["apache", "nginx", "system"]);

        assert_eq!(
            registry.get("system").map(|plugin| plugin.kind()).ok(),
            Some(PluginKind::HostSystem)
        );
        assert!(matches!(registry.get("iis"), Err(Error::UnknownPlugin(_))));
    }

    #[test]
    fn scan_log_files_globs_and_classifies() -> test::Result {
        let tempdir = tempfile::tempdir()?;
        write_file(tempdir.path(), "access.log", "a\n")?;
        write_file(tempdir.path(), "access.log.1", "b\n")?;
        write_file(tempdir.path(), "error.log", "c\n")?;
        write_file(tempdir.path(), "notes.txt", "d\n")?;

        let plugin = registry().get("nginx")?;
        let files = plugin.scan_log_files(tempdir.path(), &plugin.default_file_patterns())?;
        let names: Vec<_> = files
            .iter()
            .map(|file| {
                (
                    file.path.file_name().map(|name| name.to_string_lossy().into_owned()),
                    file.log_type.as_str(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                (Some("access.log".to_string()), "access"),
                (Some("access.log.1".to_string()), "access"),
                (Some("error.log".to_string()), "error"),
            ]
        );
        assert_eq!(files[0].size, 2);
        assert!(is_error_log(&files[2]));

        let missing = plugin.scan_log_files(&tempdir.path().join("nope"), &["*.log".to_string()]);
        assert!(matches!(missing, Err(Error::NotFound(_))));

        Ok(())
    }

    #[test]
    fn validate_config_rejects_bad_settings() -> test::Result {
        let plugin = registry().get("apache")?;
        assert!(plugin.validate_config(&PluginSettings::default()).is_ok());

        let relative = PluginSettings {
            base_path: Some(PathBuf::from("logs")),
            ..PluginSettings::default()
        };
        assert!(matches!(
            plugin.validate_config(&relative),
            Err(Error::InvalidRequest(_))
        ));

        for patterns in [vec![], vec!["../*.log".to_string()], vec!["[".to_string()]] {
            let settings = PluginSettings {
                file_patterns: Some(patterns),
                ..PluginSettings::default()
            };
            assert!(plugin.validate_config(&settings).is_err());
        }

        Ok(())
    }

    #[test]
    fn paths_must_stay_under_base() {
        let base = Path::new("/var/log/nginx");
        assert!(ensure_under(base, Path::new("/var/log/nginx/access.log")).is_ok());
        assert!(matches!(
            ensure_under(base, Path::new("/var/log/nginx/../secure")),
            Err(Error::PathNotAllowed(_))
        ));
        assert!(ensure_under(base, Path::new("/etc/passwd")).is_err());
    }
}
