// src/store.rs
//! Key-addressed stores for plugin settings and discovered log files.
//!
//! Plugin settings survive restarts: the whole map is one JSON document in the data directory,
//! read when the store is opened and rewritten after every mutation. The file catalog is rebuilt by
//! scanning and lives in memory only.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::parser::custom::{config_key, CustomRegexConfig};
use crate::plugin::LogFileInfo;
use crate::reader::{is_rotated, Compression};
use crate::{Error, Result};

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Per-plugin settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginSettings {
    /// Whether the plugin takes part in listings and aggregations.
    pub enabled: bool,
    /// Overrides the plugin's default base path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    /// Overrides the plugin's default file patterns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_patterns: Option<Vec<String>>,
    /// Whether `.gz` files are decoded when read.
    pub read_compressed: bool,
    /// Custom regexes, keyed by normalized file path.
    pub custom_regex: BTreeMap<String, CustomRegexConfig>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: None,
            file_patterns: None,
            read_compressed: false,
            custom_regex: BTreeMap::new(),
        }
    }
}

/// An error that can occur in [`SettingsStore::open`].
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The data directory or settings file couldn't be accessed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The settings file isn't valid.
    #[error("invalid settings file {}: {source}", path.display())]
    Corrupt {
        /// The settings file.
        path: PathBuf,
        /// The decoding error.
        source: serde_json::Error,
    },
}

/// Persistent plugin settings.
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<BTreeMap<String, PluginSettings>>,
}

impl SettingsStore {
    /// Open the store in `data_directory`, restoring any saved settings.
    ///
    /// The directory is created if it doesn't exist.
    ///
    /// # Errors
    ///
    /// [`OpenError::Io`] if the directory or file can't be accessed, and [`OpenError::Corrupt`] if
    /// the file can't be decoded.
    pub fn open(data_directory: &Path) -> Result<Self, OpenError> {
        fs::create_dir_all(data_directory)?;
        let path = data_directory.join(SETTINGS_FILE_NAME);

        let settings = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| OpenError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };
        debug!(
            "Restored settings for {} plugins from {}",
            settings.len(),
            path.display()
        );

        Ok(Self {
            path,
            settings: RwLock::new(settings),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, PluginSettings>> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, PluginSettings>> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, settings: &BTreeMap<String, PluginSettings>) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(settings).map_err(|error| Error::Store(error.to_string()))?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json)
            .and_then(|()| fs::rename(&temp, &self.path))
            .map_err(|error| Error::Store(format!("{}: {}", self.path.display(), error)))
    }

    /// Save `next` and only then make it the in-memory state, so memory never runs ahead of disk.
    fn commit(
        &self,
        current: &mut BTreeMap<String, PluginSettings>,
        next: BTreeMap<String, PluginSettings>,
    ) -> Result<()> {
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    /// The saved settings for a plugin, if any.
    #[must_use]
    pub fn find_by_plugin_id(&self, plugin_id: &str) -> Option<PluginSettings> {
        self.read().get(plugin_id).cloned()
    }

    /// The saved settings for a plugin, or the defaults.
    #[must_use]
    pub fn settings_for(&self, plugin_id: &str) -> PluginSettings {
        self.find_by_plugin_id(plugin_id).unwrap_or_default()
    }

    /// Save settings for a plugin that has none yet.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if settings already exist, and [`Error::Store`] if they can't be
    /// saved.
    pub fn create(&self, plugin_id: &str, settings: PluginSettings) -> Result<PluginSettings> {
        let mut all = self.write();
        if all.contains_key(plugin_id) {
            return Err(Error::InvalidRequest(format!(
                "settings for plugin {} already exist",
                plugin_id
            )));
        }
        let mut next = all.clone();
        next.insert(plugin_id.to_string(), settings.clone());
        self.commit(&mut all, next)?;
        Ok(settings)
    }

    /// Modify a plugin's settings (starting from the defaults if none are saved) and save them.
    ///
    /// Nothing is saved if `modify` fails.
    ///
    /// # Errors
    ///
    /// Whatever `modify` returns, or [`Error::Store`] if the settings can't be saved.
    pub fn update<F>(&self, plugin_id: &str, modify: F) -> Result<PluginSettings>
    where
        F: FnOnce(&mut PluginSettings) -> Result<()>,
    {
        let mut all = self.write();
        let mut settings = all.get(plugin_id).cloned().unwrap_or_default();
        modify(&mut settings)?;
        let mut next = all.clone();
        next.insert(plugin_id.to_string(), settings.clone());
        self.commit(&mut all, next)?;
        Ok(settings)
    }

    /// Forget a plugin's settings. Returns whether there were any.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the change can't be saved.
    pub fn delete(&self, plugin_id: &str) -> Result<bool> {
        let mut all = self.write();
        if !all.contains_key(plugin_id) {
            return Ok(false);
        }
        let mut next = all.clone();
        next.remove(plugin_id);
        self.commit(&mut all, next)?;
        Ok(true)
    }

    /// Store a custom regex for `path` (and its rotated/compressed variants).
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the change can't be saved.
    pub fn set_custom_regex(
        &self,
        plugin_id: &str,
        path: &Path,
        config: CustomRegexConfig,
    ) -> Result<()> {
        let key = config_key(path);
        info!("Saving custom regex for {} ({})", key, plugin_id);
        self.update(plugin_id, |settings| {
            settings.custom_regex.insert(key, config);
            Ok(())
        })?;
        Ok(())
    }

    /// Remove the custom regex for `path`. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the change can't be saved.
    pub fn remove_custom_regex(&self, plugin_id: &str, path: &Path) -> Result<bool> {
        let key = config_key(path);
        if self.custom_regex_for(plugin_id, path).is_none() {
            return Ok(false);
        }
        self.update(plugin_id, |settings| {
            settings.custom_regex.remove(&key);
            Ok(())
        })?;
        Ok(true)
    }

    /// The custom regex that applies to `path`, if any.
    #[must_use]
    pub fn custom_regex_for(&self, plugin_id: &str, path: &Path) -> Option<CustomRegexConfig> {
        self.read()
            .get(plugin_id)?
            .custom_regex
            .get(&config_key(path))
            .cloned()
    }
}

/// A file known to the catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFileRecord {
    /// A stable id derived from the path.
    pub id: String,
    /// The plugin the file belongs to.
    pub plugin_id: String,
    /// Where the file is.
    pub path: PathBuf,
    /// The plugin-specific type of the file.
    pub log_type: String,
    /// Size in bytes when last scanned.
    pub size: u64,
    /// Last modification time when last scanned.
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the file was readable when last scanned.
    pub readable: bool,
    /// Whether the file is compressed.
    pub compressed: bool,
    /// Whether the file carries a rotation suffix.
    pub rotated: bool,
}

impl LogFileRecord {
    /// Describe a scanned file.
    #[must_use]
    pub fn new(plugin_id: &str, file: &LogFileInfo, readable: bool) -> Self {
        Self {
            id: file_id(&file.path),
            plugin_id: plugin_id.to_string(),
            path: file.path.clone(),
            log_type: file.log_type.clone(),
            size: file.size,
            modified_at: file.modified_at,
            readable,
            compressed: Compression::of(&file.path).is_compressed(),
            rotated: is_rotated(&file.path),
        }
    }
}

/// The catalog id of `path`: the hex MD5 digest of its textual form.
#[must_use]
pub fn file_id(path: &Path) -> String {
    format!("{:x}", md5::compute(path.to_string_lossy().as_bytes()))
}

/// Log files discovered by scanning, by id.
#[derive(Default)]
pub struct FileCatalog {
    records: RwLock<BTreeMap<String, LogFileRecord>>,
}

impl FileCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every record of `plugin_id` with `records`.
    pub fn replace_plugin(&self, plugin_id: &str, records: Vec<LogFileRecord>) {
        let mut all = self.records.write().unwrap_or_else(PoisonError::into_inner);
        all.retain(|_, record| record.plugin_id != plugin_id);
        for record in records {
            all.insert(record.id.clone(), record);
        }
    }

    /// Look up a record.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<LogFileRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Every record, optionally limited to one plugin, ordered newest first.
    #[must_use]
    pub fn list(&self, plugin_id: Option<&str>) -> Vec<LogFileRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|record| plugin_id.map_or(true, |id| record.plugin_id == id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| a.path.cmp(&b.path)));
        records
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use crate::parser::custom::CustomRegexConfig;
    use crate::plugin::LogFileInfo;
    use crate::test::{self, temp_store};
    use crate::Error;

    use super::{file_id, FileCatalog, LogFileRecord, OpenError, PluginSettings, SettingsStore};

    #[test]
    fn crud() -> test::Result {
        let (_tempdir, store) = temp_store()?;
        assert_eq!(store.find_by_plugin_id("nginx"), None);
        assert!(store.settings_for("nginx").enabled);

        store.create("nginx", PluginSettings::default())?;
        assert!(matches!(
            store.create("nginx", PluginSettings::default()),
            Err(Error::InvalidRequest(_))
        ));

        let updated = store.update("nginx", |settings| {
            settings.enabled = false;
            Ok(())
        })?;
        assert!(!updated.enabled);
        assert_eq!(store.find_by_plugin_id("nginx"), Some(updated));

        let failed = store.update("nginx", |settings| {
            settings.enabled = true;
            Err(Error::InvalidRequest("nope".to_string()))
        });
        assert!(failed.is_err());
        assert_eq!(store.find_by_plugin_id("nginx").map(|s| s.enabled), Some(false));

        assert!(store.delete("nginx")?);
        assert!(!store.delete("nginx")?);

        Ok(())
    }

    #[test]
    fn failed_saves_leave_settings_untouched() -> test::Result {
        let tempdir = tempfile::tempdir()?;
        let data = tempdir.path().join("data");
        let store = SettingsStore::open(&data)?;
        store.update("nginx", |settings| {
            settings.enabled = false;
            Ok(())
        })?;
        std::fs::remove_dir_all(&data)?;

        let failed = store.update("nginx", |settings| {
            settings.enabled = true;
            Ok(())
        });
        assert!(matches!(failed, Err(Error::Store(_))));
        assert_eq!(store.find_by_plugin_id("nginx").map(|s| s.enabled), Some(false));

        assert!(matches!(
            store.create("apache", PluginSettings::default()),
            Err(Error::Store(_))
        ));
        assert_eq!(store.find_by_plugin_id("apache"), None);

        assert!(matches!(store.delete("nginx"), Err(Error::Store(_))));
        assert!(store.find_by_plugin_id("nginx").is_some());

        Ok(())
    }

    #[test]
    fn restores_saved_settings() -> test::Result {
        let tempdir = tempfile::tempdir()?;
        let path = Path::new("/var/log/apache2/access.log");

        {
            let store = SettingsStore::open(tempdir.path())?;
            store.update("apache", |settings| {
                settings.base_path = Some(PathBuf::from("/srv/logs"));
                Ok(())
            })?;
            let config = CustomRegexConfig::new("^(?P<ip>\\S+)", "access")?;
            store.set_custom_regex("apache", path, config)?;
        }

        let store = SettingsStore::open(tempdir.path())?;
        let settings = store.settings_for("apache");
        assert_eq!(settings.base_path, Some(PathBuf::from("/srv/logs")));
        assert!(store
            .custom_regex_for("apache", Path::new("/var/log/apache2/access.log.3.gz"))
            .is_some());

        assert!(store.remove_custom_regex("apache", Path::new("/var/log/apache2/access.log.1"))?);
        assert!(!store.remove_custom_regex("apache", path)?);
        assert!(store.custom_regex_for("apache", path).is_none());

        Ok(())
    }

    #[test]
    fn corrupt_settings_file() -> test::Result {
        let tempdir = tempfile::tempdir()?;
        fs::write(tempdir.path().join("settings.json"), "{not json")?;

        assert!(matches!(
            SettingsStore::open(tempdir.path()),
            Err(OpenError::Corrupt { .. })
        ));

        Ok(())
    }

    #[test]
    fn catalog_replaces_per_plugin() {
        let file = |path: &str| LogFileInfo {
            path: PathBuf::from(path),
            log_type: "access".to_string(),
            size: 1,
            modified_at: None,
        };
        let catalog = FileCatalog::new();
        catalog.replace_plugin(
            "nginx",
            vec![
                LogFileRecord::new("nginx", &file("/var/log/nginx/access.log"), true),
                LogFileRecord::new("nginx", &file("/var/log/nginx/access.log.2.gz"), true),
            ],
        );
        catalog.replace_plugin(
            "apache",
            vec![LogFileRecord::new("apache", &file("/var/log/apache2/access.log"), true)],
        );
        assert_eq!(catalog.list(None).len(), 3);

        catalog.replace_plugin(
            "nginx",
            vec![LogFileRecord::new("nginx", &file("/var/log/nginx/access.log"), false)],
        );
        assert_eq!(catalog.list(Some("nginx")).len(), 1);

        let id = file_id(Path::new("/var/log/nginx/access.log"));
        assert_eq!(id.len(), 32);
        let record = catalog.find(&id).expect("record exists");
        assert!(!record.readable);
        assert!(!record.compressed);
        assert!(catalog.find("missing").is_none());
    }
}
