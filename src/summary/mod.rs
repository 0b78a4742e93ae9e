// src/summary/mod.rs
//! Error-density summaries across every enabled plugin.
//!
//! [`ErrorSummarizer::summarize`] tail-scans a bounded set of candidate files per plugin and
//! counts lines by severity tag or HTTP status band (see [`classify`]). Results are cached for a
//! TTL, and a [`ProgressLog`] records what a running scan is doing.

pub mod cache;
pub mod classify;
pub mod progress;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use self::cache::{Clock, SystemClock, TtlCache};
use self::classify::{classify, Class};
use self::progress::{Progress, ProgressLog};
use crate::plugin::{
    effective_base_path, effective_patterns, is_error_log, LogFileInfo, PluginKind, PluginRegistry,
};
use crate::reader::{is_archive, read_last_lines, Compression, ReadOptions};
use crate::store::SettingsStore;
use crate::{Cancel, Error, FileFailure, Result};

/// How many lines are read from the end of each file.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// 200 lines.
    Quick,
    /// 1000 lines.
    #[default]
    Standard,
    /// 5000 lines.
    Deep,
}

impl Depth {
    /// The number of lines read per file.
    #[must_use]
    pub fn lines(self) -> usize {
        match self {
            Self::Quick => 200,
            Self::Standard => 1000,
            Self::Deep => 5000,
        }
    }
}

impl FromStr for Depth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            "deep" => Ok(Self::Deep),
            _ => Err(Error::InvalidRequest(format!("unknown depth: {}", s))),
        }
    }
}

/// Scan settings, adjustable at runtime.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryConfig {
    /// Larger files are skipped.
    pub max_file_size_bytes: u64,
    /// Candidates kept per plugin.
    pub max_files_per_plugin: usize,
    /// Lines read per file.
    pub depth: Depth,
    /// How long a result is reused.
    #[serde(with = "seconds")]
    pub ttl: Duration,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            max_files_per_plugin: 10,
            depth: Depth::default(),
            ttl: Duration::from_secs(60),
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Match counts for one file.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFileSummary {
    /// The owning plugin.
    pub plugin_id: String,
    /// Where the file is.
    pub file_path: PathBuf,
    /// The last component of `file_path`.
    pub file_name: String,
    /// The plugin-specific type of the file.
    pub log_type: String,
    /// Size in bytes when scanned.
    pub file_size_bytes: u64,
    /// `count_error_tag + count_4xx + count_5xx`.
    pub error_count: usize,
    /// Lines with a 4xx status.
    pub count_4xx: usize,
    /// Lines with a 5xx status.
    pub count_5xx: usize,
    /// Lines with a 3xx status.
    pub count_3xx: usize,
    /// Lines with an error-level tag.
    pub count_error_tag: usize,
    /// Lines with a warning tag.
    pub count_warn_tag: usize,
}

impl ErrorFileSummary {
    fn new(plugin_id: &str, file: &LogFileInfo) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            file_name: file
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: file.path.clone(),
            log_type: file.log_type.clone(),
            file_size_bytes: file.size,
            ..Self::default()
        }
    }

    fn count(&mut self, class: Class) {
        match class {
            Class::ErrorTag => self.count_error_tag += 1,
            Class::WarnTag => self.count_warn_tag += 1,
            Class::Status5xx => self.count_5xx += 1,
            Class::Status4xx => self.count_4xx += 1,
            Class::Status3xx => self.count_3xx += 1,
        }
        self.error_count = self.count_error_tag + self.count_4xx + self.count_5xx;
    }

    /// Every match in the file, warnings and redirects included.
    #[must_use]
    pub fn total(&self) -> usize {
        self.error_count + self.count_3xx + self.count_warn_tag
    }
}

/// A candidate left out because of its size.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    /// The owning plugin.
    pub plugin_id: String,
    /// Where the file is.
    pub file_path: PathBuf,
    /// Its size in bytes.
    pub file_size_bytes: u64,
    /// Why it was skipped.
    pub reason: String,
}

/// The result of one scan.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    /// Files with at least one match, most matches first.
    pub files: Vec<ErrorFileSummary>,
    /// Candidates that were too large to read.
    pub skipped: Vec<SkippedFile>,
    /// Files (or plugins) that couldn't be read.
    pub analysis_errors: Vec<FileFailure>,
    /// The depth the scan ran at.
    pub depth: Depth,
}

/// A summary as served, possibly from the cache.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summarized {
    /// The result.
    #[serde(flatten)]
    pub summary: Arc<ErrorSummary>,
    /// When the scan finished.
    pub computed_at: DateTime<Utc>,
    /// Whether the result came from the cache.
    pub from_cache: bool,
    /// Age of the cached result; `0` for a fresh scan.
    pub cache_age_seconds: i64,
}

/// Computes, caches and reports progress on error summaries.
pub struct ErrorSummarizer {
    plugins: Arc<PluginRegistry>,
    settings: Arc<SettingsStore>,
    config: Mutex<SummaryConfig>,
    cache: TtlCache<ErrorSummary>,
    progress: ProgressLog,
    clock: Arc<dyn Clock>,
}

impl ErrorSummarizer {
    /// A summarizer reading the system clock.
    pub fn new(
        plugins: Arc<PluginRegistry>,
        settings: Arc<SettingsStore>,
        config: SummaryConfig,
    ) -> Self {
        Self::with_clock(plugins, settings, config, Arc::new(SystemClock))
    }

    /// A summarizer reading `clock`.
    pub fn with_clock(
        plugins: Arc<PluginRegistry>,
        settings: Arc<SettingsStore>,
        config: SummaryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            plugins,
            settings,
            config: Mutex::new(config),
            cache: TtlCache::default(),
            progress: ProgressLog::default(),
            clock,
        }
    }

    /// The current configuration.
    pub fn config(&self) -> SummaryConfig {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the configuration and invalidate the cache.
    pub fn set_config(&self, config: SummaryConfig) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
        self.invalidate();
    }

    /// Drop the cached result, so the next request scans.
    pub fn invalidate(&self) {
        debug!("Error summary cache invalidated");
        self.cache.clear();
    }

    /// What the current (or last) scan did.
    pub fn progress(&self) -> Progress {
        self.progress.snapshot()
    }

    /// The cached summary if it's within the TTL, a fresh one otherwise.
    ///
    /// A scan stops at the next file once `cancel` is set, and its partial result is discarded
    /// without being cached.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] if the scan was cancelled.
    pub fn summarize(&self, cancel: &Cancel) -> Result<Summarized> {
        let config = self.config();
        let now = self.clock.now();
        let ttl =
            chrono::Duration::from_std(config.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        if let Some(cached) = self.cache.get(now, ttl) {
            return Ok(Summarized {
                summary: cached.value,
                computed_at: cached.computed_at,
                from_cache: true,
                cache_age_seconds: (now - cached.computed_at).num_seconds(),
            });
        }

        self.progress.start();
        let computed = self.compute(&config, cancel);
        if computed.is_err() {
            self.progress.push("Cancelled", None, None);
        }
        self.progress.finish();

        let cached = self.cache.put(computed?, self.clock.now());
        Ok(Summarized {
            summary: cached.value,
            computed_at: cached.computed_at,
            from_cache: false,
            cache_age_seconds: 0,
        })
    }

    /// [`summarize`](Self::summarize) on the blocking thread pool.
    ///
    /// Dropping the returned future doesn't stop the scan; setting `cancel` does.
    ///
    /// # Errors
    ///
    /// As for [`summarize`](Self::summarize).
    pub async fn summarize_async(self: Arc<Self>, cancel: Cancel) -> Result<Summarized> {
        blocking::unblock(move || self.summarize(&cancel)).await
    }

    fn compute(&self, config: &SummaryConfig, cancel: &Cancel) -> Result<ErrorSummary> {
        let mut summary = ErrorSummary {
            depth: config.depth,
            ..ErrorSummary::default()
        };

        for plugin in self.plugins.iter() {
            cancel.check()?;
            let plugin_id = plugin.id();
            let settings = self.settings.settings_for(plugin_id);
            if !settings.enabled {
                continue;
            }

            let base_path = effective_base_path(&**plugin, &settings, None);
            let patterns = effective_patterns(&**plugin, &settings);
            let files = match plugin.scan_log_files(&base_path, &patterns) {
                Ok(files) => files,
                Err(error) => {
                    self.progress.push(
                        format!("Unable to scan: {}", error),
                        Some(plugin_id),
                        Some(base_path.as_path()),
                    );
                    summary
                        .analysis_errors
                        .push(FileFailure::new(Some(plugin_id), &base_path, error));
                    continue;
                }
            };

            let candidates =
                self.select(plugin_id, plugin.kind(), files, config, &mut summary.skipped);
            self.progress.push(
                format!("Selected {} files", candidates.len()),
                Some(plugin_id),
                None,
            );

            for file in candidates {
                cancel.check()?;
                match self.count_file(plugin_id, &file, config.depth) {
                    Ok(counts) if counts.total() > 0 => summary.files.push(counts),
                    Ok(_) => {}
                    Err(error) => {
                        self.progress.push(
                            format!("Failed: {}", error),
                            Some(plugin_id),
                            Some(file.path.as_path()),
                        );
                        summary
                            .analysis_errors
                            .push(FileFailure::new(Some(plugin_id), &file.path, error));
                    }
                }
            }
        }

        summary.files.sort_by(|a, b| b.total().cmp(&a.total()));
        info!(
            "Error summary: {} files with matches, {} skipped, {} failures",
            summary.files.len(),
            summary.skipped.len(),
            summary.analysis_errors.len()
        );
        Ok(summary)
    }

    fn select(
        &self,
        plugin_id: &str,
        kind: PluginKind,
        files: Vec<LogFileInfo>,
        config: &SummaryConfig,
        skipped: &mut Vec<SkippedFile>,
    ) -> Vec<LogFileInfo> {
        let mut candidates: Vec<_> = files
            .into_iter()
            .filter(|file| match kind {
                PluginKind::WebServer => is_error_log(file) || file.log_type == "access",
                PluginKind::HostSystem => true,
            })
            .filter(|file| !Compression::of(&file.path).is_compressed() && !is_archive(&file.path))
            .filter(|file| {
                if file.size <= config.max_file_size_bytes {
                    return true;
                }
                self.progress
                    .push("Skipped, too large", Some(plugin_id), Some(file.path.as_path()));
                skipped.push(SkippedFile {
                    plugin_id: plugin_id.to_string(),
                    file_path: file.path.clone(),
                    file_size_bytes: file.size,
                    reason: format!("too large (limit {} bytes)", config.max_file_size_bytes),
                });
                false
            })
            .collect();

        // Error logs first, then the most recently modified.
        candidates.sort_by(|a, b| {
            is_error_log(b)
                .cmp(&is_error_log(a))
                .then_with(|| b.modified_at.cmp(&a.modified_at))
        });
        candidates.truncate(config.max_files_per_plugin);
        candidates
    }

    fn count_file(
        &self,
        plugin_id: &str,
        file: &LogFileInfo,
        depth: Depth,
    ) -> Result<ErrorFileSummary> {
        self.progress.push("Reading", Some(plugin_id), Some(file.path.as_path()));
        let lines = read_last_lines(&file.path, depth.lines(), &ReadOptions::default())?;

        let mut counts = ErrorFileSummary::new(plugin_id, file);
        for line in &lines {
            if let Some(class) = classify(&line.content) {
                counts.count(class);
            }
        }

        self.progress.push(
            format!("{} matches in {} lines", counts.total(), lines.len()),
            Some(plugin_id),
            Some(file.path.as_path()),
        );
        Ok(counts)
    }
}
