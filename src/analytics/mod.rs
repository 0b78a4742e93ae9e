// src/analytics/mod.rs
//! Dashboard statistics over access logs.
//!
//! A request runs in two phases. [`Analytics::collect`] finds the access logs of the requested
//! plugins, parses the tail of each (within fixed ceilings) and keeps only parsed entries inside
//! the time range. The aggregations in [`aggregate`] then run over that one entry set.

pub mod aggregate;
pub mod heuristics;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use self::aggregate::{overview, timeseries, top, Bucket, Dimension, Overview, TimeBucket, TopItem};
use crate::parser::{LineParser, ParseRequest, ParsedEntry};
use crate::plugin::{effective_base_path, effective_patterns, LogFileInfo};
use crate::reader::{is_rotated, Compression};
use crate::{Cancel, FileFailure, Result};

/// Default ceiling on the number of files read per request, across all plugins.
pub const DEFAULT_MAX_FILES: usize = 20;

/// Default ceiling on the number of lines read per file (from the end).
pub const DEFAULT_MAX_LINES_PER_FILE: usize = 50_000;

/// Default length of top-N lists.
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Lines filtered between checks for cancellation.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Which files of a plugin take part.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileScope {
    /// Only the live (non-rotated, uncompressed) files.
    #[default]
    Current,
    /// Rotated files too.
    All,
}

/// The bounds on one collection.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Files read per request, across all plugins.
    pub max_files: usize,
    /// Lines read per file.
    pub max_lines_per_file: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_lines_per_file: DEFAULT_MAX_LINES_PER_FILE,
        }
    }
}

/// An analytics request.
#[derive(Clone, Debug, Default)]
pub struct Query {
    /// The plugins to include.
    pub plugin_ids: Vec<String>,
    /// Overrides the base path of every plugin.
    pub base_path: Option<PathBuf>,
    /// Keep entries at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Keep entries at or before this time.
    pub to: Option<DateTime<Utc>>,
    /// Timeseries bucket width.
    pub bucket: Bucket,
    /// Requested top-N length (`0` means the default).
    pub top_limit: usize,
    /// Which files take part.
    pub file_scope: FileScope,
    /// Whether `.gz` rotated files take part (with [`FileScope::All`]).
    pub include_compressed: bool,
}

/// The entries of one collection.
#[derive(Debug, Default)]
pub struct Collected {
    /// Parsed entries within the time range.
    pub entries: Vec<ParsedEntry>,
    /// The files that were read.
    pub files_analyzed: Vec<PathBuf>,
    /// Files (or plugins) that couldn't be read.
    pub failures: Vec<FileFailure>,
}

/// Top-N lists for every dimension.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLists {
    /// By HTTP method.
    pub methods: Vec<TopItem>,
    /// By status code.
    pub statuses: Vec<TopItem>,
    /// By browser family.
    pub browsers: Vec<TopItem>,
    /// By referrer URL.
    pub referrers: Vec<TopItem>,
    /// By referring host.
    pub referring_sites: Vec<TopItem>,
    /// By virtual host.
    pub hosts: Vec<TopItem>,
    /// By URL.
    pub urls: Vec<TopItem>,
    /// By client address.
    pub ips: Vec<TopItem>,
}

/// The answer to a [`Query`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Headline numbers.
    pub overview: Overview,
    /// The bucket width used for `timeseries`.
    pub bucket: Bucket,
    /// Requests over time.
    pub timeseries: Vec<TimeBucket>,
    /// Breakdowns.
    pub top: TopLists,
    /// How many files were read.
    pub files_analyzed: usize,
    /// Files (or plugins) that couldn't be read.
    pub failures: Vec<FileFailure>,
}

impl Report {
    /// Aggregate a collection.
    #[must_use]
    pub fn build(collected: Collected, bucket: Bucket, top_limit: usize) -> Self {
        let entries = &collected.entries;
        let limit = if top_limit == 0 {
            DEFAULT_TOP_LIMIT
        } else {
            top_limit
        };
        let lists = Dimension::ALL.map(|dimension| top(entries, dimension, limit));
        let [methods, statuses, browsers, referrers, referring_sites, hosts, urls, ips] = lists;

        Self {
            overview: overview(entries),
            bucket,
            timeseries: timeseries(entries, bucket),
            top: TopLists {
                methods,
                statuses,
                browsers,
                referrers,
                referring_sites,
                hosts,
                urls,
                ips,
            },
            files_analyzed: collected.files_analyzed.len(),
            failures: collected.failures,
        }
    }
}

/// Collects and aggregates access-log entries.
#[derive(Clone)]
pub struct Analytics {
    parser: LineParser,
    limits: Limits,
}

struct Candidate {
    plugin_id: String,
    file: LogFileInfo,
}

impl Analytics {
    /// Create an aggregator.
    pub fn new(parser: LineParser, limits: Limits) -> Self {
        Self { parser, limits }
    }

    fn in_scope(file: &LogFileInfo, query: &Query) -> bool {
        let compressed = Compression::of(&file.path).is_compressed();
        match query.file_scope {
            FileScope::Current => !compressed && !is_rotated(&file.path),
            FileScope::All => !compressed || query.include_compressed,
        }
    }

    fn candidates(&self, query: &Query, failures: &mut Vec<FileFailure>) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for plugin_id in &query.plugin_ids {
            let plugin = self.parser.plugins().get(plugin_id)?;
            let settings = self.parser.settings().settings_for(plugin_id);
            if !settings.enabled {
                debug!("Skipping disabled plugin {}", plugin_id);
                continue;
            }

            let base_path = effective_base_path(&*plugin, &settings, query.base_path.as_deref());
            let patterns = effective_patterns(&*plugin, &settings);
            let files = match plugin.scan_log_files(&base_path, &patterns) {
                Ok(files) => files,
                Err(error) => {
                    warn!("Unable to scan {} for {}: {}", base_path.display(), plugin_id, error);
                    failures.push(FileFailure::new(Some(plugin_id.as_str()), &base_path, error));
                    continue;
                }
            };

            for file in files {
                if file.log_type != "access" || !Self::in_scope(&file, query) {
                    continue;
                }
                let compression = Compression::of(&file.path);
                if !compression.is_supported() {
                    debug!("Can't decode {}", file.path.display());
                    failures.push(FileFailure::new(
                        Some(plugin_id.as_str()),
                        &file.path,
                        format!("unsupported compression: {:?}", compression),
                    ));
                    continue;
                }
                candidates.push(Candidate {
                    plugin_id: plugin_id.clone(),
                    file,
                });
            }
        }

        candidates.sort_by(|a, b| b.file.modified_at.cmp(&a.file.modified_at));
        candidates.truncate(self.limits.max_files);
        Ok(candidates)
    }

    /// Collect the entries matching `query`.
    ///
    /// Files are taken newest first, up to the file ceiling, and only the last lines of each (up
    /// to the line ceiling) are read. Unparsed lines and entries without a timestamp inside
    /// `[from, to]` are discarded here, before any aggregation.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPlugin`](crate::Error::UnknownPlugin) for an unregistered plugin id, and
    /// [`Error::Cancelled`](crate::Error::Cancelled) once `cancel` is set. Problems with individual
    /// files (including compression formats that can't be decoded) are reported in
    /// [`Collected::failures`] instead.
    pub fn collect(&self, query: &Query, cancel: &Cancel) -> Result<Collected> {
        let mut collected = Collected::default();
        let candidates = self.candidates(query, &mut collected.failures)?;

        for Candidate { plugin_id, file } in candidates {
            cancel.check()?;
            let request = ParseRequest {
                plugin_id: plugin_id.clone(),
                file_path: file.path.clone(),
                log_type: file.log_type,
                max_lines: self.limits.max_lines_per_file,
                from_line: 0,
                read_compressed: query.include_compressed,
                tail: true,
            };
            let lines = match self.parser.parse_file(&request) {
                Ok(lines) => lines,
                Err(error) => {
                    debug!("Unable to read {}: {}", file.path.display(), error);
                    collected
                        .failures
                        .push(FileFailure::new(Some(plugin_id.as_str()), &file.path, error));
                    continue;
                }
            };

            for (index, line) in lines.into_iter().enumerate() {
                if index % CANCEL_CHECK_INTERVAL == 0 {
                    cancel.check()?;
                }
                if line.parsed.is_parsed && in_range(&line.parsed, query) {
                    collected.entries.push(line.parsed);
                }
            }
            collected.files_analyzed.push(file.path);
        }

        Ok(collected)
    }

    /// Collect and aggregate on the blocking thread pool.
    ///
    /// Dropping the returned future doesn't stop the scan; setting `cancel` does.
    ///
    /// # Errors
    ///
    /// As for [`collect`](Self::collect).
    pub async fn report(&self, query: Query, cancel: Cancel) -> Result<Report> {
        let analytics = self.clone();
        blocking::unblock(move || -> Result<_> {
            let collected = analytics.collect(&query, &cancel)?;
            Ok(Report::build(collected, query.bucket, query.top_limit))
        })
        .await
    }
}

fn in_range(entry: &ParsedEntry, query: &Query) -> bool {
    match entry.time() {
        Some(time) => {
            query.from.map_or(true, |from| time >= from) && query.to.map_or(true, |to| time <= to)
        }
        None => false,
    }
}
