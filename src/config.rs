// src/config.rs
//! Command line and environment configuration for the `loglens` binary.

use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use crate::analytics::Limits;
use crate::api::Options;
use crate::reader::FollowOptions;
use crate::summary::{Depth, SummaryConfig};

/// Read, tail, parse and aggregate web server and system logs.
#[derive(Debug, StructOpt)]
#[structopt(name = "loglens")]
pub struct Config {
    /// Address the HTTP API listens on.
    #[structopt(long, env = "LOGLENS_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Directory holding `settings.json`.
    #[structopt(long, env = "LOGLENS_DATA_DIR", default_value = ".data", parse(from_os_str))]
    pub data_directory: PathBuf,

    /// Seconds before analytics and error-summary requests give up.
    #[structopt(
        long,
        env = "LOGLENS_REQUEST_TIMEOUT",
        default_value = "30",
        parse(try_from_str = parse_seconds),
    )]
    pub request_timeout: Duration,

    /// Seconds between WebSocket pings.
    #[structopt(
        long,
        env = "LOGLENS_HEARTBEAT",
        default_value = "30",
        parse(try_from_str = parse_seconds),
    )]
    pub heartbeat: Duration,

    /// Milliseconds between checks of a followed file once its watcher has failed.
    #[structopt(
        long,
        env = "LOGLENS_POLL_INTERVAL_MS",
        default_value = "1000",
        parse(try_from_str = parse_millis),
    )]
    pub poll_interval: Duration,

    /// Seconds an error summary is reused.
    #[structopt(
        long,
        env = "LOGLENS_SUMMARY_TTL",
        default_value = "60",
        parse(try_from_str = parse_seconds),
    )]
    pub summary_ttl: Duration,

    /// Files larger than this are skipped by the error summary.
    #[structopt(long, env = "LOGLENS_SUMMARY_MAX_FILE_SIZE", default_value = "52428800")]
    pub summary_max_file_size: u64,

    /// Files scanned per plugin by the error summary.
    #[structopt(long, env = "LOGLENS_SUMMARY_MAX_FILES", default_value = "10")]
    pub summary_max_files: usize,

    /// Lines read per file by the error summary: quick, standard or deep.
    #[structopt(long, env = "LOGLENS_SUMMARY_DEPTH", default_value = "standard")]
    pub summary_depth: Depth,

    /// Files read per analytics request.
    #[structopt(long, env = "LOGLENS_ANALYTICS_MAX_FILES", default_value = "20")]
    pub analytics_max_files: usize,

    /// Lines read from the end of each file per analytics request.
    #[structopt(long, env = "LOGLENS_ANALYTICS_MAX_LINES", default_value = "50000")]
    pub analytics_max_lines: usize,
}

impl Config {
    /// Settings for the error summarizer.
    #[must_use]
    pub fn summary(&self) -> SummaryConfig {
        SummaryConfig {
            max_file_size_bytes: self.summary_max_file_size,
            max_files_per_plugin: self.summary_max_files,
            depth: self.summary_depth,
            ttl: self.summary_ttl,
        }
    }

    /// Ceilings for analytics requests.
    #[must_use]
    pub fn analytics(&self) -> Limits {
        Limits {
            max_files: self.analytics_max_files,
            max_lines_per_file: self.analytics_max_lines,
        }
    }

    /// Options for followed files.
    #[must_use]
    pub fn follow(&self) -> FollowOptions {
        FollowOptions {
            poll_interval: self.poll_interval,
            ..FollowOptions::default()
        }
    }

    /// Everything the HTTP API is tuned by.
    #[must_use]
    pub fn options(&self) -> Options {
        Options {
            request_timeout: self.request_timeout,
            heartbeat: self.heartbeat,
            follow: self.follow(),
            analytics: self.analytics(),
            summary: self.summary(),
        }
    }
}

fn parse_seconds(input: &str) -> Result<Duration, String> {
    input
        .parse()
        .map(Duration::from_secs)
        .map_err(|error| format!("invalid number of seconds `{}`: {}", input, error))
}

fn parse_millis(input: &str) -> Result<Duration, String> {
    input
        .parse()
        .map(Duration::from_millis)
        .map_err(|error| format!("invalid number of milliseconds `{}`: {}", input, error))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use structopt::StructOpt;

    use crate::summary::{Depth, SummaryConfig};

    use super::Config;

    #[test]
    fn defaults_match_the_components() {
        let config = Config::from_iter(["loglens"]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat, Duration::from_secs(30));
        assert_eq!(config.follow().poll_interval, Duration::from_secs(1));
        assert_eq!(config.summary(), SummaryConfig::default());
        assert_eq!(config.analytics().max_files, 20);
        assert_eq!(config.analytics().max_lines_per_file, 50_000);
    }

    #[test]
    fn flags_override() {
        let config = Config::from_iter([
            "loglens",
            "--summary-depth",
            "deep",
            "--poll-interval",
            "250",
            "--request-timeout",
            "5",
        ]);
        assert_eq!(config.summary_depth, Depth::Deep);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(Config::from_iter_safe(["loglens", "--summary-depth", "thorough"]).is_err());
    }
}
