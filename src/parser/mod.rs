// src/parser/mod.rs
//! Turning raw lines into structured entries.
//!
//! Each line is dispatched to a parser resolved once per file: a custom regex stored for the
//! file's normalized path wins over the built-in parser of the owning plugin. Lines that no parser
//! understands are kept as unparsed fallback entries so line counts stay accurate.

pub mod custom;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use log::warn;
use regex::Regex;
use serde::Serialize;

use crate::plugin::{Plugin, PluginRegistry};
use crate::reader::{self, FollowHandle, FollowOptions, RawLine, ReadOptions};
use crate::store::SettingsStore;
use crate::Result;

/// A structured view of one log line.
///
/// Fields that weren't extracted are `None` and are omitted from the serialized form.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEntry {
    /// The timestamp, as written in the line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Client address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// HTTP status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Requested URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Client user agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Referring URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// HTTP method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Virtual host or originating machine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// HTTP protocol version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Free-form message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Whether a parser understood the line.
    pub is_parsed: bool,
    /// Named fields without a dedicated slot (custom regex groups, process names, pids, ...).
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ParsedEntry {
    /// The entry for a line no parser understood.
    #[must_use]
    pub fn unparsed(line: &str) -> Self {
        Self {
            message: Some(line.to_string()),
            level: Some("info".to_string()),
            is_parsed: false,
            ..Self::default()
        }
    }

    /// Build a parsed entry from `(name, value)` pairs.
    ///
    /// Well-known names (and a few common aliases) fill the dedicated fields, a `request` value is
    /// split into method, url and protocol, and anything else lands in `extra`. Numeric fields that
    /// don't parse as numbers (e.g. a size of `-`) are left empty.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut entry = Self {
            is_parsed: true,
            ..Self::default()
        };
        for (name, value) in fields {
            let text = Some(value.to_string());
            match name {
                "timestamp" | "time" | "date" | "datetime" => entry.timestamp = text,
                "ip" | "client" | "remote_addr" => entry.ip = text,
                "status" | "status_code" => entry.status = value.parse().ok(),
                "size" | "bytes" | "body_bytes_sent" => entry.size = value.parse().ok(),
                "url" | "path" | "uri" => entry.url = text,
                "user_agent" | "useragent" | "agent" | "ua" => entry.user_agent = text,
                "referer" | "referrer" => entry.referer = text,
                "method" => entry.method = text,
                "host" | "vhost" | "server" | "hostname" => entry.host = text,
                "protocol" => entry.protocol = text,
                "message" | "msg" => entry.message = text,
                "level" | "severity" => entry.level = text,
                "request" => entry.set_request(value),
                _ => {
                    entry.extra.insert(name.to_string(), value.to_string());
                }
            }
        }
        entry
    }

    /// Fill method, url and protocol from an HTTP request line (`GET /path HTTP/1.1`).
    ///
    /// Fields already set are kept. A request that isn't three tokens long is stored in `extra`.
    pub fn set_request(&mut self, request: &str) {
        let parts: Vec<_> = request.split_whitespace().collect();
        if let [method, url, protocol] = parts[..] {
            self.method.get_or_insert_with(|| method.to_string());
            self.url.get_or_insert_with(|| url.to_string());
            self.protocol.get_or_insert_with(|| protocol.to_string());
        } else {
            self.extra
                .insert("request".to_string(), request.to_string());
        }
    }

    /// Interpret `timestamp`.
    ///
    /// Understands common log format, RFC 3339, ISO-like `YYYY-MM-DD HH:MM:SS`, nginx error log
    /// (`YYYY/MM/DD HH:MM:SS`), Apache error log (`Mon Jan 01 00:00:00.000000 2024`) and BSD syslog
    /// (`Jan  1 00:00:00`, assumed to be in the current year). Timestamps without an offset are
    /// taken as UTC.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp.as_deref()?)
    }
}

/// Interpret a textual timestamp; see [`ParsedEntry::time`].
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_str(text, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(time.with_timezone(&Utc));
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%a %b %d %H:%M:%S%.f %Y",
    ];
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    for format in NAIVE_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(&collapsed, format) {
            return Some(DateTime::from_naive_utc_and_offset(time, Utc));
        }
    }

    let with_year = format!("{} {}", Utc::now().year(), collapsed);
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
        .ok()
        .map(|time| DateTime::from_naive_utc_and_offset(time, Utc))
}

/// A parsed entry together with the line it came from.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedLine {
    /// The structured (or fallback) entry.
    pub parsed: ParsedEntry,
    /// The raw line.
    pub raw: RawLine,
}

/// Which lines of which file [`LineParser::parse_file`] should parse.
#[derive(Clone, Debug, Default)]
pub struct ParseRequest {
    /// The plugin that owns the file.
    pub plugin_id: String,
    /// The file to parse.
    pub file_path: PathBuf,
    /// The log type to use for the built-in parser.
    pub log_type: String,
    /// Maximum number of lines; `0` means unbounded.
    pub max_lines: usize,
    /// Skip lines whose number is `<= from_line`.
    pub from_line: usize,
    /// Decode `.gz` files.
    pub read_compressed: bool,
    /// Read the last `max_lines` lines instead of the first.
    pub tail: bool,
}

/// A parser resolved for one file.
#[derive(Clone)]
enum Dispatch {
    Custom(Regex),
    Builtin {
        plugin: Arc<dyn Plugin>,
        log_type: String,
    },
}

impl Dispatch {
    fn parse(&self, line: &str) -> Option<ParsedEntry> {
        match self {
            Dispatch::Custom(regex) => custom::parse(regex, line),
            Dispatch::Builtin { plugin, log_type } => plugin.parse_log_line(line, log_type),
        }
    }

    fn parse_raw(&self, raw: RawLine) -> ParsedLine {
        let parsed = self
            .parse(&raw.content)
            .unwrap_or_else(|| ParsedEntry::unparsed(&raw.content));
        ParsedLine { parsed, raw }
    }
}

/// Dispatches lines to custom or built-in parsers.
///
/// Cloning is cheap: the plugin registry and settings store are shared.
#[derive(Clone)]
pub struct LineParser {
    plugins: Arc<PluginRegistry>,
    settings: Arc<SettingsStore>,
}

impl LineParser {
    /// Create a parser over the given plugins and settings.
    pub fn new(plugins: Arc<PluginRegistry>, settings: Arc<SettingsStore>) -> Self {
        Self { plugins, settings }
    }

    /// The plugin registry this parser dispatches to.
    #[must_use]
    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// The settings store custom regexes are looked up in.
    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    fn resolve(&self, plugin_id: &str, log_type: &str, path: Option<&Path>) -> Result<Dispatch> {
        let plugin = self.plugins.get(plugin_id)?;

        let custom = path.and_then(|path| self.settings.custom_regex_for(plugin_id, path));
        if let Some(config) = custom {
            match custom::compile(&config.regex) {
                Ok(regex) => return Ok(Dispatch::Custom(regex)),
                Err(error) => warn!(
                    "Ignoring stored custom regex for plugin {}: {}",
                    plugin_id, error
                ),
            }
        }

        Ok(Dispatch::Builtin {
            plugin,
            log_type: log_type.to_string(),
        })
    }

    /// Read and parse lines of a file.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPlugin`](crate::Error::UnknownPlugin) for an unregistered plugin id, and the
    /// errors of [`reader::read_lines`] for the file itself.
    pub fn parse_file(&self, request: &ParseRequest) -> Result<Vec<ParsedLine>> {
        let dispatch = self.resolve(
            &request.plugin_id,
            &request.log_type,
            Some(&request.file_path),
        )?;
        let options = ReadOptions {
            max_lines: request.max_lines,
            from_line: request.from_line,
            read_compressed: request.read_compressed,
        };
        let lines = if request.tail {
            reader::read_last_lines(&request.file_path, request.max_lines, &options)?
        } else {
            reader::read_lines(&request.file_path, &options)?
        };

        Ok(lines
            .into_iter()
            .map(|raw| dispatch.parse_raw(raw))
            .collect())
    }

    /// [`parse_file`](Self::parse_file) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// As for [`parse_file`](Self::parse_file).
    pub async fn parse_file_async(&self, request: ParseRequest) -> Result<Vec<ParsedLine>> {
        let parser = self.clone();
        blocking::unblock(move || parser.parse_file(&request)).await
    }

    /// Follow a file, calling `on_entry` with each parsed (or fallback) line.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPlugin`](crate::Error::UnknownPlugin) for an unregistered plugin id.
    /// Problems with the file itself are not errors: the follower keeps retrying.
    pub fn stream_parse<F>(
        &self,
        plugin_id: &str,
        path: &Path,
        log_type: &str,
        options: FollowOptions,
        mut on_entry: F,
    ) -> Result<FollowHandle>
    where
        F: FnMut(ParsedLine) + Send + 'static,
    {
        let dispatch = self.resolve(plugin_id, log_type, Some(path))?;
        Ok(reader::follow(
            path,
            move |raw| on_entry(dispatch.parse_raw(raw)),
            options,
        ))
    }

    /// Parse a single line.
    ///
    /// A custom regex is only considered when `path` is given. Returns `None` if no parser
    /// understands the line.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPlugin`](crate::Error::UnknownPlugin) for an unregistered plugin id.
    pub fn parse_line(
        &self,
        plugin_id: &str,
        line: &str,
        log_type: &str,
        path: Option<&Path>,
    ) -> Result<Option<ParsedEntry>> {
        Ok(self.resolve(plugin_id, log_type, path)?.parse(line))
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use async_std::channel;
    use async_std::future;
    use chrono::{TimeZone, Utc};
    use flate2::write::GzEncoder;

    use crate::parser::custom::CustomRegexConfig;
    use crate::reader::FollowOptions;
    use crate::test::{self, registry, temp_store, write_file, ACCESS_LINE};
    use crate::Error;

    use super::{parse_timestamp, LineParser, ParseRequest, ParsedEntry};

    fn parser(
    ) -> std::result::Result<(tempfile::TempDir, LineParser), Box<dyn std::error::Error>> {
        let (tempdir, store) = temp_store()?;
        Ok((tempdir, LineParser::new(Arc::new(registry()), Arc::new(store))))
    }

    #[test]
    fn unparsed_fallback() {
        let entry = ParsedEntry::unparsed("something odd");
        assert!(!entry.is_parsed);
        assert_eq!(entry.message.as_deref(), Some("something odd"));
        assert_eq!(entry.level.as_deref(), Some("info"));

        let json = serde_json::to_value(&entry).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({"message": "something odd", "level": "info", "isParsed": false})
        );
    }

    #[test]
    fn timestamps() {
        let expected = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).single();
        assert_eq!(parse_timestamp("01/Jan/2024:00:00:00 +0100"), expected);
        assert_eq!(parse_timestamp("2023-12-31T23:00:00Z"), expected);
        assert_eq!(parse_timestamp("2023-12-31 23:00:00"), expected);
        assert_eq!(parse_timestamp("2023/12/31 23:00:00"), expected);
        assert_eq!(
            parse_timestamp("Sun Dec 31 23:00:00.123456 2023").map(|t| t.timestamp()),
            expected.map(|t| t.timestamp())
        );
        assert!(parse_timestamp("Jan  5 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn builtin_access_parser() -> test::Result {
        let (_tempdir, parser) = parser()?;
        let entry = parser
            .parse_line("apache", ACCESS_LINE, "access", None)?
            .expect("line parses");

        assert!(entry.is_parsed);
        assert_eq!(entry.ip.as_deref(), Some("192.168.1.1"));
        assert_eq!(entry.method.as_deref(), Some("GET"));
        assert_eq!(entry.url.as_deref(), Some("/index.php"));
        assert_eq!(entry.status, Some(200));
        assert_eq!(entry.size, Some(1234));

        Ok(())
    }

    #[test]
    fn unknown_plugin() -> test::Result {
        let (_tempdir, parser) = parser()?;
        assert!(matches!(
            parser.parse_line("iis", ACCESS_LINE, "access", None),
            Err(Error::UnknownPlugin(_))
        ));
        Ok(())
    }

    #[test]
    fn parse_file_keeps_misses() -> test::Result {
        let (tempdir, parser) = parser()?;
        let contents = format!("{}\nnot an access line\n{}\n", ACCESS_LINE, ACCESS_LINE);
        let path = write_file(tempdir.path(), "logs/access.log", &contents)?;

        let lines = parser.parse_file(&ParseRequest {
            plugin_id: "nginx".to_string(),
            file_path: path,
            log_type: "access".to_string(),
            ..ParseRequest::default()
        })?;

        assert_eq!(lines.len(), 3);
        assert!(lines[0].parsed.is_parsed);
        assert!(!lines[1].parsed.is_parsed);
        assert_eq!(lines[1].parsed.message.as_deref(), Some("not an access line"));
        assert_eq!(lines[1].raw.line_number, 2);

        Ok(())
    }

    #[test]
    fn custom_regex_applies_to_rotated_variants() -> test::Result {
        let (tempdir, parser) = parser()?;
        let line = "2024-01-01 12:00:00 | 10.1.1.1 | GET /health | 204";
        let base = write_file(tempdir.path(), "app/access.log", &format!("{}\n", line))?;
        let rotated = write_file(tempdir.path(), "app/access.log.1", &format!("{}\n", line))?;
        let compressed = tempdir.path().join("app/access.log.1.gz");
        let mut encoder =
            GzEncoder::new(File::create(&compressed)?, flate2::Compression::default());
        writeln!(encoder, "{}", line)?;
        encoder.finish()?;

        let config = CustomRegexConfig::new(
            r"^(?P<timestamp>\S+ \S+) \| (?P<ip>\S+) \| (?P<method>\S+) (?P<url>\S+) \| (?P<status>\d+)$",
            "access",
        )?;
        parser.settings().set_custom_regex("apache", &base, config)?;

        let mut results = Vec::new();
        for path in [base, rotated, compressed] {
            let lines = parser.parse_file(&ParseRequest {
                plugin_id: "apache".to_string(),
                file_path: path,
                log_type: "access".to_string(),
                read_compressed: true,
                ..ParseRequest::default()
            })?;
            assert_eq!(lines.len(), 1);
            results.push(lines[0].parsed.clone());
        }

        assert!(results[0].is_parsed);
        assert_eq!(results[0].ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(results[0].status, Some(204));
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], results[2]);

        // Without a path, the custom regex isn't consulted and the built-in parser misses.
        assert_eq!(parser.parse_line("apache", line, "access", None)?, None);

        Ok(())
    }

    #[test]
    fn tail_reads_last_lines() -> test::Result {
        let (tempdir, parser) = parser()?;
        let contents: String = (1..=10).map(|i| format!("entry {}\n", i)).collect();
        let path = write_file(tempdir.path(), "syslog", &contents)?;

        let lines = parser.parse_file(&ParseRequest {
            plugin_id: "system".to_string(),
            file_path: path,
            log_type: "syslog".to_string(),
            max_lines: 2,
            tail: true,
            ..ParseRequest::default()
        })?;
        let numbers: Vec<_> = lines.iter().map(|line| line.raw.line_number).collect();
        assert_eq!(numbers, vec![9, 10]);

        Ok(())
    }

    #[async_std::test]
    async fn stream_parse_delivers_entries() -> test::Result {
        let (tempdir, parser) = parser()?;
        let path = write_file(tempdir.path(), "access.log", &format!("{}\n", ACCESS_LINE))?;

        let (tx, rx) = channel::unbounded();
        let options = FollowOptions {
            tick: Duration::from_millis(10),
            poll_interval: Duration::from_millis(20),
            ..FollowOptions::default()
        };
        let _handle = parser.stream_parse("apache", &path, "access", options, move |line| {
            let _ = tx.try_send(line);
        })?;

        let line = future::timeout(Duration::from_secs(5), rx.recv()).await??;
        assert_eq!(line.parsed.status, Some(200));
        assert_eq!(line.raw.line_number, 1);

        Ok(())
    }
}
