// src/parser/custom.rs
//! User-authored regexes that override a plugin's built-in parser for one file.
//!
//! Configurations are keyed by the *normalized* file path, so `access.log`, `access.log.1` and
//! `access.log.1.gz` all share the entry stored for `access.log`.

use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ParsedEntry;
use crate::reader::normalize_path;
use crate::{Error, Result};

/// A stored custom regex.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRegexConfig {
    /// The pattern. It always compiles and has at least one named group.
    pub regex: String,
    /// The log type the pattern was written for.
    pub log_type: String,
    /// When the pattern was last saved.
    pub updated_at: DateTime<Utc>,
}

impl CustomRegexConfig {
    /// Validate `regex` and build a configuration stamped with the current time.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`] if the pattern doesn't compile or has no named capture groups.
    pub fn new(regex: &str, log_type: &str) -> Result<Self> {
        compile(regex)?;
        Ok(Self {
            regex: regex.to_string(),
            log_type: log_type.to_string(),
            updated_at: Utc::now(),
        })
    }
}

/// The key a custom regex for `path` is stored under.
#[must_use]
pub fn config_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}

/// Compile a custom pattern, rejecting anything that couldn't produce structured fields.
///
/// # Errors
///
/// [`Error::InvalidPattern`] if the pattern doesn't compile or has no named capture groups.
pub fn compile(pattern: &str) -> Result<Regex> {
    let regex = Regex::new(pattern).map_err(|error| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: error.to_string(),
    })?;
    if regex.capture_names().flatten().next().is_none() {
        return Err(Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "the pattern has no named capture groups".to_string(),
        });
    }
    Ok(regex)
}

/// Parse `line` with a compiled custom pattern.
///
/// Every named group that participated in the match becomes a field; a `request` group is split
/// into method, url and protocol.
#[must_use]
pub fn parse(regex: &Regex, line: &str) -> Option<ParsedEntry> {
    let captures = regex.captures(line)?;
    let fields = regex.capture_names().flatten().filter_map(|name| {
        captures
            .name(name)
            .map(|value| (name, value.as_str()))
    });
    Some(ParsedEntry::from_fields(fields))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::Error;

    use super::{compile, config_key, parse, CustomRegexConfig};

    #[test]
    fn rejects_invalid_patterns() {
        assert!(matches!(
            CustomRegexConfig::new("(?P<ip>\\S+", "access"),
            Err(Error::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile("^(\\S+) (\\S+)$"),
            Err(Error::InvalidPattern { reason, .. }) if reason.contains("named")
        ));
        assert!(compile("^(?P<ip>\\S+)").is_ok());
    }

    #[test]
    fn variants_share_a_key() {
        let base = config_key(Path::new("/var/log/nginx/access.log"));
        assert_eq!(config_key(Path::new("/var/log/nginx/access.log.1")), base);
        assert_eq!(config_key(Path::new("/var/log/nginx/access.log.1.gz")), base);
        assert_eq!(
            config_key(Path::new("/var/log/nginx/access.log-20240101")),
            base
        );
    }

    #[test]
    fn splits_request_groups() {
        let regex =
            compile(r#"^(?P<ip>\S+) "(?P<request>[^"]*)" (?P<status>\d+) (?P<duration>\d+)ms$"#)
                .expect("valid pattern");
        let entry = parse(&regex, r#"10.0.0.1 "POST /api/login HTTP/2.0" 401 12ms"#)
            .expect("line matches");

        assert!(entry.is_parsed);
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(entry.method.as_deref(), Some("POST"));
        assert_eq!(entry.url.as_deref(), Some("/api/login"));
        assert_eq!(entry.protocol.as_deref(), Some("HTTP/2.0"));
        assert_eq!(entry.status, Some(401));
        assert_eq!(entry.extra.get("duration").map(String::as_str), Some("12"));

        assert!(parse(&regex, "garbage").is_none());
    }
}
