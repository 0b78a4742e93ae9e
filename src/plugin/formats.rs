// src/plugin/formats.rs
//! Built-in line formats shared by the plugins.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::parser::ParsedEntry;

/// Combined or common log format, optionally prefixed with `vhost:port` (Apache `vhost_combined`).
fn access_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r#"^(?:(?P<host>[^\s:]+):\d+ )?(?P<ip>\S+) \S+ (?P<user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<request>[^"]*)" (?P<status>\d{3}) (?P<size>\d+|-)(?: "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)")?"#,
        )
        .unwrap()
    })
}

fn apache_error_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^\[(?P<timestamp>[^\]]+)\] \[(?:(?P<module>[^:\]]+):)?(?P<level>[^\]]+)\](?: \[pid (?P<pid>\d+)(?::tid \d+)?\])?(?: \[client (?P<ip>[^\]]+?)(?::\d+)?\])? (?P<message>.*)$",
        )
        .unwrap()
    })
}

fn nginx_error_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^(?P<timestamp>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<level>\w+)\] (?P<pid>\d+)#\d+: (?:\*\d+ )?(?P<message>.*)$",
        )
        .unwrap()
    })
}

/// The `key: value` context nginx appends to error messages.
fn nginx_context_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#", (?P<key>client|server|request|host): (?:"(?P<quoted>[^"]*)"|(?P<bare>[^,]+))"#)
            .unwrap()
    })
}

fn syslog_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^(?P<timestamp>[A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2}|\d{4}-\d{2}-\d{2}T\S+) (?P<host>\S+) (?P<process>[^:\[\s]+)(?:\[(?P<pid>\d+)\])?: (?P<message>.*)$",
        )
        .unwrap()
    })
}

fn severity_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(?P<error>emerg(?:ency)?|alert|crit(?:ical)?|err(?:or)?|fatal|fail(?:ed|ure)?)|(?P<warning>warn(?:ing)?))\b")
            .unwrap()
    })
}

fn fields<'a>(
    regex: &'a Regex,
    captures: &'a Captures<'a>,
) -> impl Iterator<Item = (&'a str, &'a str)> {
    regex
        .capture_names()
        .flatten()
        .filter_map(move |name| captures.name(name).map(|value| (name, value.as_str())))
}

/// Parse an access log line (combined, common or `vhost_combined`).
#[must_use]
pub fn access(line: &str) -> Option<ParsedEntry> {
    let regex = access_regex();
    let captures = regex.captures(line)?;
    let mut entry = ParsedEntry::from_fields(fields(regex, &captures));
    if entry.size.is_none() {
        entry.size = Some(0);
    }
    if entry.extra.get("user").map(String::as_str) == Some("-") {
        entry.extra.remove("user");
    }
    Some(entry)
}

/// Parse an Apache error log line.
#[must_use]
pub fn apache_error(line: &str) -> Option<ParsedEntry> {
    let regex = apache_error_regex();
    let captures = regex.captures(line)?;
    Some(ParsedEntry::from_fields(fields(regex, &captures)))
}

/// Parse an nginx error log line, lifting the trailing `client`/`server`/`request` context into
/// fields.
#[must_use]
pub fn nginx_error(line: &str) -> Option<ParsedEntry> {
    let regex = nginx_error_regex();
    let captures = regex.captures(line)?;
    let mut entry = ParsedEntry::from_fields(fields(regex, &captures));

    if let Some(message) = captures.name("message") {
        for context in nginx_context_regex().captures_iter(message.as_str()) {
            let value = context
                .name("quoted")
                .or_else(|| context.name("bare"))
                .map_or("", |value| value.as_str());
            match &context["key"] {
                "client" => entry.ip = Some(value.to_string()),
                "server" | "host" => {
                    entry.host.get_or_insert_with(|| value.to_string());
                }
                _ => entry.set_request(value),
            }
        }
    }

    Some(entry)
}

/// Parse a BSD syslog (or RFC 3339 prefixed) line. The level is inferred from the message.
#[must_use]
pub fn syslog(line: &str) -> Option<ParsedEntry> {
    let regex = syslog_regex();
    let captures = regex.captures(line)?;
    let mut entry = ParsedEntry::from_fields(fields(regex, &captures));
    entry.level = Some(severity(entry.message.as_deref().unwrap_or_default()).to_string());
    Some(entry)
}

/// A coarse severity for free text: `error`, `warning` or `info`.
#[must_use]
pub fn severity(text: &str) -> &'static str {
    match severity_regex().captures(text) {
        Some(captures) if captures.name("error").is_some() => "error",
        Some(_) => "warning",
        None => "info",
    }
}

#[cfg(test)]
mod tests {
    use crate::test::ACCESS_LINE;

    use super::{access, apache_error, nginx_error, severity, syslog};

    #[test]
    fn access_common_and_combined() {
        let entry = access(ACCESS_LINE).expect("common format parses");
        assert_eq!(entry.ip.as_deref(), Some("192.168.1.1"));
        assert_eq!(entry.method.as_deref(), Some("GET"));
        assert_eq!(entry.url.as_deref(), Some("/index.php"));
        assert_eq!(entry.protocol.as_deref(), Some("HTTP/1.1"));
        assert_eq!(entry.status, Some(200));
        assert_eq!(entry.size, Some(1234));
        assert_eq!(entry.timestamp.as_deref(), Some("01/Jan/2024:00:00:00 +0100"));
        assert!(entry.extra.is_empty());

        let line = r#"www.example.com:443 10.0.0.2 - alice [01/Jan/2024:00:00:01 +0000] "POST /login HTTP/2.0" 302 - "https://www.example.com/" "curl/8.0""#;
        let entry = access(line).expect("vhost_combined parses");
        assert_eq!(entry.host.as_deref(), Some("www.example.com"));
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(entry.size, Some(0));
        assert_eq!(entry.referer.as_deref(), Some("https://www.example.com/"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(entry.extra.get("user").map(String::as_str), Some("alice"));

        assert!(access("hello world").is_none());
    }

    #[test]
    fn apache_error_lines() {
        let line = "[Mon Jan 01 00:00:00.123456 2024] [core:error] [pid 1234:tid 5678] [client 10.0.0.3:51234] AH00126: Invalid URI in request";
        let entry = apache_error(line).expect("parses");
        assert_eq!(entry.level.as_deref(), Some("error"));
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.3"));
        assert_eq!(entry.extra.get("module").map(String::as_str), Some("core"));
        assert_eq!(entry.message.as_deref(), Some("AH00126: Invalid URI in request"));
    }

    #[test]
    fn nginx_error_lines() {
        let line = r#"2024/01/01 00:00:00 [error] 31#31: *7 open() "/srv/www/favicon.ico" failed (2: No such file or directory), client: 10.0.0.4, server: example.com, request: "GET /favicon.ico HTTP/1.1", host: "example.com""#;
        let entry = nginx_error(line).expect("parses");
        assert_eq!(entry.level.as_deref(), Some("error"));
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.4"));
        assert_eq!(entry.host.as_deref(), Some("example.com"));
        assert_eq!(entry.method.as_deref(), Some("GET"));
        assert_eq!(entry.url.as_deref(), Some("/favicon.ico"));
    }

    #[test]
    fn syslog_lines() {
        let line = "Jan  5 10:00:00 web01 sshd[812]: error: maximum authentication attempts exceeded";
        let entry = syslog(line).expect("parses");
        assert_eq!(entry.host.as_deref(), Some("web01"));
        assert_eq!(entry.extra.get("process").map(String::as_str), Some("sshd"));
        assert_eq!(entry.extra.get("pid").map(String::as_str), Some("812"));
        assert_eq!(entry.level.as_deref(), Some("error"));

        let entry = syslog("2024-01-05T10:00:00+00:00 web01 kernel: eth0 link up").expect("parses");
        assert_eq!(entry.level.as_deref(), Some("info"));
    }

    #[test]
    fn severities() {
        assert_eq!(severity("disk WARNING threshold"), "warning");
        assert_eq!(severity("[crit] out of memory"), "error");
        assert_eq!(severity("terrorist"), "info");
    }
}
