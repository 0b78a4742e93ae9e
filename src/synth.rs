// src/synth.rs
//! Guessing a named-capture regex from one sample line.
//!
//! The line is split into tokens, treating `"…"` and `[…]` as single tokens. Each token is
//! classified by its shape and becomes a named group; the groups are joined with `\s+` and anchored
//! at both ends. The regex is then run against the sample so the caller can check what it captures
//! before saving it as a custom parser.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

const HTTP_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE",
];

const USER_AGENT_MARKERS: &[&str] = &[
    "mozilla",
    "chrome",
    "safari",
    "firefox",
    "opera",
    "edge",
    "curl",
    "wget",
    "bot",
    "spider",
    "crawler",
    "python-requests",
    "okhttp",
    "go-http-client",
];

/// The output of [`synthesize`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedRegex {
    /// The generated pattern.
    pub regex: String,
    /// The named groups, in the order they appear.
    pub group_names: Vec<String>,
    /// What each group captured from the sample line.
    pub test_captures: BTreeMap<String, String>,
    /// Whether the pattern matched the sample line at all.
    pub matched: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
    Bare,
    Quoted,
    Bracketed,
}

#[derive(Debug)]
struct Token<'a> {
    shape: Shape,
    /// The token without its quotes or brackets.
    text: &'a str,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Class {
    Timestamp,
    Request,
    UserAgent,
    Referer,
    Quoted,
    Ip,
    Method,
    Status,
    Size,
    Number,
    Url,
    Placeholder,
    Literal,
    Field,
}

impl Class {
    fn group_name(self) -> Option<&'static str> {
        Some(match self {
            Class::Timestamp => "timestamp",
            Class::Request => "request",
            Class::UserAgent => "user_agent",
            Class::Referer => "referer",
            Class::Quoted => "quoted",
            Class::Ip => "ip",
            Class::Method => "method",
            Class::Status => "status",
            Class::Size => "size",
            Class::Number => "number",
            Class::Url => "url",
            Class::Field => "field",
            Class::Placeholder | Class::Literal => return None,
        })
    }

    fn capture(self) -> &'static str {
        match self {
            Class::Timestamp => r"[^\]]*",
            Class::Request | Class::UserAgent | Class::Referer | Class::Quoted => r#"(?:[^"\\]|\\.)*"#,
            Class::Method => "[A-Z]+",
            Class::Status => r"\d{3}",
            Class::Size | Class::Number => r"\d+",
            Class::Ip | Class::Url | Class::Placeholder | Class::Literal | Class::Field => r"\S+",
        }
    }
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let (token, consumed) = match rest.as_bytes()[0] {
            b'"' => match closing_quote(&rest[1..]) {
                Some(end) => (
                    Token {
                        shape: Shape::Quoted,
                        text: &rest[1..=end],
                    },
                    end + 2,
                ),
                None => bare(rest),
            },
            b'[' => match rest.find(']') {
                Some(end) => (
                    Token {
                        shape: Shape::Bracketed,
                        text: &rest[1..end],
                    },
                    end + 1,
                ),
                None => bare(rest),
            },
            _ => bare(rest),
        };
        tokens.push(token);
        rest = rest[consumed..].trim_start();
    }
    tokens
}

/// The index of the closing quote in `text` (which starts after the opening quote).
fn closing_quote(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(index),
            _ => escaped = false,
        }
    }
    None
}

fn bare(rest: &str) -> (Token<'_>, usize) {
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    (
        Token {
            shape: Shape::Bare,
            text: &rest[..end],
        },
        end,
    )
}

fn is_method(text: &str) -> bool {
    HTTP_METHODS.contains(&text)
}

fn classify(token: &Token<'_>, previous: Option<Class>) -> Class {
    let text = token.text;
    match token.shape {
        Shape::Bracketed => Class::Timestamp,
        Shape::Quoted => {
            let lower = text.to_lowercase();
            if text.split(' ').next().map_or(false, is_method) && text.contains(' ') {
                Class::Request
            } else if lower.starts_with("http") {
                Class::Referer
            } else if USER_AGENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
                Class::UserAgent
            } else {
                Class::Quoted
            }
        }
        Shape::Bare => {
            let all_digits = text.bytes().all(|b| b.is_ascii_digit());
            if text == "-" {
                Class::Placeholder
            } else if text.parse::<IpAddr>().is_ok() {
                Class::Ip
            } else if is_method(text) {
                Class::Method
            } else if all_digits && previous == Some(Class::Status) {
                Class::Size
            } else if all_digits
                && text.len() == 3
                && (100..=599).contains(&text.parse::<u16>().unwrap_or(0))
            {
                Class::Status
            } else if all_digits {
                Class::Number
            } else if text.starts_with('/') || text.starts_with("http") {
                Class::Url
            } else if !text.chars().any(char::is_alphanumeric) {
                Class::Literal
            } else {
                Class::Field
            }
        }
    }
}

/// Generate a regex for lines shaped like `sample`.
///
/// # Errors
///
/// [`Error::InvalidRequest`] if `sample` is blank.
pub fn synthesize(sample: &str) -> Result<SynthesizedRegex> {
    let tokens = tokenize(sample.trim_end_matches(&['\r', '\n'][..]));
    if tokens.is_empty() {
        return Err(Error::InvalidRequest("sample line is empty".to_string()));
    }

    let mut seen: HashMap<&'static str, usize> = HashMap::new();
    let mut group_names = Vec::new();
    let mut parts = Vec::with_capacity(tokens.len());
    let mut previous = None;

    for token in &tokens {
        let class = classify(token, previous);
        previous = Some(class);

        let body = match class.group_name() {
            Some(base) => {
                let count = seen.entry(base).or_insert(0);
                *count += 1;
                let name = if *count == 1 {
                    base.to_string()
                } else {
                    format!("{}{}", base, count)
                };
                let group = format!("(?P<{}>{})", name, class.capture());
                group_names.push(name);
                group
            }
            None if class == Class::Literal => regex::escape(token.text),
            None => class.capture().to_string(),
        };
        parts.push(match token.shape {
            Shape::Bare => body,
            Shape::Quoted => format!("\"{}\"", body),
            Shape::Bracketed => format!(r"\[{}\]", body),
        });
    }

    let pattern = format!(r"^{}$", parts.join(r"\s+"));
    let regex = Regex::new(&pattern).map_err(|error| Error::InvalidPattern {
        pattern: pattern.clone(),
        reason: error.to_string(),
    })?;

    let mut test_captures = BTreeMap::new();
    let captures = regex.captures(sample.trim());
    if let Some(captures) = &captures {
        for name in &group_names {
            if let Some(value) = captures.name(name) {
                test_captures.insert(name.clone(), value.as_str().to_string());
            }
        }
    }

    Ok(SynthesizedRegex {
        regex: pattern,
        group_names,
        test_captures,
        matched: captures.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use crate::parser::custom;
    use crate::test::ACCESS_LINE;
    use crate::Error;

    use super::synthesize;

    #[test]
    fn common_log_format() {
        let result = synthesize(ACCESS_LINE).expect("synthesizes");
        assert!(result.matched);
        assert_eq!(
            result.group_names,
            vec!["ip", "timestamp", "request", "status", "size"]
        );

        let captured = |name: &str| result.test_captures.get(name).map(String::as_str);
        assert_eq!(captured("ip"), Some("192.168.1.1"));
        assert_eq!(captured("timestamp"), Some("01/Jan/2024:00:00:00 +0100"));
        assert_eq!(captured("request"), Some("GET /index.php HTTP/1.1"));
        assert_eq!(captured("status"), Some("200"));
        assert_eq!(captured("size"), Some("1234"));

        // The output is directly usable as a custom parser.
        let regex = custom::compile(&result.regex).expect("valid custom regex");
        let entry = custom::parse(&regex, ACCESS_LINE).expect("matches");
        assert_eq!(entry.method.as_deref(), Some("GET"));
        assert_eq!(entry.url.as_deref(), Some("/index.php"));
    }

    #[test]
    fn combined_log_format() {
        let line = r#"10.0.0.1 - - [01/Jan/2024:00:00:00 +0000] "POST /api HTTP/1.1" 404 0 "https://example.com/" "Mozilla/5.0 (Windows NT 10.0)""#;
        let result = synthesize(line).expect("synthesizes");
        assert!(result.matched);
        assert_eq!(
            result.test_captures.get("referer").map(String::as_str),
            Some("https://example.com/")
        );
        assert_eq!(
            result.test_captures.get("user_agent").map(String::as_str),
            Some("Mozilla/5.0 (Windows NT 10.0)")
        );
        assert_eq!(result.test_captures.get("size").map(String::as_str), Some("0"));
    }

    #[test]
    fn duplicate_names_are_numbered() {
        let result = synthesize(r#"alpha beta 12 34 "x" "y" | /a"#).expect("synthesizes");
        assert!(result.matched);
        assert_eq!(
            result.group_names,
            vec!["field", "field2", "number", "number2", "quoted", "quoted2", "url"]
        );
        assert!(result.regex.contains(r"\|"));
    }

    #[test]
    fn methods_and_ipv6() {
        let result = synthesize("::1 GET /health 204").expect("synthesizes");
        assert_eq!(result.group_names, vec!["ip", "method", "url", "status"]);
        assert!(result.matched);
    }

    #[test]
    fn blank_sample() {
        assert!(matches!(synthesize("  \n"), Err(Error::InvalidRequest(_))));
    }
}
