// src/summary/classify.rs
//! Coarse line classification for error-density counts.
//!
//! No structural parsing happens here. A severity keyword (bracketed or bare) wins; failing that,
//! an HTTP status token decides.

use std::sync::OnceLock;

use regex::Regex;

/// What a line counts towards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Class {
    /// An `error`/`err`/`crit`/`alert`/`emerg` tag.
    ErrorTag,
    /// A `warn`/`warning` tag.
    WarnTag,
    /// A 5xx status.
    Status5xx,
    /// A 4xx status.
    Status4xx,
    /// A 3xx status.
    Status3xx,
}

fn severity_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(?P<error>err(?:or)?|crit(?:ical)?|alert|emerg(?:ency)?)|(?P<warn>warn(?:ing)?))\b",
        )
        .unwrap()
    })
}

/// A status code just after a quoted request, or written as `status=NNN`/`status: NNN`.
fn status_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(?:"\s+|\bstatus[=:]\s*)(?P<status>[1-5]\d{2})\b"#).unwrap()
    })
}

/// Classify one line, or `None` if it counts towards nothing.
#[must_use]
pub fn classify(line: &str) -> Option<Class> {
    if let Some(captures) = severity_regex().captures(line) {
        return Some(if captures.name("error").is_some() {
            Class::ErrorTag
        } else {
            Class::WarnTag
        });
    }

    let status = status_regex().captures(line)?.name("status")?.as_str();
    match status.as_bytes()[0] {
        b'5' => Some(Class::Status5xx),
        b'4' => Some(Class::Status4xx),
        b'3' => Some(Class::Status3xx),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::test::access_line;

    use super::{classify, Class};

    #[test]
    fn severity_tags() {
        assert_eq!(
            classify("[Mon Jan 01 00:00:00 2024] [core:error] [pid 1] boom"),
            Some(Class::ErrorTag)
        );
        assert_eq!(
            classify("2024/01/01 00:00:00 [crit] 12#12: *1 upstream gone"),
            Some(Class::ErrorTag)
        );
        assert_eq!(
            classify("Jan  1 00:00:00 host kernel: EMERGENCY shutdown"),
            Some(Class::ErrorTag)
        );
        assert_eq!(
            classify("2024/01/01 00:00:00 [warn] 12#12: low disk"),
            Some(Class::WarnTag)
        );
        assert_eq!(classify("terror and errands"), None);
    }

    #[test]
    fn status_bands() {
        let line = |status| {
            access_line("10.0.0.1", "01/Jan/2024:00:00:00 +0000", "GET", "/", status, 404)
        };
        assert_eq!(classify(&line(503)), Some(Class::Status5xx));
        assert_eq!(classify(&line(404)), Some(Class::Status4xx));
        assert_eq!(classify(&line(301)), Some(Class::Status3xx));
        assert_eq!(classify(&line(200)), None);
        assert_eq!(classify("request done status=502"), Some(Class::Status5xx));
    }

    #[test]
    fn severity_takes_precedence() {
        let line = access_line("10.0.0.1", "01/Jan/2024:00:00:00 +0000", "GET", "/error", 301, 1);
        assert_eq!(classify(&line), Some(Class::ErrorTag));
    }
}
