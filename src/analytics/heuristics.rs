// src/analytics/heuristics.rs
//! Cheap classifications of access-log fields.
use url::Url;

/// Longest url/referrer grouping key, in characters, before truncation.
pub const MAX_KEY_CHARS: usize = 100;

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "bmp",
    "woff", "woff2", "ttf", "otf", "eot", "mp4", "webm", "mp3", "ogg", "pdf",
];

/// The browser family of a user agent.
///
/// Checks run in order on the lower-cased string, so Edge and Opera (which also claim to be
/// Chrome) are recognised before Chrome, and Chrome (which also claims to be Safari) before Safari.
#[must_use]
pub fn browser_family(user_agent: Option<&str>) -> &'static str {
    let agent = match user_agent.map(str::trim) {
        None | Some("" | "-") => return "Direct/Unknown",
        Some(agent) => agent.to_lowercase(),
    };
    let has = |needle: &str| agent.contains(needle);

    if has("edg/") || has("edge/") {
        "Edge"
    } else if has("opera") || has("opr/") {
        "Opera"
    } else if has("chrome") && !has("chromium") {
        "Chrome"
    } else if has("firefox") {
        "Firefox"
    } else if has("safari") && !has("chrome") {
        "Safari"
    } else if has("curl") {
        "curl"
    } else if has("wget") {
        "Wget"
    } else if has("bot") || has("crawler") || has("spider") {
        "Bot"
    } else {
        "Other"
    }
}

/// The host name of a referrer, or `Direct` if there is none (or it isn't a URL).
#[must_use]
pub fn referring_site(referer: Option<&str>) -> String {
    referer
        .filter(|referer| !referer.is_empty() && *referer != "-")
        .and_then(|referer| Url::parse(referer).ok())
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "Direct".to_string())
}

/// Whether a request path looks like a static asset, by extension.
#[must_use]
pub fn is_static(url: &str) -> bool {
    let path = url.split(&['?', '#'][..]).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => STATIC_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(extension)),
        _ => false,
    }
}

/// Truncate a grouping key to [`MAX_KEY_CHARS`] characters, marking the cut with `…`.
#[must_use]
pub fn truncate_key(value: &str) -> String {
    match value.char_indices().nth(MAX_KEY_CHARS) {
        Some((cut, _)) => format!("{}…", &value[..cut]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{browser_family, is_static, referring_site, truncate_key, MAX_KEY_CHARS};

    #[test]
    fn browsers() {
        let cases = [
            (None, "Direct/Unknown"),
            (Some("-"), "Direct/Unknown"),
            (
                Some("Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0"),
                "Edge",
            ),
            (Some("Mozilla/5.0 AppleWebKit/537.36 Chrome/120.0 Safari/537.36 OPR/105.0"), "Opera"),
            (Some("Mozilla/5.0 AppleWebKit/537.36 Chrome/120.0 Safari/537.36"), "Chrome"),
            (
                Some("Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0"),
                "Firefox",
            ),
            (
                Some("Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 Version/17.0 Safari/605.1.15"),
                "Safari",
            ),
            (Some("curl/8.4.0"), "curl"),
            (Some("Wget/1.21"), "Wget"),
            (Some("Mozilla/5.0 (compatible; Googlebot/2.1)"), "Bot"),
            (Some("Lynx/2.9"), "Other"),
        ];
        for (agent, family) in cases {
            assert_eq!(browser_family(agent), family, "{:?}", agent);
        }
    }

    #[test]
    fn referring_sites() {
        assert_eq!(referring_site(Some("https://www.google.com/search?q=x")), "www.google.com");
        assert_eq!(referring_site(Some("-")), "Direct");
        assert_eq!(referring_site(Some("not a url")), "Direct");
        assert_eq!(referring_site(None), "Direct");
    }

    #[test]
    fn static_assets() {
        assert!(is_static("/assets/app.min.JS?v=3"));
        assert!(is_static("/favicon.ico"));
        assert!(!is_static("/index.php"));
        assert!(!is_static("/api/users"));
        assert!(!is_static("/.css"));
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_key("/short"), "/short");
        let long = "é".repeat(MAX_KEY_CHARS + 5);
        let truncated = truncate_key(&long);
        assert_eq!(truncated.chars().count(), MAX_KEY_CHARS + 1);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_key(&"x".repeat(MAX_KEY_CHARS)).len(), MAX_KEY_CHARS);
    }
}
