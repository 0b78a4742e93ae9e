// src/analytics/aggregate.rs
//! Aggregations over one collected entry set.
//!
//! Every function here takes the entries as given: range filtering and timestamp checks happen at
//! collection time, so each entry counts exactly once everywhere.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::heuristics::{browser_family, is_static, referring_site, truncate_key};
use crate::parser::ParsedEntry;
use crate::Error;

/// The most items a top-N list can hold, whatever the caller asks for.
pub const MAX_TOP_LIMIT: usize = 50;

/// Headline numbers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    /// Number of requests.
    pub total_requests: usize,
    /// Number of distinct client addresses.
    pub unique_visitors: usize,
    /// Requests answered with 2xx.
    pub status_2xx: usize,
    /// Requests answered with 3xx.
    pub status_3xx: usize,
    /// Requests answered with 4xx.
    pub status_4xx: usize,
    /// Requests answered with 5xx.
    pub status_5xx: usize,
    /// Requests answered with 404.
    pub not_found: usize,
    /// Sum of response sizes.
    pub total_bytes: u64,
    /// Requests for static assets.
    pub static_requests: usize,
    /// The earliest timestamp seen.
    pub first_seen: Option<DateTime<Utc>>,
    /// The latest timestamp seen.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Compute the [`Overview`] of `entries`.
#[must_use]
pub fn overview(entries: &[ParsedEntry]) -> Overview {
    let mut overview = Overview {
        total_requests: entries.len(),
        ..Overview::default()
    };
    let mut visitors = HashSet::new();

    for entry in entries {
        if let Some(ip) = &entry.ip {
            visitors.insert(ip.as_str());
        }
        match entry.status {
            Some(200..=299) => overview.status_2xx += 1,
            Some(300..=399) => overview.status_3xx += 1,
            Some(400..=499) => overview.status_4xx += 1,
            Some(500..=599) => overview.status_5xx += 1,
            _ => {}
        }
        if entry.status == Some(404) {
            overview.not_found += 1;
        }
        overview.total_bytes += entry.size.unwrap_or(0);
        if entry.url.as_deref().map_or(false, is_static) {
            overview.static_requests += 1;
        }
        if let Some(time) = entry.time() {
            overview.first_seen = Some(overview.first_seen.map_or(time, |first| first.min(time)));
            overview.last_seen = Some(overview.last_seen.map_or(time, |last| last.max(time)));
        }
    }

    overview.unique_visitors = visitors.len();
    overview
}

/// The width of a timeseries bucket.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// One minute.
    Minute,
    /// One hour.
    #[default]
    Hour,
    /// One day.
    Day,
}

impl Bucket {
    /// The width in seconds.
    #[must_use]
    pub fn seconds(self) -> i64 {
        match self {
            Bucket::Minute => 60,
            Bucket::Hour => 60 * 60,
            Bucket::Day => 24 * 60 * 60,
        }
    }
}

impl FromStr for Bucket {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "minute" => Ok(Bucket::Minute),
            "hour" => Ok(Bucket::Hour),
            "day" => Ok(Bucket::Day),
            _ => Err(Error::InvalidRequest(format!("unknown bucket `{}`", value))),
        }
    }
}

/// One bucket of a timeseries.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    /// The start of the bucket.
    pub start: DateTime<Utc>,
    /// Requests in the bucket.
    pub count: usize,
    /// Distinct client addresses in the bucket.
    pub unique_visitors: usize,
}

/// Group `entries` into buckets of `bucket` width, in ascending order.
///
/// Entries without an interpretable timestamp are not counted.
#[must_use]
pub fn timeseries(entries: &[ParsedEntry], bucket: Bucket) -> Vec<TimeBucket> {
    let width = bucket.seconds();
    let mut buckets: BTreeMap<i64, (usize, HashSet<&str>)> = BTreeMap::new();

    for entry in entries {
        let time = match entry.time() {
            Some(time) => time,
            None => continue,
        };
        let key = time.timestamp().div_euclid(width);
        let (count, visitors) = buckets.entry(key).or_default();
        *count += 1;
        if let Some(ip) = &entry.ip {
            visitors.insert(ip.as_str());
        }
    }

    buckets
        .into_iter()
        .filter_map(|(key, (count, visitors))| {
            Some(TimeBucket {
                start: Utc.timestamp_opt(key * width, 0).single()?,
                count,
                unique_visitors: visitors.len(),
            })
        })
        .collect()
}

/// A dimension for top-N breakdowns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dimension {
    /// HTTP method.
    Method,
    /// HTTP status code.
    Status,
    /// Browser family of the user agent.
    Browser,
    /// Full referrer URL.
    Referrer,
    /// Host name of the referrer.
    ReferringSite,
    /// Virtual host.
    Host,
    /// Requested URL.
    Url,
    /// Client address.
    Ip,
}

impl Dimension {
    /// Every dimension.
    pub const ALL: [Dimension; 8] = [
        Dimension::Method,
        Dimension::Status,
        Dimension::Browser,
        Dimension::Referrer,
        Dimension::ReferringSite,
        Dimension::Host,
        Dimension::Url,
        Dimension::Ip,
    ];

    /// Whether items of this dimension report distinct visitors.
    #[must_use]
    pub fn tracks_visitors(self) -> bool {
        matches!(
            self,
            Dimension::Url | Dimension::Referrer | Dimension::ReferringSite | Dimension::Host
        )
    }

    /// The grouping key of `entry`, if it has one.
    #[must_use]
    pub fn key(self, entry: &ParsedEntry) -> Option<String> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .filter(|value| !value.is_empty() && *value != "-")
                .map(str::to_string)
        };
        match self {
            Dimension::Method => present(&entry.method),
            Dimension::Status => entry.status.map(|status| status.to_string()),
            Dimension::Browser => Some(browser_family(entry.user_agent.as_deref()).to_string()),
            Dimension::Referrer => present(&entry.referer).map(|referer| truncate_key(&referer)),
            Dimension::ReferringSite => Some(referring_site(entry.referer.as_deref())),
            Dimension::Host => present(&entry.host),
            Dimension::Url => present(&entry.url).map(|url| truncate_key(&url)),
            Dimension::Ip => present(&entry.ip),
        }
    }
}

/// One item of a top-N list.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopItem {
    /// The grouping key.
    pub key: String,
    /// Entries with this key.
    pub count: usize,
    /// `count` as a percentage of all entries, to two decimals.
    pub percent: f64,
    /// Distinct client addresses with this key, for dimensions that track them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_visitors: Option<usize>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The `min(limit, MAX_TOP_LIMIT)` most frequent keys of `dimension`, most frequent first.
///
/// Ties are broken by key so the output is stable.
#[must_use]
pub fn top(entries: &[ParsedEntry], dimension: Dimension, limit: usize) -> Vec<TopItem> {
    let mut groups: HashMap<String, (usize, HashSet<&str>)> = HashMap::new();
    for entry in entries {
        if let Some(key) = dimension.key(entry) {
            let (count, visitors) = groups.entry(key).or_default();
            *count += 1;
            if let Some(ip) = &entry.ip {
                visitors.insert(ip.as_str());
            }
        }
    }

    let total = entries.len();
    let mut items: Vec<_> = groups
        .into_iter()
        .map(|(key, (count, visitors))| {
            #[allow(clippy::cast_precision_loss)]
            let percent = round2(count as f64 * 100.0 / total as f64);
            TopItem {
                key,
                count,
                percent,
                unique_visitors: dimension.tracks_visitors().then(|| visitors.len()),
            }
        })
        .collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    items.truncate(limit.min(MAX_TOP_LIMIT));
    items
}

#[cfg(test)]
mod tests {
    use crate::parser::ParsedEntry;

    use super::{overview, timeseries, top, Bucket, Dimension, MAX_TOP_LIMIT};

    fn entry(ip: &str, timestamp: &str, url: &str, status: u16) -> ParsedEntry {
        ParsedEntry {
            ip: Some(ip.to_string()),
            timestamp: Some(timestamp.to_string()),
            url: Some(url.to_string()),
            method: Some("GET".to_string()),
            status: Some(status),
            size: Some(100),
            is_parsed: true,
            ..ParsedEntry::default()
        }
    }

    fn sample() -> Vec<ParsedEntry> {
        vec![
            entry("10.0.0.1", "01/Jan/2024:10:00:00 +0000", "/", 200),
            entry("10.0.0.1", "01/Jan/2024:10:30:00 +0000", "/app.css", 200),
            entry("10.0.0.2", "01/Jan/2024:10:59:59 +0000", "/missing", 404),
            entry("10.0.0.3", "01/Jan/2024:11:00:00 +0000", "/", 500),
            entry("10.0.0.3", "01/Jan/2024:13:15:00 +0000", "/old", 301),
        ]
    }

    #[test]
    fn overview_counts() {
        let overview = overview(&sample());
        assert_eq!(overview.total_requests, 5);
        assert_eq!(overview.unique_visitors, 3);
        assert_eq!(overview.status_2xx, 2);
        assert_eq!(overview.status_3xx, 1);
        assert_eq!(overview.status_4xx, 1);
        assert_eq!(overview.status_5xx, 1);
        assert_eq!(overview.not_found, 1);
        assert_eq!(overview.total_bytes, 500);
        assert_eq!(overview.static_requests, 1);
        assert!(overview.first_seen < overview.last_seen);
    }

    #[test]
    fn timeseries_buckets_sum_to_total() {
        let entries = sample();
        let hours = timeseries(&entries, Bucket::Hour);
        let counts: Vec<_> = hours.iter().map(|bucket| bucket.count).collect();
        assert_eq!(counts, vec![3, 1, 1]);
        assert_eq!(hours[0].unique_visitors, 2);
        assert!(hours.windows(2).all(|pair| pair[0].start < pair[1].start));

        for bucket in [Bucket::Minute, Bucket::Hour, Bucket::Day] {
            let sum: usize = timeseries(&entries, bucket).iter().map(|b| b.count).sum();
            assert_eq!(sum, entries.len());
        }
    }

    #[test]
    fn top_lists_are_sorted_and_bounded() {
        let entries: Vec<_> = (0..120)
            .map(|i| {
                entry(
                    &format!("10.0.{}.{}", i % 60, i),
                    "01/Jan/2024:10:00:00 +0000",
                    &format!("/page/{}", i % 60),
                    200,
                )
            })
            .collect();

        let urls = top(&entries, Dimension::Url, 500);
        assert_eq!(urls.len(), MAX_TOP_LIMIT);
        assert!(urls.windows(2).all(|pair| pair[0].count >= pair[1].count));
        assert_eq!(urls[0].unique_visitors, Some(2));

        let statuses = top(&sample(), Dimension::Status, 2);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].key, "200");
        assert_eq!(statuses[0].count, 2);
        assert!((statuses[0].percent - 40.0).abs() < f64::EPSILON);
        assert_eq!(statuses[0].unique_visitors, None);

        let sites = top(&sample(), Dimension::ReferringSite, 10);
        assert_eq!(sites[0].key, "Direct");
        assert_eq!(sites[0].count, 5);
    }
}
