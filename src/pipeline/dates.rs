// src/pipeline/dates.rs
//! Share-date extraction. Ordered strategies, each a pure function from raw
//! text to an optional UTC timestamp; the first hit wins and no strategy
//! fabricates a date.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// One extraction strategy: raw text in, optional timestamp out.
pub type DateStrategy = fn(&str) -> Option<DateTime<Utc>>;

/// Strategy order is part of the contract: structured sources (meta tags,
/// `<time>` elements) beat free-text patterns, which beat numeric timestamps
/// and relative phrases.
pub const STRATEGIES: &[DateStrategy] = &[
    from_meta_tags,
    from_time_tags,
    from_common_patterns,
    from_iso8601,
    from_unix_timestamp,
    from_relative_phrases,
];

static META_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)<meta\s+property=["']article:published_time["']\s+content=["']([^"']+)["']"#,
        r#"(?i)<meta\s+property=["']og:published_time["']\s+content=["']([^"']+)["']"#,
        r#"(?i)<meta\s+name=["']date["']\s+content=["']([^"']+)["']"#,
        r#"(?i)<meta\s+name=["']publishdate["']\s+content=["']([^"']+)["']"#,
        r#"(?i)<meta\s+name=["']pubdate["']\s+content=["']([^"']+)["']"#,
        r#"(?i)<meta\s+itemprop=["']datePublished["']\s+content=["']([^"']+)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("meta date regex"))
    .collect()
});

static TIME_TAG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"<time\s+datetime=["']([^"']+)["']"#,
        r#"<time\s+pubdate\s+datetime=["']([^"']+)["']"#,
        r"<time[^>]*>([^<]+)</time>",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("time tag regex"))
    .collect()
});

static COMMON_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|\
                          November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Oct|Nov|Dec";
    [
        r"\b(\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2})".to_string(),
        r"\b(\d{4}-\d{2}-\d{2})\b".to_string(),
        format!(r"\b((?:{MONTHS})\s+\d{{1,2}},?\s+\d{{4}})"),
        format!(r"\b(\d{{1,2}}\s+(?:{MONTHS})\s+\d{{4}})"),
        r"\b(\d{1,2}/\d{1,2}/\d{4})\b".to_string(),
        r"(?i)(?:published|posted|released|updated)[:\s]+([A-Za-z]+\s+\d{1,2},?\s+\d{4})"
            .to_string(),
        r"(?i)(?:published|posted|released|updated)[:\s]+(\d{1,2}\s+[A-Za-z]+\s+\d{4})".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("common date regex"))
    .collect()
});

static ISO_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:Z|[+-]\d{2}:\d{2})?)",
        r"\b(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})",
        r"\b(\d{4}-\d{2}-\d{2})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("iso date regex"))
    .collect()
});

static UNIX_TS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[0-9]{9,12})\b").expect("unix ts regex"));

static RELATIVE_PATTERNS: Lazy<Vec<(Regex, RelativeUnit)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)\b(\d+)\s+hours?\s+ago\b").expect("hours regex"),
            RelativeUnit::Hours,
        ),
        (
            Regex::new(r"(?i)\b(\d+)\s+days?\s+ago\b").expect("days regex"),
            RelativeUnit::Days,
        ),
        (
            Regex::new(r"(?i)\b(\d+)\s+weeks?\s+ago\b").expect("weeks regex"),
            RelativeUnit::Weeks,
        ),
        (
            Regex::new(r"(?i)\b(\d+)\s+months?\s+ago\b").expect("months regex"),
            RelativeUnit::Months,
        ),
    ]
});

#[derive(Clone, Copy)]
enum RelativeUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

/// Tries each strategy in order until one yields a timestamp. All misses
/// mean "unknown", never "now" or an epoch zero.
pub fn parse_share_date(raw: &str) -> Option<DateTime<Utc>> {
    for strategy in STRATEGIES {
        if let Some(date) = strategy(raw) {
            debug!(share_date = %date.to_rfc3339(), "extracted share date");
            return Some(date);
        }
    }
    debug!("no share date found in content");
    None
}

fn from_meta_tags(raw: &str) -> Option<DateTime<Utc>> {
    first_normalized(&META_PATTERNS, raw)
}

fn from_time_tags(raw: &str) -> Option<DateTime<Utc>> {
    first_normalized(&TIME_TAG_PATTERNS, raw)
}

fn from_common_patterns(raw: &str) -> Option<DateTime<Utc>> {
    first_normalized(&COMMON_PATTERNS, raw)
}

fn from_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    first_normalized(&ISO_PATTERNS, raw)
}

fn first_normalized(patterns: &[Regex], raw: &str) -> Option<DateTime<Utc>> {
    patterns
        .iter()
        .filter_map(|re| re.captures(raw))
        .filter_map(|caps| normalize_date(&caps[1]))
        .next()
}

/// 10-digit (seconds) or 13-digit (milliseconds) epoch values, sanity-windowed
/// to the years 2000-2100.
fn from_unix_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let caps = UNIX_TS.captures(raw)?;
    let mut ts: i64 = caps[1].parse().ok()?;
    if ts > 1_000_000_000_000 {
        ts /= 1000;
    }
    if !(946_684_800..4_102_444_800).contains(&ts) {
        return None;
    }
    Utc.timestamp_opt(ts, 0).single()
}

/// "N hours/days/weeks/months ago", converted against the current time.
/// Months are approximated as 30 days.
fn from_relative_phrases(raw: &str) -> Option<DateTime<Utc>> {
    let now = Utc::now();
    for (re, unit) in RELATIVE_PATTERNS.iter() {
        if let Some(caps) = re.captures(raw) {
            let value: i64 = match caps[1].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let delta = match unit {
                RelativeUnit::Hours => Duration::hours(value),
                RelativeUnit::Days => Duration::days(value),
                RelativeUnit::Weeks => Duration::weeks(value),
                RelativeUnit::Months => Duration::days(value * 30),
            };
            return Some(now - delta);
        }
    }
    None
}

/// Date-time layouts tried against the bare string, in order.
const DATETIME_LAYOUTS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y, %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%d %b %Y %H:%M",
];

/// Date-only layouts; midnight UTC is assumed.
const DATE_LAYOUTS: [&str; 7] = [
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
];

/// Normalizes a raw date string against the known layouts (RFC3339 variants
/// first, then the literal layouts, then RFC2822 with a named timezone).
/// Only parses whose year lands in [2000, 2100] are accepted.
pub fn normalize_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return in_window(dt.with_timezone(&Utc));
    }

    for layout in DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return in_window(Utc.from_utc_datetime(&naive));
        }
    }

    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, layout) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return in_window(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return in_window(dt.with_timezone(&Utc));
    }

    None
}

fn in_window(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    use chrono::Datelike;
    (2000..=2100).contains(&dt.year()).then_some(dt)
}
