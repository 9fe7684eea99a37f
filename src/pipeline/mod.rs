// src/pipeline/mod.rs
//! Pure content transforms: raw fetched text in, at most one classified
//! candidate out. No I/O anywhere in this module tree.

pub mod category;
pub mod dates;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Raw bodies at or below this length never produce a candidate.
const MIN_CONTENT_BYTES: usize = 100;
/// Cleaned content is capped at this many characters (plus the ellipsis).
const MAX_CONTENT_CHARS: usize = 5000;
const TITLE_FALLBACK: &str = "Content from Source";

static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>([^<]+)</title>").expect("title regex"));
static RE_H1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>([^<]+)</h1>").expect("h1 regex"));
static RE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex"));
static RE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex"));
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Transient record produced per fetch; not yet persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScrapedCandidate {
    pub title: String,
    pub cleaned_content: String,
    pub share_date: Option<DateTime<Utc>>,
    pub criticality_score: u8,
    pub category: String,
}

/// Runs the whole pipeline once over a fetched body. Returns `None` for
/// bodies too short to be worth a record.
pub fn process_content(raw: &str) -> Option<ScrapedCandidate> {
    if raw.len() <= MIN_CONTENT_BYTES {
        return None;
    }

    let title = extract_title(raw);
    let cleaned_content = clean_content(raw);
    let category = category::detect_category(&cleaned_content, &title);
    let criticality_score = category::calculate_criticality(&cleaned_content, &title, &category);
    let share_date = dates::parse_share_date(raw);

    Some(ScrapedCandidate {
        title,
        cleaned_content,
        share_date,
        criticality_score,
        category,
    })
}

/// Title preference order: `<title>` text, then `<h1>` text (both trimmed,
/// 1..=200 chars), then a truncated slice of the cleaned body.
pub fn extract_title(raw: &str) -> String {
    for re in [&*RE_TITLE, &*RE_H1] {
        if let Some(caps) = re.captures(raw) {
            let title = caps[1].trim();
            if !title.is_empty() && title.chars().count() <= 200 {
                return title.to_string();
            }
        }
    }

    let cleaned = clean_content(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return TITLE_FALLBACK.to_string();
    }
    if cleaned.chars().count() > 100 {
        return truncate_at_whitespace(cleaned, 100, 50);
    }
    cleaned.to_string()
}

/// Strips script/style/comments and all remaining tags, decodes HTML
/// entities, collapses whitespace, drops non-printable characters, and caps
/// the length at 5000 characters.
pub fn clean_content(raw: &str) -> String {
    let mut cleaned = RE_SCRIPT.replace_all(raw, " ").into_owned();
    cleaned = RE_STYLE.replace_all(&cleaned, " ").into_owned();
    cleaned = RE_COMMENT.replace_all(&cleaned, " ").into_owned();
    cleaned = RE_TAG.replace_all(&cleaned, " ").into_owned();

    cleaned = html_escape::decode_html_entities(&cleaned).into_owned();

    cleaned = RE_WS.replace_all(&cleaned, " ").into_owned();

    // Keep printable characters only; newline and tab survive the filter but
    // were already collapsed above.
    cleaned = cleaned
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();

    cleaned = RE_WS.replace_all(&cleaned, " ").into_owned();
    let cleaned = cleaned.trim();

    if cleaned.chars().count() > MAX_CONTENT_CHARS {
        return truncate_at_whitespace(cleaned, MAX_CONTENT_CHARS, MAX_CONTENT_CHARS - 500);
    }
    cleaned.to_string()
}

/// Truncates to at most `max_chars` characters, backing up to the last
/// whitespace boundary when one exists past `min_cut`, and appends an
/// ellipsis marker.
fn truncate_at_whitespace(s: &str, max_chars: usize, min_cut: usize) -> String {
    let mut truncated: String = s.chars().take(max_chars).collect();
    if let Some(pos) = truncated.rfind(' ') {
        let chars_before = truncated[..pos].chars().count();
        if chars_before > min_cut {
            truncated.truncate(pos);
        }
    }
    truncated.push_str("...");
    truncated
}
