use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

// `/archives/{channel}/p{10 digit seconds}{6 digit micros}`
static PERMALINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/archives/([A-Z0-9]+)/p(\d{16})(?:[^0-9]|$)")
        .unwrap_or_else(|err| panic!("permalink pattern must compile: {err}"))
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    pub channel_id: String,
    pub thread_ts: String,
}

/// Extract channel and dotted timestamp from
/// `https://team.slack.com/archives/C12345678/p1234567890123456`.
pub fn parse_permalink(permalink: &str) -> Option<ThreadRef> {
    let caps = PERMALINK_PATTERN.captures(permalink)?;
    let channel_id = caps.get(1)?.as_str().to_string();
    let raw = caps.get(2)?.as_str();
    let (secs, micros) = raw.split_at(10);
    Some(ThreadRef {
        channel_id,
        thread_ts: format!("{secs}.{micros}"),
    })
}

/// Slack `ts` values are `seconds.micros`; anything unparseable is `None`.
pub fn ts_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let trimmed = ts.trim();
    let (secs_raw, frac_raw) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if secs_raw.is_empty() || !secs_raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac_raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let secs = secs_raw.parse::<i64>().ok()?;
    let mut frac = frac_raw.chars().take(9).collect::<String>();
    while frac.len() < 9 {
        frac.push('0');
    }
    let nanos = frac.parse::<u32>().ok()?;
    DateTime::from_timestamp(secs, nanos)
}
