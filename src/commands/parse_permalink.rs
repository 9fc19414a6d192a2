use anyhow::Result;

use crate::commands::CommandReport;
use crate::error::ReportError;
use crate::report::permalink::{parse_permalink, ts_to_datetime};

pub fn run(permalink: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("parse-permalink");

    let Some(thread) = parse_permalink(permalink) else {
        report.issue(ReportError::InvalidPermalink(permalink.to_string()).to_string());
        return Ok(report);
    };

    report.detail(format!("channel_id={}", thread.channel_id));
    report.detail(format!("thread_ts={}", thread.thread_ts));
    if let Some(at) = ts_to_datetime(&thread.thread_ts) {
        report.detail(format!("posted_at={}", at.format("%Y-%m-%dT%H:%M:%SZ")));
    }
    Ok(report)
}
