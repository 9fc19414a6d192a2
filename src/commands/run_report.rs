use anyhow::{Context, Result};
use chrono::Utc;

use crate::commands::CommandReport;
use crate::report::cache::open_store;
use crate::report::config::load_settings;
use crate::report::llm::{RemoteModel, resolve_model_config};
use crate::report::pipeline::{self, Collaborators, PipelineConfig, RunOptions};
use crate::report::slack_api::HttpSlackApi;

#[derive(Debug, Clone, Default)]
pub struct RunReportOptions {
    /// Overrides `DRY_RUN` when set.
    pub dry_run: Option<bool>,
    pub permalink: Option<String>,
}

pub fn run(opts: &RunReportOptions) -> Result<CommandReport> {
    let settings = load_settings()?;
    let config = PipelineConfig::from_settings(&settings)?;
    let dry_run = opts.dry_run.unwrap_or(settings.output.dry_run);
    let mut report = CommandReport::new("run");

    let model = RemoteModel::new(resolve_model_config(&settings.llm)?)?;
    let bot = HttpSlackApi::new(&settings.slack.api_base_url, &settings.slack.bot_token)?;
    let user = HttpSlackApi::new(&settings.slack.api_base_url, &settings.slack.user_token)?;
    let store = open_store(&settings.cache.redis_url)
        .with_context(|| format!("failed to open cache at {}", settings.cache.redis_url))?;

    let permalink = opts
        .permalink
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToOwned::to_owned);
    let mode = if permalink.is_some() { "permalink" } else { "window" };

    let outcome = pipeline::run(
        Collaborators {
            bot,
            user,
            store,
            model,
        },
        &config,
        &RunOptions {
            dry_run,
            permalink,
            now: Utc::now(),
        },
    )?;

    report.detail(format!("mode={mode}"));
    report.detail(format!("policy={}", config.policy.label()));
    report.detail(format!("dry_run={dry_run}"));
    report.detail(format!("threads_discovered={}", outcome.discovered));
    report.detail(format!("summaries_generated={}", outcome.summarized));
    report.detail(format!("summary_cache_hits={}", outcome.cache_hits));
    report.detail(format!(
        "placeholders_skipped={}",
        outcome.placeholders_skipped
    ));
    report.detail(format!("messages_posted={}", outcome.messages_posted));
    if let Some(anchor) = &outcome.anchor_ts {
        report.detail(format!("weekly_anchor_ts={anchor}"));
    }
    for (idx, payload) in outcome.dry_run_payloads.iter().enumerate() {
        report.detail(format!(
            "dry_run_payload[{idx}]={}",
            serde_json::to_string(payload)?
        ));
    }

    Ok(report)
}
