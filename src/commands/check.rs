use anyhow::Result;

use crate::commands::CommandReport;
use crate::report::config::{
    config_path_label, load_unvalidated_settings, redact, redact_url, validate,
};
use crate::report::llm::resolve_model_config;

pub fn run() -> Result<CommandReport> {
    let cfg = load_unvalidated_settings()?;
    let mut report = CommandReport::new("check");

    report.detail(format!("config_file={}", config_path_label()));
    report.detail(format!("slack.api_base_url={}", cfg.slack.api_base_url));
    report.detail(format!("slack.channel_id={}", cfg.slack.channel_id));
    report.detail(format!("slack.bot_token={}", redact(&cfg.slack.bot_token)));
    report.detail(format!("slack.user_token={}", redact(&cfg.slack.user_token)));
    report.detail(format!("search.query={}", cfg.search.query));
    report.detail(format!("search.limit={}", cfg.search.limit));
    report.detail(format!("search.lookback_days={}", cfg.search.lookback_days));
    report.detail(format!("search.max_threads={}", cfg.search.max_threads));
    report.detail(format!("cache.redis_url={}", redact_url(&cfg.cache.redis_url)));
    report.detail(format!("cache.user_ttl_secs={}", cfg.cache.user_ttl_secs));
    report.detail(format!("cache.thread_ttl_secs={}", cfg.cache.thread_ttl_secs));
    report.detail(format!("llm.api_key={}", redact(&cfg.llm.api_key)));
    match resolve_model_config(&cfg.llm) {
        Ok(model) => {
            report.detail(format!("llm.provider={}", model.provider.label()));
            report.detail(format!("llm.model={}", model.model));
            report.detail(format!("llm.base_url={}", model.base_url));
        }
        Err(_) => report.detail(format!("llm.model={}", cfg.llm.model)),
    }
    report.detail(format!("output.policy={}", cfg.output.policy));
    report.detail(format!("output.dry_run={}", cfg.output.dry_run));

    if let Err(err) = validate(&cfg) {
        report.issue(format!("{err:#}"));
    }

    Ok(report)
}
