use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::ReportError;
use crate::report::blocks::{Block, is_placeholder};
use crate::report::cache::{CacheLookup, JsonCache, KvStore};
use crate::report::config::Settings;
use crate::report::llm::ChatModel;
use crate::report::permalink::{parse_permalink, ts_to_datetime};
use crate::report::slack::{Message, SlackGateway};
use crate::report::slack_api::SlackApi;
use crate::report::summarizer::Summarizer;
use crate::report::transcript::build_thread_text;

const MIN_WINDOW_THREAD_MESSAGES: usize = 2;

/// How summaries are delivered. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyPolicy {
    /// One top-level message with every summary.
    Digest,
    /// One reply per summary under a per-week anchor message.
    WeeklyThread,
}

impl AssemblyPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "digest" | "daily" => Some(Self::Digest),
            "weekly" | "weekly-thread" | "weekly_thread" => Some(Self::WeeklyThread),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Digest => "digest",
            Self::WeeklyThread => "weekly",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub channel_id: String,
    pub query: String,
    pub search_limit: usize,
    pub lookback_days: i64,
    pub max_threads: usize,
    pub user_ttl_secs: u64,
    pub thread_ttl_secs: u64,
    pub policy: AssemblyPolicy,
    pub mention: Option<String>,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            channel_id: settings.slack.channel_id.clone(),
            query: settings.search.query.clone(),
            search_limit: usize::try_from(settings.search.limit)
                .context("SEARCH_LIMIT out of range")?,
            lookback_days: i64::try_from(settings.search.lookback_days)
                .context("LOOKBACK_DAYS out of range")?,
            max_threads: usize::try_from(settings.search.max_threads)
                .context("MAX_THREADS out of range")?,
            user_ttl_secs: settings.cache.user_ttl_secs,
            thread_ttl_secs: settings.cache.thread_ttl_secs,
            policy: settings.policy()?,
            mention: settings.output.mention.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub permalink: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    pub discovered: usize,
    pub summarized: usize,
    pub cache_hits: usize,
    pub placeholders_skipped: usize,
    pub messages_posted: usize,
    pub anchor_ts: Option<String>,
    /// Messages that would have been posted, in order; dry runs only.
    pub dry_run_payloads: Vec<Vec<Block>>,
}

#[derive(Debug, Clone)]
pub struct ThreadCandidate {
    pub channel_id: String,
    pub thread_root_ts: String,
    pub messages: Vec<Message>,
    pub observed_at: DateTime<Utc>,
}

struct SummarizedThread {
    channel_id: String,
    thread_root_ts: String,
    blocks: Vec<Block>,
}

/// External collaborators for one run: bot and user Slack clients, the cache
/// store and the chat model.
pub struct Collaborators<A: SlackApi, S: KvStore, M: ChatModel> {
    pub bot: A,
    pub user: A,
    pub store: S,
    pub model: M,
}

fn summary_cache_key(thread_root_ts: &str) -> String {
    format!("thread-summary:{thread_root_ts}")
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today - TimeDelta::days(i64::from(today.weekday().num_days_from_monday()))
}

/// Run the report once. The cache store is closed before returning, whether
/// the run succeeded or not.
pub fn run<A: SlackApi, S: KvStore, M: ChatModel>(
    parts: Collaborators<A, S, M>,
    config: &PipelineConfig,
    options: &RunOptions,
) -> Result<RunOutcome> {
    let cache = JsonCache::new(parts.store);
    let result = {
        let pipeline = Pipeline {
            gateway: SlackGateway::new(parts.bot, parts.user, &cache, config.user_ttl_secs),
            summarizer: Summarizer::new(parts.model, config.mention.as_deref()),
            cache: &cache,
            config,
        };
        pipeline.execute(options)
    };
    cache.close();
    result
}

struct Pipeline<'c, A: SlackApi, S: KvStore, M: ChatModel> {
    gateway: SlackGateway<'c, A, S>,
    summarizer: Summarizer<M>,
    cache: &'c JsonCache<S>,
    config: &'c PipelineConfig,
}

impl<A: SlackApi, S: KvStore, M: ChatModel> Pipeline<'_, A, S, M> {
    fn execute(&self, options: &RunOptions) -> Result<RunOutcome> {
        let mut outcome = RunOutcome::default();

        let mut candidates = match options.permalink.as_deref() {
            Some(permalink) => vec![self.discover_permalink(permalink, options.now)?],
            None => self.discover_window(options.now)?,
        };
        if self.config.max_threads > 0 {
            candidates.truncate(self.config.max_threads);
        }
        outcome.discovered = candidates.len();
        tracing::info!(
            threads = candidates.len(),
            policy = self.config.policy.label(),
            model = %self.summarizer.model_label(),
            "discovery finished"
        );

        let summaries = candidates
            .into_iter()
            .map(|candidate| self.summarize_candidate(candidate, &mut outcome))
            .collect::<Result<Vec<_>>>()?;

        match self.config.policy {
            AssemblyPolicy::Digest => self.dispatch_digest(&summaries, options, &mut outcome)?,
            AssemblyPolicy::WeeklyThread => {
                self.dispatch_weekly(&summaries, options, &mut outcome)?
            }
        }
        Ok(outcome)
    }

    fn discover_permalink(&self, permalink: &str, now: DateTime<Utc>) -> Result<ThreadCandidate> {
        let thread = parse_permalink(permalink)
            .ok_or_else(|| ReportError::InvalidPermalink(permalink.to_string()))?;
        let messages = self
            .gateway
            .fetch_thread(&thread.channel_id, &thread.thread_ts)?;
        if messages.is_empty() {
            return Err(ReportError::EmptyThread(permalink.to_string()).into());
        }
        Ok(ThreadCandidate {
            observed_at: ts_to_datetime(&thread.thread_ts).unwrap_or(now),
            channel_id: thread.channel_id,
            thread_root_ts: thread.thread_ts,
            messages,
        })
    }

    fn discover_window(&self, now: DateTime<Utc>) -> Result<Vec<ThreadCandidate>> {
        let cutoff = TimeDelta::try_days(self.config.lookback_days)
            .and_then(|window| now.checked_sub_signed(window))
            .with_context(|| {
                format!("lookback window of {} days is out of range", self.config.lookback_days)
            })?;
        let matches = self
            .gateway
            .search(&self.config.query, self.config.search_limit)?;
        tracing::info!(matches = matches.len(), query = %self.config.query, "search finished");

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for record in &matches {
            if self.config.max_threads > 0 && candidates.len() >= self.config.max_threads {
                break;
            }
            let Some(root_ts) = record.thread_root_ts() else {
                tracing::debug!("skipping match without timestamp");
                continue;
            };
            let Some(observed_at) = ts_to_datetime(root_ts) else {
                tracing::debug!(ts = root_ts, "skipping match with unparseable timestamp");
                continue;
            };
            if observed_at < cutoff {
                continue;
            }
            let Some(channel_id) = record.channel_id() else {
                tracing::debug!(ts = root_ts, "skipping match without channel");
                continue;
            };
            if !seen.insert((channel_id.to_string(), root_ts.to_string())) {
                continue;
            }

            let messages = self.gateway.fetch_thread(channel_id, root_ts)?;
            if messages.len() < MIN_WINDOW_THREAD_MESSAGES {
                tracing::debug!(channel_id, ts = root_ts, "skipping thread without replies");
                continue;
            }
            if let Some(link) = self.gateway.permalink(channel_id, root_ts) {
                tracing::info!(permalink = %link, "thread found");
            }
            candidates.push(ThreadCandidate {
                channel_id: channel_id.to_string(),
                thread_root_ts: root_ts.to_string(),
                messages,
                observed_at,
            });
        }
        Ok(candidates)
    }

    fn summarize_candidate(
        &self,
        candidate: ThreadCandidate,
        outcome: &mut RunOutcome,
    ) -> Result<SummarizedThread> {
        let key = summary_cache_key(&candidate.thread_root_ts);
        let blocks = match self.cache.get_json::<Vec<Block>>(&key) {
            CacheLookup::Hit(blocks) if !blocks.is_empty() => {
                tracing::debug!(ts = %candidate.thread_root_ts, "summary cache hit");
                outcome.cache_hits += 1;
                blocks
            }
            _ => {
                let (thread_text, participants) =
                    build_thread_text(&candidate.messages, |id| self.gateway.resolve_user_name(id));
                let date = candidate.observed_at.format("%Y-%m-%d").to_string();
                let blocks = self
                    .summarizer
                    .summarize(&date, &thread_text, &participants)?;
                if let Err(err) = self
                    .cache
                    .set_json(&key, &blocks, self.config.thread_ttl_secs)
                {
                    tracing::warn!(
                        key = %key,
                        error = %format!("{err:#}"),
                        "failed to cache summary"
                    );
                }
                outcome.summarized += 1;
                blocks
            }
        };
        Ok(SummarizedThread {
            channel_id: candidate.channel_id,
            thread_root_ts: candidate.thread_root_ts,
            blocks,
        })
    }

    fn with_link(&self, thread: &SummarizedThread, mut blocks: Vec<Block>) -> Vec<Block> {
        if let Some(link) = self
            .gateway
            .permalink(&thread.channel_id, &thread.thread_root_ts)
        {
            blocks.push(Block::view_thread(&link));
        }
        blocks
    }

    fn dispatch_digest(
        &self,
        summaries: &[SummarizedThread],
        options: &RunOptions,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let mut digest = Vec::new();
        for thread in summaries {
            if is_placeholder(&thread.blocks) {
                tracing::info!(ts = %thread.thread_root_ts, "skipping placeholder summary");
                outcome.placeholders_skipped += 1;
                continue;
            }
            digest.extend(self.with_link(thread, thread.blocks.clone()));
            digest.push(Block::divider());
        }
        if digest.is_empty() {
            digest.push(Block::no_threads_found());
        }

        if options.dry_run {
            outcome.dry_run_payloads.push(digest);
            return Ok(());
        }
        if self
            .gateway
            .post_blocks(&self.config.channel_id, &digest)?
            .is_some()
        {
            outcome.messages_posted += 1;
        }
        tracing::info!(
            channel_id = %self.config.channel_id,
            blocks = digest.len(),
            "digest posted"
        );
        Ok(())
    }

    fn dispatch_weekly(
        &self,
        summaries: &[SummarizedThread],
        options: &RunOptions,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let channel_id = &self.config.channel_id;
        let anchor = if options.dry_run {
            None
        } else {
            Some(
                self.gateway
                    .get_or_create_weekly_anchor(channel_id, week_start(options.now))?,
            )
        };
        outcome.anchor_ts = anchor.clone();

        let mut replies = 0usize;
        for thread in summaries {
            let payload = self.with_link(thread, thread.blocks.clone());
            if payload.is_empty() {
                continue;
            }
            self.reply(anchor.as_deref(), payload, outcome)?;
            replies += 1;
        }
        if replies == 0 {
            self.reply(anchor.as_deref(), vec![Block::no_threads_found()], outcome)?;
        }
        tracing::info!(channel_id = %channel_id, replies, "weekly replies dispatched");
        Ok(())
    }

    /// Post under the anchor, or record the payload when there is no anchor
    /// (dry run).
    fn reply(
        &self,
        anchor: Option<&str>,
        payload: Vec<Block>,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let Some(anchor_ts) = anchor else {
            outcome.dry_run_payloads.push(payload);
            return Ok(());
        };
        if self
            .gateway
            .post_blocks_in_thread(&self.config.channel_id, anchor_ts, &payload)?
            .is_some()
        {
            outcome.messages_posted += 1;
        }
        Ok(())
    }
}
