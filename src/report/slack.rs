use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReportError, SlackApiError};
use crate::report::blocks::Block;
use crate::report::cache::{CacheLookup, JsonCache, KvStore};
use crate::report::slack_api::SlackApi;

const SEARCH_PAGE_SIZE: u64 = 100;
const SEARCH_MAX_PAGES: u64 = 20;
const THREAD_REPLY_LIMIT: u64 = 200;
const ANCHOR_SEARCH_COUNT: u64 = 10;
const SYSTEM_BOT_USER: &str = "USLACKBOT";
const SYSTEM_BOT_NAME: &str = "slackbot";
const BOT_SUBTYPES: [&str; 3] = ["bot_message", "slackbot_response", "app_message"];

pub const DIGEST_FALLBACK_TEXT: &str = "Firefighter daily summary";
pub const THREAD_REPLY_FALLBACK_TEXT: &str = "Firefighter thread summary";

pub fn weekly_anchor_tag(week_start: NaiveDate) -> String {
    format!("Firefighter weekly summary {}", week_start.format("%Y-%m-%d"))
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// A raw `search.messages` match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch(Value);

impl SearchMatch {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn ts(&self) -> Option<&str> {
        non_empty_str(&self.0, "ts")
    }

    /// Root of the thread the match belongs to.
    pub fn thread_root_ts(&self) -> Option<&str> {
        non_empty_str(&self.0, "thread_ts").or_else(|| self.ts())
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self.0.get("channel") {
            Some(Value::Object(obj)) => obj
                .get("id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .or_else(|| non_empty_str(&self.0, "channel_id")),
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => non_empty_str(&self.0, "channel_id"),
        }
    }

    pub fn text(&self) -> &str {
        self.0.get("text").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn user(&self) -> Option<&str> {
        non_empty_str(&self.0, "user")
    }

    fn subtype(&self) -> Option<&str> {
        non_empty_str(&self.0, "subtype")
    }

    fn has_truthy(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Bool(b)) => *b,
            Some(_) => true,
        }
    }

    fn profile_is_bot(&self) -> bool {
        self.0
            .get("user_profile")
            .and_then(|p| p.get("is_bot"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn profile_name(&self) -> Option<&str> {
        let profile = self.0.get("user_profile")?;
        non_empty_str(profile, "display_name_normalized")
            .or_else(|| non_empty_str(profile, "real_name_normalized"))
            .or_else(|| non_empty_str(profile, "name"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub author_id: Option<String>,
    pub text: String,
}

impl Message {
    pub fn from_value(value: &Value) -> Self {
        Self {
            author_id: non_empty_str(value, "user").map(ToOwned::to_owned),
            text: value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub is_bot: bool,
}

/// Best-effort lookup result; `Degraded` carries a stand-in value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Resolved(T),
    Degraded(T),
}

impl<T> Lookup<T> {
    pub fn into_inner(self) -> T {
        match self {
            Lookup::Resolved(value) | Lookup::Degraded(value) => value,
        }
    }
}

fn user_cache_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Slack operations used by the report. Reads go through the user token,
/// posts through the bot token.
pub struct SlackGateway<'c, A: SlackApi, S: KvStore> {
    bot: A,
    user: A,
    cache: &'c JsonCache<S>,
    user_cache_ttl: u64,
}

impl<'c, A: SlackApi, S: KvStore> SlackGateway<'c, A, S> {
    pub fn new(bot: A, user: A, cache: &'c JsonCache<S>, user_cache_ttl: u64) -> Self {
        Self {
            bot,
            user,
            cache,
            user_cache_ttl,
        }
    }

    /// Human matches for `query`, at most `limit`, in platform order.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchMatch>> {
        let mut all_matches = Vec::new();
        let mut page = 1u64;

        while page <= SEARCH_MAX_PAGES && all_matches.len() < limit {
            let result = self
                .user
                .call(
                    "search.messages",
                    &[
                        ("query", query.to_string()),
                        ("count", SEARCH_PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                        ("sort", "timestamp".to_string()),
                        ("sort_dir", "desc".to_string()),
                    ],
                )
                .map_err(|err| anyhow!("Slack search failed: {err}"))?;

            let messages = result.get("messages");
            let page_matches = messages
                .and_then(|m| m.get("matches"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let fetched = page_matches.len();
            let before = all_matches.len();
            all_matches.extend(
                page_matches
                    .into_iter()
                    .map(SearchMatch::from_value)
                    .filter(|m| self.is_human_message(m)),
            );
            tracing::debug!(
                page,
                fetched,
                kept = all_matches.len() - before,
                "search page processed"
            );

            let total_pages = messages
                .and_then(|m| m.get("paging"))
                .and_then(|p| p.get("pages"))
                .and_then(Value::as_u64)
                .unwrap_or(1);
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        all_matches.truncate(limit);
        Ok(all_matches)
    }

    pub fn is_human_message(&self, record: &SearchMatch) -> bool {
        if record
            .subtype()
            .is_some_and(|subtype| BOT_SUBTYPES.contains(&subtype))
        {
            return false;
        }
        if record.has_truthy("bot_id") || record.has_truthy("app_id") {
            return false;
        }
        if record.has_truthy("username") && record.user().is_none() {
            return false;
        }
        if let Some(user) = record.user() {
            if user.eq_ignore_ascii_case(SYSTEM_BOT_USER) {
                return false;
            }
            if self.is_bot_user(user) {
                return false;
            }
        }
        if record.profile_is_bot() {
            return false;
        }
        if record
            .profile_name()
            .is_some_and(|name| name.eq_ignore_ascii_case(SYSTEM_BOT_NAME))
        {
            return false;
        }
        true
    }

    /// Cached identity of `user_id`. Lookup failures degrade to the raw id
    /// and "not a bot", and are not cached.
    pub fn lookup_identity(&self, user_id: &str) -> Lookup<UserIdentity> {
        let key = user_cache_key(user_id);
        if let CacheLookup::Hit(identity) = self.cache.get_json::<UserIdentity>(&key) {
            return Lookup::Resolved(identity);
        }

        let degraded = || {
            Lookup::Degraded(UserIdentity {
                name: user_id.to_string(),
                is_bot: false,
            })
        };

        let result = match self.user.call("users.info", &[("user", user_id.to_string())]) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "user lookup failed; using raw id");
                return degraded();
            }
        };
        let Some(user) = result.get("user").filter(|u| u.is_object()) else {
            tracing::warn!(user_id, "user lookup returned no profile; using raw id");
            return degraded();
        };

        let name = non_empty_str(user, "real_name")
            .or_else(|| non_empty_str(user, "name"))
            .unwrap_or(user_id)
            .to_string();
        let identity = UserIdentity {
            name,
            is_bot: user.get("is_bot").and_then(Value::as_bool).unwrap_or(false),
        };
        if let Err(err) = self.cache.set_json(&key, &identity, self.user_cache_ttl) {
            tracing::warn!(user_id, error = %format!("{err:#}"), "failed to cache user identity");
        }
        Lookup::Resolved(identity)
    }

    pub fn resolve_user_name(&self, user_id: &str) -> String {
        self.lookup_identity(user_id).into_inner().name
    }

    pub fn is_bot_user(&self, user_id: &str) -> bool {
        self.lookup_identity(user_id).into_inner().is_bot
    }

    pub fn fetch_thread(&self, channel_id: &str, thread_ts: &str) -> Result<Vec<Message>> {
        let result = self
            .user
            .call(
                "conversations.replies",
                &[
                    ("channel", channel_id.to_string()),
                    ("ts", thread_ts.to_string()),
                    ("inclusive", "true".to_string()),
                    ("limit", THREAD_REPLY_LIMIT.to_string()),
                ],
            )
            .map_err(|err| {
                anyhow!("Slack thread fetch failed for {channel_id}/{thread_ts}: {err}")
            })?;
        Ok(result
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| messages.iter().map(Message::from_value).collect())
            .unwrap_or_default())
    }

    /// `None` when Slack cannot resolve the link; callers omit it.
    pub fn permalink(&self, channel_id: &str, message_ts: &str) -> Option<String> {
        match self.user.call(
            "chat.getPermalink",
            &[
                ("channel", channel_id.to_string()),
                ("message_ts", message_ts.to_string()),
            ],
        ) {
            Ok(result) => non_empty_str(&result, "permalink").map(ToOwned::to_owned),
            Err(err) => {
                tracing::debug!(channel_id, message_ts, error = %err, "permalink unavailable");
                None
            }
        }
    }

    pub fn post_blocks(&self, channel_id: &str, blocks: &[Block]) -> Result<Option<String>> {
        if blocks.is_empty() {
            return Ok(None);
        }
        let response = self.post_message(channel_id, None, blocks, DIGEST_FALLBACK_TEXT)?;
        Ok(non_empty_str(&response, "ts").map(ToOwned::to_owned))
    }

    pub fn post_blocks_in_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
        blocks: &[Block],
    ) -> Result<Option<String>> {
        if blocks.is_empty() {
            return Ok(None);
        }
        let response =
            self.post_message(channel_id, Some(thread_ts), blocks, THREAD_REPLY_FALLBACK_TEXT)?;
        Ok(non_empty_str(&response, "ts").map(ToOwned::to_owned))
    }

    /// Reuse this week's anchor message if one is found, else post a new one.
    pub fn get_or_create_weekly_anchor(
        &self,
        channel_id: &str,
        week_start: NaiveDate,
    ) -> Result<String> {
        let tag = weekly_anchor_tag(week_start);

        match self.find_anchor(channel_id, &tag) {
            Ok(Some(ts)) => {
                tracing::info!(channel_id, ts = %ts, "reusing weekly anchor");
                return Ok(ts);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    channel_id,
                    error = %err,
                    "anchor search failed; creating a new anchor"
                );
            }
        }

        let response = self.post_message(channel_id, None, &[Block::header(&tag)], &tag)?;
        let ts = non_empty_str(&response, "ts")
            .map(ToOwned::to_owned)
            .context("Failed to get thread timestamp from Slack response")?;
        tracing::info!(channel_id, ts = %ts, "created weekly anchor");
        Ok(ts)
    }

    fn find_anchor(&self, channel_id: &str, tag: &str) -> Result<Option<String>, SlackApiError> {
        let result = self.user.call(
            "search.messages",
            &[
                ("query", tag.to_string()),
                ("count", ANCHOR_SEARCH_COUNT.to_string()),
                ("sort", "timestamp".to_string()),
            ],
        )?;
        let matches = result
            .get("messages")
            .and_then(|m| m.get("matches"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(matches
            .into_iter()
            .map(SearchMatch::from_value)
            .find(|m| m.text().contains(tag) && m.channel_id() == Some(channel_id))
            .and_then(|m| m.ts().map(ToOwned::to_owned)))
    }

    fn post_message(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        blocks: &[Block],
        fallback_text: &str,
    ) -> Result<Value> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("blocks", serde_json::to_string(blocks)?),
            ("text", fallback_text.to_string()),
        ];
        if let Some(ts) = thread_ts {
            params.push(("thread_ts", ts.to_string()));
        }

        match self.bot.call("chat.postMessage", &params) {
            Ok(response) => Ok(response),
            Err(err) if err.is_not_in_channel() => {
                tracing::info!(channel_id, "bot not in channel; joining and retrying once");
                self.bot
                    .call("conversations.join", &[("channel", channel_id.to_string())])
                    .map_err(|source| ReportError::JoinFailed {
                        channel: channel_id.to_string(),
                        source,
                    })?;
                self.bot
                    .call("chat.postMessage", &params)
                    .map_err(|source| {
                        anyhow::Error::from(ReportError::PostFailed {
                            channel: channel_id.to_string(),
                            source,
                        })
                    })
            }
            Err(source) => Err(ReportError::PostFailed {
                channel: channel_id.to_string(),
                source,
            }
            .into()),
        }
    }
}
