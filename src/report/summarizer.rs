use anyhow::{Context, Result};
use serde_json::Value;

use crate::report::blocks::Block;
use crate::report::llm::ChatModel;

const SYSTEM_INSTRUCTION: &str = r#"You write entries for a daily firefighter report posted to Slack.
Each input is one Slack thread in which someone asked the on-call firefighter for help.
A message such as "Is it ok for <@user-id> to run the following" is a request for permission to run a command.

Summarize the thread as Slack Block Kit JSON following this template:
[
  {"type": "header", "text": {"type": "plain_text", "text": "<short title of the issue>", "emoji": true}},
  {"type": "context", "elements": [{"type": "plain_text", "text": "<date>"}]},
  {"type": "section", "text": {"type": "mrkdwn", "text": "*Problem:* <what went wrong>\n*Solution:* <how it was resolved, or the current status>"}},
  {"type": "divider"},
  {"type": "context", "elements": [{"type": "mrkdwn", "text": "*Participants:* <comma separated names>"}]}
]

Rules:
- Start the problem text with "Problem:" and the solution text with "Solution:". Keep the whole summary under 120 words.
- Format links as Slack links with descriptive text, for example <https://example.atlassian.net/browse/OPS-1|JIRA OPS-1>, <https://example.zendesk.com/agent/tickets/42|Zendesk ticket 42> or <https://app.datadoghq.com/...|Datadog dashboard>. Never paste a bare JIRA, Zendesk or Datadog URL.
- Use only header, context, section and divider blocks.
- Return only the JSON array, with no commentary and no code fences."#;

fn mention_hint(mention: &str) -> String {
    format!("\n{mention} is the mention of the firefighter group; treat it as the request for help.")
}

pub fn build_user_message(date: &str, thread_text: &str, participants: &[String]) -> String {
    format!(
        "Timestamp: {date}\nThread:\n{thread_text}\n\nParticipants: {}\n",
        participants.join(", ")
    )
}

/// Drop a leading and a trailing ``` line, if present.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Interpret model output as blocks. Never fails: unusable output becomes a
/// header plus the raw text.
pub fn recover_blocks(raw: &str, date: &str) -> Vec<Block> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Array(items)) => items.into_iter().map(Block::from_value).collect(),
        Ok(obj @ Value::Object(_)) => vec![Block::from_value(obj)],
        _ => {
            tracing::warn!(date, "model output is not block JSON; using fallback blocks");
            vec![
                Block::header(&format!("Firefighter {date}")),
                Block::section(raw.trim()),
            ]
        }
    }
}

pub struct Summarizer<M: ChatModel> {
    model: M,
    system: String,
}

impl<M: ChatModel> Summarizer<M> {
    pub fn new(model: M, mention: Option<&str>) -> Self {
        let mut system = SYSTEM_INSTRUCTION.to_string();
        if let Some(mention) = mention.map(str::trim).filter(|m| !m.is_empty()) {
            system.push_str(&mention_hint(mention));
        }
        Self { model, system }
    }

    pub fn model_label(&self) -> String {
        self.model.label()
    }

    pub fn summarize(
        &self,
        date: &str,
        thread_text: &str,
        participants: &[String],
    ) -> Result<Vec<Block>> {
        let user = build_user_message(date, thread_text, participants);
        let raw = self
            .model
            .complete(&self.system, &user)
            .with_context(|| format!("summarizing thread for {date} with {}", self.model.label()))?;
        Ok(recover_blocks(&raw, date))
    }
}
