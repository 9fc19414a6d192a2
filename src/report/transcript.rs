use std::collections::BTreeSet;

use crate::report::slack::Message;

pub const UNKNOWN_AUTHOR: &str = "Unknown";
const REPLY_SEPARATOR: &str = "\nReply:\n";

/// Render a thread as `name: text` entries joined by reply markers, plus the
/// sorted, de-duplicated participant names.
pub fn build_thread_text(
    messages: &[Message],
    mut resolve_name: impl FnMut(&str) -> String,
) -> (String, Vec<String>) {
    let mut participants = BTreeSet::new();
    let mut lines = Vec::with_capacity(messages.len());

    for message in messages {
        let name = match message.author_id.as_deref() {
            Some(id) => resolve_name(id),
            None => UNKNOWN_AUTHOR.to_string(),
        };
        lines.push(format!("{name}: {}", message.text));
        participants.insert(name);
    }

    (lines.join(REPLY_SEPARATOR), participants.into_iter().collect())
}
