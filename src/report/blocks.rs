use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const NO_THREADS_TEXT: &str = "No firefighter threads found in the selected window.";

/// Phrases the model uses when a thread had nothing beyond its title.
const PLACEHOLDER_PATTERNS: [&str; 4] = [
    "placeholder/title only",
    "placeholder/title",
    "no thread messages provided beyond the title",
    "no thread messages provided",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Context,
    Section,
    Divider,
    Other,
}

/// One Block Kit block, kept verbatim so cached and model-produced blocks
/// replay exactly as they were stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block(Value);

impl Block {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn header(text: &str) -> Self {
        Self(json!({
            "type": "header",
            "text": {"type": "plain_text", "text": text},
        }))
    }

    pub fn section(markdown: &str) -> Self {
        Self(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": markdown},
        }))
    }

    pub fn context(markdown: &str) -> Self {
        Self(json!({
            "type": "context",
            "elements": [{"type": "mrkdwn", "text": markdown}],
        }))
    }

    pub fn divider() -> Self {
        Self(json!({"type": "divider"}))
    }

    pub fn view_thread(permalink: &str) -> Self {
        Self::context(&format!("<{permalink}|View thread>"))
    }

    pub fn no_threads_found() -> Self {
        Self::section(NO_THREADS_TEXT)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn kind(&self) -> BlockKind {
        match self.0.get("type").and_then(Value::as_str) {
            Some("header") => BlockKind::Header,
            Some("context") => BlockKind::Context,
            Some("section") => BlockKind::Section,
            Some("divider") => BlockKind::Divider,
            _ => BlockKind::Other,
        }
    }

    /// Visible text of header, section and context blocks.
    pub fn text_content(&self) -> String {
        match self.kind() {
            BlockKind::Header | BlockKind::Section => self
                .0
                .get("text")
                .and_then(|text| text.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            BlockKind::Context => {
                let Some(elements) = self.0.get("elements").and_then(Value::as_array) else {
                    return String::new();
                };
                elements
                    .iter()
                    .filter(|el| {
                        matches!(
                            el.get("type").and_then(Value::as_str),
                            Some("mrkdwn") | Some("plain_text")
                        )
                    })
                    .filter_map(|el| el.get("text").and_then(Value::as_str))
                    .collect()
            }
            BlockKind::Divider | BlockKind::Other => String::new(),
        }
    }
}

pub fn is_placeholder(blocks: &[Block]) -> bool {
    let all_text = blocks
        .iter()
        .map(|block| block.text_content().to_lowercase())
        .collect::<String>();
    PLACEHOLDER_PATTERNS
        .iter()
        .any(|pattern| all_text.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::{Block, BlockKind, is_placeholder};
    use serde_json::json;

    #[test]
    fn constructors_produce_block_kit_shapes() {
        assert_eq!(
            Block::header("Title").as_value(),
            &json!({"type": "header", "text": {"type": "plain_text", "text": "Title"}})
        );
        assert_eq!(
            Block::view_thread("https://x.slack.com/archives/C1/p1").as_value(),
            &json!({
                "type": "context",
                "elements": [{"type": "mrkdwn", "text": "<https://x.slack.com/archives/C1/p1|View thread>"}]
            })
        );
        assert_eq!(Block::divider().kind(), BlockKind::Divider);
    }

    #[test]
    fn unknown_fields_survive_serialization() {
        let raw = json!({
            "type": "header",
            "text": {"type": "plain_text", "text": "DB down", "emoji": true},
            "block_id": "b1"
        });
        let block: Block = serde_json::from_value(raw.clone()).expect("block");
        assert_eq!(serde_json::to_value(&block).expect("value"), raw);
    }

    #[test]
    fn text_content_reads_context_elements_but_not_images() {
        let block = Block::from_value(json!({
            "type": "context",
            "elements": [
                {"type": "plain_text", "text": "2024-01-02 "},
                {"type": "image", "image_url": "https://x", "alt_text": "no thread messages provided"},
                {"type": "mrkdwn", "text": "*Participants:* Ada"}
            ]
        }));
        assert_eq!(block.text_content(), "2024-01-02 *Participants:* Ada");
        assert!(!is_placeholder(&[block]));
    }

    #[test]
    fn placeholder_phrase_is_matched_case_insensitively() {
        let with_phrase = vec![
            Block::header("Request for help"),
            Block::section("Problem: No thread messages provided beyond the title."),
        ];
        let without_phrase = vec![
            Block::header("Request for help"),
            Block::section("Problem: deploy stuck.\nSolution: restarted the runner."),
        ];
        assert!(is_placeholder(&with_phrase));
        assert!(!is_placeholder(&without_phrase));
    }

    #[test]
    fn dividers_and_unknown_blocks_have_no_text() {
        let unknown =
            Block::from_value(json!({"type": "actions", "text": {"text": "placeholder/title"}}));
        assert_eq!(unknown.kind(), BlockKind::Other);
        assert!(!is_placeholder(&[Block::divider(), unknown]));
    }
}
