use thiserror::Error;

/// Failure of a single Slack Web API call.
#[derive(Debug, Clone, Error)]
pub enum SlackApiError {
    #[error("{method} transport failure: {reason}")]
    Transport { method: String, reason: String },
    #[error("{method} returned error `{code}`")]
    Api { method: String, code: String },
}

impl SlackApiError {
    pub fn transport(method: &str, reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn api(method: &str, code: impl Into<String>) -> Self {
        Self::Api {
            method: method.to_string(),
            code: code.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::Transport { .. } => None,
        }
    }

    pub fn is_not_in_channel(&self) -> bool {
        self.code() == Some("not_in_channel")
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid permalink format: {0}")]
    InvalidPermalink(String),
    #[error("No messages found for permalink: {0}")]
    EmptyThread(String),
    #[error(
        "Slack post failed: Could not join channel {channel}. Please invite the bot to the channel. Error: {source}"
    )]
    JoinFailed {
        channel: String,
        #[source]
        source: SlackApiError,
    },
    #[error("Slack post to channel {channel} failed: {source}")]
    PostFailed {
        channel: String,
        #[source]
        source: SlackApiError,
    },
    #[error("config invalid: {0}")]
    InvalidConfig(String),
}
