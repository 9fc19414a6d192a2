use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::report::config::LlmSettings;

const REQUEST_TIMEOUT_SECS: u64 = 45;
const TEMPERATURE: f64 = 0.2;
const ANTHROPIC_MAX_TOKENS: u64 = 1200;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A chat completion backend: one system prompt, one user turn, text back.
pub trait ChatModel {
    fn complete(&self, system: &str, user: &str) -> Result<String>;
    fn label(&self) -> String;
}

impl<M: ChatModel + ?Sized> ChatModel for &M {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete(system, user)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProvider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenAiCompatible,
}

/// Model-name prefixes that identify a provider without configuration.
const MODEL_FAMILIES: [(&str, RemoteProvider); 7] = [
    ("deepseek-", RemoteProvider::OpenAiCompatible),
    ("claude-", RemoteProvider::Anthropic),
    ("gemini-", RemoteProvider::Gemini),
    ("gpt-", RemoteProvider::OpenAi),
    ("o1", RemoteProvider::OpenAi),
    ("o3", RemoteProvider::OpenAi),
    ("o4", RemoteProvider::OpenAi),
];

impl RemoteProvider {
    pub fn label(self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "openai",
            RemoteProvider::Anthropic => "anthropic",
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAiCompatible => "openai-compatible",
        }
    }

    /// Provider implied by a model family name such as `claude-3-5-haiku`.
    fn for_model(model: &str) -> Option<Self> {
        let lower = model.trim().to_ascii_lowercase();
        MODEL_FAMILIES
            .iter()
            .find(|(prefix, _)| lower.starts_with(prefix))
            .map(|(_, provider)| *provider)
    }

    fn default_model(self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "gpt-4o-mini",
            RemoteProvider::Anthropic => "claude-3-5-haiku-latest",
            RemoteProvider::Gemini => "gemini-2.5-flash-lite",
            RemoteProvider::OpenAiCompatible => "deepseek-chat",
        }
    }

    fn default_base_url(self, model: &str) -> Option<&'static str> {
        match self {
            RemoteProvider::OpenAi => Some("https://api.openai.com"),
            RemoteProvider::Anthropic => Some("https://api.anthropic.com"),
            RemoteProvider::Gemini => Some("https://generativelanguage.googleapis.com"),
            RemoteProvider::OpenAiCompatible => {
                (Self::for_model(model) == Some(self)).then_some("https://api.deepseek.com")
            }
        }
    }
}

impl FromStr for RemoteProvider {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(RemoteProvider::OpenAi),
            "anthropic" | "claude" => Ok(RemoteProvider::Anthropic),
            "gemini" | "google" | "google_genai" => Ok(RemoteProvider::Gemini),
            "openai-compatible" | "compatible" | "deepseek" => Ok(RemoteProvider::OpenAiCompatible),
            _ => Err(anyhow!("unknown LLM provider `{}`", raw.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub provider: RemoteProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
}

/// Splits `anthropic:claude-3-5-haiku` into its provider and model; names
/// without a known provider prefix come back whole.
fn split_provider_prefix(raw: &str) -> (Option<RemoteProvider>, &str) {
    let trimmed = raw.trim();
    match trimmed.split_once(':') {
        Some((prefix, model)) => match prefix.parse::<RemoteProvider>() {
            Ok(provider) => (Some(provider), model.trim()),
            Err(_) => (None, trimmed),
        },
        None => (None, trimmed),
    }
}

/// Provider precedence: explicit `provider`, then a `provider:model` prefix,
/// then the model name, then OpenAI.
pub fn resolve_model_config(settings: &LlmSettings) -> Result<ModelConfig> {
    let explicit = match settings.provider.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<RemoteProvider>()?),
        _ => None,
    };
    let (prefixed, model) = split_provider_prefix(&settings.model);
    let provider = explicit
        .or(prefixed)
        .or_else(|| RemoteProvider::for_model(model))
        .unwrap_or(RemoteProvider::OpenAi);
    let model = if model.is_empty() {
        provider.default_model().to_string()
    } else {
        model.to_string()
    };

    let base_url = settings
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .or_else(|| provider.default_base_url(&model))
        .map(|b| b.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            anyhow!(
                "LLM_BASE_URL is required for provider {} with model {model}",
                provider.label()
            )
        })?;

    Ok(ModelConfig {
        provider,
        model,
        api_key: settings.api_key.trim().to_string(),
        base_url,
    })
}

pub struct RemoteModel {
    config: ModelConfig,
    client: Client,
}

impl RemoteModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { config, client })
    }

    fn post_json(
        &self,
        request: reqwest::blocking::RequestBuilder,
        payload: &Value,
    ) -> Result<Value> {
        let response = request.json(payload).send().with_context(|| {
            format!("{} request failed", self.config.provider.label())
        })?;
        if !response.status().is_success() {
            anyhow::bail!(
                "{} call failed with status {}",
                self.config.provider.label(),
                response.status()
            );
        }
        Ok(response.json()?)
    }

    fn complete_chat_completions(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": TEMPERATURE
        });
        let json = self.post_json(
            self.client.post(&url).bearer_auth(&self.config.api_key),
            &payload,
        )?;
        extract_chat_completions_text(&json).with_context(|| {
            format!(
                "{} response missing text content",
                self.config.provider.label()
            )
        })
    }

    fn complete_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let payload = serde_json::json!({
            "model": self.config.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": system,
            "messages": [
                {"role": "user", "content": user}
            ]
        });
        let json = self.post_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            &payload,
        )?;
        extract_anthropic_text(&json).context("anthropic response missing text content")
    }

    fn complete_gemini(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let payload = serde_json::json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": [
                {"role": "user", "parts": [{"text": user}]}
            ],
            "generationConfig": {"temperature": TEMPERATURE}
        });
        let json = self.post_json(
            self.client
                .post(&url)
                .query(&[("key", self.config.api_key.as_str())]),
            &payload,
        )?;
        extract_gemini_text(&json).context("gemini response missing text content")
    }
}

impl ChatModel for RemoteModel {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.config.provider {
            RemoteProvider::OpenAi | RemoteProvider::OpenAiCompatible => {
                self.complete_chat_completions(system, user)
            }
            RemoteProvider::Anthropic => self.complete_anthropic(system, user),
            RemoteProvider::Gemini => self.complete_gemini(system, user),
        }
    }

    fn label(&self) -> String {
        format!("{}:{}", self.config.provider.label(), self.config.model)
    }
}

fn join_text_parts(parts: &[Value]) -> Option<String> {
    let chunks: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_chat_completions_text(json: &Value) -> Option<String> {
    let first = json.get("choices").and_then(Value::as_array)?.first()?;
    match first.get("message")?.get("content")? {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => join_text_parts(parts),
        _ => None,
    }
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    join_text_parts(json.get("content").and_then(Value::as_array)?)
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)?;
    join_text_parts(parts)
}
