pub mod blocks;
pub mod cache;
pub mod config;
pub mod llm;
pub mod permalink;
pub mod pipeline;
pub mod slack;
pub mod slack_api;
pub mod summarizer;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;
