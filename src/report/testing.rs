use anyhow::Result;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use crate::error::SlackApiError;
use crate::report::llm::ChatModel;
use crate::report::slack_api::SlackApi;

pub type Params = Vec<(String, String)>;

/// Scripted Slack API. Each method replays its queued responses in order and
/// keeps repeating the last one.
#[derive(Default)]
pub struct FakeSlack {
    responses: RefCell<HashMap<String, VecDeque<Result<Value, SlackApiError>>>>,
    calls: RefCell<Vec<(String, Params)>>,
}

impl FakeSlack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: &str, response: Value) -> &Self {
        self.push(method, Ok(response))
    }

    pub fn fail(&self, method: &str, code: &str) -> &Self {
        self.push(method, Err(SlackApiError::api(method, code)))
    }

    fn push(&self, method: &str, response: Result<Value, SlackApiError>) -> &Self {
        self.responses
            .borrow_mut()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self, method: &str) -> Vec<Params> {
        self.calls
            .borrow()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls(method).len()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(m, _)| m.clone()).collect()
    }
}

pub fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl SlackApi for FakeSlack {
    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackApiError> {
        self.calls.borrow_mut().push((
            method.to_string(),
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        let mut responses = self.responses.borrow_mut();
        let Some(queue) = responses.get_mut(method) else {
            return Err(SlackApiError::api(method, "unexpected_call"));
        };
        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        queue
            .front()
            .cloned()
            .unwrap_or_else(|| Err(SlackApiError::api(method, "unexpected_call")))
    }
}

/// Chat model that replays canned completions and records prompts.
#[derive(Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<String>>,
    pub prompts: RefCell<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl ChatModel for ScriptedModel {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts
            .borrow_mut()
            .push((system.to_string(), user.to_string()));
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted model exhausted"))
    }

    fn label(&self) -> String {
        "scripted".to_string()
    }
}
