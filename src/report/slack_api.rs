use anyhow::Result;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::SlackApiError;

const REQUEST_TIMEOUT_SECS: u64 = 45;

/// One Slack Web API method call under a fixed token.
pub trait SlackApi {
    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackApiError>;
}

impl<T: SlackApi + ?Sized> SlackApi for &T {
    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackApiError> {
        (**self).call(method, params)
    }
}

impl<T: SlackApi + ?Sized> SlackApi for Box<T> {
    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackApiError> {
        (**self).call(method, params)
    }
}

pub struct HttpSlackApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpSlackApi {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

impl SlackApi for HttpSlackApi {
    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackApiError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .map_err(|err| SlackApiError::transport(method, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SlackApiError::transport(
                method,
                format!("HTTP {status}: {}", body.trim()),
            ));
        }

        let json: Value = response
            .json()
            .map_err(|err| SlackApiError::transport(method, format!("invalid JSON: {err}")))?;
        if json.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = json
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(SlackApiError::api(method, code));
        }
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpSlackApi, SlackApi};
    use crate::error::SlackApiError;
    use mockito::{Matcher, Server};

    #[test]
    fn posts_form_params_with_bearer_token() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("channel".into(), "C123".into()),
                Matcher::UrlEncoded("text".into(), "hello".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"ts":"1700000000.000100"}"#)
            .expect(1)
            .create();

        let api = HttpSlackApi::new(&format!("{}/", server.url()), "xoxb-test").expect("client");
        let out = api
            .call(
                "chat.postMessage",
                &[("channel", "C123".to_string()), ("text", "hello".to_string())],
            )
            .expect("call should succeed");

        mock.assert();
        assert_eq!(out["ts"], "1700000000.000100");
    }

    #[test]
    fn ok_false_surfaces_error_code() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/chat.postMessage")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error":"not_in_channel"}"#)
            .create();

        let api = HttpSlackApi::new(&server.url(), "xoxb-test").expect("client");
        let err = api
            .call("chat.postMessage", &[("channel", "C123".to_string())])
            .expect_err("should fail");
        assert!(err.is_not_in_channel());
    }

    #[test]
    fn http_failure_is_a_transport_error() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/search.messages")
            .with_status(500)
            .with_body("upstream exploded")
            .create();

        let api = HttpSlackApi::new(&server.url(), "xoxp-test").expect("client");
        let err = api
            .call("search.messages", &[("query", "x".to_string())])
            .expect_err("should fail");
        match err {
            SlackApiError::Transport { method, reason } => {
                assert_eq!(method, "search.messages");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
