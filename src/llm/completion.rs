//! OpenAI-compatible chat completion client.

use crate::config::LlmConfig;
use crate::error::{CompletionError, Result};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Budget for one completion call, connect and read combined.
pub const COMPLETION_DEADLINE: Duration = Duration::from_secs(60);

/// Anything that can turn a user message into a reply.
pub trait Completer: Send + Sync + 'static {
    /// Produce a reply for `user_text`. An empty string means "nothing to say".
    fn complete(&self, user_text: &str) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Stateless client for `{base_url}/chat/completions`.
///
/// Every call runs as its own tokio task bounded by the deadline; the join
/// handle carries the result back and the task is aborted when the deadline
/// passes.
#[derive(Clone)]
pub struct CompletionClient {
    http_client: reqwest::Client,
    endpoint: Arc<str>,
    api_token: Arc<str>,
    model: Arc<str>,
    system_prompt: Arc<str>,
    deadline: Duration,
}

impl CompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_deadline(config, COMPLETION_DEADLINE)
    }

    /// Build a client with a custom deadline.
    pub fn with_deadline(config: &LlmConfig, deadline: Duration) -> Result<Self> {
        // Proxy variables from the environment are ignored; the endpoint is
        // always reached directly.
        let http_client = reqwest::Client::builder()
            .no_proxy()
            .timeout(deadline)
            .build()
            .with_context(|| "failed to build HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')).into(),
            api_token: config.api_token.as_str().into(),
            model: config.model.as_str().into(),
            system_prompt: config.system_prompt.as_str().into(),
            deadline,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(self, user_text: String) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_text,
                },
            ],
        };

        let response = self
            .http_client
            .post(&*self.endpoint)
            .header("authorization", format!("Bearer {}", self.api_token))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|error| self.transport_error(error))?;

        if !status.is_success() {
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body: response_text,
            }
            .into());
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&response_text).map_err(|error| {
            CompletionError::Parse(format!("{error}; body: {}", truncate_body(&response_text)))
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default())
    }

    fn transport_error(&self, error: reqwest::Error) -> CompletionError {
        if error.is_timeout() {
            CompletionError::Timeout {
                seconds: self.deadline.as_secs(),
            }
        } else {
            CompletionError::Transport(error.to_string())
        }
    }
}

impl Completer for CompletionClient {
    async fn complete(&self, user_text: &str) -> Result<String> {
        let started = std::time::Instant::now();
        let task = tokio::spawn(self.clone().send(user_text.to_string()));
        let abort_handle = task.abort_handle();

        let result = match tokio::time::timeout(self.deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                Err(anyhow::anyhow!("completion task failed: {join_error}").into())
            }
            Err(_) => {
                abort_handle.abort();
                Err(CompletionError::Timeout {
                    seconds: self.deadline.as_secs(),
                }
                .into())
            }
        };

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "completion finished"
        );

        result
    }
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((byte_index, _)) => &body[..byte_index],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            api_token: "sk-test".into(),
            model: "study-model".into(),
            system_prompt: "你是督学".into(),
        }
    }

    fn reply(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    #[tokio::test]
    async fn sends_system_and_user_messages_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "model": "study-model",
                "messages": [
                    { "role": "system", "content": "你是督学" },
                    { "role": "user", "content": "  hi  " },
                ]
            })))
            .respond_with(reply(serde_json::json!("  去学习\n")))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&llm_config(&server.uri())).expect("client");
        let text = client.complete("  hi  ").await.expect("completion should succeed");

        assert_eq!(text, "去学习");
    }

    #[tokio::test]
    async fn empty_or_missing_content_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply(serde_json::Value::Null))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply(serde_json::json!("   ")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&llm_config(&server.uri())).expect("client");
        for _ in 0..3 {
            let text = client.complete("hi").await.expect("completion should succeed");
            assert_eq!(text, "");
        }
    }

    #[tokio::test]
    async fn non_success_status_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&llm_config(&server.uri())).expect("client");
        let error = client.complete("hi").await.expect_err("429 must fail");

        match error {
            Error::Completion(CompletionError::Http { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&llm_config(&server.uri())).expect("client");
        let error = client.complete("hi").await.expect_err("html must fail");

        assert!(matches!(error, Error::Completion(CompletionError::Parse(_))));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply(serde_json::json!("late")).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client =
            CompletionClient::with_deadline(&llm_config(&server.uri()), Duration::from_millis(200))
                .expect("client");
        let error = client.complete("hi").await.expect_err("deadline must fire");

        assert!(matches!(error, Error::Completion(CompletionError::Timeout { .. })));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        // Bind and drop a listener to get a port nothing is listening on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("local addr");
        drop(listener);

        let client = CompletionClient::new(&llm_config(&format!("http://{address}"))).expect("client");
        let error = client.complete("hi").await.expect_err("nothing is listening");

        assert!(matches!(error, Error::Completion(CompletionError::Transport(_))));
    }
}
