//! Chat relay: turns a question plus the loaded transcript into a chat-completion request,
//! walking the configured model list when a model can't take the request.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::error::{Error, Result};

/// API error codes that move on to the next model instead of failing the request.
const RETRYABLE_CODES: &[&str] = &["context_length_exceeded", "model_not_available", "model_not_found"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  temperature: f32,
  max_tokens: u32,
}

/// Rough token count: one token per `chars_per_token` characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
  text.chars().count().div_ceil(constants().chars_per_token.max(1))
}

/// Chat completions endpoint under an API base such as `https://api.openai.com/v1`.
pub fn endpoint_for_base(base: &str) -> String {
  format!("{}/chat/completions", base.trim_end_matches('/'))
}

/// How one model attempt ended.
enum Attempt {
  Reply(String),
  /// The model couldn't take the request; try the next one.
  Skip(String),
}

pub struct ChatRelay {
  http: Client,
  endpoint: String,
  models: Vec<String>,
  limits: BTreeMap<String, usize>,
}

impl ChatRelay {
  pub fn new(http: Client) -> Self {
    let c = constants();
    Self {
      http,
      endpoint: c.chat_completions_url.clone(),
      models: c.models.clone(),
      limits: c.model_limits.clone(),
    }
  }

  pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into();
    self
  }

  /// Override the model list (most capable first). An empty list keeps the defaults.
  pub fn with_models(mut self, models: Vec<String>) -> Self {
    if !models.is_empty() {
      self.models = models;
    }
    self
  }

  fn limit(&self, model: &str) -> Option<usize> {
    self.limits.get(model).copied()
  }

  /// Tokens needed for `question` with `transcript` as context.
  pub fn estimate(&self, question: &str, transcript: Option<&str>) -> usize {
    transcript.map(estimate_tokens).unwrap_or(0) + estimate_tokens(question) + constants().prompt_overhead_tokens
  }

  /// Message list for one request. No earlier turns are carried over.
  pub fn build_messages(&self, question: &str, transcript: Option<&str>, estimated: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(constants().system_prompt.clone())];
    match transcript {
      Some(text) => {
        messages.push(ChatMessage::system(format!(
          "Here is the complete video transcript:\n\n{}\n\nPlease use this context to answer questions about the video content.",
          text
        )));
        let smallest = self.models.iter().filter_map(|m| self.limit(m)).min();
        if smallest.is_some_and(|limit| estimated > limit) {
          messages.push(ChatMessage::system(format!(
            "Note: This transcript is large (about {} tokens). Only models whose context window can fit it will be used.",
            estimated
          )));
        }
      }
      None => {
        messages.push(ChatMessage::system("No video transcript is loaded yet. You can only answer general questions."))
      }
    }
    messages.push(ChatMessage::user(question));
    messages
  }

  /// Ask `question` about the video. `transcript` is the plain-text transcript, if one is loaded.
  pub async fn ask(&self, question: &str, transcript: Option<&str>, api_key: &str) -> Result<String> {
    if api_key.trim().is_empty() {
      return Err(Error::MissingCredential);
    }
    let transcript = transcript.filter(|t| !t.trim().is_empty());

    let estimated = self.estimate(question, transcript);
    if let Some(largest) = self.models.iter().filter_map(|m| self.limit(m)).max()
      && estimated > largest
    {
      warn!(estimated, largest, "chat: request exceeds every model's context window");
      return Err(Error::TokenBudgetExceeded { estimated, limit: largest });
    }

    let messages = self.build_messages(question, transcript, estimated);
    for model in &self.models {
      if let Some(limit) = self.limit(model)
        && limit < estimated
      {
        debug!(model = %model, limit, estimated, "chat: skipping model, context window too small");
        continue;
      }
      match self.attempt(model, &messages, api_key.trim()).await? {
        Attempt::Reply(content) => {
          info!(model = %model, chars = content.len(), "chat: reply received");
          return Ok(content);
        }
        Attempt::Skip(code) => {
          info!(model = %model, code = %code, "chat: model unavailable for this request, trying next");
        }
      }
    }
    Err(Error::AllModelsFailed)
  }

  async fn attempt(&self, model: &str, messages: &[ChatMessage], api_key: &str) -> Result<Attempt> {
    let c = constants();
    let body = CompletionRequest { model, messages, temperature: c.temperature, max_tokens: c.max_output_tokens };

    debug!(model = %model, messages = messages.len(), "chat: sending request");
    let response = self
      .http
      .post(&self.endpoint)
      .bearer_auth(api_key)
      .json(&body)
      .send()
      .await
      .map_err(|e| Error::ChatApi(e.to_string()))?;

    let status = response.status();
    let text = response.text().await.map_err(|e| Error::ChatApi(e.to_string()))?;
    let json: Option<Value> = serde_json::from_str(&text).ok();

    if let Some(err) = json.as_ref().and_then(|v| v.get("error")).filter(|e| !e.is_null()) {
      let code = err.get("code").and_then(Value::as_str).unwrap_or_default();
      if RETRYABLE_CODES.contains(&code) {
        return Ok(Attempt::Skip(code.to_string()));
      }
      let message = err.get("message").and_then(Value::as_str).filter(|m| !m.is_empty()).unwrap_or(code);
      let message = if message.is_empty() { status.to_string() } else { message.to_string() };
      return Err(Error::ChatApi(message));
    }
    if !status.is_success() {
      return Err(Error::ChatApi(format!("HTTP {}", status)));
    }

    json
      .as_ref()
      .and_then(|v| v.pointer("/choices/0/message/content"))
      .and_then(Value::as_str)
      .map(|s| Attempt::Reply(s.to_string()))
      .ok_or(Error::InvalidResponseShape)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
  }

  fn api_error(status: u16, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
      .set_body_json(json!({"error": {"message": format!("{} happened", code), "type": "invalid_request_error", "code": code}}))
  }

  async fn relay(server: &MockServer, models: &[&str]) -> ChatRelay {
    ChatRelay::new(Client::new())
      .with_endpoint(format!("{}/v1/chat/completions", server.uri()))
      .with_models(models.iter().map(|m| m.to_string()).collect())
  }

  // --- estimates and messages ---

  #[test]
  fn token_estimate_rounds_up() {
    assert_eq!(estimate_tokens(""), 0);
    assert_eq!(estimate_tokens("abc"), 1);
    assert_eq!(estimate_tokens("abcde"), 2);
    assert_eq!(estimate_tokens(&"x".repeat(20_000)), 5000);
  }

  #[test]
  fn messages_without_transcript() {
    let relay = ChatRelay::new(Client::new());
    let msgs = relay.build_messages("hi?", None, 101);
    assert_eq!(msgs.len(), 3);
    assert_eq!(msgs[0].role, Role::System);
    assert!(msgs[1].content.contains("No video transcript is loaded"));
    assert_eq!(msgs[2], ChatMessage::user("hi?"));
  }

  #[test]
  fn large_transcript_gets_a_note() {
    let relay = ChatRelay::new(Client::new());
    let transcript = "[0:00] hello";
    let small = relay.build_messages("q", Some(transcript), 200);
    assert_eq!(small.len(), 3);
    assert!(small[1].content.contains(transcript));

    let large = relay.build_messages("q", Some(transcript), 5110);
    assert_eq!(large.len(), 4);
    assert!(large[2].content.contains("about 5110 tokens"));
    assert!(large[2].content.contains("can fit it"));
    assert_eq!(large[3].role, Role::User);
  }

  #[test]
  fn roles_serialize_lowercase() {
    let v = serde_json::to_value(ChatMessage::system("x")).unwrap();
    assert_eq!(v, json!({"role": "system", "content": "x"}));
  }

  #[test]
  fn endpoint_from_base() {
    assert_eq!(endpoint_for_base("https://api.example.com/v1/"), "https://api.example.com/v1/chat/completions");
  }

  // --- ask ---

  #[tokio::test]
  async fn missing_key_short_circuits() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(reply("x")).expect(0).mount(&server).await;
    let err = relay(&server, &["gpt-3.5-turbo"]).await.ask("q", None, "  ").await.unwrap_err();
    assert!(matches!(err, Error::MissingCredential));
  }

  #[tokio::test]
  async fn sends_expected_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .and(header("authorization", "Bearer sk-test"))
      .and(body_partial_json(json!({"model": "gpt-3.5-turbo", "temperature": 0.7, "max_tokens": 1000})))
      .respond_with(reply("It is about Rust."))
      .expect(1)
      .mount(&server)
      .await;

    let answer = relay(&server, &["gpt-3.5-turbo"]).await.ask("What?", Some("[0:00] Rust"), "sk-test").await.unwrap();
    assert_eq!(answer, "It is about Rust.");
  }

  #[tokio::test]
  async fn oversized_transcript_is_refused_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(reply("x")).expect(0).mount(&server).await;

    let transcript = "x".repeat(20_000);
    let question = "q".repeat(40);
    let err = relay(&server, &["gpt-3.5-turbo"]).await.ask(&question, Some(&transcript), "sk").await.unwrap_err();
    match err {
      Error::TokenBudgetExceeded { estimated, limit } => {
        assert_eq!(estimated, 5110);
        assert_eq!(limit, 4000);
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn large_transcript_uses_model_that_fits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({"model": "gpt-3.5-turbo-16k"})))
      .respond_with(reply("fits"))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({"model": "gpt-3.5-turbo"})))
      .respond_with(reply("too small"))
      .expect(0)
      .mount(&server)
      .await;

    let transcript = "x".repeat(20_000);
    let question = "q".repeat(40);
    let answer = relay(&server, &["gpt-3.5-turbo", "gpt-3.5-turbo-16k"])
      .await
      .ask(&question, Some(&transcript), "sk")
      .await
      .unwrap();
    assert_eq!(answer, "fits");
  }

  #[tokio::test]
  async fn retryable_error_falls_back_to_next_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({"model": "gpt-4-turbo-preview"})))
      .respond_with(api_error(404, "model_not_found"))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({"model": "gpt-3.5-turbo-16k"})))
      .respond_with(reply("from 16k"))
      .expect(1)
      .mount(&server)
      .await;

    let answer =
      relay(&server, &["gpt-4-turbo-preview", "gpt-3.5-turbo-16k"]).await.ask("q", Some("t"), "sk").await.unwrap();
    assert_eq!(answer, "from 16k");
  }

  #[tokio::test]
  async fn exhausting_models_is_all_models_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(api_error(400, "context_length_exceeded")).expect(2).mount(&server).await;

    let err = relay(&server, &["gpt-3.5-turbo-16k", "gpt-3.5-turbo"]).await.ask("q", None, "sk").await.unwrap_err();
    assert!(matches!(err, Error::AllModelsFailed));
  }

  #[tokio::test]
  async fn other_api_errors_abort() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(api_error(401, "invalid_api_key")).expect(1).mount(&server).await;

    let err = relay(&server, &["gpt-4-turbo-preview", "gpt-3.5-turbo"]).await.ask("q", None, "sk").await.unwrap_err();
    match err {
      Error::ChatApi(msg) => assert_eq!(msg, "invalid_api_key happened"),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn reply_without_content_is_invalid_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
      .mount(&server)
      .await;

    let err = relay(&server, &["gpt-3.5-turbo"]).await.ask("q", None, "sk").await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponseShape));
  }

  #[tokio::test]
  async fn transport_failure_is_chat_api_error() {
    let relay = ChatRelay::new(Client::new())
      .with_endpoint("http://127.0.0.1:9/v1/chat/completions")
      .with_models(vec!["gpt-3.5-turbo".to_string()]);
    let err = relay.ask("q", None, "sk").await.unwrap_err();
    assert!(matches!(err, Error::ChatApi(_)));
  }
}
