//! OpenAI-compatible chat-completions client.
//!
//! Two call shapes: plain text and a strict JSON object. Calls are instrumented with
//! model name, latency and token usage. The API key and message contents are never logged.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::Question;
use crate::util::{fill_template, strip_code_fences, trunc_for_log};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum LlmError {
  #[error("LLM HTTP {0}: {1}")]
  Http(u16, String),
  #[error("LLM transport error: {0}")]
  Transport(String),
  #[error("LLM response could not be parsed: {0}")]
  Parse(String),
  #[error("LLM returned an empty reply")]
  Empty,
}

#[derive(Clone)]
pub struct LlmClient {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

/// Free-text reasoning grade.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningEval {
  #[serde(alias = "is_correct")]
  pub is_correct: bool,
  #[serde(default)]
  pub score: f32,
  #[serde(default)]
  pub feedback: String,
}

impl LlmClient {
  /// Enabled only when OPENAI_API_KEY is present.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let fast_model = std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model = std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    match Self::new(api_key, base_url, fast_model, strong_model) {
      Ok(c) => Some(c),
      Err(e) => {
        warn!(target: "cyberlms_backend", error = %e, "Could not build LLM HTTP client; AI features disabled");
        None
      }
    }
  }

  pub fn new(api_key: String, base_url: String, fast_model: String, strong_model: String) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| LlmError::Transport(e.to_string()))?;
    Ok(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), fast_model, strong_model })
  }

  async fn complete(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    json: bool,
  ) -> Result<String, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: json.then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let started = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "cyberlms-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| LlmError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(LlmError::Http(status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(
        prompt_tokens = ?usage.prompt_tokens,
        completion_tokens = ?usage.completion_tokens,
        total_tokens = ?usage.total_tokens,
        elapsed = ?started.elapsed(),
        "LLM usage"
      );
    }
    let text = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .unwrap_or_default()
      .trim()
      .to_string();
    if text.is_empty() {
      return Err(LlmError::Empty);
    }
    debug!(reply_len = text.len(), "LLM reply received");
    Ok(text)
  }

  /// Plain-text completion, trimmed.
  #[instrument(level = "info", skip(self, model, system, user), fields(model = %model))]
  pub async fn chat_plain(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String, LlmError> {
    self.complete(model, system, user, temperature, false).await
  }

  /// JSON-object completion deserialized into `T`.
  #[instrument(level = "info", skip(self, model, system, user), fields(model = %model))]
  pub async fn chat_json<T: DeserializeOwned>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, LlmError> {
    let text = self.complete(model, system, user, temperature, true).await?;
    decode_json(&text)
  }

  // --- Domain helpers ---

  #[instrument(level = "info", skip_all, fields(question_id = %question.id, was_correct = was_correct))]
  pub async fn tutor_feedback(
    &self,
    prompts: &Prompts,
    question: &Question,
    selected: &str,
    was_correct: bool,
  ) -> Result<String, LlmError> {
    let user = fill_template(
      &prompts.tutor_user_template,
      &[
        ("question", &question.text),
        ("selected", selected),
        ("correct", question.correct_option()),
        ("result", if was_correct { "correct" } else { "incorrect" }),
        ("explanation", &question.explanation),
      ],
    );
    self.chat_plain(&self.fast_model, &prompts.tutor_system, &user, 0.7).await
  }

  #[instrument(level = "info", skip_all, fields(question_id = %question.id, answer_len = answer.len()))]
  pub async fn evaluate_reasoning(
    &self,
    prompts: &Prompts,
    question: &Question,
    answer: &str,
  ) -> Result<ReasoningEval, LlmError> {
    let user = fill_template(
      &prompts.reasoning_user_template,
      &[("question", &question.text), ("correct", question.correct_option()), ("answer", answer)],
    );
    let mut eval: ReasoningEval = self.chat_json(&self.fast_model, &prompts.reasoning_system, &user, 0.2).await?;
    eval.score = eval.score.clamp(0.0, 1.0);
    Ok(eval)
  }

  #[instrument(level = "info", skip_all, fields(message_len = message.len()))]
  pub async fn mentor_reply(
    &self,
    prompts: &Prompts,
    session: &str,
    question_hint: &str,
    progress: &str,
    message: &str,
  ) -> Result<String, LlmError> {
    let user = fill_template(
      &prompts.mentor_user_template,
      &[("session", session), ("question_hint", question_hint), ("progress", progress), ("message", message)],
    );
    self.chat_plain(&self.fast_model, &prompts.mentor_system, &user, 0.7).await
  }

  #[instrument(level = "info", skip(self, prompts, category, samples), fields(%category, samples = samples.len()))]
  pub async fn study_notes(&self, prompts: &Prompts, category: &str, samples: &[String]) -> Result<String, LlmError> {
    let sample_block = samples.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");
    let user = fill_template(&prompts.notes_user_template, &[("category", category), ("samples", &sample_block)]);
    self.chat_plain(&self.strong_model, &prompts.notes_system, &user, 0.4).await
  }
}

/// Parse a model reply as JSON, tolerating Markdown fences around it.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
  let cleaned = strip_code_fences(text);
  serde_json::from_str::<T>(&cleaned).map_err(|e| LlmError::Parse(e.to_string()))
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Pull `error.message` out of an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
pub(crate) mod tests {
  use axum::{routing::post, Json, Router};
  use serde_json::{json, Value};

  use super::*;

  /// Serve a canned completion (or error) on a random local port.
  pub(crate) async fn fake_openai(status: u16, body: Value) -> String {
    let app = Router::new().route(
      "/chat/completions",
      post(move |Json(_req): Json<Value>| {
        let body = body.clone();
        async move {
          let code = axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::OK);
          (code, Json(body))
        }
      }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
      axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
  }

  pub(crate) fn client(base_url: String) -> LlmClient {
    LlmClient::new("sk-test".into(), base_url, "fast".into(), "strong".into()).expect("client")
  }

  pub(crate) fn completion(content: &str) -> Value {
    json!({
      "choices": [{ "message": { "content": content } }],
      "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
  }

  #[test]
  fn fenced_json_is_decoded() {
    let eval: ReasoningEval =
      decode_json("```json\n{\"isCorrect\": true, \"score\": 0.8, \"feedback\": \"ok\"}\n```").expect("decode");
    assert!(eval.is_correct);
    assert_eq!(eval.feedback, "ok");
    assert!(matches!(decode_json::<ReasoningEval>("not json"), Err(LlmError::Parse(_))));
  }

  #[test]
  fn openai_error_message_is_extracted() {
    let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Incorrect API key provided"));
    assert!(extract_openai_error("<html>").is_none());
  }

  #[tokio::test]
  async fn plain_reply_is_trimmed() {
    let base = fake_openai(200, completion("  Stay alert.  \n")).await;
    let out = client(base).chat_plain("fast", "sys", "hi", 0.0).await.expect("reply");
    assert_eq!(out, "Stay alert.");
  }

  #[tokio::test]
  async fn empty_reply_is_an_error() {
    let base = fake_openai(200, completion("   ")).await;
    let err = client(base).chat_plain("fast", "sys", "hi", 0.0).await.unwrap_err();
    assert!(matches!(err, LlmError::Empty));
  }

  #[tokio::test]
  async fn http_errors_carry_status_and_message() {
    let base = fake_openai(401, json!({ "error": { "message": "bad key" } })).await;
    let err = client(base).chat_plain("fast", "sys", "hi", 0.0).await.unwrap_err();
    match err {
      LlmError::Http(status, msg) => {
        assert_eq!(status, 401);
        assert_eq!(msg, "bad key");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn reasoning_score_is_clamped() {
    let base = fake_openai(200, completion(r#"{"isCorrect": false, "score": 3.5, "feedback": "close"}"#)).await;
    let q = crate::seeds::builtin_questions().into_iter().next().expect("seed question");
    let eval = client(base)
      .evaluate_reasoning(&Prompts::default(), &q, "because the domain is odd")
      .await
      .expect("eval");
    assert_eq!(eval.score, 1.0);
    assert!(!eval.is_correct);
  }
}
