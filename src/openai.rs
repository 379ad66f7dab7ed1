//! Minimal OpenAI client for the three oracles: problem generation, grading, tutoring.
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key, the candidate's code, or chat contents.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{ChatMessage, ChatRole, Difficulty, Problem, VerificationResult};
use crate::util::{fill_template, trunc_for_log};

/// Upper bound for tutor replies; keeps answers short.
const TUTOR_MAX_TOKENS: u32 = 500;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OracleError {
  #[error("transport error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("OpenAI HTTP {status}: {message}")]
  Status { status: reqwest::StatusCode, message: String },
  #[error("JSON parse error: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("model returned an incomplete payload: {0}")]
  Incomplete(&'static str),
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenProblem {
  title: String,
  #[serde(default)]
  description: String,
  #[serde(default, alias = "initial_code")]
  initial_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Verdict {
  #[serde(alias = "is_correct", alias = "correct")]
  is_correct: bool,
  #[serde(default)]
  feedback: String,
  #[serde(default, alias = "optimization_tips")]
  optimization_tips: Option<String>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// One chat.completions round trip. Returns the first choice's content (possibly empty).
  #[instrument(level = "info", skip(self, messages), fields(model = %model, messages = messages.len()))]
  async fn complete(
    &self,
    model: &str,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
    json: bool,
    max_tokens: Option<u32>,
  ) -> Result<String, OracleError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
      response_format: json.then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens,
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "vericode-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "OpenAI call failed");
      return Err(OracleError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    Ok(text)
  }

  /// System + user prompt, JSON object out. Generic over the target type T.
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, OracleError> {
    let messages = vec![ChatMessageReq::new("system", system), ChatMessageReq::new("user", user)];
    let text = self.complete(model, messages, temperature, true, None).await?;
    Ok(serde_json::from_str::<T>(&text)?)
  }

  // --- Oracles ---

  /// Synthesize a new problem. The caller assigns the id.
  #[instrument(level = "info", skip(self, prompts), fields(%difficulty, model = %self.strong_model))]
  pub async fn generate_problem(&self, prompts: &Prompts, difficulty: Difficulty) -> Result<Problem, OracleError> {
    let user = fill_template(&prompts.generate_user_template, &[("difficulty", difficulty.as_str())]);
    let gen: GenProblem = self.chat_json(&self.strong_model, &prompts.generate_system, &user, 0.8).await?;

    if gen.description.trim().is_empty() {
      return Err(OracleError::Incomplete("description"));
    }
    if gen.initial_code.trim().is_empty() {
      return Err(OracleError::Incomplete("initialCode"));
    }
    let title = if gen.title.trim().is_empty() { format!("{difficulty} Verilog Problem") } else { gen.title };

    info!(
      title_preview = %trunc_for_log(&title, 40),
      description_len = gen.description.len(),
      "Problem generated"
    );

    Ok(Problem {
      id: String::new(),
      title,
      difficulty,
      description: gen.description,
      initial_code: gen.initial_code,
    })
  }

  /// Grade a candidate solution against the problem statement.
  #[instrument(level = "info", skip(self, prompts, problem, code), fields(problem_id = %problem.id, code_len = code.len(), model = %self.strong_model))]
  pub async fn verify_solution(
    &self,
    prompts: &Prompts,
    problem: &Problem,
    code: &str,
  ) -> Result<VerificationResult, OracleError> {
    let user = fill_template(
      &prompts.verify_user_template,
      &[
        ("description", problem.description.as_str()),
        ("initial_code", problem.initial_code.as_str()),
        ("code", code),
      ],
    );
    let v: Verdict = self.chat_json(&self.strong_model, &prompts.verify_system, &user, 0.2).await?;
    info!(is_correct = v.is_correct, feedback_len = v.feedback.len(), "Verdict received");

    Ok(VerificationResult {
      is_correct: v.is_correct,
      feedback: v.feedback,
      optimization_tips: v.optimization_tips.filter(|t| !t.trim().is_empty()),
    })
  }

  /// Next tutor reply given the transcript so far and the new user message.
  #[instrument(level = "info", skip(self, prompts, history, problem, code, message),
               fields(problem_id = %problem.id, history_len = history.len(), message_len = message.len(), model = %self.fast_model))]
  pub async fn tutor_reply(
    &self,
    prompts: &Prompts,
    history: &[ChatMessage],
    problem: &Problem,
    code: &str,
    message: &str,
  ) -> Result<String, OracleError> {
    let system = fill_template(
      &prompts.tutor_system_template,
      &[("title", problem.title.as_str()), ("description", problem.description.as_str()), ("code", code)],
    );

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessageReq::new("system", &system));
    for m in history {
      let role = match m.role {
        ChatRole::User => "user",
        ChatRole::Tutor => "assistant",
      };
      messages.push(ChatMessageReq::new(role, &m.text));
    }
    messages.push(ChatMessageReq::new("user", message));

    self.complete(&self.fast_model, messages, 0.4, false, Some(TUTOR_MAX_TOKENS)).await
  }
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
impl ChatMessageReq {
  fn new(role: &str, content: &str) -> Self { Self { role: role.into(), content: content.into() } }
}
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

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
