//! HTTP endpoint handlers. Stateless wrappers over the catalog and the oracles;
//! progress is only reachable through a WebSocket session.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::{Problem, VerificationResult};
use crate::logic::{self, generated_id};
use crate::protocol::*;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  NotFound(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

/// Library id first, then an inline problem (generated problems live client-side).
fn resolve_problem(state: &AppState, target: ProblemRef) -> Result<Problem, ApiError> {
  match (target.problem_id, target.problem) {
    (Some(id), _) if !id.is_empty() => state.problem(&id).ok_or_else(|| ApiError::NotFound(format!("Unknown problem: {id}"))),
    (_, Some(problem)) => Ok(problem),
    _ => Err(ApiError::BadRequest("Either problemId or problem is required.".into())),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, oracle: state.openai.is_some() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_problems(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProblemsQuery>,
) -> Json<Vec<Problem>> {
  let problems = state.catalog.search(q.q.as_deref().unwrap_or(""));
  info!(target: "problem", count = problems.len(), "HTTP library served");
  Json(problems)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_problem(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<Problem>, ApiError> {
  let problem = state
    .problem(&id)
    .ok_or_else(|| ApiError::NotFound(format!("Unknown problem: {id}")))?;
  info!(target: "problem", %id, origin = ?state.catalog.origin_of(&id), "HTTP problem served");
  Ok(Json(problem))
}

#[instrument(level = "info", skip(state, body), fields(difficulty = %body.difficulty))]
pub async fn http_generate_problem(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Json<GenerateOut> {
  let (mut problem, origin) = logic::generate_problem(&state, body.difficulty).await;
  problem.id = generated_id(|id| state.catalog.get(id).is_some());
  info!(target: "problem", id = %problem.id, %origin, "HTTP problem generated");
  Json(GenerateOut { problem, origin })
}

#[instrument(level = "info", skip(state, body), fields(code_len = body.code.len()))]
pub async fn http_verify(
  State(state): State<Arc<AppState>>,
  Json(body): Json<VerifyIn>,
) -> Result<Json<VerificationResult>, ApiError> {
  let problem = resolve_problem(&state, body.target).inspect_err(|e| {
    warn!(target: "vericode_backend", error = %e, "HTTP verify rejected");
  })?;
  let result = logic::verify_solution(&state, &problem, &body.code).await;
  info!(target: "vericode_backend", problem_id = %problem.id, is_correct = result.is_correct, "HTTP verification done");
  Ok(Json(result))
}

#[instrument(level = "info", skip(state, body), fields(history_len = body.history.len(), message_len = body.message.len()))]
pub async fn http_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatIn>,
) -> Result<Json<ChatOut>, ApiError> {
  if body.message.trim().is_empty() {
    return Err(ApiError::BadRequest("Message is empty.".into()));
  }
  let problem = resolve_problem(&state, body.target)?;
  let text = logic::tutor_reply(&state, &body.history, &problem, &body.code, &body.message).await;
  Ok(Json(ChatOut { text }))
}
