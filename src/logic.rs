//! Oracle calls shared by the HTTP handlers and the WebSocket session.
//!
//! Every function here fails soft: callers always get a usable payload.
//!   - generation falls back to a deterministic problem per difficulty
//!   - grading falls back to an incorrect verdict with an explanation
//!   - tutoring falls back to an apology

use tracing::{error, info, instrument, warn};

use crate::catalog::fallback_problem;
use crate::domain::{ChatMessage, Difficulty, Problem, ProblemOrigin, VerificationResult};
use crate::state::AppState;
use crate::util::now_millis;

pub const GRADING_TRANSPORT_FEEDBACK: &str = "Failed to connect to verification server. Please try again.";
pub const GRADING_DISABLED_FEEDBACK: &str =
  "Verification is unavailable: no grading model is configured on this server.";
pub const TUTOR_ERROR_REPLY: &str = "Connection error. Please try again.";
pub const TUTOR_EMPTY_REPLY: &str = "I'm having trouble thinking right now. Try asking again.";
pub const TUTOR_DISABLED_REPLY: &str = "The tutor is offline: no model is configured on this server.";

pub const HINT_PROMPT: &str = "Can you give me a small hint for this problem without showing the code?";
pub const EXPLAIN_PROMPT: &str = "Can you explain the problem requirements in simple terms?";

/// Id for a generated problem: creation time in ms, bumped until unused.
pub fn generated_id(taken: impl Fn(&str) -> bool) -> String {
  let mut ms = now_millis();
  loop {
    let id = ms.to_string();
    if !taken(&id) {
      return id;
    }
    ms += 1;
  }
}

/// Ask the model for a new problem. The returned problem has no id yet.
#[instrument(level = "info", skip(state), fields(%difficulty))]
pub async fn generate_problem(state: &AppState, difficulty: Difficulty) -> (Problem, ProblemOrigin) {
  if let Some(oa) = &state.openai {
    match oa.generate_problem(&state.prompts, difficulty).await {
      Ok(p) => {
        info!(target: "problem", %difficulty, title = %p.title, "Generated fresh problem");
        return (p, ProblemOrigin::Generated);
      }
      Err(e) => {
        error!(target: "problem", %difficulty, error = %e, "Problem generation failed; using fallback");
      }
    }
  } else {
    warn!(target: "problem", %difficulty, "OPENAI_API_KEY not set; using fallback problem");
  }
  (fallback_problem(difficulty), ProblemOrigin::Fallback)
}

#[instrument(level = "info", skip(state, problem, code), fields(problem_id = %problem.id, code_len = code.len()))]
pub async fn verify_solution(state: &AppState, problem: &Problem, code: &str) -> VerificationResult {
  let Some(oa) = &state.openai else {
    return VerificationResult {
      is_correct: false,
      feedback: GRADING_DISABLED_FEEDBACK.into(),
      optimization_tips: None,
    };
  };
  match oa.verify_solution(&state.prompts, problem, code).await {
    Ok(v) => v,
    Err(e) => {
      error!(target: "vericode_backend", problem_id = %problem.id, error = %e, "Grading failed; returning soft failure");
      VerificationResult {
        is_correct: false,
        feedback: GRADING_TRANSPORT_FEEDBACK.into(),
        optimization_tips: None,
      }
    }
  }
}

#[instrument(level = "info", skip(state, history, problem, code, message),
             fields(problem_id = %problem.id, history_len = history.len(), message_len = message.len()))]
pub async fn tutor_reply(
  state: &AppState,
  history: &[ChatMessage],
  problem: &Problem,
  code: &str,
  message: &str,
) -> String {
  let Some(oa) = &state.openai else {
    return TUTOR_DISABLED_REPLY.into();
  };
  match oa.tutor_reply(&state.prompts, history, problem, code, message).await {
    Ok(t) if t.trim().is_empty() => TUTOR_EMPTY_REPLY.into(),
    Ok(t) => t,
    Err(e) => {
      error!(target: "vericode_backend", problem_id = %problem.id, error = %e, "Tutor reply failed; using apology");
      TUTOR_ERROR_REPLY.into()
    }
  }
}
