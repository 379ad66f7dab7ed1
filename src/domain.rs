//! Domain models: problems, verdicts, chat transcript, users and persisted progress.

use serde::{Deserialize, Serialize};

/// Difficulty tier. Ordered Easy < Medium < Hard. Accepts any casing when deserialized.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}
impl Default for Difficulty {
  fn default() -> Self { Difficulty::Easy }
}
impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "Easy",
      Difficulty::Medium => "Medium",
      Difficulty::Hard => "Hard",
    }
  }

  /// Lenient parse used for query strings and LLM output ("medium", "HARD", ...).
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }
}
impl TryFrom<String> for Difficulty {
  type Error = String;
  fn try_from(s: String) -> Result<Self, Self::Error> {
    Difficulty::parse(&s).ok_or_else(|| format!("unknown difficulty: {s}"))
  }
}
impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Where a problem came from. Not persisted; used for logging and the library/history split.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProblemOrigin {
  Catalog,    // built-in library
  Bank,       // extra problems from the TOML config
  Generated,  // synthesized by the model for this session
  Fallback,   // generation failed, deterministic replacement
}
impl std::fmt::Display for ProblemOrigin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      ProblemOrigin::Catalog => "catalog",
      ProblemOrigin::Bank => "bank",
      ProblemOrigin::Generated => "generated",
      ProblemOrigin::Fallback => "fallback",
    })
  }
}

/// A practice problem. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
  pub id: String,
  pub title: String,
  pub difficulty: Difficulty,
  pub description: String,
  pub initial_code: String,
}

/// Grading verdict returned by the grading oracle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
  pub is_correct: bool,
  pub feedback: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub optimization_tips: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
  User,
  // Older records call the tutor "model".
  #[serde(alias = "model")]
  Tutor,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
  pub role: ChatRole,
  pub text: String,
}

impl ChatMessage {
  pub fn user(text: impl Into<String>) -> Self { Self { role: ChatRole::User, text: text.into() } }
  pub fn tutor(text: impl Into<String>) -> Self { Self { role: ChatRole::Tutor, text: text.into() } }
}

/// Per-problem completion marker, ordered by commitment level.
///
/// The derived `Ord` is load-bearing: progress merges take the maximum.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
  #[default]
  Unseen,
  Attempted,
  Solved,
}

/// Unit of persistence, keyed by (user id, problem id).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
  pub problem_id: String,
  pub status: ProgressStatus,
  pub last_code: String,
  #[serde(default)]
  pub last_result: Option<VerificationResult>,
  #[serde(default)]
  pub chat_history: Vec<ChatMessage>,
  /// Last write, epoch milliseconds.
  pub timestamp: i64,
}

/// Signed-in user as issued by the identity provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn origin_displays_like_its_wire_name() {
    for origin in [ProblemOrigin::Catalog, ProblemOrigin::Bank, ProblemOrigin::Generated, ProblemOrigin::Fallback] {
      assert_eq!(serde_json::to_string(&origin).unwrap(), format!("\"{origin}\""));
    }
    assert_eq!(ProblemOrigin::Fallback.to_string(), "fallback");
  }

  #[test]
  fn status_order_follows_commitment() {
    assert!(ProgressStatus::Unseen < ProgressStatus::Attempted);
    assert!(ProgressStatus::Attempted < ProgressStatus::Solved);
    assert_eq!(ProgressStatus::Unseen.max(ProgressStatus::Solved), ProgressStatus::Solved);
  }

  #[test]
  fn progress_reads_legacy_camel_case_record() {
    let raw = r#"{
      "problemId": "static-mux2",
      "status": "attempted",
      "lastCode": "module m; endmodule",
      "lastResult": { "isCorrect": false, "feedback": "missing assign" },
      "chatHistory": [ { "role": "model", "text": "Hi!" }, { "role": "user", "text": "hint?" } ],
      "timestamp": 1700000000000
    }"#;
    let p: UserProgress = serde_json::from_str(raw).unwrap();
    assert_eq!(p.status, ProgressStatus::Attempted);
    assert_eq!(p.chat_history[0].role, ChatRole::Tutor);
    assert_eq!(p.last_result.as_ref().map(|r| r.is_correct), Some(false));
  }

  #[test]
  fn difficulty_parse_is_lenient() {
    assert_eq!(Difficulty::parse(" medium "), Some(Difficulty::Medium));
    assert_eq!(Difficulty::parse("HARD"), Some(Difficulty::Hard));
    assert_eq!(Difficulty::parse("insane"), None);

    let d: Difficulty = serde_json::from_str(r#""medium""#).unwrap();
    assert_eq!(d, Difficulty::Medium);
    assert_eq!(serde_json::to_string(&Difficulty::Hard).unwrap(), r#""Hard""#);
    assert!(serde_json::from_str::<Difficulty>(r#""insane""#).is_err());
  }
}
