//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, Difficulty, Problem, ProblemOrigin, ProgressStatus, User, VerificationResult};
use crate::identity::SignInRequest;
use crate::sync::ProgressStats;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    Hint,
    Explain,
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    SignIn(SignInRequest),
    SignOut,
    Library {
        #[serde(default)]
        query: Option<String>,
    },
    SelectProblem {
        #[serde(rename = "problemId")]
        problem_id: String,
    },
    NewProblem {
        difficulty: Difficulty,
    },
    EditCode {
        code: String,
    },
    ResetCode,
    Submit,
    Chat {
        text: String,
    },
    QuickAction {
        action: QuickAction,
    },
    ClearChat,
    Stats,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthStateOut {
    SignedOut,
    Loading,
    SignedIn,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Auth {
        state: AuthStateOut,
        user: Option<User>,
    },
    AuthError {
        message: String,
    },
    Library {
        library: Vec<ProblemSummary>,
        history: Vec<ProblemSummary>,
    },
    /// Full session state after a problem becomes active or is restored.
    Session {
        problem: Problem,
        code: String,
        result: Option<VerificationResult>,
        chat: Vec<ChatMessage>,
        status: ProgressStatus,
        restored: bool,
    },
    Generating {
        active: bool,
    },
    Verifying {
        active: bool,
    },
    Verification {
        #[serde(rename = "problemId")]
        problem_id: String,
        result: VerificationResult,
    },
    CodeReset {
        code: String,
    },
    ChatMessage {
        #[serde(rename = "problemId")]
        problem_id: String,
        message: ChatMessage,
    },
    TutorTyping {
        active: bool,
    },
    ChatCleared,
    Progress {
        statuses: HashMap<String, ProgressStatus>,
        stats: ProgressStats,
    },
    Error {
        message: String,
    },
}

/// Sidebar entry: problem header plus the user's status on it.
#[derive(Debug, Serialize, PartialEq)]
pub struct ProblemSummary {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub status: ProgressStatus,
}

impl ProblemSummary {
    pub fn new(p: &Problem, status: ProgressStatus) -> Self {
        Self { id: p.id.clone(), title: p.title.clone(), difficulty: p.difficulty, status }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ProblemsQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    #[serde(default)]
    pub difficulty: Difficulty,
}
#[derive(Serialize)]
pub struct GenerateOut {
    pub problem: Problem,
    pub origin: ProblemOrigin,
}

/// Either a library id or an inline problem (for generated problems).
#[derive(Debug, Deserialize)]
pub struct ProblemRef {
    #[serde(default, rename = "problemId")]
    pub problem_id: Option<String>,
    #[serde(default)]
    pub problem: Option<Problem>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyIn {
    #[serde(flatten)]
    pub target: ProblemRef,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatIn {
    #[serde(flatten)]
    pub target: ProblemRef,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub message: String,
}
#[derive(Serialize)]
pub struct ChatOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub oracle: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
