//! Session controller: one interactive practice session per WebSocket connection.
//!
//! The session owns the active problem, the editor buffer, the last verdict, the
//! tutor transcript and the generated-problem history. It drives the progress
//! synchronizer: every user change to code, verdict or chat schedules a save, and
//! identity transitions go through an explicit `AuthPhase` state machine.
//!
//! Slow work (oracle calls, the progress read on login) is spawned and reports
//! back as a `SessionEvent` on the session's channel, so the connection loop keeps
//! serving input while it runs. Every handler returns the messages to send.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::catalog::filter_problems;
use crate::domain::{ChatMessage, Difficulty, Problem, ProblemOrigin, User, VerificationResult};
use crate::identity::{IdentityProvider, SignInRequest};
use crate::logic::{self, generated_id, EXPLAIN_PROMPT, HINT_PROMPT};
use crate::protocol::{AuthStateOut, ClientWsMessage, ProblemSummary, QuickAction, ServerWsMessage};
use crate::state::AppState;
use crate::sync::{LoadOutcome, ProgressSynchronizer, SessionSnapshot};

/// Where the session stands with respect to identity.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthPhase {
  SignedOut,
  /// Signed in, progress read still in flight.
  Loading(User),
  SignedIn(User),
}

impl AuthPhase {
  pub fn user(&self) -> Option<&User> {
    match self {
      AuthPhase::SignedOut => None,
      AuthPhase::Loading(u) | AuthPhase::SignedIn(u) => Some(u),
    }
  }

  fn wire(&self) -> AuthStateOut {
    match self {
      AuthPhase::SignedOut => AuthStateOut::SignedOut,
      AuthPhase::Loading(_) => AuthStateOut::Loading,
      AuthPhase::SignedIn(_) => AuthStateOut::SignedIn,
    }
  }
}

/// Completions of spawned work. `ticket` identifies the request that produced it.
#[derive(Debug)]
pub enum SessionEvent {
  Loaded(LoadOutcome),
  Verified { ticket: u64, problem_id: String, result: VerificationResult },
  TutorReplied { ticket: u64, problem_id: String, text: String },
  Generated { ticket: u64, problem: Problem, origin: ProblemOrigin },
}

pub struct Session {
  state: Arc<AppState>,
  identity: Arc<dyn IdentityProvider>,
  sync: ProgressSynchronizer,
  events: mpsc::UnboundedSender<SessionEvent>,

  auth: AuthPhase,
  active: Option<Problem>,
  code: String,
  result: Option<VerificationResult>,
  chat: Vec<ChatMessage>,
  /// Generated problems, oldest first. Append-only for the session's lifetime.
  history: Vec<Problem>,

  // In-flight requests; `None` when idle.
  verifying: Option<u64>,
  chatting: Option<u64>,
  generating: Option<u64>,
  next_ticket: u64,
}

impl Session {
  pub fn new(
    state: Arc<AppState>,
    identity: Arc<dyn IdentityProvider>,
    events: mpsc::UnboundedSender<SessionEvent>,
  ) -> Self {
    let sync = ProgressSynchronizer::new(state.store.clone(), &state.sync);
    Self {
      state,
      identity,
      sync,
      events,
      auth: AuthPhase::SignedOut,
      active: None,
      code: String::new(),
      result: None,
      chat: Vec::new(),
      history: Vec::new(),
      verifying: None,
      chatting: None,
      generating: None,
      next_ticket: 0,
    }
  }

  /// Deadline of the pending debounced save, for the connection loop's timer.
  pub fn save_deadline(&self) -> Option<Instant> { self.sync.save_deadline() }

  // ---- client messages ----

  #[instrument(level = "debug", skip_all)]
  pub async fn handle_client(&mut self, msg: ClientWsMessage) -> Vec<ServerWsMessage> {
    match msg {
      ClientWsMessage::Ping => vec![ServerWsMessage::Pong],
      ClientWsMessage::SignIn(request) => self.sign_in(request).await,
      ClientWsMessage::SignOut => self.sign_out().await,
      ClientWsMessage::Library { query } => vec![self.library(query.as_deref().unwrap_or(""))],
      ClientWsMessage::SelectProblem { problem_id } => self.select_problem(&problem_id),
      ClientWsMessage::NewProblem { difficulty } => self.new_problem(difficulty),
      ClientWsMessage::EditCode { code } => self.edit_code(code),
      ClientWsMessage::ResetCode => self.reset_code(),
      ClientWsMessage::Submit => self.submit(),
      ClientWsMessage::Chat { text } => self.send_chat(text),
      ClientWsMessage::QuickAction { action } => {
        let prompt = match action {
          QuickAction::Hint => HINT_PROMPT,
          QuickAction::Explain => EXPLAIN_PROMPT,
        };
        self.send_chat(prompt.to_string())
      }
      ClientWsMessage::ClearChat => self.clear_chat(),
      ClientWsMessage::Stats => vec![self.progress()],
    }
  }

  // The transition is applied before the next message is handled. The provider's
  // watch notification for the same value arrives later and is a no-op.
  async fn sign_in(&mut self, request: SignInRequest) -> Vec<ServerWsMessage> {
    match self.identity.sign_in(request).await {
      Ok(user) => self.handle_auth(Some(user)),
      Err(e) => vec![ServerWsMessage::AuthError { message: e.to_string() }],
    }
  }

  async fn sign_out(&mut self) -> Vec<ServerWsMessage> {
    match self.identity.sign_out().await {
      Ok(()) => self.handle_auth(None),
      Err(e) => vec![ServerWsMessage::AuthError { message: e.to_string() }],
    }
  }

  fn library(&self, query: &str) -> ServerWsMessage {
    let summarize = |p: &Problem| ProblemSummary::new(p, self.sync.status_of(&p.id));
    ServerWsMessage::Library {
      library: self.state.catalog.search(query).iter().map(summarize).collect(),
      history: filter_problems(&self.history, query, false).iter().map(summarize).collect(),
    }
  }

  fn find_problem(&self, id: &str) -> Option<Problem> {
    self
      .state
      .problem(id)
      .or_else(|| self.history.iter().find(|p| p.id == id).cloned())
  }

  #[instrument(level = "info", skip(self), fields(%problem_id))]
  fn select_problem(&mut self, problem_id: &str) -> Vec<ServerWsMessage> {
    if self.active.as_ref().is_some_and(|p| p.id == problem_id) {
      return vec![];
    }
    let Some(problem) = self.find_problem(problem_id) else {
      warn!(target: "session", "Unknown problem selected");
      return vec![ServerWsMessage::Error { message: format!("Unknown problem: {problem_id}") }];
    };
    self.sync.cancel_pending();
    vec![self.activate(problem)]
  }

  /// Make `problem` active and install its reconciled state. Does not schedule a save.
  fn activate(&mut self, problem: Problem) -> ServerWsMessage {
    let snapshot = self.sync.reconcile_selection(&problem);
    debug!(target: "session", problem_id = %problem.id, restored = snapshot.restored, "Problem activated");
    self.verifying = None;
    self.chatting = None;
    self.active = Some(problem);
    self.install(snapshot)
  }

  fn install(&mut self, snapshot: SessionSnapshot) -> ServerWsMessage {
    let SessionSnapshot { code, result, chat, restored } = snapshot;
    self.code = code;
    self.result = result;
    self.chat = chat;
    self.session_message(restored)
  }

  fn session_message(&self, restored: bool) -> ServerWsMessage {
    match &self.active {
      Some(problem) => ServerWsMessage::Session {
        problem: problem.clone(),
        code: self.code.clone(),
        result: self.result.clone(),
        chat: self.chat.clone(),
        status: self.sync.status_of(&problem.id),
        restored,
      },
      None => no_active_problem(),
    }
  }

  #[instrument(level = "info", skip(self), fields(%difficulty))]
  fn new_problem(&mut self, difficulty: Difficulty) -> Vec<ServerWsMessage> {
    if self.generating.is_some() {
      return vec![ServerWsMessage::Error { message: "A problem is already being generated.".into() }];
    }
    let ticket = self.ticket();
    self.generating = Some(ticket);

    let state = self.state.clone();
    let events = self.events.clone();
    tokio::spawn(async move {
      let (problem, origin) = logic::generate_problem(&state, difficulty).await;
      let _ = events.send(SessionEvent::Generated { ticket, problem, origin });
    });
    vec![ServerWsMessage::Generating { active: true }]
  }

  fn edit_code(&mut self, code: String) -> Vec<ServerWsMessage> {
    if self.active.is_none() {
      return vec![no_active_problem()];
    }
    self.code = code;
    self.schedule_save();
    vec![]
  }

  fn reset_code(&mut self) -> Vec<ServerWsMessage> {
    let Some(problem) = &self.active else {
      return vec![no_active_problem()];
    };
    self.code = problem.initial_code.clone();
    self.result = None;
    self.schedule_save();
    vec![ServerWsMessage::CodeReset { code: self.code.clone() }]
  }

  fn clear_chat(&mut self) -> Vec<ServerWsMessage> {
    if self.active.is_none() {
      return vec![no_active_problem()];
    }
    self.chat.clear();
    self.schedule_save();
    vec![ServerWsMessage::ChatCleared]
  }

  fn submit(&mut self) -> Vec<ServerWsMessage> {
    let Some(problem) = self.active.clone() else {
      return vec![no_active_problem()];
    };
    if self.verifying.is_some() {
      return vec![ServerWsMessage::Error { message: "A verification is already in progress.".into() }];
    }
    let ticket = self.ticket();
    self.verifying = Some(ticket);
    info!(target: "session", problem_id = %problem.id, code_len = self.code.len(), "Submission sent for grading");

    let state = self.state.clone();
    let events = self.events.clone();
    let code = self.code.clone();
    tokio::spawn(async move {
      let result = logic::verify_solution(&state, &problem, &code).await;
      let _ = events.send(SessionEvent::Verified { ticket, problem_id: problem.id, result });
    });
    vec![ServerWsMessage::Verifying { active: true }]
  }

  fn send_chat(&mut self, text: String) -> Vec<ServerWsMessage> {
    let Some(problem) = self.active.clone() else {
      return vec![no_active_problem()];
    };
    if text.trim().is_empty() {
      return vec![ServerWsMessage::Error { message: "Message is empty.".into() }];
    }
    if self.chatting.is_some() {
      return vec![ServerWsMessage::Error { message: "The tutor is still answering.".into() }];
    }

    let history = self.chat.clone();
    let message = ChatMessage::user(text.clone());
    self.chat.push(message.clone());
    self.schedule_save();

    let ticket = self.ticket();
    self.chatting = Some(ticket);
    let state = self.state.clone();
    let events = self.events.clone();
    let code = self.code.clone();
    let problem_id = problem.id.clone();
    tokio::spawn(async move {
      let text = logic::tutor_reply(&state, &history, &problem, &code, &text).await;
      let _ = events.send(SessionEvent::TutorReplied { ticket, problem_id: problem.id, text });
    });

    vec![
      ServerWsMessage::ChatMessage { problem_id, message },
      ServerWsMessage::TutorTyping { active: true },
    ]
  }

  // ---- identity transitions ----

  /// Apply the identity provider's latest value.
  #[instrument(level = "info", skip_all, fields(user_id = user.as_ref().map(|u| u.id.as_str()).unwrap_or("-")))]
  pub fn handle_auth(&mut self, user: Option<User>) -> Vec<ServerWsMessage> {
    match user {
      None => {
        if self.auth == AuthPhase::SignedOut {
          return vec![];
        }
        self.sync.clear_on_logout();
        self.auth = AuthPhase::SignedOut;
        info!(target: "session", "Session signed out; progress cleared");
        vec![self.auth_message(), self.progress()]
      }
      Some(user) => {
        if self.auth.user().is_some_and(|u| u.id == user.id) {
          return vec![];
        }
        if self.auth != AuthPhase::SignedOut {
          self.sync.clear_on_logout();
        }

        let load = self.sync.load_task(&user.id);
        let events = self.events.clone();
        tokio::spawn(async move {
          let _ = events.send(SessionEvent::Loaded(load.await));
        });
        drop(self.sync.record_login(&user));

        info!(target: "session", "Loading progress");
        self.auth = AuthPhase::Loading(user);
        vec![self.auth_message()]
      }
    }
  }

  fn auth_message(&self) -> ServerWsMessage {
    ServerWsMessage::Auth { state: self.auth.wire(), user: self.auth.user().cloned() }
  }

  // ---- completions ----

  pub fn handle_event(&mut self, event: SessionEvent) -> Vec<ServerWsMessage> {
    match event {
      SessionEvent::Loaded(outcome) => self.on_loaded(outcome),
      SessionEvent::Verified { ticket, problem_id, result } => self.on_verified(ticket, problem_id, result),
      SessionEvent::TutorReplied { ticket, problem_id, text } => self.on_tutor_reply(ticket, problem_id, text),
      SessionEvent::Generated { ticket, problem, origin } => self.on_generated(ticket, problem, origin),
    }
  }

  fn on_loaded(&mut self, outcome: LoadOutcome) -> Vec<ServerWsMessage> {
    let user = match &self.auth {
      AuthPhase::Loading(u) if u.id == outcome.user_id() => u.clone(),
      _ => {
        debug!(target: "session", user_id = %outcome.user_id(), "Progress load for an inactive login ignored");
        return vec![];
      }
    };
    if !self.sync.apply_load(outcome) {
      return vec![];
    }
    self.auth = AuthPhase::SignedIn(user);

    let mut out = vec![self.auth_message(), self.progress()];
    let cached = self.active.as_ref().filter(|p| self.sync.get(&p.id).is_some()).cloned();
    if let Some(problem) = cached {
      let snapshot = self.sync.reconcile_selection(&problem);
      out.push(self.install(snapshot));
    }
    out
  }

  fn on_verified(&mut self, ticket: u64, problem_id: String, result: VerificationResult) -> Vec<ServerWsMessage> {
    if self.verifying != Some(ticket) || !self.is_active(&problem_id) {
      debug!(target: "session", %problem_id, "Stale verdict discarded");
      return vec![];
    }
    self.verifying = None;
    info!(target: "session", %problem_id, is_correct = result.is_correct, "Verdict received");
    self.result = Some(result.clone());
    self.schedule_save();
    vec![
      ServerWsMessage::Verifying { active: false },
      ServerWsMessage::Verification { problem_id, result },
    ]
  }

  fn on_tutor_reply(&mut self, ticket: u64, problem_id: String, text: String) -> Vec<ServerWsMessage> {
    if self.chatting != Some(ticket) || !self.is_active(&problem_id) {
      debug!(target: "session", %problem_id, "Stale tutor reply discarded");
      return vec![];
    }
    self.chatting = None;
    let message = ChatMessage::tutor(text);
    self.chat.push(message.clone());
    self.schedule_save();
    vec![
      ServerWsMessage::ChatMessage { problem_id, message },
      ServerWsMessage::TutorTyping { active: false },
    ]
  }

  fn on_generated(&mut self, ticket: u64, mut problem: Problem, origin: ProblemOrigin) -> Vec<ServerWsMessage> {
    if self.generating != Some(ticket) {
      return vec![];
    }
    self.generating = None;
    problem.id = generated_id(|id| self.find_problem(id).is_some());
    info!(target: "problem", id = %problem.id, %origin, "Problem added to session history");
    self.history.push(problem.clone());

    self.sync.cancel_pending();
    let session = self.activate(problem);
    vec![ServerWsMessage::Generating { active: false }, self.library(""), session]
  }

  // ---- persistence ----

  /// Commit the pending save if due. The store write is detached.
  pub fn on_save_deadline(&mut self) -> Vec<ServerWsMessage> {
    match self.sync.flush_due() {
      Some(_write) => vec![self.progress()],
      None => vec![],
    }
  }

  /// Connection is closing: commit whatever is pending right away.
  pub fn shutdown(&mut self) {
    if !self.sync.has_pending() {
      return;
    }
    if self.sync.flush_now().is_some() {
      debug!(target: "session", "Pending save flushed on disconnect");
    }
  }

  fn schedule_save(&mut self) {
    let (AuthPhase::SignedIn(user), Some(problem)) = (&self.auth, &self.active) else {
      return;
    };
    self.sync.schedule_save(&user.id, &problem.id, &self.code, self.result.as_ref(), &self.chat);
  }

  fn progress(&self) -> ServerWsMessage {
    ServerWsMessage::Progress { statuses: self.sync.status_map(), stats: self.sync.stats().clone() }
  }

  fn is_active(&self, problem_id: &str) -> bool {
    self.active.as_ref().is_some_and(|p| p.id == problem_id)
  }

  fn ticket(&mut self) -> u64 {
    self.next_ticket += 1;
    self.next_ticket
  }
}

fn no_active_problem() -> ServerWsMessage {
  ServerWsMessage::Error { message: "No problem is active.".into() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  use crate::config::{AppConfig, IdentityCfg};
  use crate::domain::{ProgressStatus, UserProgress};
  use crate::identity::LocalIdentity;
  use crate::store::testing::RecordingStore;
  use crate::store::ProgressStore;

  struct Harness {
    session: Session,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    store: RecordingStore,
  }

  fn harness() -> Harness {
    let store = RecordingStore::new();
    let state = AppState::from_config(AppConfig::default(), None).with_store(Arc::new(store.clone()));
    let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentity::new(IdentityCfg::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    Harness { session: Session::new(Arc::new(state), identity, tx), events: rx, store }
  }

  fn ada() -> User {
    User { id: "ada".into(), name: "Ada".into(), email: "ada@lab.org".into(), avatar_url: None }
  }

  fn grace() -> User {
    User { id: "grace".into(), name: "Grace".into(), email: "grace@lab.org".into(), avatar_url: None }
  }

  impl Harness {
    async fn next_event(&mut self) -> SessionEvent {
      self.events.recv().await.expect("event channel closed")
    }

    async fn sign_in(&mut self, user: User) {
      self.session.handle_auth(Some(user));
      let loaded = self.next_event().await;
      self.session.handle_event(loaded);
    }

    async fn select(&mut self, id: &str) {
      self.session.handle_client(ClientWsMessage::SelectProblem { problem_id: id.into() }).await;
    }
  }

  #[tokio::test]
  async fn sign_in_moves_through_loading_to_signed_in() {
    let mut h = harness();
    let out = h.session.handle_auth(Some(ada()));
    assert_eq!(h.session.auth, AuthPhase::Loading(ada()));
    assert_eq!(out, vec![ServerWsMessage::Auth { state: AuthStateOut::Loading, user: Some(ada()) }]);

    // Same user again is ignored.
    assert!(h.session.handle_auth(Some(ada())).is_empty());

    let loaded = h.next_event().await;
    let out = h.session.handle_event(loaded);
    assert_eq!(h.session.auth, AuthPhase::SignedIn(ada()));
    assert!(matches!(out[0], ServerWsMessage::Auth { state: AuthStateOut::SignedIn, .. }));

    h.session.handle_auth(None);
    assert_eq!(h.session.auth, AuthPhase::SignedOut);
    assert!(h.session.sync.owner().is_none());
  }

  #[tokio::test]
  async fn switching_user_mid_load_drops_the_first_read() {
    let mut h = harness();
    h.session.handle_auth(Some(ada()));
    h.session.handle_auth(Some(grace()));
    assert_eq!(h.session.auth, AuthPhase::Loading(grace()));

    // Both reads complete; only Grace's is installed.
    for _ in 0..2 {
      let ev = h.next_event().await;
      h.session.handle_event(ev);
    }
    assert_eq!(h.session.auth, AuthPhase::SignedIn(grace()));
    assert_eq!(h.session.sync.owner(), Some("grace"));
  }

  #[tokio::test]
  async fn completed_load_restores_the_active_problem() {
    let mut h = harness();
    let record = UserProgress {
      problem_id: "static-mux2".into(),
      status: ProgressStatus::Attempted,
      last_code: "module mux2(); // wip".into(),
      last_result: None,
      chat_history: vec![],
      timestamp: 1,
    };
    h.store.inner.put("ada", &record).await.unwrap();

    h.select("static-mux2").await;
    assert_ne!(h.session.code, record.last_code);

    h.sign_in(ada()).await;
    assert_eq!(h.session.code, record.last_code);
    assert!(h.session.chat.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn sign_out_clears_progress_before_the_next_message() {
    let mut h = harness();
    let out = h
      .session
      .handle_client(ClientWsMessage::SignIn(SignInRequest { email: "ada@lab.org".into(), ..Default::default() }))
      .await;
    assert!(matches!(&out[..], [ServerWsMessage::Auth { state: AuthStateOut::Loading, .. }]));
    let loaded = h.next_event().await;
    h.session.handle_event(loaded);

    h.select("static-mux2").await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "x".into() }).await;
    tokio::time::advance(Duration::from_millis(2000)).await;
    h.session.on_save_deadline();
    assert_eq!(h.session.sync.stats().recent_activity.len(), 0);
    assert_eq!(h.session.sync.status_map().len(), 1);

    let out = h.session.handle_client(ClientWsMessage::SignOut).await;
    assert_eq!(out[0], ServerWsMessage::Auth { state: AuthStateOut::SignedOut, user: None });
    let out = h.session.handle_client(ClientWsMessage::Stats).await;
    assert_eq!(
      out,
      vec![ServerWsMessage::Progress { statuses: Default::default(), stats: Default::default() }]
    );
  }

  #[tokio::test]
  async fn sign_out_then_sign_in_as_same_user_reloads() {
    let mut h = harness();
    let request = SignInRequest { email: "ada@lab.org".into(), ..Default::default() };
    h.session.handle_client(ClientWsMessage::SignIn(request.clone())).await;
    let loaded = h.next_event().await;
    h.session.handle_event(loaded);
    let reads = h.store.read_count();

    h.session.handle_client(ClientWsMessage::SignOut).await;
    h.session.handle_client(ClientWsMessage::SignIn(request)).await;
    assert!(matches!(h.session.auth, AuthPhase::Loading(_)));
    let loaded = h.next_event().await;
    h.session.handle_event(loaded);
    assert!(matches!(h.session.auth, AuthPhase::SignedIn(_)));
    assert_eq!(h.store.read_count(), reads + 1);

    // The provider's later notification for the same user changes nothing.
    let current = h.session.identity.subscribe().borrow().clone();
    assert!(h.session.handle_auth(current).is_empty());
  }

  #[tokio::test]
  async fn sign_in_errors_are_reported_to_the_client() {
    let mut h = harness();
    let out = h
      .session
      .handle_client(ClientWsMessage::SignIn(SignInRequest { email: "not-an-email".into(), ..Default::default() }))
      .await;
    assert!(matches!(&out[..], [ServerWsMessage::AuthError { .. }]));
    assert_eq!(h.session.auth, AuthPhase::SignedOut);
  }

  #[tokio::test]
  async fn fresh_selection_installs_skeleton_and_greeting() {
    let mut h = harness();
    let out = h.session.handle_client(ClientWsMessage::SelectProblem { problem_id: "static-mux2".into() }).await;
    let problem = h.session.active.as_ref().cloned().unwrap();
    assert_eq!(h.session.code, problem.initial_code);
    assert_eq!(h.session.chat.len(), 1);
    assert!(matches!(&out[..], [ServerWsMessage::Session { restored: false, .. }]));

    // Re-selecting the active problem is a no-op.
    h.session.handle_client(ClientWsMessage::EditCode { code: "edited".into() }).await;
    h.select("static-mux2").await;
    assert_eq!(h.session.code, "edited");
  }

  #[tokio::test]
  async fn unknown_problem_is_an_error() {
    let mut h = harness();
    let out = h.session.handle_client(ClientWsMessage::SelectProblem { problem_id: "nope".into() }).await;
    assert!(matches!(&out[..], [ServerWsMessage::Error { .. }]));
    assert!(h.session.active.as_ref().is_none());
  }

  #[tokio::test]
  async fn edits_schedule_saves_only_while_signed_in() {
    let mut h = harness();
    h.select("static-mux2").await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "a".into() }).await;
    assert!(h.session.save_deadline().is_none());

    h.sign_in(ada()).await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "b".into() }).await;
    let key = h.session.sync.pending_key().cloned().unwrap();
    assert_eq!((key.user_id.as_str(), key.problem_id.as_str()), ("ada", "static-mux2"));
  }

  #[tokio::test]
  async fn selection_alone_does_not_schedule_a_save() {
    let mut h = harness();
    h.sign_in(ada()).await;
    h.select("static-mux2").await;
    assert!(h.session.save_deadline().is_none());
  }

  #[tokio::test]
  async fn switching_problems_cancels_the_pending_save() {
    let mut h = harness();
    h.sign_in(ada()).await;
    h.select("static-mux2").await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "a".into() }).await;
    assert!(h.session.save_deadline().is_some());

    h.select("static-dff").await;
    assert!(h.session.save_deadline().is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn debounced_edit_commits_once_deadline_passes() {
    let mut h = harness();
    h.sign_in(ada()).await;
    h.select("static-mux2").await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "a".into() }).await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "ab".into() }).await;

    assert!(h.session.on_save_deadline().is_empty());
    tokio::time::advance(Duration::from_millis(2000)).await;
    let out = h.session.on_save_deadline();
    assert!(matches!(&out[..], [ServerWsMessage::Progress { .. }]));

    let cached = h.session.sync.get("static-mux2").unwrap();
    assert_eq!(cached.last_code, "ab");
    assert_eq!(cached.status, ProgressStatus::Unseen);
  }

  #[tokio::test]
  async fn duplicate_submit_is_rejected() {
    let mut h = harness();
    h.select("static-mux2").await;
    let first = h.session.handle_client(ClientWsMessage::Submit).await;
    assert_eq!(first, vec![ServerWsMessage::Verifying { active: true }]);
    let second = h.session.handle_client(ClientWsMessage::Submit).await;
    assert!(matches!(&second[..], [ServerWsMessage::Error { .. }]));

    let ev = h.next_event().await;
    let out = h.session.handle_event(ev);
    assert_eq!(out[0], ServerWsMessage::Verifying { active: false });
    assert!(h.session.result.as_ref().is_some_and(|r| !r.is_correct));
  }

  #[tokio::test]
  async fn verdict_for_a_previous_problem_is_discarded() {
    let mut h = harness();
    h.select("static-mux2").await;
    h.session.handle_client(ClientWsMessage::Submit).await;
    h.select("static-dff").await;

    let ev = h.next_event().await;
    assert!(h.session.handle_event(ev).is_empty());
    assert!(h.session.result.as_ref().is_none());
  }

  #[tokio::test]
  async fn chat_appends_user_message_then_tutor_reply() {
    let mut h = harness();
    h.select("static-mux2").await;
    let out = h.session.handle_client(ClientWsMessage::QuickAction { action: QuickAction::Hint }).await;
    assert_eq!(out.len(), 2);
    assert_eq!(h.session.chat.last().unwrap().text, HINT_PROMPT);

    let busy = h.session.handle_client(ClientWsMessage::Chat { text: "again".into() }).await;
    assert!(matches!(&busy[..], [ServerWsMessage::Error { .. }]));

    let ev = h.next_event().await;
    h.session.handle_event(ev);
    assert_eq!(h.session.chat.len(), 3);
    assert_eq!(h.session.chat[2].role, crate::domain::ChatRole::Tutor);
  }

  #[tokio::test]
  async fn reset_and_clear_restore_defaults() {
    let mut h = harness();
    h.select("static-mux2").await;
    let skeleton = h.session.active.as_ref().unwrap().initial_code.clone();
    h.session.handle_client(ClientWsMessage::EditCode { code: "x".into() }).await;
    h.session.handle_client(ClientWsMessage::ResetCode).await;
    assert_eq!(h.session.code, skeleton);
    assert!(h.session.result.as_ref().is_none());

    h.session.handle_client(ClientWsMessage::ClearChat).await;
    assert!(h.session.chat.is_empty());
  }

  #[tokio::test]
  async fn generated_problem_joins_history_and_becomes_active() {
    let mut h = harness();
    h.session.handle_client(ClientWsMessage::NewProblem { difficulty: Difficulty::Medium }).await;
    let ev = h.next_event().await;
    h.session.handle_event(ev);

    assert_eq!(h.session.history.len(), 1);
    let generated = &h.session.history[0];
    assert!(!generated.id.is_empty());
    assert_eq!(h.session.active.as_ref().map(|p| p.id.as_str()), Some(generated.id.as_str()));
    assert_eq!(h.session.code, generated.initial_code);
  }

  #[tokio::test]
  async fn logout_drops_pending_save_without_writing() {
    let mut h = harness();
    h.sign_in(ada()).await;
    h.select("static-mux2").await;
    h.session.handle_client(ClientWsMessage::EditCode { code: "a".into() }).await;
    h.session.handle_auth(None);
    assert!(h.session.save_deadline().is_none());
    h.session.shutdown();
    assert_eq!(h.store.write_count(), 0);
  }
}
