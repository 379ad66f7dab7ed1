//! Identity provider seam.
//!
//! A provider issues opaque user identities and publishes sign-in/sign-out
//! transitions on a `watch` channel. Subscribers observe the latest signed-in
//! user (or `None`); dropping the receiver unsubscribes.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::IdentityCfg;
use crate::domain::User;

/// Sign-in failures. Display text is shown to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
  #[error("Sign-in was cancelled. Please try again.")]
  PopupCancelled,

  #[error("The domain \"{0}\" is not authorized to sign in. Ask an administrator to add it to the allowed domains.")]
  DomainNotAuthorized(String),

  #[error("Sign-in is not enabled on this server. Enable it in the [identity] section of the configuration.")]
  ProviderMisconfigured,

  #[error("\"{0}\" is not a valid email address.")]
  InvalidEmail(String),
}

/// Credentials presented by the client.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
  #[serde(default)] pub name: String,
  #[serde(default)] pub email: String,
  #[serde(default)] pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
  async fn sign_in(&self, request: SignInRequest) -> Result<User, AuthError>;

  async fn sign_out(&self) -> Result<(), AuthError>;

  /// Current identity and every later transition.
  fn subscribe(&self) -> watch::Receiver<Option<User>>;
}

/// Self-hosted provider: trusts the presented email, subject to the allowed-domain list.
/// One instance per client session.
pub struct LocalIdentity {
  cfg: IdentityCfg,
  tx: watch::Sender<Option<User>>,
}

impl LocalIdentity {
  pub fn new(cfg: IdentityCfg) -> Self {
    let (tx, _rx) = watch::channel(None);
    Self { cfg, tx }
  }

  pub fn current(&self) -> Option<User> { self.tx.borrow().clone() }

  /// Stable id: the same email always maps to the same user partition.
  pub fn user_id_for(email: &str) -> String {
    let key = format!("mailto:{}", email.trim().to_lowercase());
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
  }

  fn check(&self, request: &SignInRequest) -> Result<User, AuthError> {
    if !self.cfg.enabled {
      return Err(AuthError::ProviderMisconfigured);
    }
    let email = request.email.trim();
    if email.is_empty() {
      return Err(AuthError::PopupCancelled);
    }
    let domain = match email.rsplit_once('@') {
      Some((local, domain)) if !local.is_empty() && domain.contains('.') => domain.to_lowercase(),
      _ => return Err(AuthError::InvalidEmail(email.to_string())),
    };
    if !self.cfg.allowed_domains.is_empty()
      && !self.cfg.allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(&domain))
    {
      return Err(AuthError::DomainNotAuthorized(domain));
    }

    let name = request.name.trim();
    Ok(User {
      id: Self::user_id_for(email),
      name: if name.is_empty() { "User".into() } else { name.to_string() },
      email: email.to_string(),
      avatar_url: request.avatar_url.clone().filter(|u| !u.trim().is_empty()),
    })
  }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
  #[instrument(level = "info", skip(self, request), fields(email_len = request.email.len()))]
  async fn sign_in(&self, request: SignInRequest) -> Result<User, AuthError> {
    match self.check(&request) {
      Ok(user) => {
        info!(target: "session", user_id = %user.id, "Signed in");
        self.tx.send_replace(Some(user.clone()));
        Ok(user)
      }
      Err(e) => {
        warn!(target: "session", error = %e, "Sign-in rejected");
        Err(e)
      }
    }
  }

  #[instrument(level = "info", skip(self))]
  async fn sign_out(&self) -> Result<(), AuthError> {
    if let Some(prev) = self.tx.send_replace(None) {
      info!(target: "session", user_id = %prev.id, "Signed out");
    }
    Ok(())
  }

  fn subscribe(&self) -> watch::Receiver<Option<User>> { self.tx.subscribe() }
}
