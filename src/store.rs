//! Progress Store: per-user document store for `UserProgress`.
//!
//! Logical schema is `users/{userId}/progress/{problemId}`, one document per
//! problem, partitioned per user. Two adapters:
//!   - `MemoryProgressStore`: process-local, lost on restart
//!   - `FsProgressStore`: one JSON file per document under a data directory
//!
//! Only the progress synchronizer writes through this trait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::{User, UserProgress};

/// Errors surfaced by store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
  #[error("invalid key: {0:?}")]
  InvalidKey(String),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Profile document kept next to the progress partition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileDoc {
  pub name: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<String>,
  pub last_login: i64,
}

impl UserProfileDoc {
  fn from_user(user: &User, last_login: i64) -> Self {
    Self {
      name: user.name.clone(),
      email: user.email.clone(),
      avatar_url: user.avatar_url.clone(),
      last_login,
    }
  }
}

/// Store contract for per-user progress documents.
#[async_trait]
pub trait ProgressStore: Send + Sync {
  /// Create or replace the document for `(user_id, progress.problem_id)`.
  async fn put(&self, user_id: &str, progress: &UserProgress) -> Result<(), StoreError>;

  /// Fetch a single document, `None` if absent.
  async fn get(&self, user_id: &str, problem_id: &str) -> Result<Option<UserProgress>, StoreError>;

  /// Every document of the user's partition keyed by problem id.
  async fn list_all(&self, user_id: &str) -> Result<HashMap<String, UserProgress>, StoreError>;

  /// Record the profile and last login time of a user.
  async fn touch_user(&self, user: &User, last_login: i64) -> Result<(), StoreError>;
}

/// Ids become path segments in `FsProgressStore`; the memory store applies the same rule
/// so both adapters accept exactly the same keys.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
  let ok = !key.is_empty()
    && !key.starts_with('.')
    && key.len() <= 128
    && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if ok { Ok(()) } else { Err(StoreError::InvalidKey(key.to_string())) }
}

#[derive(Default)]
struct Partition {
  profile: Option<UserProfileDoc>,
  progress: HashMap<String, UserProgress>,
}

/// In-memory adapter. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryProgressStore {
  users: Arc<Mutex<HashMap<String, Partition>>>,
}

impl MemoryProgressStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Partition>>, StoreError> {
    self.users.lock().map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
  }

  /// Profile document, if the user ever signed in.
  #[cfg(test)]
  pub fn profile(&self, user_id: &str) -> Option<UserProfileDoc> {
    self.lock().ok()?.get(user_id).and_then(|p| p.profile.clone())
  }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
  async fn put(&self, user_id: &str, progress: &UserProgress) -> Result<(), StoreError> {
    validate_key(user_id)?;
    validate_key(&progress.problem_id)?;
    let mut users = self.lock()?;
    users
      .entry(user_id.to_string())
      .or_default()
      .progress
      .insert(progress.problem_id.clone(), progress.clone());
    Ok(())
  }

  async fn get(&self, user_id: &str, problem_id: &str) -> Result<Option<UserProgress>, StoreError> {
    validate_key(user_id)?;
    validate_key(problem_id)?;
    let users = self.lock()?;
    Ok(users.get(user_id).and_then(|p| p.progress.get(problem_id).cloned()))
  }

  async fn list_all(&self, user_id: &str) -> Result<HashMap<String, UserProgress>, StoreError> {
    validate_key(user_id)?;
    let users = self.lock()?;
    Ok(users.get(user_id).map(|p| p.progress.clone()).unwrap_or_default())
  }

  async fn touch_user(&self, user: &User, last_login: i64) -> Result<(), StoreError> {
    validate_key(&user.id)?;
    let mut users = self.lock()?;
    let previous = users.entry(user.id.clone()).or_default().profile.replace(UserProfileDoc::from_user(user, last_login));
    debug!(target: "sync", user_id = %user.id, previous_login = ?previous.map(|p| p.last_login), "Profile touched");
    Ok(())
  }
}

/// Filesystem adapter:
///   `<root>/users/<userId>/profile.json`
///   `<root>/users/<userId>/progress/<problemId>.json`
#[derive(Clone, Debug)]
pub struct FsProgressStore {
  root: PathBuf,
}

impl FsProgressStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  fn user_dir(&self, user_id: &str) -> Result<PathBuf, StoreError> {
    validate_key(user_id)?;
    Ok(self.root.join("users").join(user_id))
  }

  fn progress_dir(&self, user_id: &str) -> Result<PathBuf, StoreError> {
    Ok(self.user_dir(user_id)?.join("progress"))
  }

  fn progress_path(&self, user_id: &str, problem_id: &str) -> Result<PathBuf, StoreError> {
    validate_key(problem_id)?;
    Ok(self.progress_dir(user_id)?.join(format!("{problem_id}.json")))
  }

  /// Write to a sibling temp file, then rename over the target so readers never see half a document.
  async fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
      let _ = tokio::fs::remove_file(&tmp).await;
      return Err(e.into());
    }
    Ok(())
  }
}

#[async_trait]
impl ProgressStore for FsProgressStore {
  #[instrument(level = "debug", skip(self, progress), fields(%user_id, problem_id = %progress.problem_id))]
  async fn put(&self, user_id: &str, progress: &UserProgress) -> Result<(), StoreError> {
    let path = self.progress_path(user_id, &progress.problem_id)?;
    Self::write_doc(&path, progress).await
  }

  #[instrument(level = "debug", skip(self))]
  async fn get(&self, user_id: &str, problem_id: &str) -> Result<Option<UserProgress>, StoreError> {
    let path = self.progress_path(user_id, problem_id)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_all(&self, user_id: &str) -> Result<HashMap<String, UserProgress>, StoreError> {
    let dir = self.progress_dir(user_id)?;
    let mut out = HashMap::new();
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
      Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      // One bad document must not hide the rest of the partition.
      let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
          warn!(target: "sync", path = %path.display(), error = %e, "Skipping unreadable progress document");
          continue;
        }
      };
      match serde_json::from_slice::<UserProgress>(&bytes) {
        Ok(p) => {
          out.insert(p.problem_id.clone(), p);
        }
        Err(e) => {
          warn!(target: "sync", path = %path.display(), error = %e, "Skipping corrupt progress document");
        }
      }
    }
    debug!(target: "sync", %user_id, records = out.len(), "Listed progress partition");
    Ok(out)
  }

  #[instrument(level = "debug", skip(self, user), fields(user_id = %user.id))]
  async fn touch_user(&self, user: &User, last_login: i64) -> Result<(), StoreError> {
    let path = self.user_dir(&user.id)?.join("profile.json");
    Self::write_doc(&path, &UserProfileDoc::from_user(user, last_login)).await
  }
}
