//! Progress synchronizer: keeps session state, the in-process progress cache and
//! the remote progress store consistent across edits, logins and logouts.
//!
//! This module owns:
//!   - the progress cache (problem id -> `UserProgress`) of the signed-in user
//!   - derived stats (solved/attempted counts, recent activity)
//!   - the single pending debounced save
//!
//! Rules:
//!   - status never regresses: merges take `max(prior, computed)`
//!   - the cache is updated before the store write is issued; store writes are
//!     fire-and-forget and never roll the cache back
//!   - bulk-load swaps the whole cache at once; readers holding a snapshot keep
//!     seeing the complete previous map
//!   - at most one save is pending; a newer call replaces it, a context switch cancels it

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::catalog::greeting;
use crate::config::SyncCfg;
use crate::domain::{ChatMessage, Problem, ProgressStatus, User, UserProgress, VerificationResult};
use crate::store::{ProgressStore, StoreError};
use crate::util::now_millis;

pub type ProgressCache = HashMap<String, UserProgress>;

/// Status justified by the live verdict alone.
pub fn status_for_result(result: Option<&VerificationResult>) -> ProgressStatus {
    match result {
        Some(r) if r.is_correct => ProgressStatus::Solved,
        Some(_) => ProgressStatus::Attempted,
        None => ProgressStatus::Unseen,
    }
}

/// Monotonic merge. `Solved` can only come from `computed` or from `prior`.
pub fn merge_status(prior: Option<ProgressStatus>, computed: ProgressStatus) -> ProgressStatus {
    prior.map_or(computed, |p| p.max(computed))
}

/// Aggregates shown on the profile view.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub total_solved: usize,
    /// Records with status attempted or solved.
    pub total_attempted: usize,
    /// Solved over attempted, whole percent.
    pub solve_rate: u32,
    /// Most recent attempted or solved records, newest first.
    pub recent_activity: Vec<UserProgress>,
}

impl ProgressStats {
    pub fn compute(cache: &ProgressCache, recent_limit: usize) -> Self {
        let total_solved = cache.values().filter(|p| p.status == ProgressStatus::Solved).count();
        let total_attempted = cache.values().filter(|p| p.status >= ProgressStatus::Attempted).count();
        let solve_rate = if total_attempted == 0 {
            0
        } else {
            ((total_solved * 100 + total_attempted / 2) / total_attempted) as u32
        };

        // Unseen records (edits without a verdict) count as neither attempted nor recent.
        let mut recent: Vec<UserProgress> =
            cache.values().filter(|p| p.status >= ProgressStatus::Attempted).cloned().collect();
        // Ties broken by id so the order is stable across reloads.
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.problem_id.cmp(&b.problem_id)));
        recent.truncate(recent_limit);

        Self { total_solved, total_attempted, solve_rate, recent_activity: recent }
    }
}

/// Session state to install when a problem becomes active.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub code: String,
    pub result: Option<VerificationResult>,
    pub chat: Vec<ChatMessage>,
    /// True when taken from the cache rather than the problem defaults.
    pub restored: bool,
}

impl SessionSnapshot {
    /// Skeleton code, no verdict, one greeting.
    pub fn fresh(problem: &Problem) -> Self {
        Self {
            code: problem.initial_code.clone(),
            result: None,
            chat: vec![ChatMessage::tutor(greeting(problem))],
            restored: false,
        }
    }

    pub fn from_progress(p: &UserProgress) -> Self {
        Self {
            code: p.last_code.clone(),
            result: p.last_result.clone(),
            chat: p.chat_history.clone(),
            restored: true,
        }
    }
}

/// Debounce context. A pending save only ever commits under the key it was scheduled with.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SaveKey {
    pub user_id: String,
    pub problem_id: String,
}

#[derive(Debug)]
struct PendingSave {
    key: SaveKey,
    code: String,
    result: Option<VerificationResult>,
    chat: Vec<ChatMessage>,
    deadline: Instant,
}

/// Result of a partition read, tagged with the login it belongs to.
#[derive(Debug)]
pub struct LoadOutcome {
    epoch: u64,
    user_id: String,
    records: Result<ProgressCache, StoreError>,
}

impl LoadOutcome {
    pub fn user_id(&self) -> &str { &self.user_id }
}

pub struct ProgressSynchronizer {
    store: Arc<dyn ProgressStore>,
    cache: Arc<ProgressCache>,
    /// User the cache belongs to; `None` while signed out or loading.
    owner: Option<String>,
    stats: ProgressStats,
    pending: Option<PendingSave>,
    debounce: Duration,
    recent_limit: usize,
    /// Bumped on every login and logout; load outcomes from older epochs are dropped.
    epoch: u64,
}

impl ProgressSynchronizer {
    pub fn new(store: Arc<dyn ProgressStore>, cfg: &SyncCfg) -> Self {
        Self {
            store,
            cache: Arc::new(ProgressCache::new()),
            owner: None,
            stats: ProgressStats::default(),
            pending: None,
            debounce: cfg.debounce(),
            recent_limit: cfg.recent_limit,
            epoch: 0,
        }
    }

    // ---- reads ----

    /// Immutable snapshot of the cache. Never observes a half-applied load.
    pub fn cache(&self) -> Arc<ProgressCache> { self.cache.clone() }

    pub fn get(&self, problem_id: &str) -> Option<&UserProgress> { self.cache.get(problem_id) }

    pub fn status_of(&self, problem_id: &str) -> ProgressStatus {
        self.cache.get(problem_id).map(|p| p.status).unwrap_or_default()
    }

    pub fn status_map(&self) -> HashMap<String, ProgressStatus> {
        self.cache.iter().map(|(id, p)| (id.clone(), p.status)).collect()
    }

    pub fn stats(&self) -> &ProgressStats { &self.stats }

    pub fn owner(&self) -> Option<&str> { self.owner.as_deref() }

    pub fn has_pending(&self) -> bool { self.pending.is_some() }

    #[cfg(test)]
    pub fn pending_key(&self) -> Option<&SaveKey> { self.pending.as_ref().map(|p| &p.key) }

    /// When the pending save becomes due, if any.
    pub fn save_deadline(&self) -> Option<Instant> { self.pending.as_ref().map(|p| p.deadline) }

    // ---- bulk-load / logout ----

    /// Start a login: returns the partition read as a detached future so callers can
    /// keep serving input while it runs. Feed its output to `apply_load`.
    pub fn load_task(&mut self, user_id: &str) -> impl Future<Output = LoadOutcome> + Send + 'static {
        self.epoch += 1;
        let epoch = self.epoch;
        let store = self.store.clone();
        let user_id = user_id.to_string();
        async move {
            let records = store.list_all(&user_id).await;
            LoadOutcome { epoch, user_id, records }
        }
    }

    /// Install a finished read. Returns false if the outcome was stale and ignored.
    #[instrument(level = "info", skip(self, outcome), fields(user_id = %outcome.user_id))]
    pub fn apply_load(&mut self, outcome: LoadOutcome) -> bool {
        if outcome.epoch != self.epoch {
            debug!(target: "sync", epoch = outcome.epoch, current = self.epoch, "Dropping stale progress load");
            return false;
        }

        let cache = match outcome.records {
            Ok(records) => {
                info!(target: "sync", records = records.len(), "Progress cache loaded");
                records
            }
            Err(e) => {
                warn!(target: "sync", error = %e, "Progress load failed; continuing with empty history");
                ProgressCache::new()
            }
        };

        self.stats = ProgressStats::compute(&cache, self.recent_limit);
        self.cache = Arc::new(cache);
        self.owner = Some(outcome.user_id);
        true
    }

    /// Fetch the user's partition and replace the cache. Store failures degrade to an empty cache.
    #[cfg(test)]
    pub async fn bulk_load(&mut self, user_id: &str) {
        let task = self.load_task(user_id);
        let outcome = task.await;
        self.apply_load(outcome);
    }

    /// Upsert the user's profile document with the login time. Fire-and-forget.
    pub fn record_login(&self, user: &User) -> JoinHandle<()> {
        let store = self.store.clone();
        let user = user.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_user(&user, now_millis()).await {
                warn!(target: "sync", user_id = %user.id, error = %e, "Failed to record login");
            }
        })
    }

    /// Empty the cache and stats and drop any pending save. Synchronous.
    pub fn clear_on_logout(&mut self) {
        self.epoch += 1;
        if let Some(p) = self.pending.take() {
            debug!(target: "sync", problem_id = %p.key.problem_id, "Pending save dropped on logout");
        }
        self.cache = Arc::new(ProgressCache::new());
        self.stats = ProgressStats::default();
        self.owner = None;
    }

    // ---- selection ----

    /// Cached record wins over problem defaults. No remote fetch.
    pub fn reconcile_selection(&self, problem: &Problem) -> SessionSnapshot {
        match self.cache.get(&problem.id) {
            Some(p) => SessionSnapshot::from_progress(p),
            None => SessionSnapshot::fresh(problem),
        }
    }

    // ---- debounced save ----

    /// Replace the pending save with these values and restart the quiet window.
    #[instrument(level = "debug", skip(self, code, result, chat), fields(%user_id, %problem_id))]
    pub fn schedule_save(
        &mut self,
        user_id: &str,
        problem_id: &str,
        code: &str,
        result: Option<&VerificationResult>,
        chat: &[ChatMessage],
    ) {
        if self.owner.as_deref() != Some(user_id) {
            debug!(target: "sync", "Save ignored: cache does not belong to this user");
            return;
        }

        let key = SaveKey { user_id: user_id.to_string(), problem_id: problem_id.to_string() };
        if let Some(prev) = &self.pending {
            if prev.key != key {
                debug!(target: "sync", previous = %prev.key.problem_id, "Pending save for another problem cancelled");
            }
        }

        self.pending = Some(PendingSave {
            key,
            code: code.to_string(),
            result: result.cloned(),
            chat: chat.to_vec(),
            deadline: Instant::now() + self.debounce,
        });
    }

    /// Drop the pending save. Returns whether one existed.
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => {
                debug!(target: "sync", problem_id = %p.key.problem_id, "Pending save cancelled");
                true
            }
            None => false,
        }
    }

    /// Commit the pending save if its quiet window has elapsed.
    pub fn flush_due(&mut self) -> Option<JoinHandle<()>> {
        match &self.pending {
            Some(p) if p.deadline <= Instant::now() => {}
            _ => return None,
        }
        let pending = self.pending.take()?;
        self.commit(pending)
    }

    /// Commit the pending save regardless of its deadline.
    pub fn flush_now(&mut self) -> Option<JoinHandle<()>> {
        let pending = self.pending.take()?;
        self.commit(pending)
    }

    /// Merge into the cache, then issue the store write. The handle may be dropped.
    fn commit(&mut self, pending: PendingSave) -> Option<JoinHandle<()>> {
        let PendingSave { key, code, result, chat, .. } = pending;
        if self.owner.as_deref() != Some(key.user_id.as_str()) {
            debug!(target: "sync", problem_id = %key.problem_id, "Save dropped: owner changed");
            return None;
        }

        let prior = self.cache.get(&key.problem_id);
        let status = merge_status(prior.map(|p| p.status), status_for_result(result.as_ref()));

        if let Some(prior) = prior {
            let unchanged = prior.status == status
                && prior.last_code == code
                && prior.last_result == result
                && prior.chat_history == chat;
            if unchanged {
                debug!(target: "sync", problem_id = %key.problem_id, "Save skipped: record unchanged");
                return None;
            }
        }

        let progress = UserProgress {
            problem_id: key.problem_id.clone(),
            status,
            last_code: code,
            last_result: result,
            chat_history: chat,
            timestamp: now_millis(),
        };

        Arc::make_mut(&mut self.cache).insert(key.problem_id.clone(), progress.clone());
        self.stats = ProgressStats::compute(&self.cache, self.recent_limit);
        debug!(target: "sync", problem_id = %key.problem_id, ?status, "Progress committed to cache");

        let store = self.store.clone();
        let SaveKey { user_id, problem_id } = key;
        Some(tokio::spawn(async move {
            match store.put(&user_id, &progress).await {
                Ok(()) => debug!(target: "sync", %user_id, %problem_id, "Progress saved"),
                Err(e) => warn!(target: "sync", %user_id, %problem_id, error = %e, "Progress save failed; cache kept"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Difficulty;
    use crate::store::testing::RecordingStore;

    const U: &str = "u1";

    fn cfg() -> SyncCfg { SyncCfg { debounce_ms: 2000, recent_limit: 5 } }

    fn verdict(ok: bool) -> VerificationResult {
        VerificationResult { is_correct: ok, feedback: if ok { "pass" } else { "fail" }.into(), optimization_tips: None }
    }

    fn problem(id: &str) -> Problem {
        Problem {
            id: id.into(),
            title: format!("Problem {id}"),
            difficulty: Difficulty::Easy,
            description: "desc".into(),
            initial_code: format!("module {id}(); endmodule"),
        }
    }

    fn record(id: &str, status: ProgressStatus, ts: i64) -> UserProgress {
        UserProgress {
            problem_id: id.into(),
            status,
            last_code: "code".into(),
            last_result: None,
            chat_history: vec![],
            timestamp: ts,
        }
    }

    async fn signed_in(store: &RecordingStore) -> ProgressSynchronizer {
        let mut sync = ProgressSynchronizer::new(Arc::new(store.clone()), &cfg());
        sync.bulk_load(U).await;
        sync
    }

    /// Let the quiet window elapse and await the store write, if any.
    async fn settle(sync: &mut ProgressSynchronizer) -> bool {
        tokio::time::advance(Duration::from_millis(2000)).await;
        match sync.flush_due() {
            Some(h) => {
                h.await.unwrap();
                true
            }
            None => false,
        }
    }

    #[test]
    fn status_never_regresses_over_any_verdict_sequence() {
        let choices = [None, Some(false), Some(true)];
        for a in choices {
            for b in choices {
                for c in choices {
                    for d in choices {
                        let mut status: Option<ProgressStatus> = None;
                        for v in [a, b, c, d] {
                            let r = v.map(verdict);
                            let next = merge_status(status, status_for_result(r.as_ref()));
                            if let Some(prev) = status {
                                assert!(next >= prev, "{prev:?} -> {next:?}");
                            }
                            // Solved only when justified now or already earned.
                            if next == ProgressStatus::Solved {
                                assert!(v == Some(true) || status == Some(ProgressStatus::Solved));
                            }
                            status = Some(next);
                        }
                    }
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn calls_within_window_collapse_to_last() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;

        for i in 0..5 {
            sync.schedule_save(U, "p1", &format!("v{i}"), None, &[]);
            tokio::time::advance(Duration::from_millis(500)).await;
            assert!(sync.flush_due().is_none());
        }
        tokio::time::advance(Duration::from_millis(1499)).await;
        assert!(sync.flush_due().is_none());
        tokio::time::advance(Duration::from_millis(1)).await;
        sync.flush_due().expect("due").await.unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.last_code, "v4");
        assert!(!sync.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn identical_calls_write_once() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;
        let chat = vec![ChatMessage::user("hint?")];

        for _ in 0..3 {
            sync.schedule_save(U, "p1", "same", None, &chat);
        }
        assert!(settle(&mut sync).await);
        assert_eq!(store.write_count(), 1);

        // Same content again after the commit: nothing new to persist.
        sync.schedule_save(U, "p1", "same", None, &chat);
        assert!(!settle(&mut sync).await);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_updates_before_store_write() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;
        let r = verdict(true);

        sync.schedule_save(U, "p1", "x", Some(&r), &[]);
        tokio::time::advance(Duration::from_millis(2000)).await;
        let handle = sync.flush_due().unwrap();
        assert_eq!(sync.status_of("p1"), ProgressStatus::Solved);
        assert_eq!(sync.stats().total_solved, 1);
        handle.await.unwrap();
        assert_eq!(store.inner.get(U, "p1").await.unwrap().map(|p| p.status), Some(ProgressStatus::Solved));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_optimistic_cache() {
        let store = RecordingStore::new();
        store.fail_writes.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut sync = signed_in(&store).await;

        sync.schedule_save(U, "p1", "x", Some(&verdict(false)), &[]);
        assert!(settle(&mut sync).await);
        assert_eq!(store.write_count(), 1);
        assert_eq!(sync.status_of("p1"), ProgressStatus::Attempted);
        assert!(store.inner.get(U, "p1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_attempted_problem_keeps_attempted() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;
        let p = problem("p1");

        sync.schedule_save(U, "p1", "wrong", Some(&verdict(false)), &[]);
        settle(&mut sync).await;
        assert_eq!(sync.status_of("p1"), ProgressStatus::Attempted);

        // Reopen: state comes from the cache.
        let snap = sync.reconcile_selection(&p);
        assert!(snap.restored);
        assert_eq!(snap.code, "wrong");

        // Edit then reset without resubmitting: no verdict in the session.
        sync.schedule_save(U, "p1", &p.initial_code, None, &snap.chat);
        settle(&mut sync).await;
        assert_eq!(sync.status_of("p1"), ProgressStatus::Attempted);
        assert_eq!(store.writes().last().map(|w| w.1.status), Some(ProgressStatus::Attempted));
    }

    #[tokio::test(start_paused = true)]
    async fn solved_survives_incorrect_resubmission() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;

        sync.schedule_save(U, "p1", "good", Some(&verdict(true)), &[]);
        settle(&mut sync).await;
        sync.schedule_save(U, "p1", "broken", Some(&verdict(false)), &[]);
        settle(&mut sync).await;

        let rec = sync.get("p1").unwrap();
        assert_eq!(rec.status, ProgressStatus::Solved);
        assert_eq!(rec.last_code, "broken");
        assert!(store.writes().iter().all(|(_, p)| p.status == ProgressStatus::Solved));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_problem_cancels_previous_save() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;

        sync.schedule_save(U, "a", "code-a", None, &[]);
        tokio::time::advance(Duration::from_millis(1500)).await;
        // Session switches to b: cancels, then b's state is scheduled under b's key.
        assert!(sync.cancel_pending());
        sync.schedule_save(U, "b", "code-b", None, &[]);
        assert_eq!(sync.pending_key().map(|k| k.problem_id.as_str()), Some("b"));
        settle(&mut sync).await;

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.problem_id, "b");
        assert_eq!(writes[0].1.last_code, "code-b");
        assert!(sync.get("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_key_replaces_pending_save() {
        let store = RecordingStore::new();
        let mut sync = signed_in(&store).await;

        sync.schedule_save(U, "a", "code-a", None, &[]);
        sync.schedule_save(U, "b", "code-b", None, &[]);
        settle(&mut sync).await;
        assert!(store.writes().iter().all(|(_, p)| p.problem_id == "b"));
    }

    #[tokio::test]
    async fn bulk_load_swaps_whole_cache() {
        let store = RecordingStore::new();
        store.inner.put(U, &record("p1", ProgressStatus::Solved, 10)).await.unwrap();
        store.inner.put(U, &record("p2", ProgressStatus::Attempted, 20)).await.unwrap();
        store.inner.put("u2", &record("q1", ProgressStatus::Attempted, 5)).await.unwrap();

        let mut sync = ProgressSynchronizer::new(Arc::new(store.clone()), &cfg());
        let before = sync.cache();
        sync.bulk_load(U).await;
        let loaded = sync.cache();

        assert!(before.is_empty());
        assert_eq!(loaded.len(), 2);
        assert_eq!(sync.stats().total_solved, 1);
        assert_eq!(sync.stats().total_attempted, 2);
        assert_eq!(sync.stats().solve_rate, 50);

        // Switching user replaces wholesale; earlier snapshots stay intact.
        sync.clear_on_logout();
        sync.bulk_load("u2").await;
        assert_eq!(loaded.len(), 2);
        let now = sync.cache();
        let keys: Vec<&str> = now.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["q1"]);
        assert_eq!(sync.owner(), Some("u2"));
    }

    #[tokio::test]
    async fn load_failure_degrades_to_empty() {
        let store = RecordingStore::failing_reads();
        let mut sync = ProgressSynchronizer::new(Arc::new(store.clone()), &cfg());
        sync.bulk_load(U).await;

        assert_eq!(store.read_count(), 1);
        assert!(sync.cache().is_empty());
        assert_eq!(sync.stats(), &ProgressStats::default());
        // Still signed in: saves work against the empty cache.
        assert_eq!(sync.owner(), Some(U));
    }

    #[tokio::test]
    async fn logout_clears_before_next_read() {
        let store = RecordingStore::new();
        store.inner.put(U, &record("p1", ProgressStatus::Solved, 10)).await.unwrap();
        let mut sync = signed_in(&store).await;
        sync.schedule_save(U, "p1", "pending", None, &[]);

        sync.clear_on_logout();
        assert!(sync.cache().is_empty());
        assert_eq!(sync.stats(), &ProgressStats::default());
        assert!(!sync.has_pending());
        assert_eq!(sync.status_of("p1"), ProgressStatus::Unseen);

        // A signed-out session cannot schedule saves.
        sync.schedule_save(U, "p1", "late", None, &[]);
        assert!(!sync.has_pending());
    }

    #[tokio::test]
    async fn stale_load_is_ignored() {
        let store = RecordingStore::new();
        store.inner.put(U, &record("p1", ProgressStatus::Solved, 10)).await.unwrap();
        let mut sync = ProgressSynchronizer::new(Arc::new(store.clone()), &cfg());

        let task = sync.load_task(U);
        sync.clear_on_logout();
        let outcome = task.await;
        assert_eq!(outcome.user_id(), U);
        assert!(!sync.apply_load(outcome));
        assert!(sync.cache().is_empty());
        assert!(sync.owner().is_none());
    }

    #[test]
    fn recent_activity_is_newest_first_and_bounded() {
        let mut cache = ProgressCache::new();
        for i in 0..9 {
            let status = match i % 3 {
                0 => ProgressStatus::Solved,
                1 => ProgressStatus::Attempted,
                _ => ProgressStatus::Unseen,
            };
            cache.insert(format!("p{i}"), record(&format!("p{i}"), status, i as i64));
        }
        let stats = ProgressStats::compute(&cache, 5);
        let ids: Vec<_> = stats.recent_activity.iter().map(|p| p.problem_id.as_str()).collect();
        assert_eq!(ids, vec!["p7", "p6", "p4", "p3", "p1"]);
        assert!(stats.recent_activity.iter().all(|p| p.status != ProgressStatus::Unseen));
        assert_eq!(stats.total_solved, 3);
        assert_eq!(stats.total_attempted, 6);
        assert_eq!(stats.solve_rate, 50);
    }

    #[test]
    fn fresh_selection_uses_skeleton_and_greeting() {
        let p = problem("p9");
        let snap = SessionSnapshot::fresh(&p);
        assert_eq!(snap.code, p.initial_code);
        assert!(snap.result.is_none());
        assert_eq!(snap.chat.len(), 1);
        assert!(snap.chat[0].text.contains("Problem p9"));
        assert!(!snap.restored);
    }
}
