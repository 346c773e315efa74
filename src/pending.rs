//! Open runs waiting for their completion
//!
//! Each chat turn opens a run on `inlet` and closes it on `outlet`. The
//! store maps a turn key (normally the chat id) to the run that is still
//! open for it, so one filter can serve many conversations at once.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A run that has been started but not completed yet
#[derive(Debug)]
pub struct PendingRun {
    pub run_id: Uuid,
    started_at: Instant,
    /// Stored under a chat id rather than under its own run id
    keyed: bool,
    /// Background task posting the run, awaited before patching it
    start: Option<JoinHandle<()>>,
}

impl PendingRun {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Instant::now(),
            keyed: false,
            start: None,
        }
    }

    pub fn with_start(mut self, start: JoinHandle<()>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn take_start(&mut self) -> Option<JoinHandle<()>> {
        self.start.take()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.started_at.elapsed() >= ttl
    }
}

/// Thread-safe map of turn key to open run
#[derive(Clone)]
pub struct PendingRuns {
    runs: Arc<RwLock<HashMap<String, PendingRun>>>,
    ttl: Duration,
}

impl PendingRuns {
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Records an open run for `chat_id`, returning the run it replaces.
    ///
    /// Turns without a chat id are stored under their own run id. Expired
    /// runs are dropped first, so turns that never reach `outlet` do not
    /// pile up.
    pub fn insert(&self, chat_id: Option<&str>, mut run: PendingRun) -> Option<PendingRun> {
        let key = match chat_id {
            Some(chat_id) => chat_id.to_string(),
            None => run.run_id.simple().to_string(),
        };
        run.keyed = chat_id.is_some();

        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let before = runs.len();
        runs.retain(|_, pending| !pending.is_expired(self.ttl));
        let expired = before - runs.len();
        if expired > 0 {
            tracing::debug!(expired, "dropped runs that were never completed");
        }
        runs.insert(key, run)
    }

    /// Removes and returns the open run for `chat_id`.
    ///
    /// When nothing is stored under the chat id, the most recent run that
    /// was opened without one is taken instead. Without a chat id the most
    /// recently started run is taken, whatever it was stored under.
    pub fn take(&self, chat_id: Option<&str>) -> Option<PendingRun> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let key = match chat_id {
            Some(chat_id) if runs.contains_key(chat_id) => chat_id.to_string(),
            Some(_) => latest(&runs, |pending| !pending.keyed)?,
            None => latest(&runs, |_| true)?,
        };
        runs.remove(&key)
            .filter(|pending| !pending.is_expired(self.ttl))
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn latest(
    runs: &HashMap<String, PendingRun>,
    eligible: impl Fn(&PendingRun) -> bool,
) -> Option<String> {
    runs.iter()
        .filter(|(_, pending)| eligible(pending))
        .max_by_key(|(_, pending)| pending.started_at)
        .map(|(key, _)| key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_take_by_key() {
        let runs = PendingRuns::new(TTL);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        runs.insert(Some("chat-a"), PendingRun::new(a));
        runs.insert(Some("chat-b"), PendingRun::new(b));

        assert_eq!(runs.take(Some("chat-b")).map(|r| r.run_id), Some(b));
        assert_eq!(runs.take(Some("chat-a")).map(|r| r.run_id), Some(a));
        assert!(runs.take(Some("chat-a")).is_none());
        assert!(runs.is_empty());
    }

    #[test]
    fn test_take_without_key_uses_latest() {
        let runs = PendingRuns::new(TTL);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        runs.insert(Some("one"), PendingRun::new(first));
        std::thread::sleep(Duration::from_millis(2));
        runs.insert(Some("two"), PendingRun::new(second));

        assert_eq!(runs.take(None).map(|r| r.run_id), Some(second));
        assert_eq!(runs.take(None).map(|r| r.run_id), Some(first));
        assert!(runs.take(None).is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let runs = PendingRuns::new(TTL);
        let old = Uuid::new_v4();
        runs.insert(Some("chat"), PendingRun::new(old));
        let replaced = runs.insert(Some("chat"), PendingRun::new(Uuid::new_v4()));

        assert_eq!(replaced.map(|r| r.run_id), Some(old));
        assert_eq!(runs.len(), 1);
    }

    #[test]
    fn test_expired_runs_are_dropped() {
        let runs = PendingRuns::new(Duration::ZERO);
        runs.insert(Some("stale"), PendingRun::new(Uuid::new_v4()));
        runs.insert(Some("fresh"), PendingRun::new(Uuid::new_v4()));

        // Inserting purged "stale"; "fresh" is already past a zero ttl too
        assert_eq!(runs.len(), 1);
        assert!(runs.take(Some("stale")).is_none());
        assert!(runs.take(Some("fresh")).is_none());
        assert!(runs.is_empty());
    }

    #[test]
    fn test_shared_between_clones() {
        let runs = PendingRuns::new(TTL);
        let clone = runs.clone();
        let id = Uuid::new_v4();
        clone.insert(Some("chat"), PendingRun::new(id));

        assert_eq!(runs.take(Some("chat")).map(|r| r.run_id), Some(id));
    }

    #[test]
    fn test_unkeyed_run_taken_for_unknown_chat() {
        let runs = PendingRuns::new(TTL);
        let unkeyed = Uuid::new_v4();
        runs.insert(None, PendingRun::new(unkeyed));

        assert_eq!(runs.take(Some("c1")).map(|r| r.run_id), Some(unkeyed));
        assert!(runs.is_empty());
    }

    #[test]
    fn test_unknown_chat_never_takes_other_chats() {
        let runs = PendingRuns::new(TTL);
        let other = Uuid::new_v4();
        let unkeyed = Uuid::new_v4();
        runs.insert(None, PendingRun::new(unkeyed));
        std::thread::sleep(Duration::from_millis(2));
        runs.insert(Some("c2"), PendingRun::new(other));

        // c2 is newer but belongs to another conversation
        assert_eq!(runs.take(Some("c1")).map(|r| r.run_id), Some(unkeyed));
        assert!(runs.take(Some("c1")).is_none());
        assert_eq!(runs.take(Some("c2")).map(|r| r.run_id), Some(other));
    }

    #[test]
    fn test_unkeyed_runs_do_not_collide() {
        let runs = PendingRuns::new(TTL);
        runs.insert(None, PendingRun::new(Uuid::new_v4()));
        runs.insert(None, PendingRun::new(Uuid::new_v4()));

        assert_eq!(runs.len(), 2);
    }
}
