//! A small per-user TTL cache for the questions view.
//!
//! Question listings are expensive to assemble (one item fetch and one buyer fetch per
//! question), and the marketplace tells us when they go stale: a `questions` notification
//! invalidates the owning user's entry. The TTL is only a backstop for missed
//! notifications.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::*;
use sgw_common::UserId;

use crate::sge_api::questions_api::QuestionsOverview;

pub const DEFAULT_QUESTION_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct QuestionCache {
    entries: DashMap<UserId, (Instant, QuestionsOverview)>,
    ttl: Duration,
}

impl Default for QuestionCache {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTION_CACHE_TTL)
    }
}

impl QuestionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, user_id: UserId) -> Option<QuestionsOverview> {
        let entry = self.entries.get(&user_id)?;
        let (stored_at, overview) = entry.value();
        if stored_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&user_id);
            return None;
        }
        trace!("🗃️ Question cache hit for user {user_id}");
        Some(overview.clone())
    }

    pub fn put(&self, user_id: UserId, overview: QuestionsOverview) {
        self.entries.insert(user_id, (Instant::now(), overview));
    }

    pub fn invalidate(&self, user_id: UserId) {
        if self.entries.remove(&user_id).is_some() {
            debug!("🗃️ Question cache invalidated for user {user_id}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn overview() -> QuestionsOverview {
        QuestionsOverview { total: 0, limit: 25, offset: 0, results: Vec::new() }
    }

    #[test]
    fn entries_expire_after_the_ttl() {
        let cache = QuestionCache::new(Duration::from_millis(0));
        cache.put(UserId(1), overview());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(UserId(1)).is_none());
    }

    #[test]
    fn invalidation_removes_the_entry() {
        let cache = QuestionCache::new(Duration::from_secs(60));
        cache.put(UserId(1), overview());
        assert!(cache.get(UserId(1)).is_some());
        cache.invalidate(UserId(1));
        assert!(cache.get(UserId(1)).is_none());
        // Invalidating a missing entry is fine
        cache.invalidate(UserId(2));
    }
}
