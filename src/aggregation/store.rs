//! Aggregation store - pending bursts keyed by article
//!
//! Owned exclusively by the `Dispatcher`; every method takes `&mut self` and
//! there is no interior locking. Each burst leaves the store exactly once,
//! either through `apply` (origin change) or `expire` (quiet period).

use super::types::{ClassifiedEdit, PendingEdit};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureReason {
    /// A different address edited the same article.
    OriginChanged,
    /// No edits for longer than the quiet period.
    QuietPeriod,
}

impl std::fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosureReason::OriginChanged => write!(f, "origin changed"),
            ClosureReason::QuietPeriod => write!(f, "quiet period elapsed"),
        }
    }
}

/// A burst removed from the store, ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedBurst {
    pub edit: PendingEdit,
    pub reason: ClosureReason,
}

pub struct AggregationStore {
    pending: HashMap<String, PendingEdit>,

    /// Seconds of inactivity after which a burst closes.
    quiet_period_secs: i64,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl AggregationStore {
    /// Create a store using wall-clock time.
    pub fn new(quiet_period_secs: i64) -> Self {
        Self::new_with_timestamp_fn(quiet_period_secs, Box::new(|| chrono::Utc::now().timestamp()))
    }

    /// Create a store with a custom timestamp function.
    ///
    /// Used for testing with deterministic timestamps.
    pub fn new_with_timestamp_fn(
        quiet_period_secs: i64,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            pending: HashMap::new(),
            quiet_period_secs,
            now_fn,
        }
    }

    /// Folds one classified edit into the store.
    ///
    /// - No burst for the article: opens one.
    /// - Burst from the same address: extends its revision range.
    /// - Burst from another address: closes it and opens a fresh one from
    ///   this edit. The closed burst is returned for publishing.
    pub fn apply(&mut self, edit: ClassifiedEdit) -> Option<ClosedBurst> {
        let now = (self.now_fn)();

        if let Some(existing) = self.pending.get_mut(&edit.article_key) {
            if existing.origin == edit.address {
                existing.extend(&edit, now);
                log::debug!(
                    "Burst extended: {} ({} edits, r{}..r{})",
                    existing.article_key,
                    existing.edit_count,
                    existing.old_revision,
                    existing.new_revision
                );
                return None;
            }
        }

        let key = edit.article_key.clone();
        let closed = self.pending.remove(&key).map(|previous| ClosedBurst {
            edit: previous,
            reason: ClosureReason::OriginChanged,
        });

        log::debug!("Burst opened: {} from {} ({})", key, edit.address, edit.organization);
        self.pending.insert(key, PendingEdit::open(edit, now));

        closed
    }

    /// Removes every burst idle for longer than the quiet period.
    ///
    /// Returned bursts are ordered by last activity, oldest first.
    pub fn expire(&mut self) -> Vec<ClosedBurst> {
        let now = (self.now_fn)();
        let threshold = self.quiet_period_secs;

        let expired_keys: Vec<String> = self
            .pending
            .values()
            .filter(|p| p.idle_for(now) > threshold)
            .map(|p| p.article_key.clone())
            .collect();

        let mut closed: Vec<ClosedBurst> = expired_keys
            .iter()
            .filter_map(|key| self.pending.remove(key))
            .map(|edit| ClosedBurst {
                edit,
                reason: ClosureReason::QuietPeriod,
            })
            .collect();

        closed.sort_by_key(|c| c.edit.last_activity);
        closed
    }

    /// Drops every open burst without closing it. Returns how many were dropped.
    pub fn discard_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn get(&self, article_key: &str) -> Option<&PendingEdit> {
        self.pending.get(article_key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn quiet_period_secs(&self) -> i64 {
        self.quiet_period_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::{RawChangeRecord, RecordMeta, RevisionRange};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    const QUIET: i64 = 23 * 60;

    fn mock_clock(start: i64) -> (Arc<AtomicI64>, Box<dyn Fn() -> i64 + Send + Sync>) {
        let clock = Arc::new(AtomicI64::new(start));
        let reader = Arc::clone(&clock);
        (clock, Box::new(move || reader.load(Ordering::SeqCst)))
    }

    fn edit(article: &str, address: &str, old: u64, new: u64) -> ClassifiedEdit {
        let record = RawChangeRecord {
            meta: RecordMeta {
                uri: format!("https://en.wikipedia.org/wiki/{}", article),
                domain: "en.wikipedia.org".to_string(),
            },
            title: article.to_string(),
            user: address.to_string(),
            bot: false,
            revision: RevisionRange { old, new },
            resume_token: None,
        };
        ClassifiedEdit::new(address.parse().unwrap(), "Google", record).unwrap()
    }

    fn key(article: &str) -> String {
        format!("https://en.wikipedia.org/wiki/{}", article)
    }

    #[test]
    fn test_first_edit_opens_burst() {
        let (_clock, now_fn) = mock_clock(1000);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        assert!(store.apply(edit("Foo", "8.8.8.8", 1, 2)).is_none());

        let pending = store.get(&key("Foo")).unwrap();
        assert_eq!(pending.old_revision, 1);
        assert_eq!(pending.new_revision, 2);
        assert_eq!(pending.last_activity, 1000);
        assert_eq!(pending.edit_count, 1);
        assert_eq!(pending.title, "Foo");
    }

    #[test]
    fn test_distinct_articles_do_not_interfere() {
        let (_clock, now_fn) = mock_clock(1000);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        for (i, article) in ["A", "B", "C", "D"].iter().enumerate() {
            let address = format!("8.8.8.{}", i + 1);
            assert!(store.apply(edit(article, &address, 10, 11)).is_none());
        }

        assert_eq!(store.len(), 4);
        for (i, article) in ["A", "B", "C", "D"].iter().enumerate() {
            let pending = store.get(&key(article)).unwrap();
            assert_eq!(pending.origin.to_string(), format!("8.8.8.{}", i + 1));
            assert_eq!(pending.edit_count, 1);
        }
    }

    #[test]
    fn test_same_origin_extends_range() {
        let (clock, now_fn) = mock_clock(1000);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        store.apply(edit("Foo", "8.8.8.8", 1, 2));
        clock.store(1300, Ordering::SeqCst);
        assert!(store.apply(edit("Foo", "8.8.8.8", 2, 3)).is_none());

        let pending = store.get(&key("Foo")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(pending.old_revision, 1);
        assert_eq!(pending.new_revision, 3);
        assert_eq!(pending.last_activity, 1300);
        assert_eq!(pending.edit_count, 2);
    }

    #[test]
    fn test_replayed_edit_does_not_shrink_range() {
        let (_clock, now_fn) = mock_clock(1000);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        store.apply(edit("Foo", "8.8.8.8", 1, 2));
        store.apply(edit("Foo", "8.8.8.8", 2, 3));
        store.apply(edit("Foo", "8.8.8.8", 1, 2));

        let pending = store.get(&key("Foo")).unwrap();
        assert_eq!(pending.old_revision, 1);
        assert_eq!(pending.new_revision, 3);
    }

    #[test]
    fn test_origin_change_closes_exactly_once() {
        let (_clock, now_fn) = mock_clock(1000);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        store.apply(edit("Foo", "8.8.8.8", 1, 2));
        let closed = store.apply(edit("Foo", "8.8.4.4", 2, 5)).unwrap();

        assert_eq!(closed.reason, ClosureReason::OriginChanged);
        assert_eq!(closed.edit.origin.to_string(), "8.8.8.8");
        assert_eq!(closed.edit.old_revision, 1);
        assert_eq!(closed.edit.new_revision, 2);

        let fresh = store.get(&key("Foo")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(fresh.origin.to_string(), "8.8.4.4");
        assert_eq!(fresh.old_revision, 2);
        assert_eq!(fresh.new_revision, 5);
        assert_eq!(fresh.edit_count, 1);

        // The closed burst is gone; a tick cannot close it again.
        assert!(store.expire().is_empty());
    }

    #[test]
    fn test_expire_respects_quiet_period_boundary() {
        let (clock, now_fn) = mock_clock(1000);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        store.apply(edit("Foo", "8.8.8.8", 1, 2));

        clock.store(1000 + QUIET, Ordering::SeqCst);
        assert!(store.expire().is_empty(), "exactly at the threshold is not yet quiet");
        assert_eq!(store.len(), 1);

        clock.store(1000 + QUIET + 1, Ordering::SeqCst);
        let closed = store.expire();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, ClosureReason::QuietPeriod);
        assert!(store.is_empty());

        assert!(store.expire().is_empty());
    }

    #[test]
    fn test_expire_leaves_active_bursts() {
        let (clock, now_fn) = mock_clock(0);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        store.apply(edit("Old", "8.8.8.8", 1, 2));
        clock.store(600, Ordering::SeqCst);
        store.apply(edit("Older", "8.8.8.9", 1, 2));
        clock.store(1200, Ordering::SeqCst);
        store.apply(edit("Fresh", "8.8.8.10", 1, 2));

        clock.store(600 + QUIET + 1, Ordering::SeqCst);
        let closed = store.expire();

        let titles: Vec<&str> = closed.iter().map(|c| c.edit.title.as_str()).collect();
        assert_eq!(titles, vec!["Old", "Older"]);
        assert!(store.get(&key("Fresh")).is_some());
    }

    #[test]
    fn test_discard_all_reports_count() {
        let (_clock, now_fn) = mock_clock(0);
        let mut store = AggregationStore::new_with_timestamp_fn(QUIET, now_fn);

        store.apply(edit("A", "8.8.8.8", 1, 2));
        store.apply(edit("B", "8.8.8.8", 1, 2));

        assert_eq!(store.discard_all(), 2);
        assert!(store.is_empty());
    }
}
