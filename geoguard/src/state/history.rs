// geoguard/src/state/history.rs
//
// Per-user location history, cached with a TTL.
//
// DashMap = sharded concurrent HashMap. get_or_create runs through the
// entry API, which holds the shard write lock for the whole check-and-insert,
// so two verifications racing on a brand-new user end up sharing one history
// object instead of each caching its own.
//
// Entries are never deleted explicitly; they expire time_window_hours after
// the last write and are purged by housekeeping_loop.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::events::GeoLocation;

pub type SharedHistory = Arc<RwLock<LocationHistory>>;

// ── Per-user history ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub location:  GeoLocation,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, time-ordered record of a user's verified locations.
#[derive(Debug, Clone, Serialize)]
pub struct LocationHistory {
    pub user_id:     String,
    pub entries:     VecDeque<HistoryEntry>,
    pub max_entries: usize,
}

impl LocationHistory {
    pub fn new(user_id: &str, max_entries: usize) -> Self {
        Self {
            user_id:     user_id.to_string(),
            entries:     VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Insert a verified location in timestamp order, evicting the oldest
    /// beyond the cap. A late attempt lands behind newer entries, so the
    /// last entry is always the most recent login.
    pub fn record(&mut self, location: GeoLocation, timestamp: DateTime<Utc>) {
        let at = self.entries.iter()
            .rposition(|e| e.timestamp <= timestamp)
            .map_or(0, |i| i + 1);
        self.entries.insert(at, HistoryEntry { location, timestamp });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn last_location(&self) -> Option<&GeoLocation> {
        self.entries.back().map(|e| &e.location)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|e| e.timestamp)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

// ── Store contract ────────────────────────────────────────────────────────────

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Return the cached history for `user_id`, creating an empty one on a
    /// miss. Concurrent misses for the same key yield the same object.
    async fn get_or_create(&self, user_id: &str) -> Result<SharedHistory, StoreError>;

    /// Write back a (mutated) history. Last writer wins.
    async fn put(&self, user_id: &str, history: SharedHistory) -> Result<(), StoreError>;
}

// ── In-memory implementation ──────────────────────────────────────────────────

struct CachedHistory {
    history:    SharedHistory,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryHistoryStore {
    entries:     DashMap<String, CachedHistory>,
    ttl:         Duration,
    max_entries: usize,
}

impl InMemoryHistoryStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { entries: DashMap::new(), ttl, max_entries }
    }

    /// Expiry for an entry written at `now`. Saturates instead of overflowing.
    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn fresh(&self, user_id: &str, now: DateTime<Utc>) -> CachedHistory {
        CachedHistory {
            history:    Arc::new(RwLock::new(LocationHistory::new(user_id, self.max_entries))),
            expires_at: self.expiry(now),
        }
    }

    /// Peek without creating. Expired entries read as absent.
    pub fn get(&self, user_id: &str) -> Option<SharedHistory> {
        let now = Utc::now();
        self.entries.get(user_id)
            .filter(|e| e.expires_at > now)
            .map(|e| Arc::clone(&e.history))
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub async fn housekeeping_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = self.entries.len(), "Expired location histories purged");
            }
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_or_create(&self, user_id: &str) -> Result<SharedHistory, StoreError> {
        let now = Utc::now();
        let history = match self.entries.entry(user_id.to_string()) {
            Entry::Occupied(mut o) => {
                if o.get().expires_at <= now {
                    o.insert(self.fresh(user_id, now));
                }
                Arc::clone(&o.get().history)
            }
            Entry::Vacant(v) => {
                debug!(user_id, "Creating location history");
                Arc::clone(&v.insert(self.fresh(user_id, now)).history)
            }
        };
        Ok(history)
    }

    async fn put(&self, user_id: &str, history: SharedHistory) -> Result<(), StoreError> {
        let expires_at = self.expiry(Utc::now());
        self.entries.insert(user_id.to_string(), CachedHistory { history, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(cc: &str) -> GeoLocation {
        GeoLocation::new(cc)
    }

    #[test]
    fn history_is_bounded() {
        let mut h = LocationHistory::new("u1", 3);
        let t0 = Utc::now();
        for (i, cc) in ["US", "CA", "MX", "BR"].iter().enumerate() {
            h.record(loc(cc), t0 + Duration::minutes(i as i64));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.entries.front().unwrap().location.country_code, "CA");
        assert_eq!(h.last_location().unwrap().country_code, "BR");
        assert_eq!(h.last_timestamp(), Some(t0 + Duration::minutes(3)));
    }

    #[test]
    fn late_entry_is_kept_in_time_order() {
        let mut h = LocationHistory::new("u1", 10);
        let t0 = Utc::now();
        h.record(loc("US"), t0 + Duration::minutes(5));
        h.record(loc("JP"), t0);
        assert_eq!(h.last_timestamp(), Some(t0 + Duration::minutes(5)));
        assert_eq!(h.last_location().unwrap().country_code, "US");
        assert_eq!(h.entries.front().unwrap().location.country_code, "JP");

        h.record(loc("CA"), t0 + Duration::minutes(2));
        let order: Vec<&str> = h.entries.iter().map(|e| e.location.country_code.as_str()).collect();
        assert_eq!(order, ["JP", "CA", "US"]);
    }

    #[test]
    fn late_entry_older_than_full_history_is_evicted() {
        let mut h = LocationHistory::new("u1", 2);
        let t0 = Utc::now();
        h.record(loc("US"), t0 + Duration::minutes(1));
        h.record(loc("CA"), t0 + Duration::minutes(2));
        h.record(loc("JP"), t0);
        assert_eq!(h.len(), 2);
        assert_eq!(h.entries.front().unwrap().location.country_code, "US");
        assert_eq!(h.last_location().unwrap().country_code, "CA");
    }

    #[tokio::test]
    async fn huge_ttl_saturates_instead_of_panicking() {
        let store = InMemoryHistoryStore::new(Duration::hours(4_000_000_000), 10);
        let a = store.get_or_create("u1").await.unwrap();
        store.put("u1", Arc::clone(&a)).await.unwrap();
        assert!(store.get("u1").is_some());
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn empty_history_has_no_last() {
        let h = LocationHistory::new("u1", 5);
        assert!(h.last_location().is_none());
        assert!(h.last_timestamp().is_none());
    }

    #[tokio::test]
    async fn get_or_create_returns_same_object() {
        let store = InMemoryHistoryStore::new(Duration::hours(1), 10);
        let a = store.get_or_create("u1").await.unwrap();
        let b = store.get_or_create("u1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_collapses_to_one_initializer() {
        let store = Arc::new(InMemoryHistoryStore::new(Duration::hours(1), 10));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let s = Arc::clone(&store);
            handles.push(tokio::spawn(async move { s.get_or_create("new-user").await.unwrap() }));
        }
        let mut histories = Vec::new();
        for h in handles {
            histories.push(h.await.unwrap());
        }
        let first = &histories[0];
        assert!(histories.iter().all(|h| Arc::ptr_eq(first, h)));

        // Both racers append; neither update is lost.
        first.write().record(loc("US"), Utc::now());
        histories[1].write().record(loc("CA"), Utc::now());
        store.put("new-user", Arc::clone(first)).await.unwrap();
        assert_eq!(store.get("new-user").unwrap().read().len(), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_replaced() {
        let store = InMemoryHistoryStore::new(Duration::zero(), 10);
        let a = store.get_or_create("u1").await.unwrap();
        a.write().record(loc("US"), Utc::now());
        let b = store.get_or_create("u1").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.read().is_empty());
        assert!(store.get("u1").is_none());
    }

    #[tokio::test]
    async fn purge_removes_expired() {
        let store = InMemoryHistoryStore::new(Duration::zero(), 10);
        store.get_or_create("u1").await.unwrap();
        store.get_or_create("u2").await.unwrap();
        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = InMemoryHistoryStore::new(Duration::hours(1), 10);
        let replacement = Arc::new(RwLock::new(LocationHistory::new("u1", 10)));
        replacement.write().record(loc("FR"), Utc::now());
        store.get_or_create("u1").await.unwrap();
        store.put("u1", Arc::clone(&replacement)).await.unwrap();
        let got = store.get("u1").unwrap();
        assert!(Arc::ptr_eq(&got, &replacement));
    }
}
