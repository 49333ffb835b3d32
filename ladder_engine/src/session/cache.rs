//! In-process LRU-with-TTL session cache (§5, §9, §10.5): a pure cache in
//! front of the persistent store, never the authoritative data. Global
//! singletons in the source (a process-wide session cache) become this
//! constructor-injected collaborator.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::Session;

struct Entry {
    session: Session,
    inserted_at: Instant,
}

/// Capacity-bounded, TTL-evicting cache. Eviction happens lazily on read
/// (expired entries are dropped when looked up) and on write (oldest entry
/// by insertion order is dropped once over capacity).
pub struct SessionCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<FxHashMap<String, Entry>>,
    order: Mutex<Vec<String>>,
}

impl SessionCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(FxHashMap::default()),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Returns a clone of the cached session if present and not expired.
    /// `Session` itself is cheap-ish to clone (graphs are bounded by one
    /// interview's worth of nodes); callers that mutate must re-insert via
    /// [`Self::insert`].
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Session>
    where
        Session: Clone,
    {
        let mut entries = self.entries.lock();
        let expired = entries
            .get(session_id)
            .is_some_and(|e| e.inserted_at.elapsed() > self.ttl);
        if expired {
            entries.remove(session_id);
            self.order.lock().retain(|id| id != session_id);
            return None;
        }
        entries.get(session_id).map(|e| e.session.clone())
    }

    pub fn insert(&self, session_id: String, session: Session) {
        let mut entries = self.entries.lock();
        let mut order = self.order.lock();
        if !entries.contains_key(&session_id) {
            order.push(session_id.clone());
        }
        entries.insert(
            session_id,
            Entry {
                session,
                inserted_at: Instant::now(),
            },
        );
        while entries.len() > self.capacity {
            if order.is_empty() {
                break;
            }
            let oldest = order.remove(0);
            entries.remove(&oldest);
        }
    }

    pub fn remove(&self, session_id: &str) {
        self.entries.lock().remove(session_id);
        self.order.lock().retain(|id| id != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;

    fn config() -> ProjectConfig {
        ProjectConfig {
            topic: "t".to_string(),
            stimuli: vec!["s".to_string()],
            n_values_max: -1,
            min_nodes: 1,
            max_retries: 3,
            language_hint: None,
            model_id: "m".to_string(),
            base_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = SessionCache::new(10, Duration::from_millis(0));
        let session = Session::new("s1".to_string(), &config());
        cache.insert("s1".to_string(), session);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("s1").is_none());
    }

    #[test]
    fn capacity_evicts_oldest_insertion() {
        let cache = SessionCache::new(1, Duration::from_secs(60));
        cache.insert("s1".to_string(), Session::new("s1".to_string(), &config()));
        cache.insert("s2".to_string(), Session::new("s2".to_string(), &config()));
        assert!(cache.get("s1").is_none());
        assert!(cache.get("s2").is_some());
    }
}
