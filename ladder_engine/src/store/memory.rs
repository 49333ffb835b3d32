use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::SessionStore;
use crate::errors::StoreError;

/// `RwLock`-guarded map standing in for the persistence backend in tests
/// (§10.5, §10.7).
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<FxHashMap<String, String>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, snapshot_json: &str) -> Result<(), StoreError> {
        self.inner.write().insert(session_id.to_string(), snapshot_json.to_string());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.inner.write().remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemorySessionStore::new();
        store.save("s1", "{}").await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), Some("{}".to_string()));
        store.delete("s1").await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), None);
    }
}
