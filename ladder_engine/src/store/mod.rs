//! Persistent store collaborator (§6, §10.5): key-value by session-id,
//! value is the session JSON snapshot.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemorySessionStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;

use crate::errors::StoreError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<String>, StoreError>;
    async fn save(&self, session_id: &str, snapshot_json: &str) -> Result<(), StoreError>;
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}
