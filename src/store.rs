//! Record store behind the users API.
//!
//! The pipeline does not care how records are kept; handlers talk to a
//! [`RecordStore`]. [`MemoryStore`] is the only implementation and keeps
//! everything in process memory.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Collection-store contract used by the users handlers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// One page of records in id order. `page` is 1-based.
    async fn list(&self, page: usize, page_size: usize) -> Result<Vec<User>, StoreError>;

    async fn get(&self, id: u64) -> Result<Option<User>, StoreError>;

    /// Stores `record` under a freshly assigned id and returns it.
    async fn create(&self, record: User) -> Result<User, StoreError>;

    /// Replaces the record at `id`. Returns `false` if there is none.
    async fn update(&self, id: u64, record: User) -> Result<bool, StoreError>;

    /// Removes the record at `id`. Returns `false` if there is none.
    async fn delete(&self, id: u64) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Records {
    rows: BTreeMap<u64, User>,
    last_id: u64,
}

/// In-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with two users.
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut records = store.records.write().unwrap_or_else(PoisonError::into_inner);
            for (name, email, role) in [
                ("Alice", "alice@example.com", "Admin"),
                ("Bob", "bob@example.com", "User"),
            ] {
                records.insert(User {
                    id: 0,
                    name: name.to_owned(),
                    email: email.to_owned(),
                    role: role.to_owned(),
                });
            }
        }
        store
    }
}

impl Records {
    fn insert(&mut self, mut record: User) -> User {
        self.last_id += 1;
        record.id = self.last_id;
        self.rows.insert(record.id, record.clone());
        record
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, page: usize, page_size: usize) -> Result<Vec<User>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        Ok(records.rows.values().skip(skip).take(page_size).cloned().collect())
    }

    async fn get(&self, id: u64) -> Result<Option<User>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.rows.get(&id).cloned())
    }

    async fn create(&self, record: User) -> Result<User, StoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.insert(record))
    }

    async fn update(&self, id: u64, mut record: User) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.rows.get_mut(&id) {
            Some(existing) => {
                record.id = id;
                *existing = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.rows.remove(&id).is_some())
    }
}
