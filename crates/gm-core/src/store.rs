//! Local event storage.
//!
//! The relay framework owns durability; this crate only reads through
//! [`EventStore`]. `save` and `delete` are part of the contract so the
//! framework side ([`crate::relay::StorePipeline`]) can be expressed against
//! the same trait.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use nostr_ndb::database::{NostrDatabase, SaveEventStatus};
use nostr_ndb::NdbDatabase;
use nostr_sdk::prelude::*;
use nostrdb::Ndb;
use parking_lot::RwLock;

use crate::query::EventQuery;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("event rejected by storage: {0}")]
    Rejected(String),
}

fn backend<E: fmt::Display>(err: E) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Query/persist events by filter.
///
/// No result ordering is promised by implementations; callers reduce results
/// explicitly (minimum timestamp, grouped counts) instead of relying on it.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save(&self, event: &Event) -> Result<(), StoreError>;

    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError>;

    async fn count(&self, query: &EventQuery) -> Result<usize, StoreError>;

    async fn delete(&self, query: &EventQuery) -> Result<(), StoreError>;
}

/// nostrdb-backed store, shared with the relay process through the same
/// data directory.
///
/// The bot only reads it. Notes get in through the relay's write path, where
/// [`crate::admission::AdmissionPolicy`] runs as a
/// [`crate::relay::WritePolicy`] ahead of the save.
#[derive(Debug, Clone)]
pub struct NdbStore {
    db: NdbDatabase,
}

impl NdbStore {
    pub fn open<P: AsRef<Path>>(db_dir: P) -> Result<Self, StoreError> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;

        let path = db_dir
            .to_str()
            .ok_or_else(|| StoreError::Backend(format!("non-utf8 path: {}", db_dir.display())))?;
        let config = nostrdb::Config::new();
        let ndb = Ndb::new(path, &config).map_err(backend)?;

        Ok(Self {
            db: NdbDatabase::from(ndb),
        })
    }
}

#[async_trait]
impl EventStore for NdbStore {
    async fn save(&self, event: &Event) -> Result<(), StoreError> {
        match self.db.save_event(event).await.map_err(backend)? {
            SaveEventStatus::Success => Ok(()),
            status => Err(StoreError::Rejected(format!("{status:?}"))),
        }
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        let events = self.db.query(query.to_filter()).await.map_err(backend)?;
        Ok(events.into_iter().collect())
    }

    async fn count(&self, query: &EventQuery) -> Result<usize, StoreError> {
        self.db.count(query.to_filter()).await.map_err(backend)
    }

    async fn delete(&self, query: &EventQuery) -> Result<(), StoreError> {
        self.db.delete(query.to_filter()).await.map_err(backend)
    }
}

/// In-process store. Events are kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
    query_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query sleeps for `delay` before reading, which widens the window
    /// between an admission check and the subsequent save.
    pub fn with_query_delay(delay: Duration) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            query_delay: Some(delay),
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn save(&self, event: &Event) -> Result<(), StoreError> {
        let mut events = self.events.write();
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event.clone());
        }
        Ok(())
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        self.simulate_latency().await;
        let events = self.events.read();
        let matching = events.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn count(&self, query: &EventQuery) -> Result<usize, StoreError> {
        self.simulate_latency().await;
        Ok(self.events.read().iter().filter(|e| query.matches(e)).count())
    }

    async fn delete(&self, query: &EventQuery) -> Result<(), StoreError> {
        self.events.write().retain(|e| !query.matches(e));
        Ok(())
    }
}
