//! Decides which inbound events may be stored.
//!
//! An event is admitted when its content contains the admission keyword as a
//! whole word, it is not a reply, and its author has no admitted note today.
//! The daily check is made atomic per author: decisions for one author are
//! serialized, and an accepted event reserves the author's slot for the day
//! until storage can see it. Without the reservation, two concurrent
//! candidates could both observe an empty day and both be admitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use regex::Regex;

use crate::config::{BotConfig, ConfigError};
use crate::keyword::whole_word;
use crate::query::EventQuery;
use crate::relay::{PolicyResult, WritePolicy};
use crate::store::EventStore;
use crate::tags::has_tag;
use crate::window::DailyWindow;

pub const REJECTION_REASON: &str = "Only GM notes (and not replies) are allowed (once a day)!";
pub const QUOTA_UNAVAILABLE_REASON: &str = "error: could not verify daily quota, try again later";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    MissingKeyword,
    Reply,
    AlreadyPostedToday,
    /// Storage could not answer in time; rejected conservatively
    QuotaUnavailable,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::QuotaUnavailable => QUOTA_UNAVAILABLE_REASON,
            _ => REJECTION_REASON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Accept,
    Reject(Rejection),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

/// Per-author serialization and day reservations.
#[derive(Default)]
struct DailyQuota {
    locks: Mutex<HashMap<PublicKey, Arc<tokio::sync::Mutex<()>>>>,
    reserved: Mutex<HashMap<PublicKey, (NaiveDate, EventId)>>,
}

impl DailyQuota {
    fn lock_for(&self, author: PublicKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        // Entries nobody is waiting on can be dropped
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(author).or_default().clone()
    }

    fn is_reserved(&self, author: &PublicKey, day: NaiveDate) -> bool {
        self.reserved
            .lock()
            .get(author)
            .is_some_and(|(reserved_day, _)| *reserved_day == day)
    }

    fn reserve(&self, author: PublicKey, day: NaiveDate, id: EventId) {
        let mut reserved = self.reserved.lock();
        reserved.retain(|_, (reserved_day, _)| *reserved_day >= day);
        reserved.insert(author, (day, id));
    }

    fn release(&self, author: &PublicKey, id: &EventId) {
        let mut reserved = self.reserved.lock();
        if reserved.get(author).is_some_and(|(_, reserved_id)| reserved_id == id) {
            reserved.remove(author);
        }
    }
}

pub struct AdmissionPolicy {
    store: Arc<dyn EventStore>,
    kind: Kind,
    keyword: Regex,
    query_timeout: Duration,
    quota: DailyQuota,
}

impl AdmissionPolicy {
    pub fn new(store: Arc<dyn EventStore>, config: &BotConfig) -> Result<Self, ConfigError> {
        let keyword = whole_word(&config.admission_keyword).map_err(|source| {
            ConfigError::Keyword {
                keyword: config.admission_keyword.clone(),
                source,
            }
        })?;

        Ok(Self {
            store,
            kind: config.kind(),
            keyword,
            query_timeout: config.query_timeout(),
            quota: DailyQuota::default(),
        })
    }

    pub async fn decide(&self, event: &Event) -> Decision {
        self.decide_within(event, &DailyWindow::today()).await
    }

    /// Decide against an explicit day window instead of the local clock.
    pub async fn decide_within(&self, event: &Event, window: &DailyWindow) -> Decision {
        if !self.keyword.is_match(&event.content) {
            return Decision::Reject(Rejection::MissingKeyword);
        }
        if has_tag(event, Alphabet::E) {
            return Decision::Reject(Rejection::Reply);
        }

        let lock = self.quota.lock_for(event.pubkey);
        let _guard = lock.lock().await;

        if self.quota.is_reserved(&event.pubkey, window.day()) {
            return Decision::Reject(Rejection::AlreadyPostedToday);
        }

        let query = EventQuery::new()
            .kind(self.kind)
            .author(event.pubkey)
            .within(window)
            .limit(1);

        let existing = match tokio::time::timeout(self.query_timeout, self.store.query(&query)).await
        {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                tracing::error!(id = %event.id, author = %event.pubkey, error = %e, "daily quota query failed");
                return Decision::Reject(Rejection::QuotaUnavailable);
            }
            Err(_) => {
                tracing::error!(
                    id = %event.id,
                    author = %event.pubkey,
                    timeout = ?self.query_timeout,
                    "daily quota query timed out"
                );
                return Decision::Reject(Rejection::QuotaUnavailable);
            }
        };

        if !existing.is_empty() {
            return Decision::Reject(Rejection::AlreadyPostedToday);
        }

        if event.kind == self.kind {
            self.quota.reserve(event.pubkey, window.day(), event.id);
        }
        Decision::Accept
    }

    /// Give back the day slot held by `event`, e.g. when storing it failed.
    pub fn release(&self, event: &Event) {
        self.quota.release(&event.pubkey, &event.id);
    }
}

#[async_trait]
impl WritePolicy for AdmissionPolicy {
    async fn on_candidate_event(&self, event: &Event) -> PolicyResult {
        match self.decide(event).await {
            Decision::Accept => PolicyResult::Accept,
            Decision::Reject(rejection) => PolicyResult::Reject(rejection.reason().to_string()),
        }
    }

    async fn on_store_failed(&self, event: &Event) {
        self.release(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::EventQuery;
    use crate::relay::StorePipeline;
    use crate::store::{MemoryStore, StoreError};
    use chrono::{Duration as ChronoDuration, Local};

    fn note(keys: &Keys, content: &str) -> Event {
        EventBuilder::text_note(content).sign_with_keys(keys).unwrap()
    }

    fn note_at(keys: &Keys, content: &str, at: Timestamp) -> Event {
        EventBuilder::text_note(content)
            .custom_created_at(at)
            .sign_with_keys(keys)
            .unwrap()
    }

    fn policy(store: Arc<dyn EventStore>) -> AdmissionPolicy {
        AdmissionPolicy::new(store, &BotConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_content_filter() {
        let policy = policy(Arc::new(MemoryStore::new()));

        for content in ["gm", "GM!", "good gm morning", "hello\ngm\nfriends"] {
            let decision = policy.decide(&note(&Keys::generate(), content)).await;
            assert_eq!(decision, Decision::Accept, "{content:?} should be admitted");
        }

        let decision = policy.decide(&note(&Keys::generate(), "programmer")).await;
        assert_eq!(decision, Decision::Reject(Rejection::MissingKeyword));
    }

    #[tokio::test]
    async fn test_replies_are_rejected_even_when_matching() {
        let policy = policy(Arc::new(MemoryStore::new()));
        let parent = note(&Keys::generate(), "gm");
        let reply = EventBuilder::text_note("gm")
            .tag(Tag::event(parent.id))
            .sign_with_keys(&Keys::generate())
            .unwrap();

        assert_eq!(
            policy.decide(&reply).await,
            Decision::Reject(Rejection::Reply)
        );
    }

    #[tokio::test]
    async fn test_second_note_same_day_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let policy = Arc::new(policy(store.clone()));
        let pipeline = StorePipeline::new(store.clone()).with_policy(policy.clone());
        let alice = Keys::generate();

        let first = pipeline.submit(&note(&alice, "gm")).await.unwrap();
        let second = pipeline.submit(&note(&alice, "gm again")).await.unwrap();

        assert!(first.is_accepted());
        assert_eq!(second, PolicyResult::Reject(REJECTION_REASON.to_string()));
        assert_eq!(store.len(), 1);

        // Other authors are unaffected
        let bob = pipeline.submit(&note(&Keys::generate(), "gm")).await.unwrap();
        assert!(bob.is_accepted());
    }

    #[tokio::test]
    async fn test_note_from_yesterday_does_not_count() {
        let store = Arc::new(MemoryStore::new());
        let alice = Keys::generate();
        let yesterday = Local::now() - ChronoDuration::days(1);
        store
            .save(&note_at(&alice, "gm", Timestamp::from(yesterday.timestamp() as u64)))
            .await
            .unwrap();

        let policy = policy(store);
        assert_eq!(policy.decide(&note(&alice, "gm")).await, Decision::Accept);
    }

    #[tokio::test]
    async fn test_existing_note_today_rejects() {
        let store = Arc::new(MemoryStore::new());
        let alice = Keys::generate();
        store.save(&note(&alice, "gm")).await.unwrap();

        let policy = policy(store);
        assert_eq!(
            policy.decide(&note(&alice, "gm")).await,
            Decision::Reject(Rejection::AlreadyPostedToday)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_admit_exactly_one() {
        // The query delay keeps every candidate in the check phase long enough
        // for all of them to overlap.
        let store = Arc::new(MemoryStore::with_query_delay(std::time::Duration::from_millis(50)));
        let policy = Arc::new(policy(store.clone()));
        let pipeline = Arc::new(StorePipeline::new(store.clone()).with_policy(policy));
        let alice = Keys::generate();

        let mut handles = Vec::new();
        for i in 0..8 {
            let pipeline = pipeline.clone();
            let event = note(&alice, &format!("gm #{i}"));
            handles.push(tokio::spawn(async move { pipeline.submit(&event).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_accepted() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.len(), 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn save(&self, _event: &Event) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".to_string()))
        }
        async fn query(&self, _query: &EventQuery) -> Result<Vec<Event>, StoreError> {
            Err(StoreError::Backend("down".to_string()))
        }
        async fn count(&self, _query: &EventQuery) -> Result<usize, StoreError> {
            Err(StoreError::Backend("down".to_string()))
        }
        async fn delete(&self, _query: &EventQuery) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_storage_failure_rejects_conservatively() {
        let policy = policy(Arc::new(BrokenStore));
        let decision = policy.decide(&note(&Keys::generate(), "gm")).await;

        assert_eq!(decision, Decision::Reject(Rejection::QuotaUnavailable));
        assert_eq!(Rejection::QuotaUnavailable.reason(), QUOTA_UNAVAILABLE_REASON);
    }

    #[tokio::test]
    async fn test_slow_storage_times_out() {
        let store = Arc::new(MemoryStore::with_query_delay(std::time::Duration::from_secs(5)));
        let config = BotConfig {
            query_timeout_secs: 0,
            ..BotConfig::default()
        };
        let policy = AdmissionPolicy::new(store, &config).unwrap();

        let decision = policy.decide(&note(&Keys::generate(), "gm")).await;
        assert_eq!(decision, Decision::Reject(Rejection::QuotaUnavailable));
    }

    #[tokio::test]
    async fn test_failed_save_releases_reservation() {
        let store = Arc::new(MemoryStore::new());
        let policy = policy(store.clone());
        let alice = Keys::generate();
        let first = note(&alice, "gm");

        assert!(policy.decide(&first).await.is_accepted());
        // Not stored yet, but the slot is held
        assert!(!policy.decide(&note(&alice, "gm")).await.is_accepted());

        policy.release(&first);
        assert!(policy.decide(&note(&alice, "gm")).await.is_accepted());
    }
}
