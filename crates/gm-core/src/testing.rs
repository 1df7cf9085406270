//! In-process relay set for unit tests.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::query::EventQuery;
use crate::transport::{EventStream, RelaySet, TransportError};

/// Every relay shares one event list. Publishing to a reachable relay makes
/// the event visible to later fetches, which is what the dedup check relies on.
pub(crate) struct FakeRelays {
    urls: Vec<String>,
    events: Mutex<Vec<Event>>,
    published: Mutex<Vec<(String, Event)>>,
    unreachable: HashSet<String>,
    fetch_fails: bool,
    /// One relay never sends EOSE, so a full fetch runs to its timeout
    stalled: bool,
    live: broadcast::Sender<Event>,
}

impl FakeRelays {
    pub fn new(count: usize) -> Self {
        let (live, _) = broadcast::channel(64);
        Self {
            urls: (1..=count).map(|i| format!("wss://relay{i}.test")).collect(),
            events: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            unreachable: HashSet::new(),
            fetch_fails: false,
            stalled: false,
            live,
        }
    }

    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    pub fn with_failing_fetch(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn with_stalled_relay(mut self) -> Self {
        self.stalled = true;
        self
    }

    fn stored_matches(&self, query: &EventQuery) -> Vec<Event> {
        let mut matched: Vec<Event> = self
            .events
            .lock()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    pub fn url(&self, idx: usize) -> &str {
        &self.urls[idx]
    }

    /// Seed an event as already stored on the relays.
    pub fn seed(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Deliver an event to live subscribers. Returns the number of receivers.
    pub fn push_live(&self, event: Event) -> usize {
        self.live.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.live.receiver_count()
    }

    pub fn published(&self) -> Vec<(String, Event)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl RelaySet for FakeRelays {
    fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn subscribe(&self, query: &EventQuery) -> Result<EventStream, TransportError> {
        let mut rx = self.live.subscribe();
        let query = query.clone();
        let stream = async_stream::stream! {
            while let Ok(event) = rx.recv().await {
                if query.matches(&event) {
                    yield event;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn fetch(
        &self,
        query: &EventQuery,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        if self.fetch_fails {
            return Err(TransportError::Client("connection refused".to_string()));
        }
        if self.stalled {
            tokio::time::sleep(timeout).await;
        }
        Ok(self.stored_matches(query))
    }

    async fn fetch_first(
        &self,
        query: &EventQuery,
        timeout: Duration,
    ) -> Result<Option<Event>, TransportError> {
        if self.fetch_fails {
            return Err(TransportError::Client("connection refused".to_string()));
        }
        match self.stored_matches(query).into_iter().next() {
            Some(event) => Ok(Some(event)),
            None => {
                if self.stalled {
                    tokio::time::sleep(timeout).await;
                }
                Ok(None)
            }
        }
    }

    async fn publish_to(&self, url: &str, event: &Event) -> Result<(), TransportError> {
        if !self.urls.iter().any(|u| u == url) {
            return Err(TransportError::UnknownRelay(url.to_string()));
        }
        if self.unreachable.contains(url) {
            return Err(TransportError::Client(format!("{url}: connection refused")));
        }

        self.published.lock().push((url.to_string(), event.clone()));
        let mut events = self.events.lock();
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event.clone());
        }
        Ok(())
    }
}
