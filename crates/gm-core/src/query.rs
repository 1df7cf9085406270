//! Request-scoped query descriptors.
//!
//! An [`EventQuery`] is built for a single lookup, either against local
//! storage or a remote relay subscription, and dropped afterwards. It converts
//! into a [`nostr_sdk::Filter`] for the wire and can also be evaluated locally
//! for in-process stores.

use std::collections::BTreeSet;

use nostr_sdk::prelude::*;

use crate::tags::{referenced_events, referenced_pubkeys};
use crate::window::DailyWindow;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub kinds: BTreeSet<Kind>,
    pub authors: BTreeSet<PublicKey>,
    /// Values of "e" tags, any of which must be present.
    pub event_refs: BTreeSet<EventId>,
    /// Values of "p" tags, any of which must be present.
    pub pubkey_refs: BTreeSet<PublicKey>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn author(mut self, author: PublicKey) -> Self {
        self.authors.insert(author);
        self
    }

    pub fn referencing_event(mut self, id: EventId) -> Self {
        self.event_refs.insert(id);
        self
    }

    pub fn referencing_pubkey(mut self, pubkey: PublicKey) -> Self {
        self.pubkey_refs.insert(pubkey);
        self
    }

    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict to one local calendar day.
    pub fn within(self, window: &DailyWindow) -> Self {
        self.since(window.begin()).until(window.end())
    }

    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if !self.kinds.is_empty() {
            filter = filter.kinds(self.kinds.iter().copied());
        }
        if !self.authors.is_empty() {
            filter = filter.authors(self.authors.iter().copied());
        }
        if !self.event_refs.is_empty() {
            filter = filter.events(self.event_refs.iter().copied());
        }
        if !self.pubkey_refs.is_empty() {
            filter = filter.pubkeys(self.pubkey_refs.iter().copied());
        }
        if let Some(since) = self.since {
            filter = filter.since(since);
        }
        if let Some(until) = self.until {
            filter = filter.until(until);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        filter
    }

    /// Evaluate the query against one event. `limit` is not considered here.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }
        if !self.event_refs.is_empty()
            && !referenced_events(event)
                .iter()
                .any(|id| self.event_refs.contains(id))
        {
            return false;
        }
        if !self.pubkey_refs.is_empty()
            && !referenced_pubkeys(event)
                .iter()
                .any(|pk| self.pubkey_refs.contains(pk))
        {
            return false;
        }
        true
    }
}
