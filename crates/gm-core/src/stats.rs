//! Statistics over stored notes and the reply texts built from them.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use futures::StreamExt;
use nostr_sdk::prelude::*;

use crate::config::BotConfig;
use crate::constants::kinds;
use crate::error::{Error, Result};
use crate::guard::DedupGuard;
use crate::query::EventQuery;
use crate::store::{EventStore, StoreError};
use crate::tags::referenced_pubkeys;
use crate::transport::RelaySet;
use crate::window::{days_between, in_zone, DailyWindow};

/// Answered checks run concurrently while building the missed digest
const MISSED_CHECK_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorStats {
    pub count: usize,
    /// `None` when the oldest timestamp is not representable as a date
    pub first_seen: Option<NaiveDate>,
    /// Local-midnight days between the first note and `now`, never negative
    pub days_since_first: i64,
}

impl AuthorStats {
    /// Reduce an author's notes. The oldest note is found by minimum
    /// `created_at`, independent of the order the store returned them in.
    /// Returns `None` only when `events` is empty.
    pub fn from_events<Tz: TimeZone>(events: &[Event], now: &DateTime<Tz>) -> Option<Self> {
        let oldest = events.iter().map(|e| e.created_at).min()?;
        let first = in_zone(&now.timezone(), oldest);

        Some(Self {
            count: events.len(),
            first_seen: first.as_ref().map(|f| f.date_naive()),
            // Notes dated in the future count as posted today
            days_since_first: first.map_or(0, |f| days_between(now, &f).max(0)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopAuthor {
    pub pubkey: PublicKey,
    pub count: usize,
}

impl TopAuthor {
    /// Author with the most notes. Ties go to the smallest public key so the
    /// answer does not depend on storage order.
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let mut counts: BTreeMap<PublicKey, usize> = BTreeMap::new();
        for event in events {
            *counts.entry(event.pubkey).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(pubkey, count)| Self { pubkey, count })
    }
}

fn encoding<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::Encoding(format!("{what}: {e}"))
}

pub struct StatsEngine {
    store: Arc<dyn EventStore>,
    relays: Arc<dyn RelaySet>,
    guard: Arc<DedupGuard>,
    kind: Kind,
    query_timeout: Duration,
    fetch_timeout: Duration,
    relay_url: String,
    view_url: String,
}

impl StatsEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        relays: Arc<dyn RelaySet>,
        guard: Arc<DedupGuard>,
        config: &BotConfig,
    ) -> Self {
        Self {
            store,
            relays,
            guard,
            kind: config.kind(),
            query_timeout: config.query_timeout(),
            fetch_timeout: config.dedup_timeout(),
            relay_url: config.relay_url.clone(),
            view_url: config.view_url.clone(),
        }
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        let result = tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(what))?;
        Ok(result?)
    }

    pub async fn author_stats(&self, author: PublicKey) -> Result<Option<AuthorStats>> {
        self.author_stats_at(author, &Local::now()).await
    }

    pub async fn author_stats_at<Tz: TimeZone>(
        &self,
        author: PublicKey,
        now: &DateTime<Tz>,
    ) -> Result<Option<AuthorStats>> {
        let query = EventQuery::new().kind(self.kind).author(author);
        let events = self.bounded("author query", self.store.query(&query)).await?;
        Ok(AuthorStats::from_events(&events, now))
    }

    pub async fn global_total(&self) -> Result<usize> {
        let query = EventQuery::new().kind(self.kind);
        self.bounded("total count", self.store.count(&query)).await
    }

    pub async fn top_author(&self) -> Result<Option<TopAuthor>> {
        let query = EventQuery::new().kind(self.kind);
        let events = self.bounded("top author query", self.store.query(&query)).await?;
        Ok(TopAuthor::from_events(&events))
    }

    /// Public keys from the author's most recent contact list on the relay set.
    pub async fn follows(&self, author: PublicKey) -> Result<Vec<PublicKey>> {
        let query = EventQuery::new()
            .kind(Kind::from(kinds::CONTACT_LIST))
            .author(author);
        let lists = self.relays.fetch(&query, self.fetch_timeout).await?;

        Ok(lists
            .iter()
            .max_by_key(|e| e.created_at)
            .map(referenced_pubkeys)
            .unwrap_or_default())
    }

    /// Today's stored notes by accounts `requester` follows that `requester`
    /// has not replied to, oldest first.
    pub async fn missed_from_follows(&self, requester: PublicKey) -> Result<Vec<EventId>> {
        self.missed_from_follows_within(requester, &DailyWindow::today())
            .await
    }

    pub async fn missed_from_follows_within(
        &self,
        requester: PublicKey,
        window: &DailyWindow,
    ) -> Result<Vec<EventId>> {
        let follows: HashSet<PublicKey> = self.follows(requester).await?.into_iter().collect();
        if follows.is_empty() {
            return Ok(Vec::new());
        }

        let query = EventQuery::new().kind(self.kind).within(window);
        let mut candidates: Vec<Event> = self
            .bounded("today query", self.store.query(&query))
            .await?
            .into_iter()
            .filter(|e| follows.contains(&e.pubkey))
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let checks: Vec<(EventId, Result<bool>)> = futures::stream::iter(candidates)
            .map(|event| async move {
                let replied = self.guard.already_answered(event.id, requester).await;
                (event.id, replied)
            })
            .buffered(MISSED_CHECK_CONCURRENCY)
            .collect()
            .await;

        let mut missed = Vec::new();
        for (id, replied) in checks {
            if !replied? {
                missed.push(id);
            }
        }
        Ok(missed)
    }

    pub async fn stats_reply(&self, author: PublicKey) -> Result<String> {
        Ok(match self.author_stats(author).await? {
            Some(stats) => self.render_stats(&stats),
            None => self.render_no_history(),
        })
    }

    pub async fn total_reply(&self) -> Result<String> {
        let total = self.global_total().await?;
        Ok(self.render_total(total))
    }

    pub async fn top_reply(&self) -> Result<String> {
        match self.top_author().await? {
            Some(top) => self.render_top(&top),
            None => Ok("No GMs stored yet.".to_string()),
        }
    }

    pub async fn missed_reply(&self, requester: PublicKey) -> Result<String> {
        let missed = self.missed_from_follows(requester).await?;
        render_missed(&missed)
    }

    pub fn render_stats(&self, stats: &AuthorStats) -> String {
        match stats.first_seen {
            Some(first_seen) => format!(
                "{} GMs in last {} days.\nFirst GM recorded on {}\n\nView all notes at {}",
                stats.count,
                stats.days_since_first,
                first_seen.format("%Y-%m-%d"),
                self.view_url
            ),
            None => format!(
                "{} GMs in last {} days.\n\nView all notes at {}",
                stats.count, stats.days_since_first, self.view_url
            ),
        }
    }

    pub fn render_no_history(&self) -> String {
        format!(
            "No GMs found!\nIf you want your GMs to be stored,\nadd {} to your relay list.",
            self.relay_url
        )
    }

    pub fn render_total(&self, total: usize) -> String {
        format!(
            "{} GMs stored in total.\n\nView all notes at {}",
            total, self.view_url
        )
    }

    pub fn render_top(&self, top: &TopAuthor) -> Result<String> {
        let npub = top.pubkey.to_bech32().map_err(encoding("npub"))?;
        Ok(format!(
            "Person with most GMs is nostr:{} ({} total).\n\nView all notes at {}",
            npub, top.count, self.view_url
        ))
    }
}

pub fn render_missed(missed: &[EventId]) -> Result<String> {
    if missed.is_empty() {
        return Ok("No GMs from follows you've missed today.".to_string());
    }

    let mut body = String::from("GMs from follows you've missed today:\n");
    for id in missed {
        let note = id.to_bech32().map_err(encoding("note id"))?;
        body.push_str("\n- nostr:");
        body.push_str(&note);
    }
    Ok(body)
}
