//! Prevents the bot from replying twice to the same request.
//!
//! The relays are the source of truth: a request counts as answered when any
//! relay returns an event of the monitored kind, authored by the bot, that
//! references the request. Relays are eventually consistent, so a reply that
//! has not propagated yet is invisible to that check. Replies this process
//! published are therefore also remembered locally in a bounded set.

use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;
use parking_lot::Mutex;

use crate::config::BotConfig;
use crate::error::{Error, Result};
use crate::query::EventQuery;
use crate::recent::RecentIds;
use crate::transport::RelaySet;

/// Slack given to the relay fetch beyond its own EOSE deadline
const FETCH_GRACE: Duration = Duration::from_secs(1);

pub struct DedupGuard {
    relays: Arc<dyn RelaySet>,
    bot: PublicKey,
    kind: Kind,
    timeout: Duration,
    answered: Mutex<RecentIds>,
}

impl DedupGuard {
    pub fn new(relays: Arc<dyn RelaySet>, bot: PublicKey, config: &BotConfig) -> Self {
        Self {
            relays,
            bot,
            kind: config.kind(),
            timeout: config.dedup_timeout(),
            answered: Mutex::new(RecentIds::new(config.answered_cache_size)),
        }
    }

    /// True if `author` already published a note referencing `request`.
    ///
    /// A fetch that fails or outlives the deadline is an error, so callers can
    /// tell "not answered" apart from "could not tell".
    pub async fn already_answered(&self, request: EventId, author: PublicKey) -> Result<bool> {
        if author == self.bot && self.answered.lock().contains(&request) {
            return Ok(true);
        }

        let query = EventQuery::new()
            .kind(self.kind)
            .author(author)
            .referencing_event(request)
            .limit(1);

        let reply = tokio::time::timeout(
            self.timeout + FETCH_GRACE,
            self.relays.fetch_first(&query, self.timeout),
        )
        .await
        .map_err(|_| Error::Timeout("answered check"))??;

        Ok(reply.is_some())
    }

    /// Record that the bot replied to `request`.
    pub fn remember(&self, request: EventId) {
        self.answered.lock().insert(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRelays;

    fn reply(keys: &Keys, to: &Event) -> Event {
        EventBuilder::text_note("12 GMs")
            .tags([Tag::event(to.id), Tag::public_key(to.pubkey)])
            .sign_with_keys(keys)
            .unwrap()
    }

    fn setup(relays: FakeRelays) -> (Arc<FakeRelays>, Keys, DedupGuard) {
        let relays = Arc::new(relays);
        let bot = Keys::generate();
        let guard = DedupGuard::new(relays.clone(), bot.public_key(), &BotConfig::default());
        (relays, bot, guard)
    }

    #[tokio::test]
    async fn test_unanswered_then_answered() {
        let (relays, bot, guard) = setup(FakeRelays::new(2));
        let request = EventBuilder::text_note("stats").sign_with_keys(&Keys::generate()).unwrap();

        assert!(!guard.already_answered(request.id, bot.public_key()).await.unwrap());

        relays.seed(reply(&bot, &request));
        assert!(guard.already_answered(request.id, bot.public_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reply_by_someone_else_does_not_count() {
        let (relays, bot, guard) = setup(FakeRelays::new(1));
        let request = EventBuilder::text_note("stats").sign_with_keys(&Keys::generate()).unwrap();

        relays.seed(reply(&Keys::generate(), &request));
        assert!(!guard.already_answered(request.id, bot.public_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_remembered_reply_skips_relays() {
        let (_relays, bot, guard) = setup(FakeRelays::new(1).with_failing_fetch());
        let request = EventBuilder::text_note("stats").sign_with_keys(&Keys::generate()).unwrap();

        assert!(guard.already_answered(request.id, bot.public_key()).await.is_err());

        guard.remember(request.id);
        assert!(guard.already_answered(request.id, bot.public_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_answer_found_without_waiting_for_slow_relays() {
        let (relays, bot, guard) = setup(FakeRelays::new(3).with_stalled_relay());
        let request = EventBuilder::text_note("stats").sign_with_keys(&Keys::generate()).unwrap();
        relays.seed(reply(&bot, &request));

        // Well under the 10s dedup timeout a stalled relay would hold a full fetch for
        let answered = tokio::time::timeout(
            Duration::from_secs(1),
            guard.already_answered(request.id, bot.public_key()),
        )
        .await
        .expect("answered check waited for the stalled relay")
        .unwrap();
        assert!(answered);
    }
}
