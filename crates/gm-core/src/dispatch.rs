//! Turns mentions of the bot into replies.
//!
//! [`Dispatcher::run`] keeps one subscription open for notes that tag the bot
//! and hands each event to [`Dispatcher::handle`] on a bounded pool of
//! concurrent workers. A dropped subscription is re-established after a
//! delay; the loop only exits on cancellation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::command::{CommandKind, CommandParser};
use crate::config::BotConfig;
use crate::error::{Error, Result};
use crate::guard::DedupGuard;
use crate::publish::{PublishReport, ReplyPublisher};
use crate::query::EventQuery;
use crate::stats::StatsEngine;
use crate::transport::RelaySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OwnEvent,
    UnknownCommand,
    /// Another worker is already handling this event
    InFlight,
    AlreadyAnswered,
}

#[derive(Debug)]
pub enum Outcome {
    Skipped(Skip),
    Replied(PublishReport),
    Failed(Error),
}

/// Removes the event from the in-flight set when the worker is done with it.
struct InFlightClaim<'a> {
    set: &'a Mutex<HashSet<EventId>>,
    id: EventId,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(set: &'a Mutex<HashSet<EventId>>, id: EventId) -> Option<Self> {
        set.lock().insert(id).then(|| Self { set, id })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

pub struct Dispatcher {
    relays: Arc<dyn RelaySet>,
    parser: CommandParser,
    guard: Arc<DedupGuard>,
    stats: StatsEngine,
    publisher: ReplyPublisher,
    bot: PublicKey,
    kind: Kind,
    workers: usize,
    lookback: Duration,
    resubscribe_delay: Duration,
    in_flight: Mutex<HashSet<EventId>>,
}

impl Dispatcher {
    pub fn new(
        relays: Arc<dyn RelaySet>,
        parser: CommandParser,
        guard: Arc<DedupGuard>,
        stats: StatsEngine,
        publisher: ReplyPublisher,
        bot: PublicKey,
        config: &BotConfig,
    ) -> Self {
        Self {
            relays,
            parser,
            guard,
            stats,
            publisher,
            bot,
            kind: config.kind(),
            workers: config.workers.max(1),
            lookback: config.lookback(),
            resubscribe_delay: config.resubscribe_delay(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Notes of the monitored kind that tag the bot, starting one lookback
    /// period ago so requests sent during a restart are still seen.
    pub fn mention_query(&self) -> EventQuery {
        let since = Timestamp::now().as_u64().saturating_sub(self.lookback.as_secs());
        EventQuery::new()
            .kind(self.kind)
            .referencing_pubkey(self.bot)
            .since(Timestamp::from(since))
    }

    /// Listen until `cancel` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(bot = %self.bot, workers = self.workers, "dispatcher started");

        loop {
            if is_cancelled(&cancel) {
                break;
            }

            match self.relays.subscribe(&self.mention_query()).await {
                Ok(stream) => {
                    let this = self;
                    stream
                        .take_until(cancelled(cancel.clone()))
                        .for_each_concurrent(self.workers, move |event| async move {
                            this.handle(&event).await;
                        })
                        .await;

                    if is_cancelled(&cancel) {
                        break;
                    }
                    tracing::warn!("mention subscription ended");
                }
                Err(e) => tracing::error!(error = %e, "failed to subscribe to mentions"),
            }

            tracing::info!(delay = ?self.resubscribe_delay, "resubscribing");
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }

        tracing::info!("dispatcher stopped");
    }

    /// Process one mention end to end. Errors are logged and returned, never
    /// propagated to the subscription loop.
    pub async fn handle(&self, event: &Event) -> Outcome {
        if event.pubkey == self.bot {
            return Outcome::Skipped(Skip::OwnEvent);
        }

        let command = self.parser.classify(event);
        if command == CommandKind::Unknown {
            tracing::debug!(id = %event.id, "mention without a command");
            return Outcome::Skipped(Skip::UnknownCommand);
        }

        let Some(_claim) = InFlightClaim::acquire(&self.in_flight, event.id) else {
            return Outcome::Skipped(Skip::InFlight);
        };

        match self.guard.already_answered(event.id, self.bot).await {
            Ok(true) => {
                tracing::debug!(id = %event.id, "already answered");
                return Outcome::Skipped(Skip::AlreadyAnswered);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(id = %event.id, error = %e, "could not check for an earlier reply");
                return Outcome::Failed(e);
            }
        }

        tracing::info!(id = %event.id, author = %event.pubkey, %command, "handling command");

        let body = match self.reply_body(command, event.pubkey).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(id = %event.id, %command, error = %e, "failed to compute reply");
                return Outcome::Failed(e);
            }
        };

        match self.publisher.publish(event, &body).await {
            Ok(report) => {
                if report.any_succeeded() {
                    self.guard.remember(event.id);
                } else {
                    tracing::warn!(id = %event.id, "reply reached no relay");
                }
                Outcome::Replied(report)
            }
            Err(e) => {
                tracing::error!(id = %event.id, error = %e, "failed to publish reply");
                Outcome::Failed(e)
            }
        }
    }

    async fn reply_body(&self, command: CommandKind, requester: PublicKey) -> Result<String> {
        match command {
            CommandKind::Stats => self.stats.stats_reply(requester).await,
            CommandKind::Total => self.stats.total_reply().await,
            CommandKind::Top => self.stats.top_reply().await,
            CommandKind::Missed => self.stats.missed_reply(requester).await,
            CommandKind::Unknown => Err(Error::NoReply(command.to_string())),
        }
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

async fn cancelled(mut cancel: watch::Receiver<bool>) {
    // Err means the sender is gone, which also ends the run
    let _ = cancel.wait_for(|stop| *stop).await;
}
