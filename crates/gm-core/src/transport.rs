//! Access to the upstream relay set.
//!
//! [`RelaySet`] is the narrow surface the bot needs from a relay client: a
//! live fan-in subscription, an EOSE-bounded fetch (whole or first hit), and
//! a publish to one named relay. [`PoolRelaySet`] implements it over a `nostr_sdk::Client`
//! that keeps one pooled connection per relay.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use nostr_sdk::prelude::*;
use tokio::sync::broadcast::error::RecvError;

use crate::query::EventQuery;
use crate::recent::RecentIds;

/// Events already yielded by one subscription are remembered up to this many
const STREAM_DEDUP_CAPACITY: usize = 10_000;

pub type EventStream = BoxStream<'static, Event>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("relay client error: {0}")]
    Client(String),

    #[error("relay {url} did not accept the event: {reason}")]
    Rejected { url: String, reason: String },

    #[error("relay {0} is not part of the relay set")]
    UnknownRelay(String),
}

#[async_trait]
pub trait RelaySet: Send + Sync {
    fn urls(&self) -> &[String];

    /// Live subscription across every relay. Each event is yielded once even
    /// when several relays deliver it.
    async fn subscribe(&self, query: &EventQuery) -> Result<EventStream, TransportError>;

    /// Stored matches from every relay; completes when all relays signalled
    /// end of stored events or `timeout` elapsed.
    async fn fetch(
        &self,
        query: &EventQuery,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError>;

    /// First stored match from any relay, or `None` once every relay
    /// signalled end of stored events or `timeout` elapsed.
    async fn fetch_first(
        &self,
        query: &EventQuery,
        timeout: Duration,
    ) -> Result<Option<Event>, TransportError> {
        Ok(self.fetch(query, timeout).await?.into_iter().next())
    }

    async fn publish_to(&self, url: &str, event: &Event) -> Result<(), TransportError>;
}

fn client_err<E: std::fmt::Display>(err: E) -> TransportError {
    TransportError::Client(err.to_string())
}

pub struct PoolRelaySet {
    client: Client,
    urls: Vec<String>,
}

impl PoolRelaySet {
    /// Add every relay and wait up to `timeout` for at least one connection.
    ///
    /// Relays that are down at startup are retried in the background by the
    /// pool, so a slow start is logged rather than treated as fatal.
    pub async fn connect(
        keys: &Keys,
        urls: &[String],
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().signer(keys.clone()).build();

        let mut added = Vec::new();
        for url in urls {
            match client.add_relay(url.as_str()).await {
                Ok(_) => added.push(url.clone()),
                Err(e) => tracing::warn!(%url, error = %e, "skipping relay"),
            }
        }
        if added.is_empty() {
            return Err(TransportError::Client("no usable relay url".to_string()));
        }

        let connect_start = Instant::now();
        if tokio::time::timeout(timeout, client.connect()).await.is_err() {
            tracing::warn!(elapsed = ?connect_start.elapsed(), "relay connect timed out");
        }

        // Relay status transitions asynchronously after connect() returns
        let poll_interval = Duration::from_millis(100);
        loop {
            let connected = client
                .relays()
                .await
                .values()
                .filter(|r| r.status() == RelayStatus::Connected)
                .count();

            if connected > 0 {
                tracing::info!(connected, total = added.len(), elapsed = ?connect_start.elapsed(), "relays connected");
                break;
            }
            if connect_start.elapsed() >= timeout {
                tracing::warn!(total = added.len(), "no relay connected yet, continuing with background reconnects");
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        Ok(Self {
            client,
            urls: added,
        })
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[async_trait]
impl RelaySet for PoolRelaySet {
    fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn subscribe(&self, query: &EventQuery) -> Result<EventStream, TransportError> {
        // Take the receiver before sending REQ so no early event is missed
        let mut notifications = self.client.notifications();
        let output = self
            .client
            .subscribe(query.to_filter(), None)
            .await
            .map_err(client_err)?;
        let subscription = output.val;
        tracing::debug!(%subscription, "subscribed on {} relay(s)", output.success.len());

        let stream = async_stream::stream! {
            let mut seen = RecentIds::new(STREAM_DEDUP_CAPACITY);
            loop {
                match notifications.recv().await {
                    Ok(RelayPoolNotification::Event { subscription_id, event, relay_url }) => {
                        if subscription_id != subscription || !seen.insert(event.id) {
                            continue;
                        }
                        tracing::trace!(id = %event.id, %relay_url, "event received");
                        yield *event;
                    }
                    Ok(RelayPoolNotification::Shutdown) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notification receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
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
        let events = self
            .client
            .fetch_events(query.to_filter(), timeout)
            .await
            .map_err(client_err)?;
        Ok(events.into_iter().collect())
    }

    async fn fetch_first(
        &self,
        query: &EventQuery,
        timeout: Duration,
    ) -> Result<Option<Event>, TransportError> {
        // Stop at the first event instead of waiting on the slowest relay
        let mut events = self
            .client
            .stream_events(query.to_filter(), timeout)
            .await
            .map_err(client_err)?;
        Ok(events.next().await)
    }

    async fn publish_to(&self, url: &str, event: &Event) -> Result<(), TransportError> {
        if !self.urls.iter().any(|u| u == url) {
            return Err(TransportError::UnknownRelay(url.to_string()));
        }

        let output = self
            .client
            .send_event_to([url], event)
            .await
            .map_err(client_err)?;

        if output.success.is_empty() {
            return Err(TransportError::Rejected {
                url: url.to_string(),
                reason: format!("{:?}", output.failed),
            });
        }
        Ok(())
    }
}
