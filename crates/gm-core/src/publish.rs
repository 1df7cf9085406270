use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;

use crate::config::BotConfig;
use crate::error::{Error, Result};
use crate::transport::RelaySet;

/// Per-relay outcome of one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub event_id: EventId,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PublishReport {
    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

pub struct ReplyPublisher {
    relays: Arc<dyn RelaySet>,
    keys: Keys,
    kind: Kind,
    timeout: Duration,
}

impl ReplyPublisher {
    pub fn new(relays: Arc<dyn RelaySet>, keys: Keys, config: &BotConfig) -> Self {
        Self {
            relays,
            keys,
            kind: config.kind(),
            timeout: config.publish_timeout(),
        }
    }

    /// Sign a reply that tags the trigger event and its author.
    pub fn build_reply(&self, trigger: &Event, body: &str) -> Result<Event> {
        EventBuilder::new(self.kind, body)
            .tags([Tag::event(trigger.id), Tag::public_key(trigger.pubkey)])
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    /// Send the reply to every relay independently. A relay that fails or
    /// exceeds the timeout does not affect the others.
    pub async fn publish(&self, trigger: &Event, body: &str) -> Result<PublishReport> {
        let reply = self.build_reply(trigger, body)?;
        let reply = &reply;

        let attempts = self.relays.urls().iter().map(|url| async move {
            let outcome = tokio::time::timeout(self.timeout, self.relays.publish_to(url, reply)).await;
            (url, outcome)
        });

        let mut report = PublishReport {
            event_id: reply.id,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (url, outcome) in futures::future::join_all(attempts).await {
            match outcome {
                Ok(Ok(())) => {
                    tracing::debug!(%url, id = %reply.id, "reply published");
                    report.succeeded.push(url.clone());
                }
                Ok(Err(e)) => {
                    tracing::warn!(%url, id = %reply.id, error = %e, "reply not accepted");
                    report.failed.push((url.clone(), e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(%url, id = %reply.id, "reply publish timed out");
                    report.failed.push((url.clone(), "timed out".to_string()));
                }
            }
        }

        tracing::info!(
            id = %reply.id,
            trigger = %trigger.id,
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            "reply sent"
        );
        Ok(report)
    }
}
