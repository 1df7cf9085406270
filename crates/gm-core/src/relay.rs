//! The seam between the relay server framework and this crate.
//!
//! A relay framework runs every registered [`WritePolicy`] before it persists
//! an inbound event and surfaces the reject reason to the publisher.
//! [`StorePipeline`] reproduces that ordering over an [`EventStore`] so the
//! admission path can be embedded and exercised without a socket server.

use std::sync::Arc;

use async_trait::async_trait;
use nostr_sdk::prelude::*;

use crate::store::{EventStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyResult {
    Accept,
    /// Reject with a human-readable reason sent back in the relay's `OK` message
    Reject(String),
}

impl PolicyResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PolicyResult::Accept)
    }
}

#[async_trait]
pub trait WritePolicy: Send + Sync {
    /// Invoked synchronously before an event is admitted to storage.
    async fn on_candidate_event(&self, event: &Event) -> PolicyResult;

    /// Invoked when an event this policy accepted was not persisted, either
    /// because a later policy rejected it or because the save failed.
    async fn on_store_failed(&self, _event: &Event) {}
}

pub struct StorePipeline {
    policies: Vec<Arc<dyn WritePolicy>>,
    store: Arc<dyn EventStore>,
}

impl StorePipeline {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            policies: Vec::new(),
            store,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn WritePolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Run every policy in registration order, then persist the event.
    pub async fn submit(&self, event: &Event) -> Result<PolicyResult, StoreError> {
        for (idx, policy) in self.policies.iter().enumerate() {
            if let PolicyResult::Reject(reason) = policy.on_candidate_event(event).await {
                tracing::debug!(id = %event.id, author = %event.pubkey, %reason, "event rejected");
                for earlier in &self.policies[..idx] {
                    earlier.on_store_failed(event).await;
                }
                return Ok(PolicyResult::Reject(reason));
            }
        }

        if let Err(e) = self.store.save(event).await {
            tracing::error!(id = %event.id, error = %e, "failed to store admitted event");
            for policy in &self.policies {
                policy.on_store_failed(event).await;
            }
            return Err(e);
        }

        Ok(PolicyResult::Accept)
    }
}
