//! Event bus (C13).
//!
//! Subscribers register a glob-style pattern (`payment.*`, `escrow.released`,
//! `*`) and receive a fire-and-forget callback for every event whose topic
//! matches. Dispatch runs on tracked background tasks so graceful shutdown
//! (mirroring [`crate::sig_down::SigDown`]) can wait for in-flight deliveries
//! with a bounded timeout instead of dropping them silently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;

use crate::ids::event_id;
use crate::timestamp::UnixTimestamp;

/// Wire contract version for the `api_version` field on every emitted event.
pub const API_VERSION: &str = "2024-01";

/// An emitted platform event. Field names match the wire contract
/// (`id`/`type`/`data`/`created_at`/`api_version`) rather than this crate's
/// internal naming, since webhook subscribers depend on this exact shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "id")]
    pub event_id: String,
    #[serde(rename = "type")]
    pub topic: String,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    pub created_at: UnixTimestamp,
    pub api_version: String,
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: Event);
}

/// Matches `*` as a wildcard segment and `payment.*` as a prefix wildcard;
/// an exact pattern matches only that literal topic. Shared with the webhook
/// delivery engine's subscription matching.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return topic == prefix || topic.starts_with(&format!("{prefix}."));
    }
    pattern == topic
}

struct Subscription {
    pattern: String,
    subscriber: Arc<dyn EventSubscriber>,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: DashMap<String, Subscription>,
    tracker: TaskTracker,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscription_id: String, pattern: String, subscriber: Arc<dyn EventSubscriber>) {
        self.subscriptions
            .insert(subscription_id, Subscription { pattern, subscriber });
    }

    pub fn unsubscribe(&self, subscription_id: &str) {
        self.subscriptions.remove(subscription_id);
    }

    /// Publishes `topic`/`payload`, dispatching to every matching subscriber
    /// on its own tracked background task. Never blocks on subscriber work.
    pub fn publish(&self, topic: &str, payload: serde_json::Value, now: UnixTimestamp) -> Event {
        let event = Event {
            event_id: event_id(),
            topic: topic.to_string(),
            payload,
            created_at: now,
            api_version: API_VERSION.to_string(),
        };

        for entry in self.subscriptions.iter() {
            if topic_matches(&entry.pattern, topic) {
                let subscriber = Arc::clone(&entry.subscriber);
                let event = event.clone();
                self.tracker.spawn(async move {
                    subscriber.handle(event).await;
                });
            }
        }

        event
    }

    /// Waits for in-flight deliveries to finish, up to `timeout`. Part of the
    /// orchestrated shutdown sequence alongside [`crate::sig_down::SigDown`].
    pub async fn shutdown(&self, timeout: Duration) {
        self.tracker.close();
        let _ = tokio::time::timeout(timeout, self.tracker.wait()).await;
    }
}
