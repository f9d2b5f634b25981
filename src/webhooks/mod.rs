//! Webhook delivery engine (C14).
//!
//! Subscriptions map a topic pattern to a destination URL and secret. Each
//! delivery attempt is logged; failures are retried against the fixed
//! 1s/5s/30s schedule from [`crate::retry::RetryPolicy::webhook_delivery`]
//! before the subscription is marked failed for that event.

pub mod signing;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::Event;
use crate::ids::{delivery_attempt_id, webhook_subscription_id};
use crate::retry::RetryPolicy;
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub subscription_id: String,
    pub agent_id: String,
    pub topic_pattern: String,
    pub url: String,
    pub secret: String,
    pub is_active: bool,
    pub created_at: UnixTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub attempt_id: String,
    pub subscription_id: String,
    pub event_id: String,
    pub attempt_number: u32,
    pub status: DeliveryStatus,
    pub response_status: Option<u16>,
    pub error: Option<String>,
    pub attempted_at: UnixTimestamp,
}

/// Delivers an event's signed body to a destination. Implemented by an HTTP
/// client adapter outside this crate; a no-op/failing implementation is
/// useful for tests. `event_id`/`event_type`/`timestamp` are exposed
/// separately from `body` so an implementer can populate the
/// `X-Sardis-Event-ID`/`X-Sardis-Event-Type`/`X-Sardis-Timestamp` headers
/// alongside `X-Sardis-Signature` (`signature_header`).
#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn post(
        &self,
        url: &str,
        body: &str,
        signature_header: &str,
        event_id: &str,
        event_type: &str,
        timestamp: u64,
    ) -> Result<u16>;
}

#[derive(Debug, Default)]
pub struct SubscriptionStore {
    subscriptions: DashMap<String, WebhookSubscription>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_id: String, topic_pattern: String, url: String, secret: String, now: UnixTimestamp) -> WebhookSubscription {
        let subscription = WebhookSubscription {
            subscription_id: webhook_subscription_id(),
            agent_id,
            topic_pattern,
            url,
            secret,
            is_active: true,
            created_at: now,
        };
        self.subscriptions
            .insert(subscription.subscription_id.clone(), subscription.clone());
        subscription
    }

    pub fn deactivate(&self, subscription_id: &str) {
        if let Some(mut sub) = self.subscriptions.get_mut(subscription_id) {
            sub.is_active = false;
        }
    }

    pub fn matching(&self, topic: &str) -> Vec<WebhookSubscription> {
        self.subscriptions
            .iter()
            .filter(|s| s.is_active && crate::events::topic_matches(&s.topic_pattern, topic))
            .map(|s| s.clone())
            .collect()
    }
}

/// Delivers one event to one subscription, retrying per the fixed schedule.
/// Every attempt (success or failure) is appended to the returned log.
pub async fn deliver(
    subscription: &WebhookSubscription,
    event: &Event,
    transport: &dyn WebhookTransport,
    now_seconds: u64,
) -> Vec<DeliveryAttempt> {
    let schedule = RetryPolicy::webhook_delivery();
    let body = serde_json::to_string(event).expect("event is always serializable");
    let mut log = Vec::new();

    for attempt_number in 1..=schedule.max_attempts() {
        let header = signing::sign(subscription.secret.as_bytes(), now_seconds, &body);
        let result = transport
            .post(&subscription.url, &body, &header, &event.event_id, &event.topic, now_seconds)
            .await;
        let attempt = match result {
            Ok(status) if (200..300).contains(&status) => DeliveryAttempt {
                attempt_id: delivery_attempt_id(),
                subscription_id: subscription.subscription_id.clone(),
                event_id: event.event_id.clone(),
                attempt_number,
                status: DeliveryStatus::Delivered,
                response_status: Some(status),
                error: None,
                attempted_at: UnixTimestamp(now_seconds),
            },
            Ok(status) => DeliveryAttempt {
                attempt_id: delivery_attempt_id(),
                subscription_id: subscription.subscription_id.clone(),
                event_id: event.event_id.clone(),
                attempt_number,
                status: DeliveryStatus::Failed,
                response_status: Some(status),
                error: None,
                attempted_at: UnixTimestamp(now_seconds),
            },
            Err(e) => DeliveryAttempt {
                attempt_id: delivery_attempt_id(),
                subscription_id: subscription.subscription_id.clone(),
                event_id: event.event_id.clone(),
                attempt_number,
                status: DeliveryStatus::Failed,
                response_status: None,
                error: Some(e.to_string()),
                attempted_at: UnixTimestamp(now_seconds),
            },
        };

        let delivered = attempt.status == DeliveryStatus::Delivered;
        log.push(attempt);
        if delivered {
            return log;
        }

        if let Some(delay) = schedule.delay_for_attempt(attempt_number) {
            tokio::time::sleep(delay).await;
        }
    }

    log
}
