//! Webhook fan-out and delivery.
//!
//! Given a domain event, the dispatcher selects the merchant's active
//! endpoints subscribed to that event type, serializes one payload, and
//! delivers it to each endpoint independently and concurrently. Every try,
//! success or failure, is recorded as an immutable `WebhookAttempt` before
//! that try counts as done; failed tries walk the retry ladder inside
//! their own task.

use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinHandle;

use crate::db::{queries, DbPool};
use crate::error::Result;
use crate::events::{DomainEvent, EventType};
use crate::id::EntityType;
use crate::models::{WebhookAttempt, WebhookEndpoint};
use crate::signature;
use crate::webhooks::RetryPolicy;

pub const SIGNATURE_HEADER: &str = "X-Paylane-Signature";
pub const EVENT_HEADER: &str = "X-Paylane-Event";

/// Outcome of a single HTTP POST to an endpoint.
struct TryOutcome {
    status_code: i64,
    success: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: DbPool,
    client: Client,
    policy: RetryPolicy,
}

impl Dispatcher {
    /// Build a dispatcher with a shared HTTP client.
    pub fn new(pool: DbPool, delivery_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(delivery_timeout)
            .user_agent("paylane-webhooks/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            // Builder only fails on TLS backend misconfiguration; there is
            // no useful degraded mode without an HTTP client.
            .expect("failed to build webhook HTTP client");

        Self {
            pool,
            client,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry schedule (tests compress the ladder).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fan an event out to all matching endpoints.
    ///
    /// Each endpoint gets its own spawned task so one endpoint's slowness
    /// or retry schedule never affects another's. The returned handles are
    /// ignored by the worker loop; tests join them to await completion.
    pub fn dispatch(&self, event: &DomainEvent) -> Vec<JoinHandle<()>> {
        let endpoints = {
            let conn = match self.pool.get() {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("webhook dispatch: failed to get DB connection: {}", e);
                    return Vec::new();
                }
            };
            match queries::list_endpoints_for_event(&conn, &event.merchant_id, event.event_type) {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    tracing::error!(
                        "webhook dispatch: failed to query endpoints for {}: {}",
                        event.merchant_id,
                        e
                    );
                    return Vec::new();
                }
            }
        };

        if endpoints.is_empty() {
            tracing::debug!(
                "no active endpoints subscribed to {} for merchant {}",
                event.event_type,
                event.merchant_id
            );
            return Vec::new();
        }

        let event_id = EntityType::Event.gen_id();
        let payload = serde_json::json!({
            "id": event_id,
            "type": event.event_type,
            "created": queries::now_ms(),
            "livemode": event.livemode,
            "data": event.data,
        })
        .to_string();

        endpoints
            .into_iter()
            .map(|endpoint| {
                let dispatcher = self.clone();
                let event_id = event_id.clone();
                let payload = payload.clone();
                let event_type = event.event_type;
                tokio::spawn(async move {
                    dispatcher
                        .deliver_with_retries(endpoint, event_id, event_type, payload)
                        .await;
                })
            })
            .collect()
    }

    /// Walk the retry ladder for one endpoint until a delivery succeeds or
    /// the ladder is exhausted.
    async fn deliver_with_retries(
        &self,
        endpoint: WebhookEndpoint,
        event_id: String,
        event_type: EventType,
        payload: String,
    ) {
        for attempt_number in 1..=self.policy.max_attempts() {
            // delay_before(1) is zero: the first attempt is immediate.
            if let Some(delay) = self.policy.delay_before(attempt_number) {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let outcome = self
                .try_once(&endpoint, &event_id, event_type, &payload, attempt_number)
                .await;

            match outcome {
                Ok(attempt) if attempt.success => return,
                Ok(_) => continue,
                Err(e) => {
                    // Recording the attempt failed; without the audit row
                    // the try does not count, so stop rather than lose
                    // track of the sequence.
                    tracing::error!(
                        "webhook delivery to {} aborted, could not record attempt: {}",
                        endpoint.id,
                        e
                    );
                    return;
                }
            }
        }

        tracing::error!(
            "webhook delivery permanently failed: endpoint={} event={} type={} after {} attempts",
            endpoint.id,
            event_id,
            event_type,
            self.policy.max_attempts()
        );
    }

    /// One delivery try: POST, then durably record the attempt.
    async fn try_once(
        &self,
        endpoint: &WebhookEndpoint,
        event_id: &str,
        event_type: EventType,
        payload: &str,
        attempt_number: i64,
    ) -> Result<WebhookAttempt> {
        let outcome = self.post(endpoint, event_type, payload).await;

        let attempt = WebhookAttempt {
            id: EntityType::WebhookAttempt.gen_id(),
            endpoint_id: endpoint.id.clone(),
            event_id: event_id.to_string(),
            event_type,
            payload: payload.to_string(),
            attempt_number,
            status_code: outcome.status_code,
            success: outcome.success,
            error: outcome.error,
            created_at: queries::now_ms(),
        };

        let conn = self.pool.get()?;
        queries::insert_webhook_attempt(&conn, &attempt)?;
        queries::record_endpoint_delivery_outcome(&conn, &endpoint.id, outcome.success)?;

        if outcome.success {
            tracing::info!(
                "webhook delivered: endpoint={} event={} attempt={} status={}",
                endpoint.id,
                event_id,
                attempt_number,
                outcome.status_code
            );
        } else {
            tracing::warn!(
                "webhook delivery failed: endpoint={} event={} attempt={} status={}",
                endpoint.id,
                event_id,
                attempt_number,
                attempt.status_code
            );
        }

        Ok(attempt)
    }

    /// Deliver a previously recorded attempt's payload once more, outside
    /// the automatic ladder. Re-signs with the endpoint's current secret
    /// and continues the attempt-number sequence.
    pub async fn redeliver(
        &self,
        endpoint: &WebhookEndpoint,
        original: &WebhookAttempt,
    ) -> Result<WebhookAttempt> {
        let attempt_number = {
            let conn = self.pool.get()?;
            queries::next_attempt_number(&conn, &endpoint.id, &original.event_id)?
        };

        self.try_once(
            endpoint,
            &original.event_id,
            original.event_type,
            &original.payload,
            attempt_number,
        )
        .await
    }

    async fn post(
        &self,
        endpoint: &WebhookEndpoint,
        event_type: EventType,
        payload: &str,
    ) -> TryOutcome {
        // Sign at send time so the timestamp reflects this attempt, not
        // the original event.
        let signature = signature::sign_now(payload.as_bytes(), &endpoint.secret);

        let response = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event_type.as_str())
            .body(payload.to_string())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                TryOutcome {
                    status_code: status.as_u16() as i64,
                    success: status.is_success(),
                    error: if status.is_success() {
                        None
                    } else {
                        Some(format!("endpoint returned {}", status))
                    },
                }
            }
            // Network failure or timeout: status code 0 by convention.
            Err(e) => TryOutcome {
                status_code: 0,
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}
