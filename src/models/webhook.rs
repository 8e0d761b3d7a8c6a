use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::events::EventType;

/// A merchant-owned webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub merchant_id: String,
    pub url: String,
    /// Shared signing secret (`whsec_...`). Generated at creation,
    /// replaced wholesale by rotation.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Event types this endpoint receives.
    pub events: HashSet<EventType>,
    pub is_active: bool,

    pub success_count: i64,
    pub failure_count: i64,
    pub last_success_at: Option<i64>,
    pub last_failure_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// Data required to create a new webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookEndpoint {
    pub url: String,
    pub events: HashSet<EventType>,
}

/// Fields a merchant may change on an existing endpoint. Absent fields are
/// left untouched; the secret is only changed through rotation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWebhookEndpoint {
    pub url: Option<String>,
    pub events: Option<HashSet<EventType>>,
    pub is_active: Option<bool>,
}

/// An immutable record of one delivery try.
///
/// Retries create new attempts, never update old ones; the attempt trail is
/// the delivery audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAttempt {
    pub id: String,
    pub endpoint_id: String,
    /// The event payload's own `id` field; ties retries of the same event
    /// together.
    pub event_id: String,
    pub event_type: EventType,
    /// The serialized JSON payload exactly as signed and sent.
    pub payload: String,
    /// 1-based, strictly increasing per (endpoint, event).
    pub attempt_number: i64,
    /// HTTP status of the response, or 0 on network failure/timeout.
    pub status_code: i64,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: i64,
}
