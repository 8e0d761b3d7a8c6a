//! Webhook event types.
//!
//! Event types are a closed enum rather than free-form strings so a typo in
//! a subscription or a dispatch site is a compile error, not a webhook that
//! silently never fires.

use serde::{Deserialize, Serialize};

/// Everything a merchant can subscribe a webhook endpoint to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "payment.created")]
    PaymentCreated,
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment.cancelled")]
    PaymentCancelled,
    #[serde(rename = "payment.expired")]
    PaymentExpired,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
}

impl EventType {
    pub const ALL: &'static [EventType] = &[
        Self::PaymentCreated,
        Self::PaymentSucceeded,
        Self::PaymentCancelled,
        Self::PaymentExpired,
        Self::PaymentRefunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentCreated => "payment.created",
            Self::PaymentSucceeded => "payment.succeeded",
            Self::PaymentCancelled => "payment.cancelled",
            Self::PaymentExpired => "payment.expired",
            Self::PaymentRefunded => "payment.refunded",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment.created" => Ok(Self::PaymentCreated),
            "payment.succeeded" => Ok(Self::PaymentSucceeded),
            "payment.cancelled" => Ok(Self::PaymentCancelled),
            "payment.expired" => Ok(Self::PaymentExpired),
            "payment.refunded" => Ok(Self::PaymentRefunded),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A domain event produced by the payment ledger, handed to the webhook
/// dispatcher for fan-out. The `data` value becomes the payload's `data`
/// field verbatim.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub merchant_id: String,
    pub event_type: EventType,
    pub livemode: bool,
    pub data: serde_json::Value,
}
