//! Prefixed ID generation for Paylane entities.
//!
//! All IDs carry an entity prefix so that a bare ID is self-describing in
//! logs and webhook payloads (`pay_...`, `we_...`, etc.).
//!
//! Format: `{prefix}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["pay_", "rf_", "we_", "wha_", "evt_", "mch_"];

/// Validate that a string is a valid Paylane prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `{prefix}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in Paylane.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Payment,
    Refund,
    WebhookEndpoint,
    WebhookAttempt,
    Event,
    Merchant,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Payment => "pay",
            Self::Refund => "rf",
            Self::WebhookEndpoint => "we",
            Self::WebhookAttempt => "wha",
            Self::Event => "evt",
            Self::Merchant => "mch",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
