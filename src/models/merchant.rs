use serde::{Deserialize, Serialize};

/// A merchant account. Owns payments and webhook endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    /// SHA-256 hash of the API key; the key itself is shown once at creation.
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    /// Platform fee percentage applied to this merchant's payments.
    pub fee_percent: f64,
    /// Fixed fee in the smallest currency unit.
    pub fixed_fee: i64,
    /// False for test-mode merchants; stamped into every webhook payload.
    pub livemode: bool,
    pub created_at: i64,
}

/// Data required to create a new merchant.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMerchant {
    pub name: String,
    pub fee_percent: Option<f64>,
    pub fixed_fee: Option<i64>,
    #[serde(default)]
    pub livemode: bool,
}
