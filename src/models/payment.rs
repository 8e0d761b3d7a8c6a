use serde::{Deserialize, Serialize};

/// A single charge attempt for one merchant.
///
/// Payments are append-only: rows are never deleted, only superseded by
/// status changes. All amounts are integers in the smallest currency unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub merchant_id: String,
    /// Merchant-supplied order reference, unique per merchant.
    pub order_id: String,

    pub amount: i64,
    /// ISO 4217 code, lowercase (e.g. "usd").
    pub currency: String,
    /// Cumulative succeeded refund amount. Never exceeds `amount`.
    pub amount_refunded: i64,
    pub fee_amount: i64,
    pub net_amount: i64,

    pub status: PaymentStatus,
    pub description: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
    pub paid_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub refunded_at: Option<i64>,
    /// Pending payments past this timestamp are moved to `expired` by the
    /// expiry sweep.
    pub expires_at: Option<i64>,
}

impl Payment {
    /// Amount still available to refund.
    pub fn refundable_balance(&self) -> i64 {
        self.amount - self.amount_refunded
    }
}

/// Data required to create a new payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Expired => "expired",
        }
    }

    /// Whether a refund may be issued against a payment in this status.
    pub fn is_refundable(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallyRefunded)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "partially_refunded" => Ok(Self::PartiallyRefunded),
            "expired" => Ok(Self::Expired),
        _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One refund operation against exactly one payment.
///
/// The sum of succeeded refund amounts for a payment always equals that
/// payment's `amount_refunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}
