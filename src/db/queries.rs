//! All SQL queries for Paylane.
//!
//! Conventions: timestamps are unix milliseconds; status transitions use
//! guarded UPDATEs (`WHERE id = ? AND status = ?`) so concurrent callers
//! race on the database row, not on stale in-memory reads.

use rand::RngCore;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use super::from_row::{
    query_all, query_one, MERCHANT_COLS, PAYMENT_COLS, REFUND_COLS, WEBHOOK_ATTEMPT_COLS,
    WEBHOOK_ENDPOINT_COLS,
};
use crate::error::{AppError, Result};
use crate::events::EventType;
use crate::id::EntityType;
use crate::models::*;

/// Current time as unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============ Secrets ============

/// Generate a merchant API key (`plk_` + 32 random bytes, hex).
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("plk_{}", hex::encode(bytes))
}

/// Generate a webhook endpoint signing secret (`whsec_` + 32 random bytes,
/// hex).
pub fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}

/// Hash an API key for storage and lookup. SHA-256 with application salt,
/// lowercase hex.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"paylane-v1:");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

// ============ Merchants ============

pub fn create_merchant(
    conn: &Connection,
    input: &CreateMerchant,
    api_key: &str,
    default_fee_percent: f64,
    default_fixed_fee: i64,
) -> Result<Merchant> {
    let merchant = Merchant {
        id: EntityType::Merchant.gen_id(),
        name: input.name.clone(),
        api_key_hash: hash_api_key(api_key),
        fee_percent: input.fee_percent.unwrap_or(default_fee_percent),
        fixed_fee: input.fixed_fee.unwrap_or(default_fixed_fee),
        livemode: input.livemode,
        created_at: now_ms(),
    };

    conn.execute(
        "INSERT INTO merchants (id, name, api_key_hash, fee_percent, fixed_fee, livemode, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            merchant.id,
            merchant.name,
            merchant.api_key_hash,
            merchant.fee_percent,
            merchant.fixed_fee,
            merchant.livemode,
            merchant.created_at,
        ],
    )?;

    Ok(merchant)
}

pub fn get_merchant_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<Merchant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM merchants WHERE api_key_hash = ?1", MERCHANT_COLS),
        &[&hash_api_key(api_key)],
    )
}

pub fn get_merchant_by_id(conn: &Connection, id: &str) -> Result<Option<Merchant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM merchants WHERE id = ?1", MERCHANT_COLS),
        &[&id],
    )
}

// ============ Payments ============

/// Insert a new pending payment. Fee and net amounts are computed by the
/// ledger before insertion and frozen on the row.
pub fn create_payment(
    conn: &Connection,
    merchant_id: &str,
    input: &CreatePayment,
    fee_amount: i64,
    net_amount: i64,
) -> Result<Payment> {
    let now = now_ms();
    let payment = Payment {
        id: EntityType::Payment.gen_id(),
        merchant_id: merchant_id.to_string(),
        order_id: input.order_id.clone(),
        amount: input.amount,
        currency: input.currency.to_lowercase(),
        amount_refunded: 0,
        fee_amount,
        net_amount,
        status: PaymentStatus::Pending,
        description: input.description.clone(),
        created_at: now,
        updated_at: now,
        paid_at: None,
        cancelled_at: None,
        refunded_at: None,
        expires_at: input.expires_at,
    };

    conn.execute(
        "INSERT INTO payments (id, merchant_id, order_id, amount, currency, amount_refunded,
            fee_amount, net_amount, status, description, created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            payment.id,
            payment.merchant_id,
            payment.order_id,
            payment.amount,
            payment.currency,
            payment.amount_refunded,
            payment.fee_amount,
            payment.net_amount,
            payment.status.as_str(),
            payment.description,
            payment.created_at,
            payment.updated_at,
            payment.expires_at,
        ],
    )?;

    Ok(payment)
}

pub fn get_payment(conn: &Connection, merchant_id: &str, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE id = ?1 AND merchant_id = ?2",
            PAYMENT_COLS
        ),
        &[&id, &merchant_id],
    )
}

pub fn get_payment_by_id(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn list_payments(
    conn: &Connection,
    merchant_id: &str,
    status: Option<PaymentStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Payment>> {
    match status {
        Some(status) => query_all(
            conn,
            &format!(
                "SELECT {} FROM payments WHERE merchant_id = ?1 AND status = ?2
                 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                PAYMENT_COLS
            ),
            &[&merchant_id, &status.as_str(), &limit, &offset],
        ),
        None => query_all(
            conn,
            &format!(
                "SELECT {} FROM payments WHERE merchant_id = ?1
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                PAYMENT_COLS
            ),
            &[&merchant_id, &limit, &offset],
        ),
    }
}

pub fn count_payments(
    conn: &Connection,
    merchant_id: &str,
    status: Option<PaymentStatus>,
) -> Result<i64> {
    let count = match status {
        Some(status) => conn.query_row(
            "SELECT COUNT(*) FROM payments WHERE merchant_id = ?1 AND status = ?2",
            params![merchant_id, status.as_str()],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM payments WHERE merchant_id = ?1",
            params![merchant_id],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

/// Atomically move a payment from one status to another. Returns false if
/// the payment was not in `from` status at commit time (someone else won
/// the race, or the transition is invalid).
pub fn claim_status_transition(
    conn: &Connection,
    merchant_id: &str,
    payment_id: &str,
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<bool> {
    let now = now_ms();
    let extra_set = match to {
        PaymentStatus::Succeeded => ", paid_at = ?2",
        PaymentStatus::Cancelled => ", cancelled_at = ?2",
        _ => "",
    };
    let changed = conn.execute(
        &format!(
            "UPDATE payments SET status = ?1, updated_at = ?2{}
             WHERE id = ?3 AND merchant_id = ?4 AND status = ?5",
            extra_set
        ),
        params![to.as_str(), now, payment_id, merchant_id, from.as_str()],
    )?;
    Ok(changed == 1)
}

/// Find pending payments whose expiry deadline has passed.
pub fn list_expirable_payments(conn: &Connection, now: i64) -> Result<Vec<Payment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payments
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?1",
            PAYMENT_COLS
        ),
        &[&now],
    )
}

/// Apply a refund to a payment row. Guarded on the previously observed
/// `amount_refunded` so a concurrent refund that committed first makes this
/// update a no-op (returns false) instead of over-refunding.
pub fn apply_refund_to_payment(
    conn: &Connection,
    payment_id: &str,
    observed_refunded: i64,
    new_refunded: i64,
    new_status: PaymentStatus,
) -> Result<bool> {
    let now = now_ms();
    let changed = conn.execute(
        "UPDATE payments
         SET amount_refunded = ?1, status = ?2, refunded_at = ?3, updated_at = ?3
         WHERE id = ?4 AND amount_refunded = ?5
           AND status IN ('succeeded', 'partially_refunded')
           AND ?1 <= amount",
        params![new_refunded, new_status.as_str(), now, payment_id, observed_refunded],
    )?;
    Ok(changed == 1)
}

// ============ Refunds ============

pub fn insert_refund(conn: &Connection, refund: &Refund) -> Result<()> {
    conn.execute(
        "INSERT INTO refunds (id, payment_id, amount, reason, status, processed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            refund.id,
            refund.payment_id,
            refund.amount,
            refund.reason,
            refund.status.as_str(),
            refund.processed_at,
            refund.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_refunds(conn: &Connection, payment_id: &str) -> Result<Vec<Refund>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM refunds WHERE payment_id = ?1 ORDER BY created_at ASC",
            REFUND_COLS
        ),
        &[&payment_id],
    )
}

// ============ Webhook endpoints ============

pub fn create_webhook_endpoint(
    conn: &Connection,
    merchant_id: &str,
    input: &CreateWebhookEndpoint,
    secret: &str,
) -> Result<WebhookEndpoint> {
    let now = now_ms();
    let endpoint = WebhookEndpoint {
        id: EntityType::WebhookEndpoint.gen_id(),
        merchant_id: merchant_id.to_string(),
        url: input.url.clone(),
        secret: secret.to_string(),
        events: input.events.clone(),
        is_active: true,
        success_count: 0,
        failure_count: 0,
        last_success_at: None,
        last_failure_at: None,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO webhook_endpoints
            (id, merchant_id, url, secret, events, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
        params![
            endpoint.id,
            endpoint.merchant_id,
            endpoint.url,
            endpoint.secret,
            serde_json::to_string(&endpoint.events)?,
            now,
        ],
    )?;

    Ok(endpoint)
}

pub fn get_webhook_endpoint(
    conn: &Connection,
    merchant_id: &str,
    id: &str,
) -> Result<Option<WebhookEndpoint>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_endpoints WHERE id = ?1 AND merchant_id = ?2",
            WEBHOOK_ENDPOINT_COLS
        ),
        &[&id, &merchant_id],
    )
}

pub fn get_webhook_endpoint_by_id(conn: &Connection, id: &str) -> Result<Option<WebhookEndpoint>> {
    query_one(
        conn,
        &format!("SELECT {} FROM webhook_endpoints WHERE id = ?1", WEBHOOK_ENDPOINT_COLS),
        &[&id],
    )
}

pub fn list_webhook_endpoints(conn: &Connection, merchant_id: &str) -> Result<Vec<WebhookEndpoint>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_endpoints WHERE merchant_id = ?1 ORDER BY created_at DESC",
            WEBHOOK_ENDPOINT_COLS
        ),
        &[&merchant_id],
    )
}

/// Active endpoints of a merchant subscribed to the given event type.
///
/// The subscription set is small and stored as JSON, so membership is
/// checked on the decoded enum set rather than with SQL string matching.
pub fn list_endpoints_for_event(
    conn: &Connection,
    merchant_id: &str,
    event_type: EventType,
) -> Result<Vec<WebhookEndpoint>> {
    let endpoints: Vec<WebhookEndpoint> = query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_endpoints WHERE merchant_id = ?1 AND is_active = 1",
            WEBHOOK_ENDPOINT_COLS
        ),
        &[&merchant_id],
    )?;
    Ok(endpoints
        .into_iter()
        .filter(|e| e.subscribes_to(event_type))
        .collect())
}

pub fn update_webhook_endpoint(
    conn: &Connection,
    merchant_id: &str,
    id: &str,
    update: &UpdateWebhookEndpoint,
) -> Result<Option<WebhookEndpoint>> {
    let Some(mut endpoint) = get_webhook_endpoint(conn, merchant_id, id)? else {
        return Ok(None);
    };

    if let Some(ref url) = update.url {
        endpoint.url = url.clone();
    }
    if let Some(ref events) = update.events {
        endpoint.events = events.clone();
    }
    if let Some(is_active) = update.is_active {
        endpoint.is_active = is_active;
    }
    endpoint.updated_at = now_ms();

    conn.execute(
        "UPDATE webhook_endpoints SET url = ?1, events = ?2, is_active = ?3, updated_at = ?4
         WHERE id = ?5 AND merchant_id = ?6",
        params![
            endpoint.url,
            serde_json::to_string(&endpoint.events)?,
            endpoint.is_active,
            endpoint.updated_at,
            id,
            merchant_id,
        ],
    )?;

    Ok(Some(endpoint))
}

pub fn delete_webhook_endpoint(conn: &Connection, merchant_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM webhook_endpoints WHERE id = ?1 AND merchant_id = ?2",
        params![id, merchant_id],
    )?;
    Ok(changed == 1)
}

/// Replace an endpoint's signing secret. Single-writer update; the old
/// secret is invalid the moment this commits.
pub fn rotate_webhook_secret(
    conn: &Connection,
    merchant_id: &str,
    id: &str,
    new_secret: &str,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE webhook_endpoints SET secret = ?1, updated_at = ?2
         WHERE id = ?3 AND merchant_id = ?4",
        params![new_secret, now_ms(), id, merchant_id],
    )?;
    Ok(changed == 1)
}

pub fn record_endpoint_delivery_outcome(
    conn: &Connection,
    endpoint_id: &str,
    success: bool,
) -> Result<()> {
    let now = now_ms();
    if success {
        conn.execute(
            "UPDATE webhook_endpoints
             SET success_count = success_count + 1, last_success_at = ?1 WHERE id = ?2",
            params![now, endpoint_id],
        )?;
    } else {
        conn.execute(
            "UPDATE webhook_endpoints
             SET failure_count = failure_count + 1, last_failure_at = ?1 WHERE id = ?2",
            params![now, endpoint_id],
        )?;
    }
    Ok(())
}

// ============ Webhook attempts ============

/// Append one delivery attempt to the audit trail. Attempts are immutable;
/// there is no corresponding update query.
///
/// Two racing manual retries can compute the same attempt number; the
/// loser hits UNIQUE(endpoint_id, event_id, attempt_number), reported as
/// `Conflict` so the caller can retry with a fresh number.
pub fn insert_webhook_attempt(conn: &Connection, attempt: &WebhookAttempt) -> Result<()> {
    conn.execute(
        "INSERT INTO webhook_attempts
            (id, endpoint_id, event_id, event_type, payload, attempt_number,
             status_code, success, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            attempt.id,
            attempt.endpoint_id,
            attempt.event_id,
            attempt.event_type.as_str(),
            attempt.payload,
            attempt.attempt_number,
            attempt.status_code,
            attempt.success,
            attempt.error,
            attempt.created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!(
                "attempt {} for event {} already recorded",
                attempt.attempt_number, attempt.event_id
            ))
        }
        other => AppError::Database(other),
    })?;
    Ok(())
}

pub fn get_webhook_attempt(
    conn: &Connection,
    endpoint_id: &str,
    attempt_id: &str,
) -> Result<Option<WebhookAttempt>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_attempts WHERE id = ?1 AND endpoint_id = ?2",
            WEBHOOK_ATTEMPT_COLS
        ),
        &[&attempt_id, &endpoint_id],
    )
}

pub fn list_webhook_attempts(
    conn: &Connection,
    endpoint_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<WebhookAttempt>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_attempts WHERE endpoint_id = ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            WEBHOOK_ATTEMPT_COLS
        ),
        &[&endpoint_id, &limit, &offset],
    )
}

pub fn count_webhook_attempts(conn: &Connection, endpoint_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM webhook_attempts WHERE endpoint_id = ?1",
        params![endpoint_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Attempts already recorded for an endpoint+event pair. Used to continue
/// the attempt-number sequence for manual retries.
pub fn next_attempt_number(conn: &Connection, endpoint_id: &str, event_id: &str) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(attempt_number) FROM webhook_attempts
         WHERE endpoint_id = ?1 AND event_id = ?2",
        params![endpoint_id, event_id],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}
