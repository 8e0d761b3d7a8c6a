//! Row mapping trait and helpers for reducing boilerplate in queries.

use std::collections::HashSet;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::events::EventType;
use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt rows.
fn parse_enum<T: FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse the JSON-encoded event set stored on webhook endpoints. Unknown
/// event strings fail the row rather than being silently dropped.
fn parse_event_set(row: &Row, col: usize) -> rusqlite::Result<HashSet<EventType>> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, "events".to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const MERCHANT_COLS: &str =
    "id, name, api_key_hash, fee_percent, fixed_fee, livemode, created_at";

pub const PAYMENT_COLS: &str = "id, merchant_id, order_id, amount, currency, amount_refunded, fee_amount, net_amount, status, description, created_at, updated_at, paid_at, cancelled_at, refunded_at, expires_at";

pub const REFUND_COLS: &str = "id, payment_id, amount, reason, status, processed_at, created_at";

pub const WEBHOOK_ENDPOINT_COLS: &str = "id, merchant_id, url, secret, events, is_active, success_count, failure_count, last_success_at, last_failure_at, created_at, updated_at";

pub const WEBHOOK_ATTEMPT_COLS: &str = "id, endpoint_id, event_id, event_type, payload, attempt_number, status_code, success, error, created_at";

// ============ FromRow Implementations ============

impl FromRow for Merchant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Merchant {
            id: row.get(0)?,
            name: row.get(1)?,
            api_key_hash: row.get(2)?,
            fee_percent: row.get(3)?,
            fixed_fee: row.get(4)?,
            livemode: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            merchant_id: row.get(1)?,
            order_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            amount_refunded: row.get(5)?,
            fee_amount: row.get(6)?,
            net_amount: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            description: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            paid_at: row.get(12)?,
            cancelled_at: row.get(13)?,
            refunded_at: row.get(14)?,
            expires_at: row.get(15)?,
        })
    }
}

impl FromRow for Refund {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Refund {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            amount: row.get(2)?,
            reason: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            processed_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for WebhookEndpoint {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEndpoint {
            id: row.get(0)?,
            merchant_id: row.get(1)?,
            url: row.get(2)?,
            secret: row.get(3)?,
            events: parse_event_set(row, 4)?,
            is_active: row.get(5)?,
            success_count: row.get(6)?,
            failure_count: row.get(7)?,
            last_success_at: row.get(8)?,
            last_failure_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for WebhookAttempt {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookAttempt {
            id: row.get(0)?,
            endpoint_id: row.get(1)?,
            event_id: row.get(2)?,
            event_type: parse_enum(row, 3, "event_type")?,
            payload: row.get(4)?,
            attempt_number: row.get(5)?,
            status_code: row.get(6)?,
            success: row.get(7)?,
            error: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}
