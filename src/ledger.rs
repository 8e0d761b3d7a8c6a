//! The payment ledger state machine.
//!
//! Owns every payment lifecycle transition:
//!
//! ```text
//! pending ──confirm──▶ succeeded ──refund──▶ partially_refunded ──refund──▶ refunded
//!    │                                              │
//!    ├──cancel──▶ cancelled                         └──refund──▶ refunded
//!    └──expire──▶ expired
//! ```
//!
//! Transitions are serialized per payment through guarded UPDATEs (and, for
//! refunds, an IMMEDIATE transaction), so the guard is checked against
//! persisted state at commit time rather than a stale read. An operation
//! attempted from a state with no such transition fails with
//! `InvalidStateTransition` and leaves the payment untouched.
//!
//! Every successful transition emits exactly one domain event. Emission is
//! best-effort relative to the state change: the change commits first, and
//! a full dispatcher queue or absent worker never rolls it back.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventType};
use crate::id::EntityType;
use crate::models::{
    CreatePayment, Merchant, Payment, PaymentStatus, Refund, RefundStatus,
};
use crate::money;
use crate::webhooks::EventSender;

/// Create a new pending payment for a merchant.
///
/// Fee and net amounts are computed from the merchant's fee config and
/// frozen on the row. Emits `payment.created`.
pub fn create_payment(
    conn: &Connection,
    merchant: &Merchant,
    input: &CreatePayment,
    events: &EventSender,
) -> Result<Payment> {
    if input.amount <= 0 {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    if input.order_id.trim().is_empty() {
        return Err(AppError::BadRequest("order_id must not be empty".into()));
    }

    let fee_amount = money::fee(input.amount, merchant.fee_percent, merchant.fixed_fee);
    if fee_amount >= input.amount {
        return Err(AppError::BadRequest(
            "amount does not cover the platform fee".into(),
        ));
    }
    let net_amount = money::net(input.amount, merchant.fee_percent, merchant.fixed_fee);

    let payment = queries::create_payment(conn, &merchant.id, input, fee_amount, net_amount)
        .map_err(|e| match e {
            AppError::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::Conflict(format!("order_id {} already exists", input.order_id))
            }
            other => other,
        })?;

    emit(events, merchant, EventType::PaymentCreated, &payment, None);
    Ok(payment)
}

/// Confirm a pending payment: pending -> succeeded. Emits
/// `payment.succeeded`.
pub fn confirm_payment(
    conn: &Connection,
    merchant: &Merchant,
    payment_id: &str,
    events: &EventSender,
) -> Result<Payment> {
    transition(conn, merchant, payment_id, "confirm", PaymentStatus::Succeeded, events)
}

/// Cancel a pending payment: pending -> cancelled. Emits
/// `payment.cancelled`.
pub fn cancel_payment(
    conn: &Connection,
    merchant: &Merchant,
    payment_id: &str,
    events: &EventSender,
) -> Result<Payment> {
    transition(conn, merchant, payment_id, "cancel", PaymentStatus::Cancelled, events)
}

/// Expire a pending payment: pending -> expired. Driven by the expiry
/// sweep or an external expiry signal. Emits `payment.expired`.
pub fn expire_payment(
    conn: &Connection,
    merchant: &Merchant,
    payment_id: &str,
    events: &EventSender,
) -> Result<Payment> {
    transition(conn, merchant, payment_id, "expire", PaymentStatus::Expired, events)
}

fn transition(
    conn: &Connection,
    merchant: &Merchant,
    payment_id: &str,
    operation: &'static str,
    to: PaymentStatus,
    events: &EventSender,
) -> Result<Payment> {
    // The guarded UPDATE claims the transition; a concurrent caller that
    // lost the race falls through to the error path below.
    let claimed = queries::claim_status_transition(
        conn,
        &merchant.id,
        payment_id,
        PaymentStatus::Pending,
        to,
    )?;

    let payment = queries::get_payment(conn, &merchant.id, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {}", payment_id)))?;

    if !claimed {
        return Err(AppError::InvalidStateTransition {
            operation,
            status: payment.status,
        });
    }

    let event_type = match to {
        PaymentStatus::Succeeded => EventType::PaymentSucceeded,
        PaymentStatus::Cancelled => EventType::PaymentCancelled,
        PaymentStatus::Expired => EventType::PaymentExpired,
        _ => unreachable!("no ledger operation targets {}", to),
    };
    emit(events, merchant, event_type, &payment, None);
    Ok(payment)
}

/// Refund part or all of a payment.
///
/// `amount = None` refunds the full remaining balance. The refund row and
/// the payment update commit atomically inside an IMMEDIATE transaction;
/// the balance guard is re-checked against the row the update actually
/// hits, so two racing refunds whose sum exceeds the balance produce
/// exactly one success. Emits `payment.refunded` (data includes the refund).
pub fn refund_payment(
    conn: &mut Connection,
    merchant: &Merchant,
    payment_id: &str,
    amount: Option<i64>,
    reason: Option<String>,
    events: &EventSender,
) -> Result<(Payment, Refund)> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let payment = queries::get_payment(&tx, &merchant.id, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {}", payment_id)))?;

    if !payment.status.is_refundable() {
        return Err(AppError::InvalidStateTransition {
            operation: "refund",
            status: payment.status,
        });
    }

    let balance = payment.refundable_balance();
    let refund_amount = amount.unwrap_or(balance);

    if refund_amount <= 0 {
        return Err(AppError::BadRequest("refund amount must be positive".into()));
    }
    if refund_amount > balance {
        return Err(AppError::RefundExceedsBalance {
            requested: refund_amount,
            available: balance,
        });
    }

    let new_refunded = payment.amount_refunded + refund_amount;
    let new_status = if new_refunded == payment.amount {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartiallyRefunded
    };

    let applied = queries::apply_refund_to_payment(
        &tx,
        payment_id,
        payment.amount_refunded,
        new_refunded,
        new_status,
    )?;
    if !applied {
        // The row moved underneath us between the read and the update.
        // The IMMEDIATE lock makes this unreachable within one process,
        // but another process could have won; report it as the race it is.
        return Err(AppError::RefundExceedsBalance {
            requested: refund_amount,
            available: balance,
        });
    }

    let now = queries::now_ms();
    let refund = Refund {
        id: EntityType::Refund.gen_id(),
        payment_id: payment_id.to_string(),
        amount: refund_amount,
        reason,
        status: RefundStatus::Succeeded,
        processed_at: Some(now),
        created_at: now,
    };
    queries::insert_refund(&tx, &refund)?;

    tx.commit()?;

    let updated = Payment {
        amount_refunded: new_refunded,
        status: new_status,
        refunded_at: Some(now),
        updated_at: now,
        ..payment
    };

    emit(events, merchant, EventType::PaymentRefunded, &updated, Some(&refund));
    Ok((updated, refund))
}

/// Sweep pending payments past their expiry deadline. Returns how many
/// were expired. Each expiry emits `payment.expired`.
pub fn expire_due_payments(conn: &Connection, events: &EventSender) -> Result<usize> {
    let due = queries::list_expirable_payments(conn, queries::now_ms())?;
    let mut expired = 0;

    for payment in due {
        let Some(merchant) = queries::get_merchant_by_id(conn, &payment.merchant_id)? else {
            tracing::warn!(
                "expiry sweep: merchant {} missing for payment {}",
                payment.merchant_id,
                payment.id
            );
            continue;
        };

        match expire_payment(conn, &merchant, &payment.id, events) {
            Ok(_) => expired += 1,
            // A concurrent confirm/cancel won the claim; skip that payment.
            Err(AppError::InvalidStateTransition { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(expired)
}

/// Hand a domain event to the dispatcher. Never fails the caller: the
/// state change has already committed, delivery is asynchronous.
fn emit(
    events: &EventSender,
    merchant: &Merchant,
    event_type: EventType,
    payment: &Payment,
    refund: Option<&Refund>,
) {
    let data = match refund {
        Some(refund) => serde_json::json!({
            "payment": payment,
            "refund": refund,
        }),
        None => serde_json::json!({ "payment": payment }),
    };

    events.send(DomainEvent {
        merchant_id: merchant.id.clone(),
        event_type,
        livemode: merchant.livemode,
        data,
    });
}
