mod common;

use common::{create_test_merchant, create_test_payment, test_db};
use paylane::db::queries;
use paylane::error::AppError;
use paylane::ledger;
use paylane::models::{CreatePayment, PaymentStatus};
use paylane::webhooks::EventSender;

#[test]
fn test_create_payment_computes_fee() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);

    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, 5000);
    // 5000 * 2.9% = 145, plus fixed 30
    assert_eq!(payment.fee_amount, 175);
    assert_eq!(payment.net_amount, 4825);
    assert_eq!(payment.amount_refunded, 0);
    assert!(payment.id.starts_with("pay_"));
}

#[test]
fn test_create_payment_rejects_bad_input() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let zero = CreatePayment {
        order_id: "order-1".to_string(),
        amount: 0,
        currency: "usd".to_string(),
        description: None,
        expires_at: None,
    };
    assert!(matches!(
        ledger::create_payment(&conn, &merchant, &zero, &events),
        Err(AppError::BadRequest(_))
    ));

    let blank_order = CreatePayment {
        order_id: "  ".to_string(),
        amount: 5000,
        currency: "usd".to_string(),
        description: None,
        expires_at: None,
    };
    assert!(matches!(
        ledger::create_payment(&conn, &merchant, &blank_order, &events),
        Err(AppError::BadRequest(_))
    ));

    // 10 * 2.9% rounds to 0, plus fixed 30: fee swallows the amount.
    let tiny = CreatePayment {
        order_id: "order-tiny".to_string(),
        amount: 10,
        currency: "usd".to_string(),
        description: None,
        expires_at: None,
    };
    assert!(matches!(
        ledger::create_payment(&conn, &merchant, &tiny, &events),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn test_duplicate_order_id_conflicts() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    create_test_payment(&conn, &merchant, "order-1", 5000);

    let dup = CreatePayment {
        order_id: "order-1".to_string(),
        amount: 2000,
        currency: "usd".to_string(),
        description: None,
        expires_at: None,
    };
    assert!(matches!(
        ledger::create_payment(&conn, &merchant, &dup, &events),
        Err(AppError::Conflict(_))
    ));

    // A different merchant can reuse the same order_id.
    let other = create_test_merchant(&conn);
    assert!(ledger::create_payment(&conn, &other, &dup, &events).is_ok());
}

#[test]
fn test_confirm_pending_payment() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    let confirmed = ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap();

    assert_eq!(confirmed.status, PaymentStatus::Succeeded);
    assert!(confirmed.paid_at.is_some());
}

#[test]
fn test_confirm_twice_is_invalid() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap();

    let err = ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            operation: "confirm",
            status: PaymentStatus::Succeeded,
        }
    ));
}

#[test]
fn test_cancel_pending_payment() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    let cancelled = ledger::cancel_payment(&conn, &merchant, &payment.id, &events).unwrap();

    assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    // Cancelled payments cannot be confirmed afterwards.
    assert!(matches!(
        ledger::confirm_payment(&conn, &merchant, &payment.id, &events),
        Err(AppError::InvalidStateTransition { .. })
    ));
}

#[test]
fn test_transition_unknown_payment_is_not_found() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    assert!(matches!(
        ledger::confirm_payment(&conn, &merchant, "pay_missing", &events),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn test_merchant_cannot_touch_anothers_payment() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let owner = create_test_merchant(&conn);
    let intruder = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &owner, "order-1", 5000);

    assert!(matches!(
        ledger::confirm_payment(&conn, &intruder, &payment.id, &events),
        Err(AppError::NotFound(_))
    ));

    // The payment stays untouched for its owner.
    let reread = queries::get_payment(&conn, &owner.id, &payment.id)
        .unwrap()
        .unwrap();
    assert_eq!(reread.status, PaymentStatus::Pending);
}

#[test]
fn test_refund_requires_succeeded_payment() {
    let (_dir, pool) = test_db();
    let mut conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);

    let err = ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(1000), None, &events)
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            operation: "refund",
            status: PaymentStatus::Pending,
        }
    ));
}

#[test]
fn test_partial_refund_tracks_balance() {
    let (_dir, pool) = test_db();
    let mut conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap();

    let (updated, refund) =
        ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(1500), None, &events)
            .unwrap();

    assert_eq!(updated.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(updated.amount_refunded, 1500);
    assert_eq!(updated.refundable_balance(), 3500);
    assert_eq!(refund.amount, 1500);
    assert!(refund.id.starts_with("rf_"));

    // Requesting more than the remaining balance is rejected with both
    // figures reported.
    let err = ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(4000), None, &events)
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::RefundExceedsBalance {
            requested: 4000,
            available: 3500,
        }
    ));

    // The failed request changed nothing.
    let reread = queries::get_payment(&conn, &merchant.id, &payment.id)
        .unwrap()
        .unwrap();
    assert_eq!(reread.amount_refunded, 1500);
}

#[test]
fn test_default_refund_is_full_remaining_balance() {
    let (_dir, pool) = test_db();
    let mut conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap();
    ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(1500), None, &events).unwrap();

    let (updated, refund) =
        ledger::refund_payment(&mut conn, &merchant, &payment.id, None, None, &events).unwrap();

    assert_eq!(refund.amount, 3500);
    assert_eq!(updated.status, PaymentStatus::Refunded);
    assert_eq!(updated.amount_refunded, 5000);

    // Fully refunded payments accept no further refunds.
    let err = ledger::refund_payment(&mut conn, &merchant, &payment.id, None, None, &events)
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            operation: "refund",
            status: PaymentStatus::Refunded,
        }
    ));
}

#[test]
fn test_refund_rejects_nonpositive_amount() {
    let (_dir, pool) = test_db();
    let mut conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap();

    assert!(matches!(
        ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(0), None, &events),
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(-100), None, &events),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn test_refund_history_sums_to_amount_refunded() {
    let (_dir, pool) = test_db();
    let mut conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    ledger::confirm_payment(&conn, &merchant, &payment.id, &events).unwrap();
    ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(1000), None, &events).unwrap();
    ledger::refund_payment(&mut conn, &merchant, &payment.id, Some(2000), None, &events).unwrap();

    let refunds = queries::list_refunds(&conn, &payment.id).unwrap();
    assert_eq!(refunds.len(), 2);
    let total: i64 = refunds.iter().map(|r| r.amount).sum();

    let reread = queries::get_payment(&conn, &merchant.id, &payment.id)
        .unwrap()
        .unwrap();
    assert_eq!(total, reread.amount_refunded);
}

#[test]
fn test_concurrent_refunds_exactly_one_wins() {
    let (_dir, pool) = test_db();
    let merchant = {
        let conn = pool.get().unwrap();
        create_test_merchant(&conn)
    };
    let payment = {
        let conn = pool.get().unwrap();
        let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
        ledger::confirm_payment(&conn, &merchant, &payment.id, &EventSender::disconnected())
            .unwrap();
        payment
    };

    // Two refunds of 3000 each against a 5000 balance: at most one can
    // succeed, whichever order the transactions land in.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let pool = pool.clone();
        let merchant = merchant.clone();
        let payment_id = payment.id.clone();
        handles.push(std::thread::spawn(move || {
            let mut conn = pool.get().unwrap();
            ledger::refund_payment(
                &mut conn,
                &merchant,
                &payment_id,
                Some(3000),
                None,
                &EventSender::disconnected(),
            )
            .is_ok()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);

    let conn = pool.get().unwrap();
    let reread = queries::get_payment(&conn, &merchant.id, &payment.id)
        .unwrap()
        .unwrap();
    assert_eq!(reread.amount_refunded, 3000);
    assert_eq!(reread.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(queries::list_refunds(&conn, &payment.id).unwrap().len(), 1);
}

#[test]
fn test_expire_pending_payment() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let payment = create_test_payment(&conn, &merchant, "order-1", 5000);
    let expired = ledger::expire_payment(&conn, &merchant, &payment.id, &events).unwrap();
    assert_eq!(expired.status, PaymentStatus::Expired);

    // Only pending payments can expire.
    let paid = create_test_payment(&conn, &merchant, "order-2", 5000);
    ledger::confirm_payment(&conn, &merchant, &paid.id, &events).unwrap();
    let err = ledger::expire_payment(&conn, &merchant, &paid.id, &events).unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            operation: "expire",
            status: PaymentStatus::Succeeded,
        }
    ));
}

#[test]
fn test_expiry_sweep_expires_overdue_pending() {
    let (_dir, pool) = test_db();
    let conn = pool.get().unwrap();
    let merchant = create_test_merchant(&conn);
    let events = EventSender::disconnected();

    let overdue = CreatePayment {
        order_id: "order-overdue".to_string(),
        amount: 5000,
        currency: "usd".to_string(),
        description: None,
        expires_at: Some(queries::now_ms() - 1000),
    };
    let overdue = ledger::create_payment(&conn, &merchant, &overdue, &events).unwrap();

    let future = CreatePayment {
        order_id: "order-future".to_string(),
        amount: 5000,
        currency: "usd".to_string(),
        description: None,
        expires_at: Some(queries::now_ms() + 60_000),
    };
    let future = ledger::create_payment(&conn, &merchant, &future, &events).unwrap();

    // Confirmed payments are never expired, even past their deadline.
    let paid = CreatePayment {
        order_id: "order-paid".to_string(),
        amount: 5000,
        currency: "usd".to_string(),
        description: None,
        expires_at: Some(queries::now_ms() - 1000),
    };
    let paid = ledger::create_payment(&conn, &merchant, &paid, &events).unwrap();
    ledger::confirm_payment(&conn, &merchant, &paid.id, &events).unwrap();

    let expired = ledger::expire_due_payments(&conn, &events).unwrap();
    assert_eq!(expired, 1);

    let get = |id: &str| {
        queries::get_payment(&conn, &merchant.id, id)
            .unwrap()
            .unwrap()
            .status
    };
    assert_eq!(get(&overdue.id), PaymentStatus::Expired);
    assert_eq!(get(&future.id), PaymentStatus::Pending);
    assert_eq!(get(&paid.id), PaymentStatus::Succeeded);
}
