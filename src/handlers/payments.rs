//! Payment API handlers. Thin wrappers: validation and response shaping
//! here, all state machine logic in the ledger.

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{OptionExt, Result};
use crate::extractors::{ApiMerchant, Json, Path, Query};
use crate::ledger;
use crate::models::{CreatePayment, Payment, PaymentStatus, Refund};
use crate::pagination::Paginated;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments", get(list_payments))
        .route("/v1/payments/{id}", get(get_payment))
        .route("/v1/payments/{id}/confirm", post(confirm_payment))
        .route("/v1/payments/{id}/cancel", post(cancel_payment))
        .route("/v1/payments/{id}/expire", post(expire_payment))
        .route("/v1/payments/{id}/refund", post(refund_payment))
        .route("/v1/payments/{id}/refunds", get(list_refunds))
}

#[derive(Deserialize)]
struct PaymentPath {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListPaymentsQuery {
    status: Option<PaymentStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RefundRequest {
    /// Amount to refund; omitted means the full remaining balance.
    amount: Option<i64>,
    reason: Option<String>,
}

/// POST /v1/payments
async fn create_payment(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Json(input): Json<CreatePayment>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = ledger::create_payment(&conn, &merchant, &input, &state.events)?;
    Ok(Json(payment))
}

/// GET /v1/payments
async fn list_payments(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Paginated<Payment>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let conn = state.db.get()?;
    let items = queries::list_payments(&conn, &merchant.id, query.status, limit, offset)?;
    let total = queries::count_payments(&conn, &merchant.id, query.status)?;

    Ok(Json(Paginated::new(items, total, limit, offset)))
}

/// GET /v1/payments/{id}
async fn get_payment(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<PaymentPath>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = queries::get_payment(&conn, &merchant.id, &path.id)?
        .or_not_found(&format!("payment {}", path.id))?;
    Ok(Json(payment))
}

/// POST /v1/payments/{id}/confirm
async fn confirm_payment(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<PaymentPath>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = ledger::confirm_payment(&conn, &merchant, &path.id, &state.events)?;
    Ok(Json(payment))
}

/// POST /v1/payments/{id}/cancel
async fn cancel_payment(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<PaymentPath>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = ledger::cancel_payment(&conn, &merchant, &path.id, &state.events)?;
    Ok(Json(payment))
}

/// POST /v1/payments/{id}/expire
///
/// External expiry signal; the background sweep handles deadline-driven
/// expiry on its own.
async fn expire_payment(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<PaymentPath>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = ledger::expire_payment(&conn, &merchant, &path.id, &state.events)?;
    Ok(Json(payment))
}

/// POST /v1/payments/{id}/refund
async fn refund_payment(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<PaymentPath>,
    Json(input): Json<RefundRequest>,
) -> Result<Json<Payment>> {
    let mut conn = state.db.get()?;
    let (payment, _refund) = ledger::refund_payment(
        &mut conn,
        &merchant,
        &path.id,
        input.amount,
        input.reason.clone(),
        &state.events,
    )?;
    Ok(Json(payment))
}

/// GET /v1/payments/{id}/refunds
async fn list_refunds(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<PaymentPath>,
) -> Result<Json<Vec<Refund>>> {
    let conn = state.db.get()?;
    // Ownership check before exposing the refund list.
    queries::get_payment(&conn, &merchant.id, &path.id)?
        .or_not_found(&format!("payment {}", path.id))?;
    let refunds = queries::list_refunds(&conn, &path.id)?;
    Ok(Json(refunds))
}
