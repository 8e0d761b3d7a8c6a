//! Webhook endpoint management handlers.
//!
//! The endpoint secret is returned exactly once, on creation and on
//! rotation; list/get responses never include it.

use axum::extract::State;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{ApiMerchant, Json, Path, Query};
use crate::models::{CreateWebhookEndpoint, UpdateWebhookEndpoint, WebhookAttempt, WebhookEndpoint};
use crate::pagination::{Paginated, PaginationQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/webhook_endpoints", post(create_endpoint))
        .route("/v1/webhook_endpoints", get(list_endpoints))
        .route("/v1/webhook_endpoints/{id}", get(get_endpoint))
        .route("/v1/webhook_endpoints/{id}", patch(update_endpoint))
        .route("/v1/webhook_endpoints/{id}", delete(delete_endpoint))
        .route("/v1/webhook_endpoints/{id}/rotate_secret", post(rotate_secret))
        .route("/v1/webhook_endpoints/{id}/attempts", get(list_attempts))
        .route(
            "/v1/webhook_endpoints/{id}/attempts/{attempt_id}/retry",
            post(retry_attempt),
        )
}

#[derive(serde::Deserialize)]
struct EndpointPath {
    id: String,
}

#[derive(serde::Deserialize)]
struct AttemptPath {
    id: String,
    attempt_id: String,
}

/// Endpoint response that carries the secret. Only used where the secret
/// is being revealed for the first (and only) time.
#[derive(Serialize)]
struct EndpointWithSecret {
    #[serde(flatten)]
    endpoint: WebhookEndpoint,
    secret: String,
}

/// POST /v1/webhook_endpoints
async fn create_endpoint(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Json(input): Json<CreateWebhookEndpoint>,
) -> Result<Json<EndpointWithSecret>> {
    if !input.url.starts_with("http://") && !input.url.starts_with("https://") {
        return Err(AppError::BadRequest("url must be http(s)".into()));
    }
    if input.events.is_empty() {
        return Err(AppError::BadRequest("events must not be empty".into()));
    }

    let secret = queries::generate_webhook_secret();
    let conn = state.db.get()?;
    let endpoint = queries::create_webhook_endpoint(&conn, &merchant.id, &input, &secret)?;

    Ok(Json(EndpointWithSecret { endpoint, secret }))
}

/// GET /v1/webhook_endpoints
async fn list_endpoints(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
) -> Result<Json<Vec<WebhookEndpoint>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_webhook_endpoints(&conn, &merchant.id)?))
}

/// GET /v1/webhook_endpoints/{id}
async fn get_endpoint(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<EndpointPath>,
) -> Result<Json<WebhookEndpoint>> {
    let conn = state.db.get()?;
    let endpoint = queries::get_webhook_endpoint(&conn, &merchant.id, &path.id)?
        .or_not_found(&format!("webhook endpoint {}", path.id))?;
    Ok(Json(endpoint))
}

/// PATCH /v1/webhook_endpoints/{id}
async fn update_endpoint(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<EndpointPath>,
    Json(update): Json<UpdateWebhookEndpoint>,
) -> Result<Json<WebhookEndpoint>> {
    if let Some(ref url) = update.url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::BadRequest("url must be http(s)".into()));
        }
    }
    if let Some(ref events) = update.events {
        if events.is_empty() {
            return Err(AppError::BadRequest("events must not be empty".into()));
        }
    }

    let conn = state.db.get()?;
    let endpoint = queries::update_webhook_endpoint(&conn, &merchant.id, &path.id, &update)?
        .or_not_found(&format!("webhook endpoint {}", path.id))?;
    Ok(Json(endpoint))
}

/// DELETE /v1/webhook_endpoints/{id}
async fn delete_endpoint(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<EndpointPath>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    if !queries::delete_webhook_endpoint(&conn, &merchant.id, &path.id)? {
        return Err(AppError::NotFound(format!("webhook endpoint {}", path.id)));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// POST /v1/webhook_endpoints/{id}/rotate_secret
///
/// The new secret takes effect immediately; deliveries already in flight
/// keep the old one and may fail verification on the receiver.
async fn rotate_secret(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<EndpointPath>,
) -> Result<Json<EndpointWithSecret>> {
    let secret = queries::generate_webhook_secret();
    let conn = state.db.get()?;

    if !queries::rotate_webhook_secret(&conn, &merchant.id, &path.id, &secret)? {
        return Err(AppError::NotFound(format!("webhook endpoint {}", path.id)));
    }
    let endpoint = queries::get_webhook_endpoint(&conn, &merchant.id, &path.id)?
        .or_not_found(&format!("webhook endpoint {}", path.id))?;

    Ok(Json(EndpointWithSecret { endpoint, secret }))
}

/// GET /v1/webhook_endpoints/{id}/attempts
async fn list_attempts(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<EndpointPath>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Paginated<WebhookAttempt>>> {
    let conn = state.db.get()?;
    queries::get_webhook_endpoint(&conn, &merchant.id, &path.id)?
        .or_not_found(&format!("webhook endpoint {}", path.id))?;

    let items = queries::list_webhook_attempts(&conn, &path.id, query.limit(), query.offset())?;
    let total = queries::count_webhook_attempts(&conn, &path.id)?;

    Ok(Json(Paginated::new(items, total, query.limit(), query.offset())))
}

/// POST /v1/webhook_endpoints/{id}/attempts/{attempt_id}/retry
///
/// Manual redelivery outside the automatic ladder. The stored payload is
/// re-signed with the endpoint's current secret; the new attempt continues
/// the attempt-number sequence for that endpoint+event.
async fn retry_attempt(
    State(state): State<AppState>,
    ApiMerchant(merchant): ApiMerchant,
    Path(path): Path<AttemptPath>,
) -> Result<Json<WebhookAttempt>> {
    let (endpoint, original) = {
        let conn = state.db.get()?;
        let endpoint = queries::get_webhook_endpoint(&conn, &merchant.id, &path.id)?
            .or_not_found(&format!("webhook endpoint {}", path.id))?;
        let original = queries::get_webhook_attempt(&conn, &path.id, &path.attempt_id)?
            .or_not_found(&format!("webhook attempt {}", path.attempt_id))?;
        (endpoint, original)
    };

    let attempt = state.dispatcher.redeliver(&endpoint, &original).await?;
    Ok(Json(attempt))
}
