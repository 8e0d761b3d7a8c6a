pub mod payments;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    payments::router().merge(webhooks::router())
}
