use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::payments;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/stk-push/:patient_id", post(payments::initiate_stk_push))
        .route("/transactions/:transaction_id", get(payments::get_transaction))
        .route("/total-paid", get(payments::total_amount_paid))
        .route_layer(middleware::from_fn(auth_middleware));

    // The callback is posted by Daraja itself and carries no bearer token.
    Router::new()
        .route("/health", get(payments_health))
        .route("/callback", post(payments::mpesa_callback))
        .merge(protected)
}

async fn payments_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "payments",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["stk-push", "callback-reconciliation", "transactions"]
    }))
}
