// handlers/payments.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::{AppError, Result};
use crate::models::transaction::{InitiateChargeRequest, PaymentTransaction, StkCallbackEnvelope};
use crate::policy::{self, Operation, Principal};
use crate::state::AppState;

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(patient_id): Path<String>,
    Json(payload): Json<InitiateChargeRequest>,
) -> Result<(StatusCode, Json<PaymentTransaction>)> {
    policy::authorize(&principal, Operation::InitiateCharge)?;

    let patient_id = ObjectId::parse_str(&patient_id)?;
    let tx = state
        .payments
        .initiate(&patient_id, payload.amount, &payload.phone_number)
        .await?;

    info!(
        "STK push initiated by {} for patient {}: {}",
        principal.username, patient_id, tx.checkout_request_id
    );

    Ok((StatusCode::CREATED, Json(tx)))
}

/// Daraja posts results here. The gateway treats anything but an ack as a
/// delivery failure and re-posts, so reconciliation errors are logged and
/// the ack is returned regardless.
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Json(payload): Json<StkCallbackEnvelope>,
) -> Json<serde_json::Value> {
    match state.payments.reconcile(payload).await {
        Ok(tx) => {
            info!(
                "Callback applied for {}: status {:?}",
                tx.checkout_request_id, tx.status
            );
        }
        Err(AppError::AlreadyResolved(id)) => {
            warn!("Duplicate callback for already-resolved transaction {}", id);
        }
        Err(AppError::TransactionNotFound(id)) => {
            warn!("Callback for unknown checkout request {}", id);
        }
        Err(e) => {
            error!("Failed to reconcile callback: {}", e);
        }
    }

    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentTransaction>> {
    policy::authorize(&principal, Operation::ViewTransactions)?;

    let id = ObjectId::parse_str(&transaction_id)?;
    let tx = state.payments.get_by_transaction_id(&id).await?;

    Ok(Json(tx))
}

pub async fn total_amount_paid(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<serde_json::Value>> {
    policy::authorize(&principal, Operation::ViewDashboard)?;

    let total = state.payments.total_paid().await?;

    Ok(Json(json!({ "total_amount_paid": total })))
}
