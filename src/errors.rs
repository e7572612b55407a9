// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Medical record not found")]
    MedicalRecordNotFound,

    #[error("Transaction not found for checkout request {0}")]
    TransactionNotFound(String),

    #[error("Failed to obtain M-Pesa access token")]
    UpstreamAuthError,

    #[error("M-Pesa rejected the push request: {0}")]
    UpstreamRejected(String),

    #[error("M-Pesa unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("Transaction {0} is already resolved")]
    AlreadyResolved(String),

    #[error("Malformed STK callback: {0}")]
    MalformedCallback(String),

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("Duplicate key error")]
    DuplicateKey,

    #[error("Authentication error")]
    AuthError,

    #[error("Permission denied for role {role} on {operation}")]
    PermissionDenied { role: String, operation: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Stable machine-readable discriminant, so callers can tell
    /// "patient doesn't exist" apart from "gateway unreachable".
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MongoDB(_) => "database",
            AppError::PatientNotFound => "patient_not_found",
            AppError::MedicalRecordNotFound => "medical_record_not_found",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::UpstreamAuthError => "upstream_auth_error",
            AppError::UpstreamRejected(_) => "upstream_rejected",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::AlreadyResolved(_) => "already_resolved",
            AppError::MalformedCallback(_) => "malformed_callback",
            AppError::InvalidObjectId(_) => "invalid_object_id",
            AppError::DuplicateKey => "duplicate_key",
            AppError::AuthError => "auth_error",
            AppError::PermissionDenied { .. } => "permission_denied",
            AppError::ValidationError(_) => "validation_error",
            AppError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string()),
            AppError::PatientNotFound => (StatusCode::NOT_FOUND, "Patient not found".to_string()),
            AppError::MedicalRecordNotFound => (StatusCode::NOT_FOUND, "Medical record not found".to_string()),
            AppError::TransactionNotFound(_) => (StatusCode::NOT_FOUND, "Transaction not found".to_string()),
            AppError::UpstreamAuthError => (StatusCode::BAD_GATEWAY, "M-Pesa authentication failed".to_string()),
            AppError::UpstreamRejected(_) => (StatusCode::BAD_GATEWAY, "M-Pesa rejected the request".to_string()),
            AppError::UpstreamUnavailable(_) => (StatusCode::GATEWAY_TIMEOUT, "M-Pesa unreachable".to_string()),
            AppError::AlreadyResolved(_) => (StatusCode::CONFLICT, "Transaction already resolved".to_string()),
            AppError::MalformedCallback(_) => (StatusCode::BAD_REQUEST, "Malformed callback payload".to_string()),
            AppError::InvalidObjectId(_) => (StatusCode::BAD_REQUEST, "Invalid ID format".to_string()),
            AppError::DuplicateKey => (StatusCode::CONFLICT, "Duplicate entry".to_string()),
            AppError::AuthError => (StatusCode::UNAUTHORIZED, "Authentication failed".to_string()),
            AppError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "Permission denied".to_string()),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed".to_string()),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "kind": self.kind(),
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

// Manual From implementations
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err))
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
