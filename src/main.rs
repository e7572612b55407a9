use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod errors;
mod handlers;
mod middleware;
mod models;
mod policy;
mod routes;
mod services;
mod state;
mod store;

use database::connection::get_db_client;
use services::daraja::DarajaClient;
use services::payments::PaymentService;
use state::AppState;
use store::mongo::{MongoPatientStore, MongoTransactionStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let db = get_db_client().await;
    let app_state = initialize_app_state(db).await;

    let app = build_router(app_state);
    start_server(app).await;
}

async fn initialize_app_state(db: mongodb::Database) -> AppState {
    let patients = Arc::new(MongoPatientStore::new(&db));
    let transactions = Arc::new(MongoTransactionStore::new(&db));

    let mut payments = PaymentService::new(patients, transactions);

    match config::AppConfig::from_env() {
        Ok(config) => {
            tracing::info!("M-Pesa config loaded");
            tracing::info!("Short code: {}", config.mpesa_short_code);
            tracing::info!("Environment: {}", config.mpesa_environment);

            let retry_attempts = config.gateway_retry_attempts;
            payments = payments.with_gateway(Arc::new(DarajaClient::new(config)), retry_attempts);
            tracing::info!("M-Pesa gateway initialized and ready");
        }
        Err(e) => {
            tracing::warn!("M-Pesa config unavailable: {:#}", e);
            tracing::warn!("STK push initiation will be disabled; queries still work");
        }
    }

    AppState::new(db, Arc::new(payments))
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/auth", routes::auth::routes())
        .nest("/api/patients", routes::patients::routes())
        .nest("/api/appointments", routes::appointments::routes())
        .nest("/api/records", routes::records::routes())
        .nest("/api/payments", routes::payments::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router) {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(8000)));

    tracing::info!("Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            axum::serve(listener, app).await.unwrap();
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn root_handler() -> &'static str {
    "AfyaCare Hospital Management API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    use mongodb::bson::doc;

    let db_status = match state.db.run_command(doc! {"ping": 1}).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "mpesa": state.payments.gateway_configured(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
