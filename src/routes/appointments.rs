use axum::{middleware, routing::get, Router};

use crate::handlers::appointments;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mine", get(appointments::my_appointments))
        .route("/per-day", get(appointments::appointments_per_day))
        .route_layer(middleware::from_fn(auth_middleware))
}
