use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::patients;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(patients::list_patients).post(patients::create_patient))
        .route("/:patient_id", get(patients::get_patient))
        .route("/:patient_id/book-appointment", post(crate::handlers::appointments::book_appointment))
        .route_layer(middleware::from_fn(auth_middleware))
}
