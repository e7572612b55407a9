use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::records;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/patient/:patient_id", post(records::add_medical_record).get(records::get_patient_medical_records))
        .route(
            "/patient/:patient_id/with-prescriptions",
            get(records::get_patient_records_with_prescriptions),
        )
        .route(
            "/:medical_record_id/prescriptions",
            post(records::create_prescription),
        )
        .route("/prescriptions", get(records::list_prescriptions))
        .route_layer(middleware::from_fn(auth_middleware))
}
