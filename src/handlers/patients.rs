use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::patient::{CreatePatient, Patient};
use crate::policy::{self, Operation, Principal};
use crate::state::AppState;

pub async fn create_patient(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreatePatient>,
) -> Result<(StatusCode, Json<Patient>)> {
    policy::authorize(&principal, Operation::CreatePatient)?;
    payload.validate()?;

    let collection: Collection<Patient> = state.db.collection("patients");

    // Same person registered twice is a conflict, not a second row.
    let existing = collection
        .find_one(doc! {
            "name": &payload.name,
            "phone_number": &payload.phone_number,
        })
        .await?;
    if existing.is_some() {
        return Err(AppError::DuplicateKey);
    }

    let patient = Patient {
        id: Some(ObjectId::new()),
        name: payload.name,
        phone_number: payload.phone_number,
        date_of_birth: payload.date_of_birth,
        added_at: Utc::now(),
    };

    collection.insert_one(&patient).await?;
    tracing::info!("Registered patient {}", patient.name);

    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn list_patients(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Patient>>> {
    policy::authorize(&principal, Operation::ListPatients)?;

    let collection: Collection<Patient> = state.db.collection("patients");
    let cursor = collection.find(doc! {}).await?;
    let mut patients: Vec<Patient> = cursor.try_collect().await?;

    patients.sort_by(|a, b| b.added_at.cmp(&a.added_at));

    Ok(Json(patients))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(patient_id): Path<String>,
) -> Result<Json<Patient>> {
    policy::authorize(&principal, Operation::ViewPatient)?;

    let id = ObjectId::parse_str(&patient_id)?;
    let collection: Collection<Patient> = state.db.collection("patients");

    let patient = collection
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(AppError::PatientNotFound)?;

    Ok(Json(patient))
}
