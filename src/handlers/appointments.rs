use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;
use std::collections::BTreeMap;

use crate::errors::{AppError, Result};
use crate::models::appointment::{Appointment, BookAppointment};
use crate::models::patient::Patient;
use crate::policy::{self, Operation, Principal};
use crate::state::AppState;

pub async fn book_appointment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(patient_id): Path<String>,
    Json(payload): Json<BookAppointment>,
) -> Result<(StatusCode, Json<Appointment>)> {
    policy::authorize(&principal, Operation::BookAppointment)?;

    let patient_id = ObjectId::parse_str(&patient_id)?;
    let patients: Collection<Patient> = state.db.collection("patients");
    patients
        .find_one(doc! { "_id": patient_id })
        .await?
        .ok_or(AppError::PatientNotFound)?;

    let appointment = Appointment {
        id: Some(ObjectId::new()),
        patient_id,
        appointment_date: payload.appointment_date,
        status: payload.status,
        booked_by: ObjectId::parse_str(&principal.user_id)?,
    };

    let collection: Collection<Appointment> = state.db.collection("appointments");
    collection.insert_one(&appointment).await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Appointments booked by the calling user.
pub async fn my_appointments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Appointment>>> {
    policy::authorize(&principal, Operation::ListOwnAppointments)?;

    let booked_by = ObjectId::parse_str(&principal.user_id)?;
    let collection: Collection<Appointment> = state.db.collection("appointments");

    let cursor = collection.find(doc! { "booked_by": booked_by }).await?;
    let mut appointments: Vec<Appointment> = cursor.try_collect().await?;

    appointments.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date));

    Ok(Json(appointments))
}

/// Dashboard series: appointment counts grouped by calendar day.
pub async fn appointments_per_day(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<serde_json::Value>> {
    policy::authorize(&principal, Operation::ViewDashboard)?;

    let collection: Collection<Appointment> = state.db.collection("appointments");
    let cursor = collection.find(doc! {}).await?;
    let appointments: Vec<Appointment> = cursor.try_collect().await?;

    let mut per_day: BTreeMap<String, i64> = BTreeMap::new();
    for appointment in &appointments {
        let day = appointment.appointment_date.format("%Y-%m-%d").to_string();
        *per_day.entry(day).or_insert(0) += 1;
    }

    let series: Vec<serde_json::Value> = per_day
        .into_iter()
        .map(|(date, count)| serde_json::json!({ "date": date, "count": count }))
        .collect();

    Ok(Json(serde_json::json!({
        "total": appointments.len(),
        "per_day": series,
    })))
}
