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
use crate::models::medical_record::{
    CreateMedicalRecord, MedicalRecord, MedicalRecordWithPrescriptions,
};
use crate::models::patient::Patient;
use crate::models::prescription::{CreatePrescription, Prescription};
use crate::policy::{self, Operation, Principal};
use crate::state::AppState;

pub async fn add_medical_record(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(patient_id): Path<String>,
    Json(payload): Json<CreateMedicalRecord>,
) -> Result<(StatusCode, Json<MedicalRecord>)> {
    policy::authorize(&principal, Operation::AddMedicalRecord)?;
    payload.validate()?;

    let patient_id = ObjectId::parse_str(&patient_id)?;
    let patients: Collection<Patient> = state.db.collection("patients");
    patients
        .find_one(doc! { "_id": patient_id })
        .await?
        .ok_or(AppError::PatientNotFound)?;

    let record = MedicalRecord {
        id: Some(ObjectId::new()),
        patient_id,
        symptoms: payload.symptoms,
        diagnosis_date: Utc::now(),
        added_by: ObjectId::parse_str(&principal.user_id)?,
    };

    let collection: Collection<MedicalRecord> = state.db.collection("medical_records");
    collection.insert_one(&record).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_patient_medical_records(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<MedicalRecord>>> {
    policy::authorize(&principal, Operation::ViewMedicalRecords)?;

    let patient_id = ObjectId::parse_str(&patient_id)?;
    let collection: Collection<MedicalRecord> = state.db.collection("medical_records");

    let cursor = collection.find(doc! { "patient_id": patient_id }).await?;
    let mut records: Vec<MedicalRecord> = cursor.try_collect().await?;

    records.sort_by(|a, b| b.diagnosis_date.cmp(&a.diagnosis_date));

    Ok(Json(records))
}

pub async fn get_patient_records_with_prescriptions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<MedicalRecordWithPrescriptions>>> {
    policy::authorize(&principal, Operation::ViewMedicalRecords)?;

    let patient_id = ObjectId::parse_str(&patient_id)?;

    let records_collection: Collection<MedicalRecord> = state.db.collection("medical_records");
    let cursor = records_collection
        .find(doc! { "patient_id": patient_id })
        .await?;
    let mut records: Vec<MedicalRecord> = cursor.try_collect().await?;
    records.sort_by(|a, b| b.diagnosis_date.cmp(&a.diagnosis_date));

    let prescriptions_collection: Collection<Prescription> = state.db.collection("prescriptions");
    let cursor = prescriptions_collection
        .find(doc! { "patient_id": patient_id })
        .await?;
    let prescriptions: Vec<Prescription> = cursor.try_collect().await?;

    let combined = records
        .into_iter()
        .map(|record| {
            let record_id = record.id;
            let prescriptions = prescriptions
                .iter()
                .filter(|p| Some(p.medical_record_id) == record_id)
                .cloned()
                .collect();
            MedicalRecordWithPrescriptions {
                record,
                prescriptions,
            }
        })
        .collect();

    Ok(Json(combined))
}

pub async fn create_prescription(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(medical_record_id): Path<String>,
    Json(payload): Json<CreatePrescription>,
) -> Result<(StatusCode, Json<Prescription>)> {
    policy::authorize(&principal, Operation::CreatePrescription)?;
    payload.validate()?;

    let medical_record_id = ObjectId::parse_str(&medical_record_id)?;
    let records: Collection<MedicalRecord> = state.db.collection("medical_records");
    let record = records
        .find_one(doc! { "_id": medical_record_id })
        .await?
        .ok_or(AppError::MedicalRecordNotFound)?;

    let prescription = Prescription {
        id: Some(ObjectId::new()),
        patient_id: record.patient_id,
        medical_record_id,
        medication: payload.medication,
        dosage: payload.dosage,
        prescribed_by: ObjectId::parse_str(&principal.user_id)?,
    };

    let collection: Collection<Prescription> = state.db.collection("prescriptions");
    collection.insert_one(&prescription).await?;

    Ok((StatusCode::CREATED, Json(prescription)))
}

pub async fn list_prescriptions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Prescription>>> {
    policy::authorize(&principal, Operation::ListPrescriptions)?;

    let collection: Collection<Prescription> = state.db.collection("prescriptions");
    let cursor = collection.find(doc! {}).await?;
    let prescriptions: Vec<Prescription> = cursor.try_collect().await?;

    Ok(Json(prescriptions))
}
