use chrono::{DateTime, Utc};
use mongodb::bson;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::prescription::Prescription;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub patient_id: ObjectId,
    pub symptoms: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub diagnosis_date: DateTime<Utc>,

    pub added_by: ObjectId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMedicalRecord {
    #[validate(length(min = 1))]
    pub symptoms: String,
}

#[derive(Debug, Serialize)]
pub struct MedicalRecordWithPrescriptions {
    #[serde(flatten)]
    pub record: MedicalRecord,
    pub prescriptions: Vec<Prescription>,
}
