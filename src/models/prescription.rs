use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub patient_id: ObjectId,
    pub medical_record_id: ObjectId,
    pub medication: String,
    pub dosage: String,
    pub prescribed_by: ObjectId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePrescription {
    #[validate(length(min = 1, max = 255))]
    pub medication: String,
    #[validate(length(min = 1, max = 255))]
    pub dosage: String,
}
