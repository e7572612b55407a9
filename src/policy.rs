// src/policy.rs
//
// Central role/permission table. Handlers never compare role strings;
// they call `authorize` with the operation they are about to perform.
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Pharmacist,
    Receptionist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Pharmacist => "pharmacist",
            Role::Receptionist => "receptionist",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "pharmacist" => Some(Role::Pharmacist),
            "receptionist" => Some(Role::Receptionist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateUser,
    CreatePatient,
    ListPatients,
    ViewPatient,
    BookAppointment,
    ListOwnAppointments,
    AddMedicalRecord,
    ViewMedicalRecords,
    CreatePrescription,
    ListPrescriptions,
    InitiateCharge,
    ViewTransactions,
    ViewDashboard,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateUser => "create_user",
            Operation::CreatePatient => "create_patient",
            Operation::ListPatients => "list_patients",
            Operation::ViewPatient => "view_patient",
            Operation::BookAppointment => "book_appointment",
            Operation::ListOwnAppointments => "list_own_appointments",
            Operation::AddMedicalRecord => "add_medical_record",
            Operation::ViewMedicalRecords => "view_medical_records",
            Operation::CreatePrescription => "create_prescription",
            Operation::ListPrescriptions => "list_prescriptions",
            Operation::InitiateCharge => "initiate_charge",
            Operation::ViewTransactions => "view_transactions",
            Operation::ViewDashboard => "view_dashboard",
        }
    }
}

/// The authenticated caller, threaded explicitly into every operation.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

pub fn permits(role: Role, operation: Operation) -> bool {
    use Operation::*;
    use Role::*;

    match operation {
        CreateUser => matches!(role, Admin),
        CreatePatient | BookAppointment | InitiateCharge => {
            matches!(role, Receptionist | Admin)
        }
        ListPatients | ViewPatient | ListOwnAppointments | AddMedicalRecord
        | ViewMedicalRecords | CreatePrescription => true,
        ListPrescriptions => matches!(role, Pharmacist | Doctor | Admin),
        ViewTransactions | ViewDashboard => matches!(role, Admin),
    }
}

pub fn authorize(principal: &Principal, operation: Operation) -> Result<()> {
    if permits(principal.role, operation) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied {
            role: principal.role.as_str().to_string(),
            operation: operation.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: "64b0c8c2a1f4e2d3c4b5a697".into(),
            username: "wanjiku".into(),
            role,
        }
    }

    #[test]
    fn receptionist_registers_patients_but_doctor_does_not() {
        assert!(permits(Role::Receptionist, Operation::CreatePatient));
        assert!(!permits(Role::Doctor, Operation::CreatePatient));
    }

    #[test]
    fn only_admin_sees_payment_reports() {
        assert!(permits(Role::Admin, Operation::ViewTransactions));
        assert!(!permits(Role::Receptionist, Operation::ViewTransactions));
        assert!(!permits(Role::Pharmacist, Operation::ViewDashboard));
    }

    #[test]
    fn all_staff_roles_read_patient_data() {
        for role in [Role::Admin, Role::Doctor, Role::Pharmacist, Role::Receptionist] {
            assert!(permits(role, Operation::ListPatients));
            assert!(permits(role, Operation::ViewMedicalRecords));
        }
    }

    #[test]
    fn authorize_reports_role_and_operation() {
        let err = authorize(&principal(Role::Doctor), Operation::InitiateCharge).unwrap_err();
        match err {
            crate::errors::AppError::PermissionDenied { role, operation } => {
                assert_eq!(role, "doctor");
                assert_eq!(operation, "initiate_charge");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn role_round_trips_through_its_string_form() {
        for role in [Role::Admin, Role::Doctor, Role::Pharmacist, Role::Receptionist] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("janitor"), None);
    }
}
