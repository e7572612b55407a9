// src/store/mod.rs
//
// Durable record of payment attempts and patient lookups, behind traits so
// the payment workflow runs against MongoDB in production and an in-memory
// map in tests.
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::models::patient::Patient;
use crate::models::transaction::{PaymentTransaction, TransactionStatus};

pub mod memory;
pub mod mongo;

/// Terminal outcome to apply to a pending transaction.
#[derive(Debug, Clone)]
pub enum Resolution {
    Success {
        amount: Decimal,
        receipt_number: String,
        phone_number: String,
        result_code: i64,
        result_desc: String,
    },
    Failure {
        result_code: i64,
        result_desc: String,
    },
}

/// Result of a conditional resolve. Only the first resolution for a given
/// checkout request is `Applied`; the store serializes the transition so
/// concurrent callbacks cannot both win.
#[derive(Debug)]
pub enum ResolveOutcome {
    Applied(PaymentTransaction),
    AlreadyResolved,
    Unknown,
}

pub(crate) fn apply_resolution(tx: &mut PaymentTransaction, resolution: &Resolution) {
    match resolution {
        Resolution::Success {
            amount,
            receipt_number,
            phone_number,
            result_code,
            result_desc,
        } => {
            tx.status = TransactionStatus::Succeeded;
            tx.amount = *amount;
            tx.mpesa_receipt_number = receipt_number.clone();
            tx.phone_number = phone_number.clone();
            tx.result_code = Some(*result_code);
            tx.result_desc = Some(result_desc.clone());
        }
        Resolution::Failure {
            result_code,
            result_desc,
        } => {
            tx.status = TransactionStatus::Failed;
            tx.result_code = Some(*result_code);
            tx.result_desc = Some(result_desc.clone());
        }
    }
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Patient>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: PaymentTransaction) -> Result<PaymentTransaction>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentTransaction>>;

    async fn find_by_checkout_request(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    /// Applies `resolution` to the transaction for `checkout_request_id`
    /// if and only if it is still pending.
    async fn resolve(
        &self,
        checkout_request_id: &str,
        resolution: Resolution,
    ) -> Result<ResolveOutcome>;

    /// Sum of `amount` over every stored transaction; zero when none exist.
    async fn total_paid(&self) -> Result<Decimal>;
}
