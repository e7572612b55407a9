// src/store/mongo.rs
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::models::patient::Patient;
use crate::models::transaction::PaymentTransaction;
use crate::store::{PatientStore, Resolution, ResolveOutcome, TransactionStore};

#[derive(Clone)]
pub struct MongoPatientStore {
    collection: Collection<Patient>,
}

impl MongoPatientStore {
    pub fn new(db: &Database) -> Self {
        MongoPatientStore {
            collection: db.collection("patients"),
        }
    }
}

#[async_trait]
impl PatientStore for MongoPatientStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Patient>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }
}

#[derive(Clone)]
pub struct MongoTransactionStore {
    collection: Collection<PaymentTransaction>,
}

impl MongoTransactionStore {
    pub fn new(db: &Database) -> Self {
        MongoTransactionStore {
            collection: db.collection("payment_transactions"),
        }
    }
}

#[async_trait]
impl TransactionStore for MongoTransactionStore {
    async fn insert(&self, tx: PaymentTransaction) -> Result<PaymentTransaction> {
        self.collection.insert_one(&tx).await?;
        Ok(tx)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentTransaction>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_checkout_request(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .collection
            .find_one(doc! { "checkout_request_id": checkout_request_id })
            .await?)
    }

    async fn resolve(
        &self,
        checkout_request_id: &str,
        resolution: Resolution,
    ) -> Result<ResolveOutcome> {
        let update = match &resolution {
            Resolution::Success {
                amount,
                receipt_number,
                phone_number,
                result_code,
                result_desc,
            } => doc! {
                "$set": {
                    "status": "SUCCEEDED",
                    "amount": amount.to_string(),
                    "mpesa_receipt_number": receipt_number,
                    "phone_number": phone_number,
                    "result_code": result_code,
                    "result_desc": result_desc,
                }
            },
            Resolution::Failure {
                result_code,
                result_desc,
            } => doc! {
                "$set": {
                    "status": "FAILED",
                    "result_code": result_code,
                    "result_desc": result_desc,
                }
            },
        };

        // Conditional update keyed on the pending state: the filter only
        // matches while the transaction is unresolved, so of two racing
        // callbacks exactly one observes a match.
        let updated = self
            .collection
            .find_one_and_update(
                doc! {
                    "checkout_request_id": checkout_request_id,
                    "status": "PENDING",
                },
                update,
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(tx) => Ok(ResolveOutcome::Applied(tx)),
            None => {
                let existing = self
                    .collection
                    .find_one(doc! { "checkout_request_id": checkout_request_id })
                    .await?;
                if existing.is_some() {
                    Ok(ResolveOutcome::AlreadyResolved)
                } else {
                    Ok(ResolveOutcome::Unknown)
                }
            }
        }
    }

    async fn total_paid(&self) -> Result<Decimal> {
        let cursor = self.collection.find(doc! {}).await?;
        let transactions: Vec<PaymentTransaction> = cursor.try_collect().await?;
        Ok(transactions.iter().map(|tx| tx.amount).sum())
    }
}
