// src/store/memory.rs
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::models::patient::Patient;
use crate::models::transaction::PaymentTransaction;
use crate::store::{apply_resolution, PatientStore, Resolution, ResolveOutcome, TransactionStore};

#[derive(Default, Clone)]
pub struct InMemoryPatientStore {
    patients: Arc<RwLock<HashMap<ObjectId, Patient>>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, patient: Patient) -> ObjectId {
        let id = patient.id.unwrap_or_else(ObjectId::new);
        let mut patients = self.patients.write().await;
        patients.insert(
            id,
            Patient {
                id: Some(id),
                ..patient
            },
        );
        id
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Patient>> {
        let patients = self.patients.read().await;
        Ok(patients.get(id).cloned())
    }
}

/// Transactions keyed by `checkout_request_id`, the natural key callbacks
/// are matched on. The write lock serializes resolves per store, so the
/// pending check and the mutation are a single critical section.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<String, PaymentTransaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: PaymentTransaction) -> Result<PaymentTransaction> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.checkout_request_id.clone(), tx.clone());
        Ok(tx)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().find(|tx| tx.id.as_ref() == Some(id)).cloned())
    }

    async fn find_by_checkout_request(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(checkout_request_id).cloned())
    }

    async fn resolve(
        &self,
        checkout_request_id: &str,
        resolution: Resolution,
    ) -> Result<ResolveOutcome> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(checkout_request_id) {
            None => Ok(ResolveOutcome::Unknown),
            Some(tx) if tx.status.is_terminal() => Ok(ResolveOutcome::AlreadyResolved),
            Some(tx) => {
                apply_resolution(tx, &resolution);
                Ok(ResolveOutcome::Applied(tx.clone()))
            }
        }
    }

    async fn total_paid(&self) -> Result<Decimal> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().map(|tx| tx.amount).sum())
    }
}
