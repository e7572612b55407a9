// services/payments.rs
//
// Payment workflow over the transaction store and the STK gateway:
// initiation writes a pending record only after Daraja accepts the push,
// and reconciliation applies the asynchronous callback exactly once.
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::models::transaction::{PaymentTransaction, StkCallbackEnvelope};
use crate::services::daraja::{StkGateway, StkPushResponse};
use crate::store::{PatientStore, Resolution, ResolveOutcome, TransactionStore};

pub struct PaymentService {
    gateway: Option<Arc<dyn StkGateway>>,
    patients: Arc<dyn PatientStore>,
    transactions: Arc<dyn TransactionStore>,
    retry_attempts: u32,
}

impl PaymentService {
    pub fn new(patients: Arc<dyn PatientStore>, transactions: Arc<dyn TransactionStore>) -> Self {
        PaymentService {
            gateway: None,
            patients,
            transactions,
            retry_attempts: 0,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn StkGateway>, retry_attempts: u32) -> Self {
        self.gateway = Some(gateway);
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn gateway_configured(&self) -> bool {
        self.gateway.is_some()
    }

    /// Starts a push payment for a patient. A transaction row is written
    /// only on the success path, after the gateway has accepted the push.
    pub async fn initiate(
        &self,
        patient_id: &ObjectId,
        amount: Decimal,
        phone_number: &str,
    ) -> Result<PaymentTransaction> {
        if amount <= Decimal::ZERO {
            return Err(AppError::ValidationError(
                "Amount must be greater than 0".to_string(),
            ));
        }

        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("M-Pesa gateway is not configured".into()))?;

        let patient = self
            .patients
            .find_by_id(patient_id)
            .await?
            .ok_or(AppError::PatientNotFound)?;

        let access_token = gateway
            .fetch_access_token()
            .await
            .ok_or(AppError::UpstreamAuthError)?;

        let account_reference = patient.id.map(|id| id.to_hex()).unwrap_or_default();
        let response = self
            .push_with_retry(
                gateway.as_ref(),
                &access_token,
                &amount,
                phone_number,
                &account_reference,
            )
            .await?;

        if response.response_code != "0" {
            return Err(AppError::UpstreamRejected(response.response_description));
        }

        let tx = PaymentTransaction::pending(
            *patient_id,
            response.merchant_request_id,
            response.checkout_request_id,
            amount,
            phone_number.to_string(),
        );

        let tx = self.transactions.insert(tx).await?;
        info!(
            "Pending transaction {} recorded for patient {}",
            tx.checkout_request_id, patient.name
        );
        Ok(tx)
    }

    async fn push_with_retry(
        &self,
        gateway: &dyn StkGateway,
        access_token: &str,
        amount: &Decimal,
        phone_number: &str,
        account_reference: &str,
    ) -> Result<StkPushResponse> {
        let mut attempt = 0;
        loop {
            match gateway
                .stk_push(access_token, amount, phone_number, account_reference)
                .await
            {
                Err(AppError::UpstreamUnavailable(reason)) if attempt < self.retry_attempts => {
                    attempt += 1;
                    warn!(
                        "STK push attempt {}/{} failed: {}",
                        attempt,
                        self.retry_attempts + 1,
                        reason
                    );
                }
                other => return other,
            }
        }
    }

    /// Applies Daraja's asynchronous result to the matching pending
    /// transaction. Duplicate callbacks for a resolved checkout request
    /// get `AlreadyResolved` and leave the stored record untouched.
    pub async fn reconcile(&self, envelope: StkCallbackEnvelope) -> Result<PaymentTransaction> {
        let callback = envelope.body.stk_callback;

        let resolution = if callback.result_code == 0 {
            let metadata = callback.callback_metadata.as_ref().ok_or_else(|| {
                AppError::MalformedCallback("success callback without CallbackMetadata".into())
            })?;
            let amount = metadata
                .amount()
                .ok_or_else(|| AppError::MalformedCallback("missing Amount item".into()))?;
            let receipt_number = metadata.receipt_number().ok_or_else(|| {
                AppError::MalformedCallback("missing MpesaReceiptNumber item".into())
            })?;
            let phone_number = metadata
                .phone_number()
                .ok_or_else(|| AppError::MalformedCallback("missing PhoneNumber item".into()))?;

            Resolution::Success {
                amount,
                receipt_number,
                phone_number,
                result_code: callback.result_code,
                result_desc: callback.result_desc.clone(),
            }
        } else {
            Resolution::Failure {
                result_code: callback.result_code,
                result_desc: callback.result_desc.clone(),
            }
        };

        match self
            .transactions
            .resolve(&callback.checkout_request_id, resolution)
            .await?
        {
            ResolveOutcome::Applied(tx) => {
                info!(
                    "Transaction {} resolved: {} ({})",
                    tx.checkout_request_id, callback.result_code, callback.result_desc
                );
                Ok(tx)
            }
            ResolveOutcome::AlreadyResolved => {
                Err(AppError::AlreadyResolved(callback.checkout_request_id))
            }
            ResolveOutcome::Unknown => {
                Err(AppError::TransactionNotFound(callback.checkout_request_id))
            }
        }
    }

    pub async fn get_by_transaction_id(&self, id: &ObjectId) -> Result<PaymentTransaction> {
        self.transactions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_hex()))
    }

    pub async fn total_paid(&self) -> Result<Decimal> {
        self.transactions.total_paid().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::patient::Patient;
    use crate::models::transaction::TransactionStatus;
    use crate::store::memory::{InMemoryPatientStore, InMemoryTransactionStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct MockGateway {
        token: Option<String>,
        response_code: &'static str,
        unavailable_failures: Mutex<u32>,
    }

    impl MockGateway {
        fn accepting() -> Self {
            MockGateway {
                token: Some("test-token".into()),
                response_code: "0",
                unavailable_failures: Mutex::new(0),
            }
        }

        fn rejecting() -> Self {
            MockGateway {
                response_code: "1",
                ..Self::accepting()
            }
        }

        fn without_token() -> Self {
            MockGateway {
                token: None,
                ..Self::accepting()
            }
        }

        fn flaky(failures: u32) -> Self {
            MockGateway {
                unavailable_failures: Mutex::new(failures),
                ..Self::accepting()
            }
        }
    }

    #[async_trait]
    impl StkGateway for MockGateway {
        async fn fetch_access_token(&self) -> Option<String> {
            self.token.clone()
        }

        async fn stk_push(
            &self,
            _access_token: &str,
            _amount: &Decimal,
            _phone_number: &str,
            _account_reference: &str,
        ) -> Result<StkPushResponse> {
            let mut failures = self.unavailable_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AppError::UpstreamUnavailable("connection reset".into()));
            }

            Ok(StkPushResponse {
                merchant_request_id: "29115-34620561-1".into(),
                checkout_request_id: "ws_CO_191220191020363925".into(),
                response_code: self.response_code.into(),
                response_description: if self.response_code == "0" {
                    "Success. Request accepted for processing".into()
                } else {
                    "The initiator information is invalid.".into()
                },
                customer_message: "Success. Request accepted for processing".into(),
            })
        }
    }

    struct Harness {
        service: PaymentService,
        transactions: InMemoryTransactionStore,
        patient_id: ObjectId,
    }

    async fn harness(gateway: MockGateway, retry_attempts: u32) -> Harness {
        let patients = InMemoryPatientStore::new();
        let patient_id = patients
            .insert(Patient {
                id: Some(ObjectId::new()),
                name: "Grace Wanjiru".into(),
                phone_number: "254700000000".into(),
                date_of_birth: "1990-04-12".into(),
                added_at: Utc::now(),
            })
            .await;

        let transactions = InMemoryTransactionStore::new();
        let service = PaymentService::new(
            Arc::new(patients),
            Arc::new(transactions.clone()),
        )
        .with_gateway(Arc::new(gateway), retry_attempts);

        Harness {
            service,
            transactions,
            patient_id,
        }
    }

    fn callback(checkout_request_id: &str, result_code: i64) -> StkCallbackEnvelope {
        let metadata = if result_code == 0 {
            serde_json::json!({
                "Item": [
                    {"Value": 500},
                    {"Value": "QAI2V"},
                    {"Value": 0},
                    {"Value": 20240101120000u64},
                    {"Value": "254700000000"}
                ]
            })
        } else {
            serde_json::Value::Null
        };

        let mut stk_callback = serde_json::json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": checkout_request_id,
            "ResultCode": result_code,
            "ResultDesc": if result_code == 0 {
                "The service request is processed successfully."
            } else {
                "Request cancelled by user."
            },
        });
        if result_code == 0 {
            stk_callback["CallbackMetadata"] = metadata;
        }

        serde_json::from_value(serde_json::json!({
            "Body": { "stkCallback": stk_callback }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn initiating_for_an_unknown_patient_writes_nothing() {
        let h = harness(MockGateway::accepting(), 0).await;
        let err = h
            .service
            .initiate(&ObjectId::new(), dec!(100), "254700000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PatientNotFound));
        assert_eq!(h.transactions.len().await, 0);
    }

    #[tokio::test]
    async fn a_rejected_push_writes_nothing() {
        let h = harness(MockGateway::rejecting(), 0).await;
        let err = h
            .service
            .initiate(&h.patient_id, dec!(100), "254700000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamRejected(_)));
        assert_eq!(h.transactions.len().await, 0);
    }

    #[tokio::test]
    async fn a_missing_access_token_is_a_hard_stop() {
        let h = harness(MockGateway::without_token(), 0).await;
        let err = h
            .service
            .initiate(&h.patient_id, dec!(100), "254700000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamAuthError));
        assert_eq!(h.transactions.len().await, 0);
    }

    #[tokio::test]
    async fn an_accepted_push_creates_one_pending_transaction() {
        let h = harness(MockGateway::accepting(), 0).await;
        let tx = h
            .service
            .initiate(&h.patient_id, dec!(350), "254700000000")
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.result_code.is_none());
        assert!(tx.mpesa_receipt_number.is_empty());
        assert_eq!(tx.amount, dec!(350));
        assert_eq!(tx.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(h.transactions.len().await, 1);
    }

    #[tokio::test]
    async fn a_success_callback_overwrites_from_metadata() {
        let h = harness(MockGateway::accepting(), 0).await;
        h.service
            .initiate(&h.patient_id, dec!(350), "254711111111")
            .await
            .unwrap();

        let tx = h
            .service
            .reconcile(callback("ws_CO_191220191020363925", 0))
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Succeeded);
        assert_eq!(tx.amount, dec!(500));
        assert_eq!(tx.mpesa_receipt_number, "QAI2V");
        assert_eq!(tx.phone_number, "254700000000");
        assert_eq!(tx.result_code, Some(0));
    }

    #[tokio::test]
    async fn a_failure_callback_keeps_the_initiated_fields() {
        let h = harness(MockGateway::accepting(), 0).await;
        h.service
            .initiate(&h.patient_id, dec!(350), "254711111111")
            .await
            .unwrap();

        let tx = h
            .service
            .reconcile(callback("ws_CO_191220191020363925", 1032))
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.amount, dec!(350));
        assert!(tx.mpesa_receipt_number.is_empty());
        assert_eq!(tx.phone_number, "254711111111");
        assert_eq!(tx.result_code, Some(1032));
        assert_eq!(tx.result_desc.as_deref(), Some("Request cancelled by user."));
    }

    #[tokio::test]
    async fn a_second_callback_cannot_regress_a_resolved_transaction() {
        let h = harness(MockGateway::accepting(), 0).await;
        h.service
            .initiate(&h.patient_id, dec!(350), "254700000000")
            .await
            .unwrap();

        h.service
            .reconcile(callback("ws_CO_191220191020363925", 0))
            .await
            .unwrap();

        // Same checkout request, opposite outcome.
        let err = h
            .service
            .reconcile(callback("ws_CO_191220191020363925", 1032))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyResolved(_)));

        let stored = h
            .transactions
            .find_by_checkout_request("ws_CO_191220191020363925")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Succeeded);
        assert_eq!(stored.amount, dec!(500));
        assert_eq!(stored.mpesa_receipt_number, "QAI2V");
    }

    #[tokio::test]
    async fn a_callback_for_an_unknown_checkout_request_is_not_found() {
        let h = harness(MockGateway::accepting(), 0).await;
        let err = h
            .service
            .reconcile(callback("ws_CO_never_initiated", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn a_success_callback_without_metadata_is_malformed() {
        let h = harness(MockGateway::accepting(), 0).await;
        h.service
            .initiate(&h.patient_id, dec!(350), "254700000000")
            .await
            .unwrap();

        let envelope: StkCallbackEnvelope = serde_json::from_value(serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully."
                }
            }
        }))
        .unwrap();

        let err = h.service.reconcile(envelope).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedCallback(_)));

        // The pending record is untouched.
        let stored = h
            .transactions
            .find_by_checkout_request("ws_CO_191220191020363925")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn total_paid_is_zero_with_no_transactions() {
        let h = harness(MockGateway::accepting(), 0).await;
        assert_eq!(h.service.total_paid().await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn total_paid_sums_amounts() {
        let h = harness(MockGateway::accepting(), 0).await;
        for (checkout_request_id, amount) in [("ws_CO_a", dec!(100)), ("ws_CO_b", dec!(250))] {
            h.transactions
                .insert(PaymentTransaction::pending(
                    h.patient_id,
                    "merchant".into(),
                    checkout_request_id.into(),
                    amount,
                    "254700000000".into(),
                ))
                .await
                .unwrap();
        }
        assert_eq!(h.service.total_paid().await.unwrap(), dec!(350));
    }

    #[tokio::test]
    async fn lookup_by_transaction_id() {
        let h = harness(MockGateway::accepting(), 0).await;
        let tx = h
            .service
            .initiate(&h.patient_id, dec!(75), "254700000000")
            .await
            .unwrap();

        let found = h
            .service
            .get_by_transaction_id(&tx.id.unwrap())
            .await
            .unwrap();
        assert_eq!(found.checkout_request_id, tx.checkout_request_id);

        let err = h
            .service
            .get_by_transaction_id(&ObjectId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn unreachable_pushes_are_retried_only_when_configured() {
        // Default policy: no retries, the failure surfaces.
        let h = harness(MockGateway::flaky(1), 0).await;
        let err = h
            .service
            .initiate(&h.patient_id, dec!(100), "254700000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        assert_eq!(h.transactions.len().await, 0);

        // With two extra attempts configured, two transient failures recover.
        let h = harness(MockGateway::flaky(2), 2).await;
        let tx = h
            .service
            .initiate(&h.patient_id, dec!(100), "254700000000")
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(h.transactions.len().await, 1);
    }

    #[tokio::test]
    async fn an_unconfigured_gateway_refuses_initiation() {
        let patients = InMemoryPatientStore::new();
        let patient_id = patients
            .insert(Patient {
                id: Some(ObjectId::new()),
                name: "Grace Wanjiru".into(),
                phone_number: "254700000000".into(),
                date_of_birth: "1990-04-12".into(),
                added_at: Utc::now(),
            })
            .await;
        let service = PaymentService::new(
            Arc::new(patients),
            Arc::new(InMemoryTransactionStore::new()),
        );

        let err = service
            .initiate(&patient_id, dec!(100), "254700000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }
}
