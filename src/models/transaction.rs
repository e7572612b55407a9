use chrono::{DateTime, Utc};
use mongodb::bson;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle of a payment attempt. Transitions are one-way:
/// `Pending` -> `Succeeded` or `Pending` -> `Failed`, applied exactly once
/// by the first callback that resolves the checkout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub patient_id: ObjectId,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub status: TransactionStatus,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub amount: Decimal,
    /// Empty until the gateway confirms settlement.
    pub mpesa_receipt_number: String,
    pub phone_number: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn pending(
        patient_id: ObjectId,
        merchant_request_id: String,
        checkout_request_id: String,
        amount: Decimal,
        phone_number: String,
    ) -> Self {
        PaymentTransaction {
            id: Some(ObjectId::new()),
            patient_id,
            merchant_request_id,
            checkout_request_id,
            status: TransactionStatus::Pending,
            result_code: None,
            result_desc: None,
            amount,
            mpesa_receipt_number: String::new(),
            phone_number,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InitiateChargeRequest {
    pub amount: Decimal,
    pub phone_number: String,
}

// ---------------------------------------------------------------------------
// STK callback wire format, exactly as Daraja posts it.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(rename = "ResultCode")]
    pub result_code: i64,

    #[serde(rename = "ResultDesc")]
    pub result_desc: String,

    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,

    #[serde(rename = "Value", default)]
    pub value: serde_json::Value,
}

impl CallbackMetadata {
    /// Finds an item by its declared `Name`, falling back to the gateway's
    /// documented position when names are missing from the payload.
    fn lookup(&self, name: &str, position: usize) -> Option<&serde_json::Value> {
        self.items
            .iter()
            .find(|item| item.name.as_deref() == Some(name))
            .or_else(|| self.items.get(position))
            .map(|item| &item.value)
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.lookup("Amount", 0).and_then(decimal_value)
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.lookup("MpesaReceiptNumber", 1).and_then(string_value)
    }

    pub fn phone_number(&self) -> Option<String> {
        self.lookup("PhoneNumber", 4).and_then(string_value)
    }
}

fn decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn string_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
