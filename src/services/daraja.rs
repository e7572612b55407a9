// services/daraja.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::Utc;
use reqwest::{header, Client};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub expires_in: String,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

/// Outbound side of the payment workflow. The production implementation
/// talks to Daraja; tests substitute a canned gateway.
#[async_trait]
pub trait StkGateway: Send + Sync {
    /// Fresh bearer token for one push attempt. `None` on any failure;
    /// callers must treat that as a hard stop.
    async fn fetch_access_token(&self) -> Option<String>;

    async fn stk_push(
        &self,
        access_token: &str,
        amount: &Decimal,
        phone_number: &str,
        account_reference: &str,
    ) -> Result<StkPushResponse>;
}

#[derive(Debug, Clone)]
pub struct DarajaClient {
    config: AppConfig,
    client: Client,
}

impl DarajaClient {
    pub fn new(config: AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        DarajaClient { config, client }
    }

    fn format_phone_number(&self, phone: &str) -> String {
        let phone = phone.trim();
        if phone.starts_with("254") && phone.len() == 12 {
            return phone.to_string();
        }
        if phone.starts_with("07") && phone.len() == 10 {
            return format!("254{}", &phone[1..]);
        }
        if phone.starts_with("7") && phone.len() == 9 {
            return format!("254{}", phone);
        }
        phone.to_string()
    }

    /// Daraja's signing scheme: base64(shortcode + passkey + timestamp),
    /// with the timestamp as YYYYMMDDHHMMSS.
    fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!(
            "{}{}{}",
            self.config.mpesa_short_code, self.config.mpesa_passkey, timestamp
        );
        base64.encode(password_string)
    }

    fn timestamp_now() -> String {
        Utc::now().format("%Y%m%d%H%M%S").to_string()
    }
}

#[async_trait]
impl StkGateway for DarajaClient {
    async fn fetch_access_token(&self) -> Option<String> {
        let auth_string = format!(
            "{}:{}",
            self.config.mpesa_consumer_key, self.config.mpesa_consumer_secret
        );
        let encoded_auth = base64.encode(auth_string);

        let response = match self
            .client
            .get(self.config.auth_url())
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to reach M-Pesa token endpoint: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            error!("M-Pesa auth failed: {}", response.status());
            return None;
        }

        match response.json::<AuthResponse>().await {
            Ok(auth) => Some(auth.access_token),
            Err(e) => {
                error!("Unexpected M-Pesa auth response: {}", e);
                None
            }
        }
    }

    async fn stk_push(
        &self,
        access_token: &str,
        amount: &Decimal,
        phone_number: &str,
        account_reference: &str,
    ) -> Result<StkPushResponse> {
        let formatted_phone = self.format_phone_number(phone_number);
        let timestamp = Self::timestamp_now();
        let password = self.generate_password(&timestamp);

        let stk_request = StkPushRequest {
            business_short_code: self.config.mpesa_short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: amount.to_string(),
            party_a: formatted_phone.clone(),
            party_b: self.config.mpesa_short_code.clone(),
            phone_number: formatted_phone,
            callback_url: self.config.mpesa_callback_url.clone(),
            account_reference: account_reference.to_string(),
            transaction_desc: "Hospital charge".to_string(),
        };

        info!("STK push for {} - KSh {}", stk_request.phone_number, amount);

        let response = self
            .client
            .post(self.config.stk_push_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&stk_request)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("STK push declined: {} - {}", status, body);
            return Err(AppError::UpstreamRejected(format!("{}: {}", status, body)));
        }

        let stk_response: StkPushResponse = response.json().await?;
        info!("STK push accepted: {}", stk_response.merchant_request_id);
        Ok(stk_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DarajaClient {
        DarajaClient::new(AppConfig {
            mpesa_consumer_key: "key".into(),
            mpesa_consumer_secret: "secret".into(),
            mpesa_short_code: "174379".into(),
            mpesa_passkey: "secretpass".into(),
            mpesa_callback_url: "https://example.com/api/payments/callback".into(),
            mpesa_environment: "sandbox".into(),
            gateway_timeout_secs: 10,
            gateway_retry_attempts: 0,
        })
    }

    #[test]
    fn password_derivation_is_bit_exact() {
        // base64("174379" + "secretpass" + "20240101120000")
        assert_eq!(
            client().generate_password("20240101120000"),
            "MTc0Mzc5c2VjcmV0cGFzczIwMjQwMTAxMTIwMDAw"
        );
    }

    #[test]
    fn timestamps_are_fourteen_digits() {
        let ts = DarajaClient::timestamp_now();
        assert_eq!(ts.len(), 14);
        assert!(ts.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn local_phone_formats_normalize_to_msisdn() {
        let client = client();
        assert_eq!(client.format_phone_number("0712345678"), "254712345678");
        assert_eq!(client.format_phone_number("712345678"), "254712345678");
        assert_eq!(client.format_phone_number("254712345678"), "254712345678");
        assert_eq!(client.format_phone_number(" 0712345678 "), "254712345678");
    }

    #[test]
    fn push_request_serializes_with_gateway_field_names() {
        let request = StkPushRequest {
            business_short_code: "174379".into(),
            password: "cGFzcw==".into(),
            timestamp: "20240101120000".into(),
            transaction_type: "CustomerPayBillOnline".into(),
            amount: "500".into(),
            party_a: "254712345678".into(),
            party_b: "174379".into(),
            phone_number: "254712345678".into(),
            callback_url: "https://example.com/cb".into(),
            account_reference: "64b0c8c2a1f4e2d3c4b5a697".into(),
            transaction_desc: "Hospital charge".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        for key in [
            "BusinessShortCode",
            "Password",
            "Timestamp",
            "TransactionType",
            "Amount",
            "PartyA",
            "PartyB",
            "PhoneNumber",
            "CallBackURL",
            "AccountReference",
            "TransactionDesc",
        ] {
            assert!(value.get(key).is_some(), "missing field {key}");
        }
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
    }
}
