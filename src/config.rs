// config.rs
use anyhow::Context;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_short_code: String,
    pub mpesa_passkey: String,
    pub mpesa_callback_url: String,
    pub mpesa_environment: String,
    /// Bound on each outbound gateway call, in seconds.
    pub gateway_timeout_secs: u64,
    /// Extra attempts for the push request when the gateway is unreachable.
    /// 0 keeps the historical no-retry behavior.
    pub gateway_retry_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mpesa_environment =
            env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());

        Ok(AppConfig {
            mpesa_consumer_key: env::var("MPESA_CONSUMER_KEY")
                .context("MPESA_CONSUMER_KEY must be set")?,
            mpesa_consumer_secret: env::var("MPESA_CONSUMER_SECRET")
                .context("MPESA_CONSUMER_SECRET must be set")?,
            mpesa_short_code: env::var("MPESA_SHORT_CODE")
                .context("MPESA_SHORT_CODE must be set")?,
            mpesa_passkey: env::var("MPESA_PASSKEY").context("MPESA_PASSKEY must be set")?,
            mpesa_callback_url: env::var("MPESA_CALLBACK_URL")
                .context("MPESA_CALLBACK_URL must be set")?,
            mpesa_environment,
            gateway_timeout_secs: env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            gateway_retry_attempts: env::var("MPESA_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    pub fn is_production(&self) -> bool {
        self.mpesa_environment == "production"
    }

    pub fn mpesa_base_url(&self) -> &'static str {
        if self.is_production() {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        }
    }

    pub fn auth_url(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.mpesa_base_url()
        )
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.mpesa_base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_config() -> AppConfig {
        AppConfig {
            mpesa_consumer_key: "key".into(),
            mpesa_consumer_secret: "secret".into(),
            mpesa_short_code: "174379".into(),
            mpesa_passkey: "passkey".into(),
            mpesa_callback_url: "https://example.com/api/payments/callback".into(),
            mpesa_environment: "sandbox".into(),
            gateway_timeout_secs: 10,
            gateway_retry_attempts: 0,
        }
    }

    #[test]
    fn sandbox_urls_point_at_sandbox_host() {
        let config = sandbox_config();
        assert!(!config.is_production());
        assert_eq!(
            config.auth_url(),
            "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
        assert_eq!(
            config.stk_push_url(),
            "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        );
    }

    #[test]
    fn production_flag_switches_host() {
        let mut config = sandbox_config();
        config.mpesa_environment = "production".into();
        assert!(config.is_production());
        assert!(config.auth_url().starts_with("https://api.safaricom.co.ke"));
    }
}
