//! SMS provider client
//!
//! Delivers one-time codes through an MSG91-style HTTP API:
//! `POST {base_url}/api/v5/otp` with the API key in the `authkey` header.

use std::time::Duration;

use serde::Serialize;

use crate::config::SmsConfig;
use crate::error::AppError;
use crate::metrics::OTP_DELIVERIES_TOTAL;

/// Validate E.164 phone number format (`+` then 7 to 15 digits)
pub fn is_valid_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Mask phone number for logging
pub fn mask_phone(phone: &str) -> String {
    if phone.len() <= 4 {
        return "****".to_string();
    }
    let visible = &phone[phone.len() - 4..];
    format!("****{}", visible)
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    mobiles: &'a str,
    message: String,
    sender: &'a str,
    otp: &'a str,
}

/// HTTP client for the SMS provider
pub struct SmsClient {
    http: reqwest::Client,
    base_url: String,
    auth_key: String,
    sender: String,
}

impl SmsClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: &SmsConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tweetapp/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_key: config.auth_key.clone(),
            sender: config.sender.clone(),
        })
    }

    /// Send a one-time code to an E.164 phone number
    ///
    /// # Errors
    /// `Delivery` when the provider answers with a non-2xx status,
    /// `HttpClient` when the provider cannot be reached. No retry.
    pub async fn send_otp(&self, phone_number: &str, otp: &str) -> Result<(), AppError> {
        let url = format!("{}/api/v5/otp", self.base_url);
        let mobiles = phone_number.trim_start_matches('+');
        let payload = OtpRequest {
            mobiles,
            message: format!("Your OTP is {}", otp),
            sender: &self.sender,
            otp,
        };

        let response = self
            .http
            .post(&url)
            .header("authkey", &self.auth_key)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                OTP_DELIVERIES_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!(phone = %mask_phone(phone_number), error = %e, "SMS provider unreachable");
                AppError::HttpClient(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            OTP_DELIVERIES_TOTAL.with_label_values(&["rejected"]).inc();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                phone = %mask_phone(phone_number),
                status = %status,
                body = %body,
                "SMS provider rejected OTP request"
            );
            return Err(AppError::Delivery(format!(
                "SMS provider returned {}",
                status.as_u16()
            )));
        }

        OTP_DELIVERIES_TOTAL.with_label_values(&["sent"]).inc();
        tracing::info!(phone = %mask_phone(phone_number), "OTP delivered to SMS provider");
        Ok(())
    }
}
