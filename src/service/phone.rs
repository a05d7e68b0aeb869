//! Phone verification service
//!
//! Sends six-digit one-time codes over SMS and marks the profile's phone
//! number verified once the newest live code is echoed back.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;

use super::Actor;
use crate::auth::password::hash_secret;
use crate::data::{Database, EntityId, PhoneOtp};
use crate::error::AppError;
use crate::sms::{SmsClient, mask_phone};

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Phone verification service
pub struct PhoneVerificationService {
    db: Arc<Database>,
    sms: Arc<SmsClient>,
    otp_ttl: Duration,
}

impl PhoneVerificationService {
    pub fn new(db: Arc<Database>, sms: Arc<SmsClient>, otp_ttl_seconds: i64) -> Self {
        Self {
            db,
            sms,
            otp_ttl: Duration::seconds(otp_ttl_seconds),
        }
    }

    /// Generate, store and deliver a code to the actor's phone number.
    ///
    /// The stored code is removed again if delivery fails.
    ///
    /// # Returns
    /// Seconds until the code expires
    ///
    /// # Errors
    /// `Validation` if the profile has no phone number, `Delivery` or
    /// `HttpClient` if the SMS provider fails
    pub async fn send_code(&self, actor: &Actor) -> Result<i64, AppError> {
        let profile = self
            .db
            .get_profile_by_account(&actor.account_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let phone_number = profile.phone_number.ok_or_else(|| {
            AppError::Validation("No phone number is registered for this profile".to_string())
        })?;

        let code = generate_code();
        let now = Utc::now();
        let otp = PhoneOtp {
            id: EntityId::new().0,
            profile_id: profile.id.clone(),
            phone_number: phone_number.clone(),
            code_hash: hash_secret(&code),
            created_at: now,
            expires_at: now + self.otp_ttl,
            consumed_at: None,
        };
        self.db.insert_phone_otp(&otp).await?;

        if let Err(error) = self.sms.send_otp(&phone_number, &code).await {
            if let Err(cleanup_error) = self.db.delete_phone_otp(&otp.id).await {
                tracing::warn!(
                    otp_id = %otp.id,
                    error = %cleanup_error,
                    "failed to remove undelivered verification code"
                );
            }
            return Err(error);
        }

        tracing::info!(
            profile_id = %profile.id,
            phone = %mask_phone(&phone_number),
            "Verification code sent"
        );
        Ok(self.otp_ttl.num_seconds())
    }

    /// Check a code against the newest live one and mark the phone verified.
    ///
    /// # Errors
    /// `Validation` for a wrong, expired or already used code
    pub async fn verify_code(&self, actor: &Actor, code: &str) -> Result<(), AppError> {
        let code = code.trim();
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation("Invalid verification code".to_string()));
        }

        let verified = self
            .db
            .consume_phone_otp(&actor.profile_id, &hash_secret(code), Utc::now())
            .await?;
        if !verified {
            tracing::info!(profile_id = %actor.profile_id, "Verification code rejected");
            return Err(AppError::Validation("Invalid verification code".to_string()));
        }

        tracing::info!(profile_id = %actor.profile_id, "Phone number verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmsConfig;
    use crate::data::NewAccount;
    use crate::service::test_support::{create_test_db, register};
    use axum::{Json, Router, http::StatusCode, routing::post};
    use std::sync::Mutex;

    type Sent = Arc<Mutex<Vec<String>>>;

    /// Fake provider recording the `otp` field of each request
    async fn spawn_provider(status: StatusCode) -> (Arc<SmsClient>, Sent) {
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let app = Router::new().route(
            "/api/v5/otp",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    if let Some(otp) = body["otp"].as_str() {
                        sink.lock().unwrap().push(otp.to_string());
                    }
                    (status, Json(serde_json::json!({ "type": "success" })))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = SmsClient::new(&SmsConfig {
            base_url: format!("http://{}", addr),
            auth_key: "test-key".to_string(),
            sender: "TWEETA".to_string(),
            otp_ttl_seconds: 300,
            timeout_seconds: 5,
        })
        .unwrap();
        (Arc::new(client), sent)
    }

    async fn register_with_phone(db: &Database, username: &str, phone: &str) -> Actor {
        let (account, profile) = db
            .register_account(&NewAccount {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: "not-a-real-hash".to_string(),
                phone_number: Some(phone.to_string()),
            })
            .await
            .unwrap();
        Actor {
            account_id: account.id,
            profile_id: profile.id,
            username: account.username,
        }
    }

    #[tokio::test]
    async fn delivered_code_verifies_phone_once() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::OK).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let alice = register_with_phone(&db, "alice", "+14155551234").await;

        assert_eq!(service.send_code(&alice).await.unwrap(), 300);
        let code = sent.lock().unwrap()[0].clone();
        assert_eq!(code.len(), 6);

        service.verify_code(&alice, &code).await.unwrap();
        let profile = db.get_profile_by_account(&alice.account_id).await.unwrap().unwrap();
        assert!(profile.phone_verified);

        assert!(matches!(
            service.verify_code(&alice, &code).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn only_newest_code_is_accepted() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::OK).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let alice = register_with_phone(&db, "alice", "+14155551234").await;

        service.send_code(&alice).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service.send_code(&alice).await.unwrap();
        let (first, second) = {
            let sent = sent.lock().unwrap();
            (sent[0].clone(), sent[1].clone())
        };

        if first != second {
            assert!(service.verify_code(&alice, &first).await.is_err());
        }
        service.verify_code(&alice, &second).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::OK).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let alice = register_with_phone(&db, "alice", "+14155551234").await;

        service.send_code(&alice).await.unwrap();
        let code = sent.lock().unwrap()[0].clone();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for attempt in [wrong, "12ab56", ""] {
            assert!(matches!(
                service.verify_code(&alice, attempt).await,
                Err(AppError::Validation(_))
            ));
        }
        let profile = db.get_profile_by_account(&alice.account_id).await.unwrap().unwrap();
        assert!(!profile.phone_verified);
    }

    #[tokio::test]
    async fn code_is_burned_after_too_many_wrong_guesses() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::OK).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let alice = register_with_phone(&db, "alice", "+14155551234").await;

        service.send_code(&alice).await.unwrap();
        let code = sent.lock().unwrap()[0].clone();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for _ in 0..crate::data::MAX_OTP_ATTEMPTS {
            assert!(service.verify_code(&alice, wrong).await.is_err());
        }
        // The right code no longer works
        assert!(matches!(
            service.verify_code(&alice, &code).await,
            Err(AppError::Validation(_))
        ));

        // A fresh code does
        service.send_code(&alice).await.unwrap();
        let fresh = sent.lock().unwrap()[1].clone();
        service.verify_code(&alice, &fresh).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_guesses_below_the_limit_keep_the_code() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::OK).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let alice = register_with_phone(&db, "alice", "+14155551234").await;

        service.send_code(&alice).await.unwrap();
        let code = sent.lock().unwrap()[0].clone();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for _ in 1..crate::data::MAX_OTP_ATTEMPTS {
            assert!(service.verify_code(&alice, wrong).await.is_err());
        }
        service.verify_code(&alice, &code).await.unwrap();
    }

    #[tokio::test]
    async fn failed_delivery_discards_code() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::BAD_GATEWAY).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let alice = register_with_phone(&db, "alice", "+14155551234").await;

        assert!(matches!(
            service.send_code(&alice).await,
            Err(AppError::Delivery(_))
        ));
        let code = sent.lock().unwrap()[0].clone();
        assert!(service.verify_code(&alice, &code).await.is_err());
    }

    #[tokio::test]
    async fn profile_without_phone_cannot_request_code() {
        let (db, _temp_dir) = create_test_db().await;
        let (sms, sent) = spawn_provider(StatusCode::OK).await;
        let service = PhoneVerificationService::new(db.clone(), sms, 300);
        let bob = register(&db, "bob").await;

        assert!(matches!(
            service.send_code(&bob).await,
            Err(AppError::Validation(_))
        ));
        assert!(sent.lock().unwrap().is_empty());
    }
}
