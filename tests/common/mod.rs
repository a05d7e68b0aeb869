//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tweetapp::{AppState, config};

/// OTP codes received by the fake SMS provider, as (mobiles, otp)
pub type SentCodes = Arc<Mutex<Vec<(String, String)>>>;

/// A registered and logged-in test user
#[derive(Debug, Clone)]
pub struct TestUser {
    pub username: String,
    pub token: String,
    pub account_id: String,
    pub profile_id: String,
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
    pub sent_codes: SentCodes,
}

/// Fake SMS provider recording every OTP request
async fn spawn_sms_provider() -> (String, SentCodes) {
    use axum::{Json, Router, routing::post};

    let sent: SentCodes = Arc::new(Mutex::new(Vec::new()));
    let sink = sent.clone();
    let app = Router::new().route(
        "/api/v5/otp",
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                let mobiles = body["mobiles"].as_str().unwrap_or_default().to_string();
                let otp = body["otp"].as_str().unwrap_or_default().to_string();
                sink.lock().unwrap().push((mobiles, otp));
                Json(json!({ "type": "success" }))
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), sent)
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        tweetapp::metrics::init_metrics();

        // Create temporary directory for test database and media
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind to random port first so media URLs can point at it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let (sms_base_url, sent_codes) = spawn_sms_provider().await;

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            storage: config::StorageConfig {
                media: config::MediaStorageConfig {
                    backend: config::MediaBackend::Local,
                    bucket: "test-media".to_string(),
                    public_url: format!("{}/media", addr_str),
                    local_root: temp_dir.path().join("media"),
                },
            },
            cloudflare: None,
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
                password_reset_ttl: 3600,
            },
            sms: config::SmsConfig {
                base_url: sms_base_url,
                auth_key: "test-auth-key".to_string(),
                sender: "TWEETA".to_string(),
                otp_ttl_seconds: 300,
                timeout_seconds: 5,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Redirects are asserted, never followed
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Build router
        let app = tweetapp::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
            sent_codes,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST /register
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        phone_number: Option<&str>,
    ) -> reqwest::Response {
        self.client
            .post(self.url("/register"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": password,
                "phone_number": phone_number,
            }))
            .send()
            .await
            .unwrap()
    }

    /// POST /login and return the session token
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Register and log in a user with the default password
    pub async fn create_user(&self, username: &str) -> TestUser {
        self.create_user_with_phone(username, None).await
    }

    pub async fn create_user_with_phone(&self, username: &str, phone: Option<&str>) -> TestUser {
        let response = self.register(username, "password123", phone).await;
        assert_eq!(response.status(), 201);
        let account: Value = response.json().await.unwrap();
        let token = self.login(username, "password123").await;

        TestUser {
            username: username.to_string(),
            token,
            account_id: account["id"].as_str().unwrap().to_string(),
            profile_id: account["profile_id"].as_str().unwrap().to_string(),
        }
    }

    pub async fn get(&self, path: &str, user: &TestUser) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, user: &TestUser) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_json(&self, path: &str, user: &TestUser, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, user: &TestUser) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap()
    }

    /// Create a text post via multipart and return its JSON
    pub async fn create_post(&self, user: &TestUser, title: &str, body: &str) -> Value {
        let form = reqwest::multipart::Form::new()
            .text("title", title.to_string())
            .text("body", body.to_string());
        let response = self
            .client
            .post(self.url("/posts"))
            .bearer_auth(&user.token)
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// GET a path and decode the JSON body
    pub async fn get_json(&self, path: &str, user: &TestUser) -> Value {
        let response = self.get(path, user).await;
        assert_eq!(response.status(), 200, "GET {} failed", path);
        response.json().await.unwrap()
    }
}
