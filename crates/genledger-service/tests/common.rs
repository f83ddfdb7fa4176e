//! Common test utilities for genledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::Router;
use axum_test::{TestResponse, TestServer};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tempfile::TempDir;

use genledger_core::{JobFamily, ModelPrice, UserId};
use genledger_service::auth::JwtClaims;
use genledger_service::crypto::hmac_sha256_hex;
use genledger_service::handlers::callbacks::SIGNATURE_HEADER;
use genledger_service::{
    create_router, AppState, DispatchReceipt, DispatchRequest, GenerationProvider, ProviderError,
    ServiceConfig,
};
use genledger_store::RocksStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const CALLBACK_SECRET: &str = "test-callback-secret";

/// Model costing 7 credits, used by the lifecycle scenario.
pub const SEVEN_CREDIT_MODEL: &str = "test-video-7";

/// Provider double that accepts or rejects every dispatch and counts calls.
#[derive(Default)]
pub struct ScriptedProvider {
    fail_with: Mutex<Option<u16>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Make every following dispatch fail with `status`.
    pub fn fail_with(&self, status: u16) {
        *self.fail_with.lock().unwrap() = Some(status);
    }

    /// Accept every following dispatch.
    pub fn accept(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    /// Answer every following dispatch only after `delay`.
    pub fn respond_after(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let outcome = *self.fail_with.lock().unwrap();
        match outcome {
            Some(status) => Err(ProviderError::Api {
                status,
                message: "scripted failure".into(),
            }),
            None => Ok(DispatchReceipt {
                task_id: format!("task-{}", request.request_id),
            }),
        }
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Shared state, for inspecting the store and cache directly.
    pub state: AppState,
    /// The provider double behind the service.
    pub provider: Arc<ScriptedProvider>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            callback_secret: Some(CALLBACK_SECRET.into()),
            dispatch_max_attempts: 1,
            ..ServiceConfig::default()
        };
        config.pricing.models.insert(
            SEVEN_CREDIT_MODEL.into(),
            ModelPrice::new(JobFamily::Video, 7),
        );
        adjust(&mut config);

        let provider = Arc::new(ScriptedProvider::default());
        let state = AppState::with_provider(Arc::new(store), config, provider.clone());
        let router: Router = create_router(state.clone());

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            state,
            provider,
            _temp_dir: temp_dir,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Get a bearer header carrying a freshly minted token for `user_id`.
    pub fn auth_header_for(user_id: &UserId) -> String {
        let defaults = ServiceConfig::default();
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            aud: defaults.auth_audience,
            iss: defaults.auth_issuer,
            exp: now + 600,
            iat: now,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to mint token");
        format!("Bearer {token}")
    }

    /// Open the test user's account and return its balance.
    pub async fn create_account(&self) -> i64 {
        let response = self
            .server
            .post("/v1/accounts")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json::<serde_json::Value>()["balance"]
            .as_i64()
            .expect("balance")
    }

    /// Current balance of the test user.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json::<serde_json::Value>()["balance"]
            .as_i64()
            .expect("balance")
    }

    /// Submit a generation for the test user.
    pub async fn generate(&self, body: &serde_json::Value) -> TestResponse {
        self.server
            .post("/v1/generations")
            .add_header("authorization", self.user_auth_header())
            .json(body)
            .await
    }

    /// Sign a callback body with the test callback secret.
    pub fn sign(body: &[u8]) -> String {
        hmac_sha256_hex(CALLBACK_SECRET, body)
    }

    /// Deliver a correctly signed provider callback.
    pub async fn post_callback(&self, payload: &serde_json::Value) -> TestResponse {
        let body = serde_json::to_vec(payload).expect("serialize callback");
        let signature = Self::sign(&body);
        self.server
            .post("/webhooks/provider")
            .add_header("content-type", "application/json")
            .add_header(SIGNATURE_HEADER, signature)
            .bytes(Bytes::from(body))
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
