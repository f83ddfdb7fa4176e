//! Generation admission, status and history integration tests.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{TestHarness, SEVEN_CREDIT_MODEL};
use futures::future::join_all;
use genledger_core::{JobStatus, RequestId, SettlementSource, StatusSnapshot, UserId};
use genledger_store::Store;
use serde_json::json;

// ============================================================================
// Models
// ============================================================================

#[tokio::test]
async fn list_models_returns_price_table() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/models").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let models = body["models"].as_array().unwrap();
    let veo = models.iter().find(|m| m["model"] == "veo-3").unwrap();
    assert_eq!(veo["family"], "video");
    assert_eq!(veo["credits"], 40);
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn create_generation_charges_and_dispatches() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .generate(&json!({
            "family": "image",
            "model": "imagen-4",
            "input": { "prompt": "a lighthouse at dusk" },
        }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "processing");
    assert_eq!(body["credits_charged"], 2);
    assert_eq!(body["new_balance"], 8);
    assert_eq!(body["replayed"], false);
    assert_eq!(harness.provider.calls(), 1);
    assert_eq!(harness.balance().await, 8);

    let request_id: RequestId = body["request_id"].as_str().unwrap().parse().unwrap();
    let job = harness.state.store.get_job(&request_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.provider_task_id, Some(format!("task-{request_id}")));
}

#[tokio::test]
async fn create_generation_rejects_unknown_model() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .generate(&json!({ "family": "image", "model": "mystery-model" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.provider.calls(), 0);
    assert_eq!(harness.balance().await, 10);
}

#[tokio::test]
async fn create_generation_rejects_family_mismatch() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .generate(&json!({ "family": "image", "model": "veo-3" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.balance().await, 10);
}

#[tokio::test]
async fn create_generation_rejects_malformed_request_id() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .generate(&json!({
            "family": "image",
            "model": "imagen-4",
            "request_id": "not-a-uuid",
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.balance().await, 10);
}

#[tokio::test]
async fn create_generation_without_account_fails() {
    let harness = TestHarness::new();

    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;

    response.assert_status_not_found();
    assert_eq!(harness.provider.calls(), 0);
}

#[tokio::test]
async fn insufficient_funds_reports_shortfall() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .generate(&json!({ "family": "video", "model": "veo-3" }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_funds");
    assert_eq!(body["error"]["details"]["required"], 40);
    assert_eq!(body["error"]["details"]["available"], 10);
    assert_eq!(body["error"]["details"]["shortfall"], 30);
    assert_eq!(harness.provider.calls(), 0);
    assert_eq!(harness.balance().await, 10);
}

#[tokio::test]
async fn repeated_request_id_is_admitted_once() {
    let harness = TestHarness::new();
    harness.create_account().await;
    let request_id = RequestId::generate().to_string();
    let body = json!({
        "family": "image",
        "model": "imagen-4",
        "request_id": request_id,
    });

    let first = harness.generate(&body).await;
    first.assert_status(StatusCode::ACCEPTED);

    let second = harness.generate(&body).await;
    second.assert_status_ok();
    let replay: serde_json::Value = second.json();
    assert_eq!(replay["request_id"], request_id);
    assert_eq!(replay["replayed"], true);
    assert_eq!(replay["new_balance"], 8);

    assert_eq!(harness.provider.calls(), 1);
    assert_eq!(harness.balance().await, 8);
}

#[tokio::test]
async fn request_id_of_another_account_conflicts() {
    let harness = TestHarness::new();
    harness.create_account().await;
    let request_id = RequestId::generate().to_string();
    harness
        .generate(&json!({
            "family": "image",
            "model": "imagen-4",
            "request_id": request_id,
        }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let other = UserId::generate();
    let other_auth = TestHarness::auth_header_for(&other);
    harness
        .server
        .post("/v1/accounts")
        .add_header("authorization", other_auth.clone())
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", other_auth)
        .json(&json!({
            "family": "image",
            "model": "imagen-4",
            "request_id": request_id,
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let other_account = harness.state.store.get_account(&other).unwrap().unwrap();
    assert_eq!(other_account.balance, 10);
}

#[tokio::test]
async fn concurrent_admissions_never_overdraw() {
    let harness = TestHarness::new();
    harness.create_account().await;
    let body = json!({ "family": "image", "model": "imagen-4-ultra" });

    let responses = join_all((0..5).map(|_| harness.generate(&body))).await;

    let accepted = responses
        .iter()
        .filter(|r| r.status_code() == StatusCode::ACCEPTED)
        .count();
    let rejected = responses
        .iter()
        .filter(|r| r.status_code() == StatusCode::PAYMENT_REQUIRED)
        .count();
    assert_eq!(accepted, 2);
    assert_eq!(rejected, 3);
    assert_eq!(harness.balance().await, 2);
}

// ============================================================================
// Dispatch failure
// ============================================================================

#[tokio::test]
async fn dispatch_failure_refunds_charge() {
    let harness = TestHarness::new();
    harness.create_account().await;
    harness.provider.fail_with(400);

    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "generation_failed");
    assert_eq!(body["error"]["details"]["refunded"], true);
    assert_eq!(harness.balance().await, 10);

    let request_id: RequestId = body["error"]["details"]["request_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let status = harness
        .server
        .get(&format!("/v1/generations/{request_id}"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    status.assert_status_ok();
    let status: serde_json::Value = status.json();
    assert_eq!(status["status"], "failed");
    assert_eq!(status["percentage"], 100);
}

#[tokio::test]
async fn retryable_dispatch_failure_is_retried_then_refunded() {
    let harness = TestHarness::with_config(|config| config.dispatch_max_attempts = 3);
    harness.create_account().await;
    harness.provider.fail_with(503);

    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(harness.provider.calls(), 3);
    assert_eq!(harness.balance().await, 10);

    let entries = harness
        .state
        .store
        .ledger_for_user(&harness.test_user_id)
        .unwrap();
    let kinds: Vec<_> = entries.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, ["signup_grant", "job_charge", "job_refund"]);
}

#[tokio::test]
async fn timed_out_admission_still_refunds() {
    let harness = TestHarness::with_config(|config| {
        config.request_timeout_seconds = 1;
        config.dispatch_max_attempts = 1;
    });
    harness.create_account().await;
    harness.provider.fail_with(503);
    harness.provider.respond_after(Duration::from_secs(2));
    let request_id = RequestId::generate();

    let response = harness
        .generate(&json!({
            "family": "video",
            "model": SEVEN_CREDIT_MODEL,
            "request_id": request_id.to_string(),
        }))
        .await;

    response.assert_status(StatusCode::REQUEST_TIMEOUT);
    assert_eq!(harness.balance().await, 3);

    tokio::time::sleep(Duration::from_secs(3)).await;

    let job = harness.state.store.get_job(&request_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.settled_by, Some(SettlementSource::DispatchFailure));
    assert_eq!(harness.balance().await, 10);

    let status = harness
        .server
        .get(&format!("/v1/generations/{request_id}"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    assert_eq!(status.json::<serde_json::Value>()["status"], "failed");
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn status_of_unknown_job_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/generations/{}", RequestId::generate()))
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn status_with_malformed_id_is_bad_request() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/generations/not-a-uuid")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_of_another_accounts_job_is_forbidden() {
    let harness = TestHarness::new();
    harness.create_account().await;
    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;
    let request_id = response.json::<serde_json::Value>()["request_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = harness
        .server
        .get(&format!("/v1/generations/{request_id}"))
        .add_header(
            "authorization",
            TestHarness::auth_header_for(&UserId::generate()),
        )
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_is_served_from_registry_after_cache_loss() {
    let harness = TestHarness::with_config(|config| config.status_cache_ttl_seconds = 0);
    harness.create_account().await;
    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;
    let request_id = response.json::<serde_json::Value>()["request_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = harness
        .server
        .get(&format!("/v1/generations/{request_id}"))
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["request_id"], request_id);
    assert_eq!(body["status"], "processing");
    assert!(body.get("user_id").is_none());
}

#[tokio::test]
async fn terminal_status_never_regresses() {
    let harness = TestHarness::new();
    harness.create_account().await;
    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;
    let request_id_text = response.json::<serde_json::Value>()["request_id"]
        .as_str()
        .unwrap()
        .to_string();
    let request_id: RequestId = request_id_text.parse().unwrap();

    harness
        .post_callback(&json!({
            "request_id": request_id_text,
            "outcome": "succeeded",
            "result_location": "https://cdn.example.test/out.png",
        }))
        .await
        .assert_status_ok();

    // A late processing write must not move the job or the cache backwards.
    let job = harness
        .state
        .store
        .mark_processing(&request_id, "late-task".into())
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let mut stale = StatusSnapshot::from(&job);
    stale.status = JobStatus::Processing;
    assert!(!harness.state.status_cache.put(stale).await);

    for _ in 0..3 {
        let response = harness
            .server
            .get(&format!("/v1/generations/{request_id_text}"))
            .add_header("authorization", harness.user_auth_header())
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "completed");
        assert_eq!(body["result_location"], "https://cdn.example.test/out.png");
        assert_eq!(body["percentage"], 100);
    }
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn list_generations_hides_provider_cost() {
    let harness = TestHarness::new();
    harness.create_account().await;
    let response = harness
        .generate(&json!({ "family": "image", "model": "imagen-4" }))
        .await;
    let request_id = response.json::<serde_json::Value>()["request_id"]
        .as_str()
        .unwrap()
        .to_string();
    harness
        .post_callback(&json!({
            "requestId": request_id,
            "outcome": "succeeded",
            "resultLocation": "https://cdn.example.test/out.png",
            "actualCost": 999,
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/v1/generations")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let generations = body["generations"].as_array().unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0]["request_id"], request_id);
    assert_eq!(generations[0]["status"], "completed");
    assert_eq!(generations[0]["credits_charged"], 2);
    assert!(generations[0].get("actual_cost").is_none());
    assert!(generations[0].get("actual_credits_used").is_none());
    assert_eq!(body["has_more"], false);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn failure_refund_then_readmission_lifecycle() {
    let harness = TestHarness::new();
    assert_eq!(harness.create_account().await, 10);
    let body = json!({ "family": "video", "model": SEVEN_CREDIT_MODEL });

    let first = harness.generate(&body).await;
    first.assert_status(StatusCode::ACCEPTED);
    let first: serde_json::Value = first.json();
    assert_eq!(first["new_balance"], 3);
    let request_id = first["request_id"].as_str().unwrap().to_string();

    let failure = json!({
        "request_id": request_id,
        "outcome": "failed",
        "error_detail": "content filtered",
    });
    let ack = harness.post_callback(&failure).await;
    ack.assert_status_ok();
    assert_eq!(ack.json::<serde_json::Value>()["result"], "applied");
    assert_eq!(harness.balance().await, 10);

    let ack = harness.post_callback(&failure).await;
    ack.assert_status_ok();
    assert_eq!(ack.json::<serde_json::Value>()["result"], "duplicate");
    assert_eq!(harness.balance().await, 10);

    let job = harness
        .state
        .store
        .get_job(&request_id.parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let second = harness.generate(&body).await;
    second.assert_status(StatusCode::ACCEPTED);
    assert_eq!(second.json::<serde_json::Value>()["new_balance"], 3);

    let third = harness.generate(&body).await;
    third.assert_status(StatusCode::PAYMENT_REQUIRED);
    let details = &third.json::<serde_json::Value>()["error"]["details"];
    assert_eq!(details["required"], 7);
    assert_eq!(details["available"], 3);
    assert_eq!(details["shortfall"], 4);
    assert_eq!(harness.balance().await, 3);
}
