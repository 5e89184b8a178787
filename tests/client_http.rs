//! HTTP behavior of the task client and the refresh handshake against a
//! local mock server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nebula_fleet::client::{RetryPolicy, TaskApi, TaskClient};
use nebula_fleet::compute::TaskResult;
use nebula_fleet::error::{ClientError, RefreshError};
use nebula_fleet::shutdown::Shutdown;
use nebula_fleet::token::{ChallengeSigner, TokenRefresh, TokenRefresher};

const TASK_PATH: &str = "/open_compute/finish/task";

/// Fast retry policy so exhaustion tests finish quickly.
fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    }
}

fn client_for(server: &MockServer) -> TaskClient {
    TaskClient::new(reqwest::Client::new(), server.uri(), test_policy())
}

#[tokio::test]
async fn fetch_parses_task_from_service_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .and(header("token", "tok-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "matrix_size": 4,
                "seed1": 11,
                "seed2": 22,
                "task_id": "t-77"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_handle, shutdown) = Shutdown::new();
    let task = client_for(&server)
        .fetch_task("tok-abc", &shutdown)
        .await
        .unwrap();

    assert_eq!(task.matrix_size, 4);
    assert_eq!(task.seed1, 11);
    assert_eq!(task.seed2, 22);
    assert_eq!(task.task_id, "t-77");
}

#[tokio::test]
async fn fetch_surfaces_rejection_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (_handle, shutdown) = Shutdown::new();
    let err = client_for(&server)
        .fetch_task("tok-abc", &shutdown)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::CredentialRejected));
}

#[tokio::test]
async fn fetch_retries_server_errors_then_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let (_handle, shutdown) = Shutdown::new();
    let err = client_for(&server)
        .fetch_task("tok-abc", &shutdown)
        .await
        .unwrap_err();

    assert!(
        matches!(err, ClientError::FetchFailed { attempts: 3, .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn fetch_retries_nonzero_service_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 1102 })))
        .expect(3)
        .mount(&server)
        .await;

    let (_handle, shutdown) = Shutdown::new();
    let err = client_for(&server)
        .fetch_task("tok-abc", &shutdown)
        .await
        .unwrap_err();

    match err {
        ClientError::FetchFailed { attempts, reason } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("1102"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn submit_sends_fixed_precision_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .and(header("token", "tok-abc"))
        .and(body_partial_json(json!({
            "result_1": "1.5000000000",
            "result_2": "0.2500000000",
            "task_id": "t-77"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "calc_status": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_handle, shutdown) = Shutdown::new();
    let result = TaskResult { r1: 1.5, r2: 0.25 };
    client_for(&server)
        .submit_result("tok-abc", &result, "t-77", &shutdown)
        .await
        .unwrap();
}

#[tokio::test]
async fn submit_treats_unaccepted_result_as_failure() {
    let server = MockServer::start().await;
    // code 0 but calc_status false: the service did not accept the result.
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "calc_status": false }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let (_handle, shutdown) = Shutdown::new();
    let result = TaskResult { r1: 1.0, r2: 1.0 };
    let err = client_for(&server)
        .submit_result("tok-abc", &result, "t-77", &shutdown)
        .await
        .unwrap_err();

    assert!(
        matches!(err, ClientError::SubmitFailed { attempts: 3, .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn fetch_cancelled_by_shutdown_mid_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(30))
                .set_body_json(json!({ "code": 0 })),
        )
        .mount(&server)
        .await;

    let (handle, shutdown) = Shutdown::new();
    let client = client_for(&server);
    let fetch = tokio::spawn(async move { client.fetch_task("tok-abc", &shutdown).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown();

    let err = tokio::time::timeout(Duration::from_secs(5), fetch)
        .await
        .expect("fetch did not cancel")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
}

// Refresh handshake tests.

struct StaticSigner;

impl ChallengeSigner for StaticSigner {
    fn public_key(&self) -> &str {
        "pk-1"
    }

    fn sign(&self, _message: &str, _timestamp: i64) -> Result<String, RefreshError> {
        Ok("sig-1".to_string())
    }
}

fn refresher_for(server: &MockServer) -> TokenRefresher {
    TokenRefresher::new(
        reqwest::Client::new(),
        server.uri(),
        std::sync::Arc::new(StaticSigner),
    )
}

#[tokio::test]
async fn refresh_runs_challenge_verify_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/challenge"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "prove-it" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/verify"))
        .and(body_partial_json(json!({
            "message": "prove-it",
            "signature": "sig-1",
            "publicKey": "pk-1"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": "fresh-token" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = refresher_for(&server).refresh("old-token").await.unwrap();
    assert_eq!(token, "fresh-token");
}

#[tokio::test]
async fn refresh_fails_when_challenge_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/challenge"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = refresher_for(&server).refresh("old-token").await.unwrap_err();
    assert!(matches!(
        err,
        RefreshError::ChallengeUnavailable { status: 503 }
    ));
}

#[tokio::test]
async fn refresh_fails_when_verify_returns_no_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/challenge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "m" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = refresher_for(&server).refresh("old-token").await.unwrap_err();
    assert!(matches!(err, RefreshError::ExchangeRejected { .. }));
}
