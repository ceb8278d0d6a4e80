//! End-to-end behavior of `ApiClient` against mock backends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use api_client::{
    ApiClient, ErrorCategory, RequestOptions, RetryStrategy, TokenStore, Url,
};
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: axum::Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    Url::parse(&format!("http://{addr}")).unwrap()
}

fn client(base: Url, retry: RetryStrategy) -> ApiClient {
    ApiClient::builder()
        .base_url(base)
        .retry(retry)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// A backend that fails with `status` for the first `failures` hits on
/// `/flaky`, then answers 200 `{"ok":true}`.
async fn flaky_backend(status: StatusCode, failures: u64) -> (Url, Arc<AtomicU64>) {
    let hits = Arc::new(AtomicU64::new(0));
    let app = axum::Router::new()
        .route(
            "/flaky",
            get(
                move |State(hits): State<Arc<AtomicU64>>| async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (status, Json(json!({ "detail": "try later" }))).into_response()
                    } else {
                        Json(json!({ "ok": true })).into_response()
                    }
                },
            ),
        )
        .with_state(hits.clone());
    (serve(app).await, hits)
}

#[tokio::test]
async fn get_returns_decoded_body() {
    let app = axum::Router::new().route("/v1/retry/policies", get(|| async { Json(json!([])) }));
    let base = serve(app).await;

    let policies: Vec<Value> = client(base, RetryStrategy::default())
        .get("/v1/retry/policies")
        .await
        .unwrap();
    assert!(policies.is_empty());
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let hits = Arc::new(AtomicU64::new(0));
    let app = axum::Router::new()
        .route(
            "/v1/auth/login",
            post(|State(hits): State<Arc<AtomicU64>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "bad credentials" })),
                )
            }),
        )
        .with_state(hits.clone());
    let base = serve(app).await;

    let err = client(base, RetryStrategy::linear(2, Duration::from_millis(10)))
        .post::<_, Value>(
            "/v1/auth/login",
            &json!({ "email": "a@b.co", "password": "wrong" }),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::ClientError);
    assert_eq!(err.status, 401);
    assert_eq!(err.message, "Unauthorized");
    assert_eq!(err.body, Some(json!({ "detail": "bad credentials" })));
    assert_eq!(err.detail(), "bad credentials");
    assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must be a single attempt");
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let (base, hits) = flaky_backend(StatusCode::SERVICE_UNAVAILABLE, 3).await;

    let err = client(base, RetryStrategy::linear(2, Duration::from_millis(10)))
        .get::<Value>("/flaky")
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::RetryExhausted);
    assert_eq!(err.status, 503);
    assert_eq!(
        err.body,
        Some(json!({ "attempts": 3, "last_status": 503, "last_category": "SERVER_ERROR" }))
    );
    assert_eq!(hits.load(Ordering::SeqCst), 3, "1 + retry_count attempts");
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let (base, hits) = flaky_backend(StatusCode::BAD_GATEWAY, 2).await;

    let body: Value = client(base, RetryStrategy::linear(2, Duration::from_millis(10)))
        .get("/flaky")
        .await
        .unwrap();

    assert_eq!(body, json!({ "ok": true }));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn too_many_requests_is_retried() {
    let (base, hits) = flaky_backend(StatusCode::TOO_MANY_REQUESTS, 1).await;

    let body: Value = client(base, RetryStrategy::linear(1, Duration::from_millis(10)))
        .get("/flaky")
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_retry_surfaces_server_error() {
    let (base, hits) = flaky_backend(StatusCode::INTERNAL_SERVER_ERROR, 5).await;

    let err = client(base, RetryStrategy::default())
        .get_with::<Value>("/flaky", RequestOptions::no_retry())
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::ServerError);
    assert_eq!(err.status, 500);
    assert_eq!(err.message, "Internal Server Error");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_client_retries_twice_then_exhausts() {
    let (base, hits) = flaky_backend(StatusCode::SERVICE_UNAVAILABLE, 3).await;
    let client = ApiClient::builder().base_url(base).build().unwrap();

    let started = Instant::now();
    let err = client.get::<Value>("/flaky").await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::RetryExhausted);
    assert_eq!(err.status, 503);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // 1s before the second attempt, 2s before the third
    assert!(started.elapsed() >= Duration::from_millis(3_000));
}

#[tokio::test]
async fn per_call_retry_count_enables_retry_over_single_attempt_client() {
    let (base, hits) = flaky_backend(StatusCode::SERVICE_UNAVAILABLE, 10).await;

    let err = client(base, RetryStrategy::none())
        .get_with::<Value>(
            "/flaky",
            RequestOptions::new()
                .retry_count(2)
                .retry_delay(Duration::from_millis(5)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::RetryExhausted);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn zero_retry_count_is_single_attempt() {
    let (base, hits) = flaky_backend(StatusCode::SERVICE_UNAVAILABLE, 5).await;

    let err = client(base, RetryStrategy::linear(0, Duration::from_millis(10)))
        .get::<Value>("/flaky")
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::ServerError);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backoff_grows_linearly() {
    let (base, hits) = flaky_backend(StatusCode::SERVICE_UNAVAILABLE, 10).await;

    let started = Instant::now();
    let err = client(base, RetryStrategy::linear(3, Duration::from_millis(50)))
        .get::<Value>("/flaky")
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    // Delays before attempts 2, 3, 4: 50ms, 100ms, 150ms.
    assert_eq!(err.category, ErrorCategory::RetryExhausted);
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert!(
        elapsed >= Duration::from_millis(300),
        "expected at least 300ms of backoff, got {elapsed:?}"
    );
}

#[tokio::test]
async fn per_call_options_override_client_defaults() {
    let (base, hits) = flaky_backend(StatusCode::SERVICE_UNAVAILABLE, 10).await;

    let err = client(base, RetryStrategy::none())
        .get_with::<Value>(
            "/flaky",
            RequestOptions::new()
                .retry(true)
                .retry_count(1)
                .retry_delay(Duration::from_millis(5)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::RetryExhausted);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hanging_server_times_out_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU64::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // Hold the connection open without ever answering
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });

    let base = Url::parse(&format!("http://{addr}")).unwrap();
    let err = client(base, RetryStrategy::linear(2, Duration::from_millis(10)))
        .get_with::<Value>(
            "/v1/analytics/recovery-rate",
            RequestOptions::new().timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Timeout);
    assert_eq!(err.status, 408);
    assert_eq!(err.body, Some(json!({ "timeout": 100 })));
    assert_eq!(accepted.load(Ordering::SeqCst), 1, "timeouts are terminal");
}

/// A port that was bound and released, so connecting is refused.
async fn refused_base() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let err = client(refused_base().await, RetryStrategy::none())
        .get::<Value>("/healthz")
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::NetworkError);
    assert_eq!(err.status, 0);
}

#[tokio::test]
async fn connection_refused_exhausts_retries() {
    let err = client(
        refused_base().await,
        RetryStrategy::linear(1, Duration::from_millis(5)),
    )
    .get::<Value>("/healthz")
    .await
    .unwrap_err();

    assert_eq!(err.category, ErrorCategory::RetryExhausted);
    assert_eq!(err.body.as_ref().unwrap()["last_status"], 0);
    assert_eq!(err.body.as_ref().unwrap()["last_category"], "NETWORK_ERROR");
}

/// Echoes the request's auth and correlation headers.
async fn header_echo(headers: HeaderMap) -> Json<Value> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    Json(json!({
        "authorization": read("authorization"),
        "content_type": read("content-type"),
        "request_id": read("x-request-id"),
    }))
}

#[tokio::test]
async fn bearer_token_is_attached_when_present() {
    let base = serve(axum::Router::new().route("/v1/auth/me", get(header_echo))).await;

    let seen: Value = ApiClient::builder()
        .base_url(base)
        .bearer_token("at_123")
        .build()
        .unwrap()
        .get("/v1/auth/me")
        .await
        .unwrap();

    assert_eq!(seen["authorization"], "Bearer at_123");
    assert_eq!(seen["content_type"], "application/json");
    assert!(seen["request_id"].as_str().unwrap().starts_with("req_"));
}

#[tokio::test]
async fn no_authorization_without_token() {
    let base = serve(axum::Router::new().route("/v1/auth/me", get(header_echo))).await;

    let seen: Value = client(base, RetryStrategy::none())
        .get("/v1/auth/me")
        .await
        .unwrap();

    assert_eq!(seen["authorization"], Value::Null);
}

#[tokio::test]
async fn token_store_is_read_on_every_call() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        TokenStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap(),
    );
    let base = serve(axum::Router::new().route("/v1/auth/me", get(header_echo))).await;
    let client = ApiClient::builder()
        .base_url(base)
        .token_source(store.clone())
        .build()
        .unwrap();

    let before: Value = client.get("/v1/auth/me").await.unwrap();
    assert_eq!(before["authorization"], Value::Null);

    store.set_token("at_fresh").await.unwrap();
    let after: Value = client.get("/v1/auth/me").await.unwrap();
    assert_eq!(after["authorization"], "Bearer at_fresh");
}

#[tokio::test]
async fn request_id_is_stable_across_retries() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let app = axum::Router::new()
        .route(
            "/flaky",
            get(
                |State(seen): State<Arc<std::sync::Mutex<Vec<String>>>>, headers: HeaderMap| async move {
                    let id = headers
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned();
                    let mut seen = seen.lock().unwrap();
                    seen.push(id);
                    if seen.len() < 2 {
                        StatusCode::SERVICE_UNAVAILABLE.into_response()
                    } else {
                        Json(json!({ "ok": true })).into_response()
                    }
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(app).await;

    let _: Value = client(base, RetryStrategy::linear(2, Duration::from_millis(5)))
        .get("/flaky")
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn typed_round_trip() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Policy {
        name: String,
        max_retries: u32,
    }

    let app = axum::Router::new().route(
        "/v1/retry/policies",
        post(|Json(policy): Json<Value>| async move {
            let mut created = policy.clone();
            created["id"] = json!("pol_1");
            (StatusCode::CREATED, Json(created))
        }),
    );
    let base = serve(app).await;

    let sent = Policy {
        name: "aggressive".into(),
        max_retries: 5,
    };
    let created: Policy = client(base, RetryStrategy::none())
        .post("/v1/retry/policies", &sent)
        .await
        .unwrap();
    assert_eq!(created, sent);
}

#[tokio::test]
async fn no_content_and_raw_responses_decode_as_unit() {
    let app = axum::Router::new()
        .route(
            "/v1/retry/policies/pol_1",
            axum::routing::delete(|| async { StatusCode::NO_CONTENT }),
        )
        .route("/v1/auth/logout", post(|| async { "logged out" }));
    let base = serve(app).await;
    let client = client(base, RetryStrategy::none());

    client
        .delete::<()>("/v1/retry/policies/pol_1")
        .await
        .unwrap();
    client
        .post_with::<_, ()>(
            "/v1/auth/logout",
            &json!({}),
            RequestOptions::new().parse_json(false),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn wrong_shape_is_unknown_error() {
    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Health {
        status: String,
        version: String,
    }

    let app = axum::Router::new().route("/healthz", get(|| async { Json(json!({ "up": true })) }));
    let base = serve(app).await;

    let err = client(base, RetryStrategy::default())
        .get::<Health>("/healthz")
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnknownError);
    assert_eq!(err.status, 500);
    assert_eq!(err.body, Some(json!({ "up": true })));
}

#[tokio::test]
async fn non_json_success_is_unknown_error() {
    let app = axum::Router::new().route("/healthz", get(|| async { "<html>ok</html>" }));
    let base = serve(app).await;

    let err = client(base, RetryStrategy::none())
        .get::<Value>("/healthz")
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnknownError);
    assert_eq!(err.body, Some(json!("<html>ok</html>")));
}

#[tokio::test]
async fn text_error_body_is_kept_as_string() {
    let app = axum::Router::new().route(
        "/v1/auth/me",
        get(|| async { (StatusCode::FORBIDDEN, "forbidden for this tenant") }),
    );
    let base = serve(app).await;

    let err = client(base, RetryStrategy::none())
        .get::<Value>("/v1/auth/me")
        .await
        .unwrap_err();
    assert_eq!(err.status, 403);
    assert_eq!(err.body, Some(json!("forbidden for this tenant")));
    assert_eq!(err.detail(), "forbidden for this tenant");
}

#[tokio::test]
async fn absolute_url_bypasses_base() {
    let target = serve(axum::Router::new().route("/healthz", get(|| async { Json(json!("here")) }))).await;

    // The configured base points nowhere useful.
    let client = client(refused_base().await, RetryStrategy::none());
    let answer: Value = client
        .get(target.join("/healthz").unwrap().as_str())
        .await
        .unwrap();
    assert_eq!(answer, json!("here"));
}

#[tokio::test]
async fn base_path_is_replaced_by_rooted_paths() {
    let app = axum::Router::new().route("/v1/x", get(|| async { Json(json!("rooted")) }));
    let base = serve(app).await;

    let answer: Value = client(base.join("/api/").unwrap(), RetryStrategy::none())
        .get("/v1/x")
        .await
        .unwrap();
    assert_eq!(answer, json!("rooted"));
}
