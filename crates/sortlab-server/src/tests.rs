//! Endpoint-level tests driving the router directly.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::auth::ApiKeySet;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::jobs::{DurableStore, JobStore, MemoryStore};
use crate::routes::router;
use crate::state::AppState;

fn test_state(configure: impl FnOnce(&mut ServerConfig)) -> AppState {
    let mut config = ServerConfig::default();
    configure(&mut config);
    let engine = Engine::in_process();
    let store = JobStore::Memory(MemoryStore::new(engine.clone(), config.timeout));
    AppState::new(config, engine, ApiKeySet::default(), store)
}

fn app(configure: impl FnOnce(&mut ServerConfig)) -> Router {
    router(test_state(configure))
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn small_run() -> Value {
    json!({
        "N": 256,
        "dist": "runs",
        "type": "i32",
        "repeats": 1,
        "algos": ["std_sort"],
        "assert_sorted": true
    })
}

fn big_job() -> Value {
    json!({
        "N": 3_000_000,
        "dist": "runs",
        "type": "i32",
        "repeats": 1,
        "algos": ["std_sort"]
    })
}

/// Polls the job until it leaves `{pending, running}`.
async fn wait_terminal(app: &Router, id: &str, headers: &[(&str, &str)]) -> Value {
    for _ in 0..300 {
        let mut builder = Request::builder().method("GET").uri(format!("/jobs/{id}"));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = body_json(response).await;
        if matches!(
            job["status"].as_str(),
            Some("done") | Some("failed") | Some("canceled")
        ) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state");
}

#[tokio::test]
async fn healthz_is_ok() {
    let response = app(|_| {}).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn readyz_reports_ready() {
    let response = app(|_| {}).oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ready");
}

#[tokio::test]
async fn metrics_exposes_prometheus_text() {
    let app = app(|_| {});
    // Generate at least one routed request first.
    app.clone().oneshot(get("/healthz")).await.unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("# TYPE requests_total counter"));
    assert!(text.contains("# TYPE jobs_running gauge"));
}

#[tokio::test]
async fn meta_lists_types_dists_and_algorithms() {
    let response = app(|_| {}).oneshot(get("/meta")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let meta = body_json(response).await;
    assert_eq!(meta["types"].as_array().unwrap().len(), 7);
    assert_eq!(meta["dists"].as_array().unwrap().len(), 13);
    let i32_algos = meta["algos"]["i32"].as_array().unwrap();
    assert!(i32_algos.iter().any(|a| a == "std_sort"));
    assert!(i32_algos.iter().any(|a| a == "radix_sort_lsd"));
    // Floats have no radix entry.
    let f64_algos = meta["algos"]["f64"].as_array().unwrap();
    assert!(!f64_algos.iter().any(|a| a == "radix_sort_lsd"));
}

#[tokio::test]
async fn limits_reports_caps_and_mode() {
    let response = app(|cfg| cfg.max_jobs = 7).oneshot(get("/limits")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let limits = body_json(response).await;
    assert_eq!(limits["max_n"], 10_000_000);
    assert_eq!(limits["max_jobs"], 7);
    assert_eq!(limits["mode"], "in-process");
    assert_eq!(limits["durable"], false);
}

#[tokio::test]
async fn sync_small_run_returns_one_row() {
    let response = app(|_| {})
        .oneshot(post_json("/run", small_run()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let rows = body_json(response).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["algo"], "std_sort");
    assert_eq!(rows[0]["N"], 256);
    assert_eq!(rows[0]["dist"], "runs");
    assert!(rows[0]["median_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn sync_run_with_zero_repeats_is_accepted() {
    let mut body = small_run();
    body["repeats"] = json!(0);
    let response = app(|_| {}).oneshot(post_json("/run", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn negative_n_is_rejected_with_exact_message() {
    let response = app(|_| {})
        .oneshot(post_json(
            "/run",
            json!({"N": -1, "dist": "runs", "type": "i32"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "N must be in [1,10000000]");
}

#[tokio::test]
async fn invalid_dist_is_rejected() {
    let response = app(|_| {})
        .oneshot(post_json(
            "/run",
            json!({"N": 1024, "dist": "swirl", "type": "i32"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid dist");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/run")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(|_| {}).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("invalid JSON:"));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let padding = "x".repeat(1024 * 1024 + 16);
    let request = Request::builder()
        .method("POST")
        .uri("/run")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!(
            r#"{{"N": 256, "dist": "runs", "type": "i32", "pad": "{padding}"}}"#
        )))
        .unwrap();
    let response = app(|_| {}).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_body_fields_are_ignored() {
    let mut body = small_run();
    body["wat"] = json!("ignored");
    let response = app(|_| {}).oneshot(post_json("/run", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limiter_refuses_after_burst() {
    let app = app(|cfg| {
        cfg.rate_limit_burst = 2.0;
        cfg.rate_limit_per_minute = 1.0;
    });
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/run", small_run()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.oneshot(post_json("/run", small_run())).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn rate_limiter_skips_operational_routes() {
    let app = app(|cfg| {
        cfg.rate_limit_burst = 1.0;
        cfg.rate_limit_per_minute = 1.0;
    });
    app.clone().oneshot(post_json("/run", small_run())).await.unwrap();
    // The bucket is empty, but /healthz is not rate-limited.
    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn job_submit_requires_key_when_configured() {
    let mut config = ServerConfig::default();
    config.max_jobs = 4;
    let engine = Engine::in_process();
    let store = JobStore::Memory(MemoryStore::new(engine.clone(), config.timeout));
    let state = AppState::new(
        config,
        engine,
        ApiKeySet::from_keys(["letmein".to_string()]),
        store,
    );
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post_json("/jobs", small_run()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"error": "unauthorized"}));

    let mut request = post_json("/jobs", small_run());
    request
        .headers_mut()
        .insert("x-api-key", "letmein".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["job_id"].as_str().is_some());

    // Bearer form works too.
    let mut request = post_json("/jobs", small_run());
    request
        .headers_mut()
        .insert("authorization", "Bearer letmein".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn job_cap_rejects_second_submission() {
    let app = app(|cfg| cfg.max_jobs = 1);
    let response = app
        .clone()
        .oneshot(post_json("/jobs", big_job()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(post_json("/jobs", big_job()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await, json!({"error": "too many jobs"}));
}

#[tokio::test]
async fn job_runs_to_done_and_polls_are_stable() {
    let app = app(|_| {});
    let response = app
        .clone()
        .oneshot(post_json("/jobs", small_run()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let job = wait_terminal(&app, &id, &[]).await;
    assert_eq!(job["status"], "done");
    assert_eq!(job["result"][0]["algo"], "std_sort");
    assert!(job["duration_ms"].as_i64().is_some());
    assert!(job.get("error").is_none());

    // Terminal polls are byte-identical.
    let a = app
        .clone()
        .oneshot(get(&format!("/jobs/{id}")))
        .await
        .unwrap();
    let b = app
        .clone()
        .oneshot(get(&format!("/jobs/{id}")))
        .await
        .unwrap();
    assert_eq!(body_text(a).await, body_text(b).await);
}

#[tokio::test]
async fn job_cancellation_reaches_canceled_with_duration() {
    let app = app(|_| {});
    let response = app
        .clone()
        .oneshot(post_json("/jobs", big_job()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/jobs/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "cancelled"}));

    let job = wait_terminal(&app, &id, &[]).await;
    assert_eq!(job["status"], "canceled");
    assert!(job["duration_ms"].as_i64().is_some());
    assert!(job.get("result").is_none());
}

#[tokio::test]
async fn cancel_of_terminal_job_is_a_noop_200() {
    let app = app(|_| {});
    let response = app
        .clone()
        .oneshot(post_json("/jobs", small_run()))
        .await
        .unwrap();
    let id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_terminal(&app, &id, &[]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/jobs/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let job = wait_terminal(&app, &id, &[]).await;
    assert_eq!(job["status"], "done");
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let app = app(|_| {});
    let response = app.clone().oneshot(get("/jobs/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs/nope/cancel")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn job_submit_validates_like_run() {
    let response = app(|_| {})
        .oneshot(post_json(
            "/jobs",
            json!({"N": 1024, "dist": "swirl", "type": "i32"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid dist");
}

// ---------------------------------------------------------------------------
// Durable mode

async fn durable_state(configure: impl FnOnce(&mut ServerConfig)) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
    let mut config = ServerConfig::default();
    config.database_url = Some(url.clone());
    configure(&mut config);
    let engine = Engine::in_process();
    let store = JobStore::Durable(DurableStore::connect(&url, 4).await.unwrap());
    (
        AppState::new(config, engine, ApiKeySet::default(), store),
        dir,
    )
}

#[tokio::test]
async fn durable_jobs_drain_through_the_worker_pool() {
    let (state, _dir) = durable_state(|cfg| cfg.workers = 2).await;
    let _workers = crate::worker::spawn_workers(&state);
    let app = router(state);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(post_json("/jobs", big_job()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        ids.push(
            body_json(response).await["job_id"]
                .as_str()
                .unwrap()
                .to_string(),
        );
    }

    // With two workers and three jobs, one job lags behind the others.
    let mut saw_pending_with_progress = false;
    for _ in 0..100 {
        let mut statuses = Vec::new();
        for id in &ids {
            let response = app
                .clone()
                .oneshot(get(&format!("/jobs/{id}")))
                .await
                .unwrap();
            statuses.push(
                body_json(response).await["status"]
                    .as_str()
                    .unwrap()
                    .to_string(),
            );
        }
        let pending = statuses.iter().filter(|s| *s == "pending").count();
        let running = statuses.iter().filter(|s| *s == "running").count();
        assert!(running <= 2, "more running jobs than workers: {statuses:?}");
        if pending >= 1 && (running >= 1 || statuses.iter().any(|s| s == "done")) {
            saw_pending_with_progress = true;
        }
        if statuses.iter().all(|s| s == "done") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_pending_with_progress, "never observed a queued job");

    for id in &ids {
        let job = wait_terminal(&app, id, &[]).await;
        assert_eq!(job["status"], "done", "job {id} did not complete");
        assert!(job["result"].is_array());
    }

    // Workers sampled the queue while one job waited.
    let response = app.oneshot(get("/metrics")).await.unwrap();
    let text = body_text(response).await;
    assert!(text.contains("queue_depth"));
}

#[tokio::test]
async fn durable_cancel_while_pending_never_runs() {
    // No workers spawned: the job stays pending until canceled.
    let (state, _dir) = durable_state(|_| {}).await;
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post_json("/jobs", small_run()))
        .await
        .unwrap();
    let id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/jobs/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get(&format!("/jobs/{id}")))
        .await
        .unwrap();
    let job = body_json(response).await;
    assert_eq!(job["status"], "canceled");
    assert!(job.get("started_at").is_none());
}
