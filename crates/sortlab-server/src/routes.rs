//! HTTP router, handlers, and middleware.
//!
//! Middleware order, outer to inner: metrics wrapper → rate limit → auth →
//! handler. `/run` is rate-limited but open; the job routes are
//! rate-limited and key-protected; the operational endpoints are neither.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, MatchedPath, Path, RawQuery, State};
use axum::http::{Request, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sortlab_core::{Dist, ElemType};

use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::ratelimit::Decision;
use crate::state::AppState;
use crate::validate::{RunRequest, build_engine_call, validate};

/// Request body cap.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Distributions exercised by the readiness smoke run.
const READY_SMOKE_DISTS: [Dist; 3] = [Dist::Random, Dist::Runs, Dist::Sorted];

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/run", post(run_sync))
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_text))
        .route("/meta", get(meta))
        .route("/limits", get(limits))
        .route_layer(middleware::from_fn(track_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Middleware

/// Outermost wrapper: counts every routed request and times it.
async fn track_requests(req: Request<axum::body::Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();
    let response = next.run(req).await;
    Metrics::global().record_request(&route, response.status().as_u16(), start.elapsed());
    response
}

/// Token-bucket admission, before any body is read.
async fn rate_limit(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let identity = client_identity(&state, &req);
    match state.limiter.check(&identity) {
        Decision::Admit => next.run(req).await,
        Decision::Refuse { retry_after_secs } => {
            tracing::debug!(client = %identity, "rate limited");
            ApiError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

/// Key check for protected routes. An empty key set leaves them open.
async fn require_api_key(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.keys.authorize(req.headers()) {
        next.run(req).await
    } else {
        ApiError::Unauthorized.into_response()
    }
}

/// Client identity for rate limiting: the peer address, or the first
/// `X-Forwarded-For` entry only when the deployment opted in.
fn client_identity(state: &AppState, req: &Request<axum::body::Body>) -> String {
    if state.config.trust_xff {
        if let Some(forwarded) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return forwarded.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string())
}

// ---------------------------------------------------------------------------
// Operational endpoints

async fn healthz() -> &'static str {
    "ok"
}

/// Readiness: algorithm discovery plus a tiny smoke run per sample
/// distribution.
async fn readyz(State(state): State<AppState>) -> Response {
    match readiness_probe(&state).await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(message) => {
            tracing::error!(error = %message, "readiness probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response()
        }
    }
}

async fn readiness_probe(state: &AppState) -> Result<(), String> {
    let names = state
        .engine
        .list_algorithms(ElemType::I32, &[])
        .await
        .map_err(|e| format!("algorithm discovery failed: {e}"))?;
    if names.is_empty() {
        return Err("algorithm discovery returned no algorithms".to_string());
    }
    for dist in READY_SMOKE_DISTS {
        let call = build_engine_call(&RunRequest {
            n: 64,
            dist: dist.name().to_string(),
            elem_type: "i32".to_string(),
            repeats: 1,
            algos: vec!["std_sort".to_string()],
            assert_sorted: true,
            ..RunRequest::default()
        });
        state
            .engine
            .run(&call, Duration::from_secs(10), &CancellationToken::new())
            .await
            .map_err(|e| format!("smoke run failed ({}): {e}", dist.name()))?;
    }
    Ok(())
}

async fn metrics_text() -> Response {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        Metrics::global().render(),
    )
        .into_response()
}

#[derive(Serialize)]
struct MetaResponse {
    types: Vec<&'static str>,
    dists: Vec<&'static str>,
    algos: BTreeMap<&'static str, Vec<String>>,
}

/// Types, distributions, and per-type algorithms. Repeated `plugin=path`
/// query parameters extend discovery for this call only.
async fn meta(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<MetaResponse>, ApiError> {
    let plugins = plugin_params(query.as_deref());
    let mut algos = BTreeMap::new();
    for elem_type in ElemType::ALL {
        let names = state
            .engine
            .list_algorithms(elem_type, &plugins)
            .await
            .map_err(|e| ApiError::Engine(e.to_string()))?;
        algos.insert(elem_type.name(), names);
    }
    Ok(Json(MetaResponse {
        types: ElemType::ALL.iter().map(|t| t.name()).collect(),
        dists: Dist::ALL.iter().map(|d| d.name()).collect(),
        algos,
    }))
}

/// Extracts repeated `plugin=` values from the raw query string.
fn plugin_params(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| *key == "plugin")
        .map(|(_, value)| percent_decode(value))
        .filter(|v| !v.is_empty())
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &raw[i + 1..i + 3];
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Effective caps and the engine mode, for operators and clients.
async fn limits(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cfg = &state.config;
    Json(json!({
        "max_n": cfg.max_n,
        "max_repeats": cfg.max_repeats,
        "max_threads": cfg.max_threads,
        "max_jobs": cfg.max_jobs,
        "timeout_ms": cfg.timeout.as_millis() as u64,
        "workers": cfg.workers,
        "rate_limit_per_minute": cfg.rate_limit_per_minute,
        "rate_limit_burst": cfg.rate_limit_burst,
        "mode": state.engine.mode().name(),
        "durable": cfg.durable(),
    }))
}

// ---------------------------------------------------------------------------
// Benchmark endpoints

/// Decodes and validates a run request body.
fn parse_request(
    state: &AppState,
    body: Result<Bytes, BytesRejection>,
) -> Result<RunRequest, ApiError> {
    let bytes = body.map_err(|_| ApiError::Validation("request body too large".to_string()))?;
    let request: RunRequest = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Validation(format!("invalid JSON: {e}")))?;
    validate(&request, &state.config).map_err(ApiError::Validation)?;
    Ok(request)
}

/// `POST /run`: one synchronous engine invocation under the request
/// deadline, responding with the raw engine JSON.
async fn run_sync(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request = parse_request(&state, body)?;
    let call = build_engine_call(&request);

    let deadline = if request.timeout_ms > 0 {
        Duration::from_millis(request.timeout_ms as u64).min(state.config.timeout)
    } else {
        state.config.timeout
    };

    let output = state
        .engine
        .run(&call, deadline, &CancellationToken::new())
        .await
        .map_err(|e| ApiError::Engine(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        output,
    )
        .into_response())
}

/// `POST /jobs`: admission-checked enqueue; the caller polls for results.
async fn submit_job(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request = parse_request(&state, body)?;

    if state.store.active_count().await? >= state.config.max_jobs {
        return Err(ApiError::Admission);
    }

    let id = state.store.enqueue(request).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": id }))).into_response())
}

/// `GET /jobs/{id}`: status and, for done jobs, the stored result bytes.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.store.get(&id).await?;
    Ok(Json(record.into_response()).into_response())
}

/// `POST /jobs/{id}/cancel`: signals the job's cancel handle and returns
/// immediately; terminal jobs are unaffected.
async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.store.cancel(&id).await?;
    Ok(Json(json!({ "status": "cancelled" })).into_response())
}
