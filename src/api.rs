//! Webhook and stats server.
//!
//! Closure notifications from the system of record arrive here and are
//! applied to the tracker; terminal outcomes are fed back into the fusion
//! engine before the response is written.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::models::{CloseReason, SignalOutcome};
use crate::scheduler::{stopped, Pipeline, ShutdownHandle};
use crate::tracker::TrackerError;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Clone)]
pub struct ApiState {
    pipeline: Arc<Pipeline>,
    secret: Arc<str>,
}

impl ApiState {
    /// An empty `secret` disables authentication.
    pub fn new(pipeline: Arc<Pipeline>, secret: &str) -> Self {
        Self {
            pipeline,
            secret: Arc::from(secret),
        }
    }
}

// --- Errors ---

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        let status = match &e {
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::AlreadyClosed(_)
            | TrackerError::TargetsComplete(_)
            | TrackerError::OutOfOrder { .. }
            | TrackerError::Duplicate(_) => StatusCode::CONFLICT,
            TrackerError::InvalidPrice { .. } | TrackerError::EmptyTargets(_) => {
                StatusCode::BAD_REQUEST
            }
            TrackerError::Storage(_) | TrackerError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// --- Router ---

pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/api/signals/close", post(close_signal))
        .route("/api/signals/tp-hit", post(target_hit))
        .route("/api/signals/stats", get(stats))
        .route("/api/signals/stats/daily", get(daily_stats))
        .route("/api/signals/active", get(active))
        .layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: ApiState, shutdown: ShutdownHandle) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding API server to {bind}"))?;
    serve_on(listener, state, shutdown).await
}

pub async fn serve_on(listener: TcpListener, state: ApiState, shutdown: ShutdownHandle) -> Result<()> {
    let addr = listener.local_addr()?;
    if state.secret.is_empty() {
        warn!("Webhook secret not set, API is unauthenticated");
    }
    info!("API server listening on {}", addr);

    let mut rx = shutdown.subscribe();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { stopped(&mut rx).await })
        .await
        .context("API server failed")?;
    info!("API server stopped");
    Ok(())
}

async fn require_secret(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.secret.is_empty() {
        let given = req.headers().get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(&*state.secret) {
            warn!("Rejected request to {} with bad webhook secret", req.uri().path());
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid webhook secret" })),
            )
                .into_response();
        }
    }
    next.run(req).await
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub signal_id: String,
    pub exit_price: f64,
    pub close_reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TargetHitRequest {
    pub signal_id: String,
    pub hit_price: f64,
    #[serde(default)]
    pub tp_number: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    pub date: Option<String>,
}

async fn close_signal(
    State(state): State<ApiState>,
    body: Result<Json<CloseRequest>, JsonRejection>,
) -> Result<Json<SignalOutcome>, ApiError> {
    let Json(req) = body?;
    let reason: CloseReason = req.close_reason.parse().map_err(ApiError::bad_request)?;
    let CloseRequest {
        signal_id,
        exit_price,
        ..
    } = req;

    let outcome = state
        .pipeline
        .write_tracker(move |tracker| match reason {
            CloseReason::Target => tracker.on_target_hit(&signal_id, exit_price, None),
            other => tracker.close(&signal_id, exit_price, other),
        })
        .await?;
    Ok(Json(settle(&state, outcome)))
}

async fn target_hit(
    State(state): State<ApiState>,
    body: Result<Json<TargetHitRequest>, JsonRejection>,
) -> Result<Json<SignalOutcome>, ApiError> {
    let Json(req) = body?;
    let outcome = state
        .pipeline
        .write_tracker(move |tracker| {
            tracker.on_target_hit(&req.signal_id, req.hit_price, req.tp_number)
        })
        .await?;
    Ok(Json(settle(&state, outcome)))
}

/// Feeds the fusion hook synchronously, then announces in the background.
fn settle(state: &ApiState, outcome: SignalOutcome) -> SignalOutcome {
    state.pipeline.record_outcome(&outcome);
    let pipeline = state.pipeline.clone();
    let announced = outcome.clone();
    tokio::spawn(async move {
        pipeline.announce_outcome(&announced).await;
    });
    outcome
}

async fn stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.pipeline.tracker().get_stats())
}

async fn daily_stats(
    State(state): State<ApiState>,
    Query(q): Query<DailyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let date = match q.date.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request(format!("invalid date: {s}")))?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(state.pipeline.tracker().get_daily_stats(date)))
}

async fn active(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.pipeline.tracker().get_active())
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let tracker = state.pipeline.tracker();
    Json(json!({
        "status": "ok",
        "tracked_signals": tracker.len(),
        "pipeline": state.pipeline.stats(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BotSource, Side, Signal, SignalStatus};
    use crate::test_helpers::{default_test_config, make_candidate, MockBroadcaster, MockDispatcher};
    use crate::tracker::{SignalTracker, TrackerStats};
    use reqwest::Client;
    use std::time::Duration;

    struct Harness {
        base: String,
        pipeline: Arc<Pipeline>,
        broadcaster: Arc<MockBroadcaster>,
        shutdown: ShutdownHandle,
        client: Client,
    }

    impl Harness {
        async fn start() -> Self {
            let broadcaster = Arc::new(MockBroadcaster::new());
            let pipeline = Arc::new(Pipeline::new(
                default_test_config("unused").shared(),
                Arc::new(SignalTracker::in_memory()),
                Arc::new(MockDispatcher::new()),
                broadcaster.clone(),
            ));
            let shutdown = ShutdownHandle::new();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            let state = ApiState::new(pipeline.clone(), "test-secret");
            tokio::spawn(serve_on(listener, state, shutdown.clone()));
            Self {
                base,
                pipeline,
                broadcaster,
                shutdown,
                client: Client::new(),
            }
        }

        fn open(&self, symbol: &str, side: Side) -> String {
            let c = make_candidate(symbol, side, 80.0, BotSource::Trend);
            self.pipeline.fusion().process(vec![c.clone()]);
            self.pipeline.tracker().open(&c).unwrap();
            c.signal_id
        }

        async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
            self.client
                .post(format!("{}{}", self.base, path))
                .header(SECRET_HEADER, "test-secret")
                .json(&body)
                .send()
                .await
                .unwrap()
        }

        async fn get(&self, path: &str) -> reqwest::Response {
            self.client
                .get(format!("{}{}", self.base, path))
                .header(SECRET_HEADER, "test-secret")
                .send()
                .await
                .unwrap()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.shutdown.trigger();
        }
    }

    #[tokio::test]
    async fn close_with_terminal_reason_closes_and_notifies_fusion() {
        let h = Harness::start().await;
        let id = h.open("BTCUSDT", Side::Long);

        let resp = h
            .post(
                "/api/signals/close",
                json!({ "signal_id": id, "exit_price": 97.0, "close_reason": "SL" }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome: SignalOutcome = resp.json().await.unwrap();
        assert!(outcome.is_final);
        assert_eq!(outcome.close_reason, Some(CloseReason::StopLoss));
        assert_eq!(outcome.profit_pct, -3.0);

        assert_eq!(
            h.pipeline.fusion().state().last_close_reason_by_symbol.get("BTCUSDT"),
            Some(&CloseReason::StopLoss)
        );

        // The announcement runs off the request path.
        for _ in 0..50 {
            if !h.broadcaster.messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.broadcaster.messages().len(), 1);
    }

    #[tokio::test]
    async fn close_with_tp_reason_advances_one_target() {
        let h = Harness::start().await;
        let id = h.open("ETHUSDT", Side::Long);

        let resp = h
            .post(
                "/api/signals/close",
                json!({ "signal_id": id, "exit_price": 101.0, "close_reason": "TP" }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let row = h.pipeline.tracker().get(&id).unwrap();
        assert_eq!(row.status, SignalStatus::Active);
        assert_eq!(row.current_target_index, 1);
    }

    #[tokio::test]
    async fn error_statuses_are_distinct() {
        let h = Harness::start().await;
        let id = h.open("SOLUSDT", Side::Short);

        let missing = h
            .post(
                "/api/signals/close",
                json!({ "signal_id": "nope", "exit_price": 1.0, "close_reason": "SL" }),
            )
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let bad_reason = h
            .post(
                "/api/signals/close",
                json!({ "signal_id": id, "exit_price": 1.0, "close_reason": "MOON" }),
            )
            .await;
        assert_eq!(bad_reason.status(), StatusCode::BAD_REQUEST);

        let malformed = h.post("/api/signals/close", json!({ "signal_id": id })).await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let out_of_order = h
            .post(
                "/api/signals/tp-hit",
                json!({ "signal_id": id, "hit_price": 98.0, "tp_number": 2 }),
            )
            .await;
        assert_eq!(out_of_order.status(), StatusCode::CONFLICT);

        let ok = h
            .post(
                "/api/signals/close",
                json!({ "signal_id": id, "exit_price": 100.0, "close_reason": "CANCEL" }),
            )
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        let again = h
            .post(
                "/api/signals/close",
                json!({ "signal_id": id, "exit_price": 100.0, "close_reason": "CANCEL" }),
            )
            .await;
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn secret_is_required_except_for_health() {
        let h = Harness::start().await;
        let resp = h
            .client
            .get(format!("{}/api/signals/stats", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = h
            .client
            .get(format!("{}/api/signals/stats", h.base))
            .header(SECRET_HEADER, "wrong")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = h.client.get(format!("{}/health", h.base)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn read_endpoints_project_tracker_state() {
        let h = Harness::start().await;
        let a = h.open("BTCUSDT", Side::Long);
        h.open("ETHUSDT", Side::Short);
        h.pipeline
            .tracker()
            .close(&a, 103.0, CloseReason::Target)
            .unwrap();

        let active: Vec<Signal> = h.get("/api/signals/active").await.json().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol, "ETHUSDT");

        let stats: TrackerStats = h.get("/api/signals/stats").await.json().await.unwrap();
        assert_eq!(stats.active_signals, 1);
        assert_eq!(stats.closed_signals, 1);
        assert_eq!(stats.win_rate, 100.0);

        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let daily: serde_json::Value = h
            .get(&format!("/api/signals/stats/daily?date={today}"))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(daily["total_signals"], 1);

        let bad = h.get("/api/signals/stats/daily?date=yesterday").await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
