use crate::collectors::SystemStatus;
use crate::health::Trigger;
use crate::remediation::RemediationError;
use crate::state::{RestartSource, State as AgentState, WatchdogPhase};
use crate::watchdog::Agent;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, UNIX_EPOCH};
use tokio::net::TcpListener;

const RESTART_OK_MESSAGE: &str = "Sunshine restarted successfully";

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiStatus {
    pub cpu_usage: Option<f64>,
    pub mem_usage: Option<f64>,
    pub mem_total: u64,
    pub mem_used: u64,
    pub os: String,
    pub arch: String,
    pub sunshine_pid: u32,
    pub sunshine_running: bool,
}

impl From<&SystemStatus> for ApiStatus {
    fn from(value: &SystemStatus) -> Self {
        Self {
            cpu_usage: value.cpu_usage,
            mem_usage: value.mem_usage(),
            mem_total: value.memory.map_or(0, |m| m.total_bytes),
            mem_used: value.memory.map_or(0, |m| m.used_bytes),
            os: value.os.clone(),
            arch: value.arch.clone(),
            sunshine_pid: value.sunshine_pid(),
            sunshine_running: value.is_running(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiWatchdog {
    pub started_at: String,
    pub phase: WatchdogPhase,
    pub ticks_total: u64,
    pub last_tick_unix: Option<i64>,
    pub last_triggers: Vec<Trigger>,
    pub consecutive_restarts: u32,
    pub deferred_ticks: u32,
    pub last_attempt_unix: Option<i64>,
    pub restarts_total: u64,
    pub restart_failures_total: u64,
    pub last_restart_unix: Option<i64>,
    pub last_restart_error: Option<String>,
}

impl From<&AgentState> for ApiWatchdog {
    fn from(value: &AgentState) -> Self {
        Self {
            started_at: format_unix(value.started_at_unix),
            phase: value.phase,
            ticks_total: value.ticks_total,
            last_tick_unix: value.last_tick_unix,
            last_triggers: value.last_triggers.clone(),
            consecutive_restarts: value.history.consecutive,
            deferred_ticks: value.history.deferred_ticks,
            last_attempt_unix: value.history.last_attempt_unix,
            restarts_total: value.restarts_total,
            restart_failures_total: value.restart_failures_total,
            last_restart_unix: value.last_restart_unix,
            last_restart_error: value.last_restart_error.clone(),
        }
    }
}

/// Binds the control surface. An unparsable address is `InvalidInput`.
pub async fn bind(listen: &str) -> io::Result<TcpListener> {
    let addr: SocketAddr = listen.parse().map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid listen address {listen:?}: {err}"),
        )
    })?;
    TcpListener::bind(addr).await
}

pub fn build_router(agent: Agent) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/restart", post(restart_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/watchdog", get(watchdog_handler))
        .with_state(agent)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status_handler(State(agent): State<Agent>) -> impl IntoResponse {
    let status = agent.collector.collect().await;
    Json(ApiStatus::from(&status))
}

async fn restart_handler(State(agent): State<Agent>) -> Response {
    match agent.restart(RestartSource::Manual).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "message": RESTART_OK_MESSAGE }))).into_response(),
        Err(err @ RemediationError::InProgress) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn metrics_handler(State(agent): State<Agent>) -> Response {
    agent.metrics.inc_scrape_count();
    {
        let guard = agent.state.read().await;
        agent.metrics.update_from_state(&guard);
    }
    match agent.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn watchdog_handler(State(agent): State<Agent>) -> impl IntoResponse {
    let guard = agent.state.read().await;
    Json(ApiWatchdog::from(&*guard))
}

fn format_unix(unix: i64) -> String {
    let st = UNIX_EPOCH + Duration::from_secs(unix.max(0) as u64);
    humantime::format_rfc3339_seconds(st).to_string()
}
