//! # HTTP Transport
//!
//! Thin axum layer over [`SubmissionGate`]. Handlers only pull the inputs out
//! of the request and map [`GateError`] onto a status code; every decision is
//! made by the gate.
//!
//! ```text
//!     POST /api/email          { email }                 → { success, data: record }
//!     POST /api/email/survey   { email, surveyData }     → { success, data: [record] }
//!     GET  /healthz                                      → { status, limiter }
//!     GET  /api/admin/emails   Authorization: Bearer ..  → { success, data: [record] }
//!
//!     InvalidInput → 400   RateLimited → 429 (+ Retry-After)
//!     Conflict     → 409   Internal    → 500
//! ```
//!
//! The caller's source identifier is the peer address. Behind a reverse proxy
//! (see [`AppState::trust_proxy_headers`]) it is the last `X-Forwarded-For`
//! hop, then `X-Real-IP`, then the peer address. Without any of these it is
//! `"unknown"`.

use crate::error::GateError;
use crate::gate::SubmissionGate;
use crate::rate_limiter::HealthStatus;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const INVALID_REQUEST: &str = "Invalid request format";
const UNAUTHORIZED: &str = "Unauthorized";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    gate: SubmissionGate,
    admin_token: Option<Arc<str>>,
    trust_proxy_headers: bool,
}

impl AppState {
    /// State serving `gate`. The listing endpoint exists only with a token.
    pub fn new(gate: SubmissionGate, admin_token: Option<String>) -> Self {
        Self {
            gate,
            admin_token: admin_token.map(Arc::from),
            trust_proxy_headers: false,
        }
    }

    /// Takes the source from proxy headers instead of the peer address.
    ///
    /// Only safe when every request arrives through a proxy that appends the
    /// real client to `X-Forwarded-For`. Otherwise callers pick their own
    /// source and get a fresh IP budget per request.
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// The gate behind the handlers.
    pub fn gate(&self) -> &SubmissionGate {
        &self.gate
    }
}

/// Response body shared by every API route.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// Whether the submission was accepted.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// User-safe message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

fn success<T: Serialize>(data: T) -> Response {
    Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    })
    .into_response()
}

fn failure(status: StatusCode, message: &'static str) -> Response {
    let body = Envelope::<()> {
        success: false,
        data: None,
        error: Some(message),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match self {
            GateError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::Conflict => StatusCode::CONFLICT,
            GateError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = failure(status, self.public_message());

        if let GateError::RateLimited { retry_after_ms, .. } = self {
            let secs = retry_after_ms.div_ceil(1000).max(1);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

/// Caller identity for the IP axis.
///
/// Headers are ignored unless `trust_proxy` is set. The rightmost
/// `X-Forwarded-For` hop is the one our proxy appended; entries to its left
/// come from the client.
pub fn client_source(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.rsplit(',').next().unwrap_or_default().trim())
            .filter(|v| !v.is_empty())
    };

    let forwarded = if trust_proxy {
        header("x-forwarded-for").or_else(|| header("x-real-ip"))
    } else {
        None
    };

    forwarded
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

async fn email_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return failure(StatusCode::BAD_REQUEST, INVALID_REQUEST);
    };
    // A missing address still counts as an attempt; the gate rejects it
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();

    let source = client_source(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_proxy_headers,
    );
    match state.gate.submit_email(email, &source).await {
        Ok(record) => success(record),
        Err(e) => e.into_response(),
    }
}

async fn survey_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return failure(StatusCode::BAD_REQUEST, INVALID_REQUEST);
    };
    let (Some(email), Some(survey)) = (
        body.get("email").and_then(Value::as_str),
        body.get("surveyData").filter(|v| !v.is_null()),
    ) else {
        return failure(StatusCode::BAD_REQUEST, INVALID_REQUEST);
    };

    let source = client_source(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_proxy_headers,
    );
    match state.gate.submit_survey(email, survey, &source).await {
        Ok(rows) => success(rows),
        Err(e) => e.into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let metrics = state.gate.stats();
    let health = metrics.health_status();
    let status = match health {
        HealthStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        status,
        Json(json!({
            "status": health.as_str(),
            "limiter": metrics.summary(),
        })),
    )
        .into_response()
}

async fn list_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (&state.admin_token, presented) {
        (Some(expected), Some(token)) if token == &**expected => {}
        _ => {
            warn!("Rejected submission listing request");
            return failure(StatusCode::UNAUTHORIZED, UNAUTHORIZED);
        }
    }

    match state.gate.list_submissions().await {
        Ok(records) => success(records),
        Err(e) => e.into_response(),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// All routes, with CORS for `cors_origins` and request tracing.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/api/email", post(email_handler))
        .route("/api/email/survey", post(survey_handler))
        .route("/healthz", get(health_handler));

    if state.admin_token.is_some() {
        router = router.route("/api/admin/emails", get(list_handler));
    }

    router
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// Peer addresses are made available to handlers as a source fallback.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
