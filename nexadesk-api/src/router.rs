use std::any::Any;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use nexadesk_common::lifecycle::{HealthReporter, Liveness, Readiness};
use nexadesk_common::metrics::{self, track_metrics, HttpMetrics};

use crate::api::{ApiError, PingResponse, VersionResponse};
use crate::time::TimeSource;

/// Hardening headers added to every response unless a handler set its own.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
         form-action 'self';frame-ancestors 'self';img-src 'self' data:;\
         object-src 'none';script-src 'self';script-src-attr 'none';\
         style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

#[derive(Clone)]
pub struct AppState {
    pub version: Arc<VersionResponse>,
    pub health: HealthReporter,
    pub metrics: HttpMetrics,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
}

async fn healthz(State(state): State<AppState>) -> Liveness {
    state.health.liveness()
}

async fn readyz(State(state): State<AppState>) -> Readiness {
    state.health.readiness()
}

async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(state.version.as_ref().clone())
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    metrics::render(state.metrics.registry())
}

async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    Json(PingResponse {
        pong: true,
        ts: state.timesource.current_time(),
    })
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Log the panic payload and answer with a generic 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_owned()
    };
    error!(error = %detail, "unhandled_error");

    ApiError::Internal.into_response()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(render_metrics))
        .route("/api/ping", get(ping))
}

/// Wrap `routes` with the fallback and the middleware stack, outermost first:
/// security headers, CORS, tracing, request metrics, panic recovery.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    // Any origin, never with credentials.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request());

    let mut app = routes
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    for &(name, value) in SECURITY_HEADERS {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    app.with_state(state)
}

pub fn router(state: AppState) -> Router {
    with_middleware(routes(), state)
}
