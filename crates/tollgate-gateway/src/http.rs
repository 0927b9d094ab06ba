//! Caller-facing HTTP surface.
//!
//! `GET /health` answers without authentication. Every other path and
//! method goes through the [`GatingPipeline`].

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tollgate_core::{BackendResponse, RawRequest, Rejection};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::{GatingPipeline, Reply};

/// Name of the authenticated caller, attached to responses for the access
/// log.
#[derive(Debug, Clone)]
struct CallerName(String);

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    confirmation_mode: String,
    pending_confirmation: bool,
}

/// Build the caller-facing router.
pub fn router(pipeline: Arc<GatingPipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(gate)
        .layer(middleware::from_fn(access_log))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn health(State(pipeline): State<Arc<GatingPipeline>>) -> Json<Health> {
    let confirmations = pipeline.confirmations();
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        confirmation_mode: confirmations.mode().to_string(),
        pending_confirmation: confirmations.is_pending(),
    })
}

fn header_string(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn gate(
    State(pipeline): State<Arc<GatingPipeline>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = RawRequest {
        method: method.as_str().to_owned(),
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        authorization: header_string(&headers, AUTHORIZATION),
        content_type: header_string(&headers, CONTENT_TYPE),
        body,
    };

    let outcome = pipeline.execute(&raw).await;
    let mut response = match outcome.reply {
        Reply::Backend(backend) => backend_response(backend),
        Reply::Rejected(rejection) => rejection_response(&rejection),
    };
    if let Some(name) = outcome.caller {
        response.extensions_mut().insert(CallerName(name));
    }
    response
}

/// Pass a backend answer through unchanged.
fn backend_response(backend: BackendResponse) -> Response {
    let status = StatusCode::from_u16(backend.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = status;
    if let Some(value) = backend
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Render a rejection as the JSON error envelope.
pub(crate) fn rejection_response(rejection: &Rejection) -> Response {
    let status =
        StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(rejection)).into_response()
}

/// One line per request: `method path -> status (caller)`.
async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let response = next.run(request).await;
    let caller = response
        .extensions()
        .get::<CallerName>()
        .map_or("-", |c| c.0.as_str());
    info!(
        target: "tollgate::access",
        "{method} {path} -> {} ({caller})",
        response.status().as_u16()
    );
    response
}
