//! Operator approval surface for the web decision channel.
//!
//! Served on its own listener, never on the caller port, so a caller
//! holding an API key has no route to approve its own requests.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tollgate_approval::{QueueEvent, WebApprovalQueue};
use tollgate_core::{ErrorKind, Rejection};
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use crate::http::rejection_response;

const PAGE: &str = include_str!("../assets/approval.html");

/// SSE keep-alive interval.
const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct OperatorState {
    queue: Arc<WebApprovalQueue>,
    shutdown: CancellationToken,
}

/// Build the operator router. Event streams end when `shutdown` fires so
/// that open browser tabs do not hold up a graceful shutdown.
pub fn router(queue: Arc<WebApprovalQueue>, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/approval", get(|| async { Redirect::permanent("/approval/") }))
        .route("/approval/", get(page))
        .route("/approval/api/queue", get(pending))
        .route("/approval/api/events", get(events))
        .route("/approval/api/{id}/approve", post(approve))
        .route("/approval/api/{id}/reject", post(reject))
        .layer(TraceLayer::new_for_http())
        .with_state(OperatorState { queue, shutdown })
}

async fn page() -> Html<&'static str> {
    Html(PAGE)
}

async fn pending(State(state): State<OperatorState>) -> Json<QueueEvent> {
    Json(state.queue.snapshot())
}

async fn approve(State(state): State<OperatorState>, Path(id): Path<String>) -> Response {
    decide(&state.queue, &id, true)
}

async fn reject(State(state): State<OperatorState>, Path(id): Path<String>) -> Response {
    decide(&state.queue, &id, false)
}

fn decide(queue: &WebApprovalQueue, id: &str, approved: bool) -> Response {
    let resolved = Uuid::parse_str(id).is_ok_and(|id| {
        if approved {
            queue.approve(id)
        } else {
            queue.reject(id)
        }
    });
    if !resolved {
        return rejection_response(&Rejection::new(
            404,
            ErrorKind::ProxyError,
            format!("no pending confirmation with id {id}"),
        ));
    }
    let status = if approved { "approved" } else { "rejected" };
    Json(json!({ "id": id, "status": status })).into_response()
}

/// Current queue first, then every change. A lagging subscriber gets a
/// fresh snapshot instead of the events it missed.
async fn events(
    State(OperatorState { queue, shutdown }): State<OperatorState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = queue.subscribe();
    let first = queue.snapshot();

    let stream = futures::stream::unfold(
        (Some(first), rx, queue),
        |(next, mut rx, queue)| async move {
            if let Some(event) = next {
                return Some((Ok(to_sse(&event)), (None, rx, queue)));
            }
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "approval event stream lagged");
                    queue.snapshot()
                },
                Err(RecvError::Closed) => return None,
            };
            Some((Ok(to_sse(&event)), (None, rx, queue)))
        },
    )
    .take_until(shutdown.cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}

fn to_sse(event: &QueueEvent) -> Event {
    Event::default()
        .json_data(event)
        .unwrap_or_else(|_| Event::default().data("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tollgate_approval::{ConfirmationPrompt, Decision, DecisionChannel};
    use tollgate_core::{OperationDescriptor, RawRequest};
    use tollgate_policy::{PolicyMatcher, PolicyVerdict};
    use tollgate_test::test_caller;
    use tower::ServiceExt;

    fn prompt() -> ConfirmationPrompt {
        let op = OperationDescriptor::from_raw(&RawRequest::new(
            "POST",
            "/gmail/v1/users/me/messages/m1/trash",
        ))
        .unwrap();
        let PolicyVerdict::Allowed(allowed) = PolicyMatcher::builtin().unwrap().classify(&op) else {
            panic!("expected allowed");
        };
        ConfirmationPrompt::new(&op, &allowed, &test_caller())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 65_536).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn call(app: Router, method: &str, uri: &str) -> Response {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    fn app(queue: &Arc<WebApprovalQueue>) -> Router {
        router(Arc::clone(queue), CancellationToken::new())
    }

    async fn wait_for_pending(queue: &WebApprovalQueue) {
        while queue.pending().is_empty() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_page_is_served() {
        let response = call(app(&Arc::new(WebApprovalQueue::new())), "GET", "/approval/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("/approval/api/events"));
    }

    #[tokio::test]
    async fn test_queue_lists_pending_prompt() {
        let queue = Arc::new(WebApprovalQueue::new());
        let prompt = prompt();
        let waiting = {
            let queue = Arc::clone(&queue);
            let prompt = prompt.clone();
            tokio::spawn(async move { queue.present(&prompt).await })
        };
        wait_for_pending(&queue).await;

        let body = body_json(call(app(&queue), "GET", "/approval/api/queue").await).await;
        assert_eq!(body["event"], "connected");
        assert_eq!(body["pending"][0]["id"], prompt.id.to_string());
        assert_eq!(body["pending"][0]["path"], "/gmail/v1/users/me/messages/m1/trash");

        waiting.abort();
    }

    #[tokio::test]
    async fn test_approve_and_reject_resolve_prompt() {
        let queue = Arc::new(WebApprovalQueue::new());
        for (action, expected) in [("approve", Decision::Approved), ("reject", Decision::Rejected)] {
            let prompt = prompt();
            let waiting = {
                let queue = Arc::clone(&queue);
                let prompt = prompt.clone();
                tokio::spawn(async move { queue.present(&prompt).await })
            };
            wait_for_pending(&queue).await;

            let uri = format!("/approval/api/{}/{action}", prompt.id);
            let response = call(app(&queue), "POST", &uri).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(waiting.await.unwrap().unwrap(), expected);

            // Already decided.
            let response = call(app(&queue), "POST", &uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_404_envelope() {
        let queue = Arc::new(WebApprovalQueue::new());
        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let response = call(app(&queue), "POST", &format!("/approval/api/{id}/approve")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = body_json(response).await;
            assert_eq!(body["error"], "proxy_error");
        }
    }

    #[tokio::test]
    async fn test_events_start_with_snapshot_then_follow_changes() {
        let queue = Arc::new(WebApprovalQueue::new());
        let response = call(app(&queue), "GET", "/approval/api/events").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("\"event\":\"connected\""));

        let prompt = prompt();
        let waiting = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.present(&prompt).await })
        };
        let added = frames.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&added).contains("\"event\":\"request_added\""));

        waiting.abort();
        let withdrawn = frames.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&withdrawn).contains("\"event\":\"request_withdrawn\""));
    }

    #[tokio::test]
    async fn test_events_end_on_shutdown() {
        let shutdown = CancellationToken::new();
        let operator = router(Arc::new(WebApprovalQueue::new()), shutdown.clone());
        let response = call(operator, "GET", "/approval/api/events").await;

        let mut frames = response.into_body().into_data_stream();
        assert!(frames.next().await.is_some());
        shutdown.cancel();
        assert!(frames.next().await.is_none());
    }
}
