use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use proxy_core::types::CanonicalRequest;
use proxy_core::{ProxyError, StreamEvent};
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::state::AppState;

/// Upstream events are relayed through a bounded channel so a slow client
/// applies backpressure to the dispatch engine's upstream read loop instead
/// of letting it buffer an entire response in memory.
const STREAM_CHANNEL_CAPACITY: usize = 64;

fn error_status(err: &ProxyError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Builds the error response for a dispatch failure that never reached the
/// client, attaching `Retry-After` when the error carries a reset time.
fn error_response(err: &ProxyError) -> Response {
    let status = error_status(err);
    let mut response = (status, err.to_string()).into_response();
    if let Some(reset_ms) = err.retry_after_ms() {
        let secs = (reset_ms / 1_000).max(1).to_string();
        if let Ok(value) = HeaderValue::from_str(&secs) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
    }
    response
}

/// POST /v1/messages
pub async fn create_message(State(state): State<AppState>, Json(req): Json<CanonicalRequest>) -> Response {
    if req.stream {
        return stream_message(state, req).await;
    }

    match state.dispatch.send(req).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "dispatch failed");
            error_response(&err)
        }
    }
}

/// Streams a response as SSE, but does not commit to a 200 until the dispatch
/// engine has either produced its first event or failed outright: quota
/// exhaustion, an empty account pool, and retry exhaustion are all detected
/// before any byte reaches the client, so they still surface as a plain 429
/// instead of being downgraded to an in-band SSE error event. Once the first
/// event is through, any later failure can only become a terminal SSE error —
/// the 200 is already on the wire.
async fn stream_message(state: AppState, req: CanonicalRequest) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), ProxyError>>();

    tokio::spawn(async move {
        let ready_tx = Arc::new(Mutex::new(Some(ready_tx)));
        let sink_ready_tx = ready_tx.clone();
        let sink_tx = tx.clone();

        let result = state
            .dispatch
            .send_stream(req, move |event| {
                let tx = sink_tx.clone();
                let ready_tx = sink_ready_tx.clone();
                async move {
                    if let Some(ready) = ready_tx.lock().unwrap().take() {
                        let _ = ready.send(Ok(()));
                    }
                    let _ = tx.send(event).await;
                }
            })
            .await;

        if let Err(err) = result {
            match ready_tx.lock().unwrap().take() {
                Some(ready) => {
                    let _ = ready.send(Err(err));
                }
                None => {
                    tracing::warn!(error = %err, "stream dispatch failed");
                    let _ = tx
                        .send(StreamEvent::Error { kind: "dispatch_error".to_string(), message: err.to_string() })
                        .await;
                }
            }
        }
    });

    match ready_rx.await {
        Ok(Ok(())) => {
            let events = ReceiverStream::new(rx).map(|event| {
                let event_type = match &event {
                    StreamEvent::MessageStart { .. } => "message_start",
                    StreamEvent::ContentBlockStart { .. } => "content_block_start",
                    StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
                    StreamEvent::ContentBlockStop { .. } => "content_block_stop",
                    StreamEvent::MessageDelta { .. } => "message_delta",
                    StreamEvent::MessageStop => "message_stop",
                    StreamEvent::Error { .. } => "error",
                };
                let data = serde_json::to_string(&event).unwrap_or_default();
                Ok::<_, std::convert::Infallible>(SseEvent::default().event(event_type).data(data))
            });
            Sse::new(events).keep_alive(KeepAlive::default()).into_response()
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "stream dispatch failed before first byte");
            error_response(&err)
        }
        Err(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "stream dispatch task terminated unexpectedly").into_response()
        }
    }
}
