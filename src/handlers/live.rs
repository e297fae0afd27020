//! Server-Sent Events stream of reconciliation outcomes for one tracking code.

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::tracking::find_tracked;
use crate::error::AppError;
use crate::services::broker::{ChannelSink, SubscriptionGuard};
use crate::AppState;

/// Frames a subscriber may fall behind by before new ones are dropped.
const LIVE_BUFFER: usize = 32;

pub const CONNECTED_FRAME: &[u8] = b": connected\n\n";
pub const KEEPALIVE_FRAME: &[u8] = b": keep-alive\n\n";

fn data_frame(payload: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(payload);
    frame.extend_from_slice(b"\n\n");
    Bytes::from(frame)
}

/// Opens a live stream. The subscription and the keep-alive timer live inside
/// the body stream, so both end the moment the client goes away.
pub async fn live_updates(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let transaction = find_tracked(&state, &code).await?;
    let topic = transaction.tracking_code;

    let (sink, mut rx) = ChannelSink::bounded(LIVE_BUFFER);
    let id = state.broker.subscribe(&topic, Arc::new(sink));
    let guard = SubscriptionGuard::new(state.broker.clone(), topic.clone(), id);
    let keepalive = state.keepalive;

    tracing::debug!(tracking_code = %topic, "Live stream opened");

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        yield Ok::<Bytes, Infallible>(Bytes::from_static(CONNECTED_FRAME));

        loop {
            let frame = tokio::select! {
                payload = rx.recv() => match payload {
                    Some(payload) => data_frame(&payload),
                    None => break,
                },
                _ = ticker.tick() => Bytes::from_static(KEEPALIVE_FRAME),
            };
            yield Ok(frame);
        }

        tracing::debug!(tracking_code = %topic, "Live stream closed by server");
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}
