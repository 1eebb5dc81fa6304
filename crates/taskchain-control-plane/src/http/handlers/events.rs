//! Server-Sent Events stream of task lifecycle events and metrics.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};

use taskchain_core::EventChannel;

use crate::bus::BusMessage;
use crate::http::responses::{ApiError, EventsQuery};
use crate::state::AppState;

/// Type alias for boxed SSE stream.
type SseEventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// GET /events?channel=
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<SseEventStream>, ApiError> {
    let channel: EventChannel = query
        .channel
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(|e: taskchain_core::CoreError| ApiError::validation(e.to_string()))?;

    info!(channel = %channel, "Event stream opened");
    let events = state.bus.subscribe(channel).into_stream().map(to_sse);
    let stream: SseEventStream = Box::pin(events);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(message: BusMessage) -> Result<Event, Infallible> {
    let event = match message {
        BusMessage::Task(event) => Event::default()
            .id(event.seq.to_string())
            .event(event.wire_name())
            .json_data(event.wire_payload()),
        BusMessage::Metrics(metrics) => Event::default().event("metrics").json_data(metrics),
    };
    Ok(event.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode event");
        Event::default().comment("encoding error")
    }))
}
