use crate::server::AppContext;
use crate::state::StoreEvent;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(events_handler))
}

pub async fn events_handler(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = ctx.store.subscribe();
    tracing::debug!(subscriber = subscription.id(), "Event stream opened");

    // The stream owns the subscription; dropping the stream when the client
    // disconnects unsubscribes it from the store.
    let stream = futures::stream::unfold(subscription, |mut sub| async move {
        let event = sub.recv().await?;
        Some((event, sub))
    })
    .map(|event: StoreEvent| {
        // Unnamed SSE events so EventSource.onmessage sees everything; the
        // type field in the JSON payload routes them client-side.
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));
        Ok(Event::default().data(data))
    });

    // Heartbeat every 30 seconds so idle connections stay warm.
    let heartbeat =
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
            .map(|_| {
                Ok(Event::default()
                    .event("heartbeat")
                    .data(r#"{"type":"heartbeat"}"#))
            });

    let combined = stream.merge(heartbeat);

    Sse::new(combined).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
