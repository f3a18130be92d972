//! Executor Stream Endpoint (C3) — spec.md §4.3.
//!
//! `GET /executor/stream` returns an SSE body that interleaves bus-delivered
//! `command` events with a periodic `keepalive`, the same dual-source
//! `tokio::select!` merge `frusta::server::sender_main` uses to fan two
//! channels into one outgoing sink. Auth (§4.3 step 1) already ran in
//! `auth_mw::executor_auth` by the time this handler is called.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use kubently_common::auth::ExecutorPrincipal;
use uuid::Uuid;

use crate::app::FabricState;

pub async fn stream(
    State(state): State<FabricState>,
    ExecutorPrincipal(cluster_id): ExecutorPrincipal,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let keepalive_seconds = state.args.sse_keepalive_seconds;
    metrics::gauge!("fabric_executor_connections", "cluster_id" => cluster_id.to_string())
        .increment(1.0);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("connected")
            .json_data(serde_json::json!({ "session_id": session_id }))
            .unwrap_or_else(|_| Event::default().event("connected")));

        let mut subscription = match state.bus.subscribe(&cluster_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(%e, %cluster_id, "failed to subscribe to command channel");
                yield Ok(Event::default().event("error").data(e.to_string()));
                metrics::gauge!("fabric_executor_connections", "cluster_id" => cluster_id.to_string())
                    .decrement(1.0);
                return;
            }
        };
        let cancel = tokio_util::sync::CancellationToken::new();
        let mut keepalive = tokio::time::interval(Duration::from_secs(keepalive_seconds.max(1)));
        keepalive.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                payload = subscription.next(&cancel) => {
                    match payload {
                        Some(payload) => {
                            let data = serde_json::json!({
                                "id": payload.id,
                                "args": payload.args,
                                "deadline_unix_ms": payload.deadline_unix_ms,
                                "correlation_id": payload.correlation_id,
                            });
                            yield Ok(Event::default().event("command").json_data(data)
                                .unwrap_or_else(|_| Event::default().event("error")));
                        }
                        None => break,
                    }
                }
                _ = keepalive.tick() => {
                    yield Ok(Event::default().event("keepalive").data(""));
                }
            }
        }
        metrics::gauge!("fabric_executor_connections", "cluster_id" => cluster_id.to_string())
            .decrement(1.0);
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(keepalive_seconds.max(1))))
}
