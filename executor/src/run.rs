//! Drives the executor state machine of spec.md §4.5:
//!
//! ```text
//! [Init] -> [Reporting] -> [Connecting] -> [Live] -> {[Executing], [Backoff]} -> ...
//! ```
//!
//! `[Dead]` (auth failure, no retry) and graceful SIGTERM drain are the only
//! terminal paths; everything else loops back to `[Connecting]`.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use kubently_common::args::ExecutorArgs;
use kubently_common::types::{CommandPayload, StreamEvent};
use kubently_common::wait::backoff_full_jitter;
use owo_colors::OwoColorize;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use tokio_util::sync::CancellationToken;

use crate::api::FabricClient;
use crate::{capability, kubectl};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Runs until `cancel` fires (graceful drain) or an unrecoverable auth
/// failure is observed (`[Dead]`, process exits non-zero via the returned
/// `Err`).
pub async fn run(args: ExecutorArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let client = FabricClient::new(args.clone());
    let allow_list = crate::command::default_allow_list();

    // [Init] -> [Reporting]
    if !args.disable_capability_reporter {
        let record = capability::build();
        if let Err(e) = client.post_capabilities(&record).await {
            tracing::warn!(%e, "initial capability report failed, continuing anyway");
        } else {
            tracing::info!("reported capabilities to fabric");
        }
        spawn_heartbeat(client.clone(), args.heartbeat_interval_seconds, cancel.clone());
    }

    let mut attempt: usize = 0;
    loop {
        if cancel.is_cancelled() {
            tracing::info!("shutdown requested, exiting executor loop");
            return Ok(());
        }

        // [Reporting]/[Backoff] -> [Connecting]
        match live_session(&client, &args, &allow_list, &cancel).await {
            Ok(()) => {
                // stream closed cleanly (e.g. remote shutdown); reconnect.
                attempt = 0;
            }
            Err(SessionError::Auth) => {
                eprintln!("{}", "executor authentication rejected by fabric, exiting".red());
                return Err(AuthFailure.into());
            }
            Err(SessionError::Transient(e)) => {
                tracing::warn!(%e, "stream session ended, backing off before reconnect");
                attempt += 1;
            }
        }

        if cancel.is_cancelled() {
            return Ok(());
        }
        let delay = backoff_full_jitter(BACKOFF_BASE, BACKOFF_CAP, attempt.saturating_sub(1));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

enum SessionError {
    Auth,
    Transient(anyhow::Error),
}

/// Marker error for `[Dead]` (spec.md §4.5): lets `main` tell an
/// authentication rejection apart from every other error so it can exit
/// with status `2` ("credential/authentication fatal", spec.md §6) instead
/// of the generic `1`.
#[derive(Debug)]
pub struct AuthFailure;

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "executor authentication failed")
    }
}

impl std::error::Error for AuthFailure {}

/// One `[Connecting] -> [Live] -> ({[Executing]}* | [Backoff])` cycle.
async fn live_session(
    client: &FabricClient,
    args: &ExecutorArgs,
    allow_list: &[String],
    cancel: &CancellationToken,
) -> Result<(), SessionError> {
    let mut source = client.open_stream().map_err(SessionError::Transient)?;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                source.close();
                return Ok(());
            }
            next = source.next() => next,
        };

        let Some(event) = next else {
            return Ok(());
        };

        match event {
            Ok(SseEvent::Open) => {
                tracing::info!("executor stream connected");
            }
            Ok(SseEvent::Message(message)) => {
                if let Some(stream_event) = parse_event(&message.event, &message.data) {
                    handle_event(client, args, allow_list, stream_event).await;
                }
            }
            Err(reqwest_eventsource::Error::InvalidStatusCode(status, _))
                if status.as_u16() == 401 || status.as_u16() == 403 =>
            {
                source.close();
                return Err(SessionError::Auth);
            }
            Err(e) => {
                source.close();
                return Err(SessionError::Transient(e.into()));
            }
        }
    }
}

fn parse_event(event_name: &str, data: &str) -> Option<StreamEvent> {
    match event_name {
        "connected" => Some(StreamEvent::Connected {
            session_id: serde_json::from_str::<serde_json::Value>(data)
                .ok()
                .and_then(|v| v.get("session_id").and_then(|s| s.as_str().map(str::to_string)))
                .unwrap_or_default(),
        }),
        "command" => serde_json::from_str::<CommandPayload>(data)
            .ok()
            .map(StreamEvent::Command),
        "keepalive" => Some(StreamEvent::Keepalive),
        "error" => Some(StreamEvent::Error { message: data.to_string() }),
        _ => None,
    }
}

async fn handle_event(client: &FabricClient, args: &ExecutorArgs, allow_list: &[String], event: StreamEvent) {
    match event {
        StreamEvent::Connected { session_id } => {
            tracing::info!(%session_id, "executor session established");
        }
        StreamEvent::Keepalive => {}
        StreamEvent::Error { message } => {
            tracing::warn!(%message, "fabric reported a stream error");
        }
        // [Live] --command event--> [Executing] --result--> [Live]
        StreamEvent::Command(payload) => {
            let command_id = payload.id.clone();
            let correlation_id = payload.correlation_id.clone();
            let submission = kubectl::run(args, allow_list, &payload).await;
            tracing::info!(
                command_id = %command_id,
                correlation_id = ?correlation_id,
                status = %submission.status,
                execution_time_ms = submission.execution_time_ms,
                "command execution finished"
            );
            if let Err(e) = client.post_result(&submission).await {
                tracing::error!(%e, command_id = %command_id, "failed to post command result");
            }
        }
    }
}

fn spawn_heartbeat(client: FabricClient, interval_seconds: u64, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        ticker.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = client.post_heartbeat().await {
                        tracing::warn!(%e, "heartbeat POST failed");
                    }
                }
            }
        }
    });
}
