//! Executor-facing result/capability endpoints (spec.md §4.5, §4.6, §6).

use axum::{Json, extract::State, response::IntoResponse};
use kubently_common::auth::ExecutorPrincipal;
use kubently_common::error::FabricError;
use kubently_common::types::{CapabilityRecord, CommandResult, ResultSubmission};

use crate::app::FabricState;

/// `POST /executor/results`. An unknown `command_id` (already expired, or
/// never published by this fabric) is discarded with 404 — the executor
/// has no retry obligation (spec.md §7 `NotFound`).
pub async fn results(
    State(state): State<FabricState>,
    ExecutorPrincipal(_cluster_id): ExecutorPrincipal,
    Json(submission): Json<ResultSubmission>,
) -> impl IntoResponse {
    let cap = state.args.command_output_cap_bytes;
    let result = match to_command_result(submission, cap) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match state.bus.deliver_result(&result.0, &result.1).await {
        Ok(true) => Json(serde_json::json!({ "ok": true })).into_response(),
        Ok(false) => FabricError::NotFound(format!(
            "command {} already has a result (expired or duplicate)",
            result.0
        ))
        .into_response(),
        Err(e) => FabricError::Unavailable(e.to_string()).into_response(),
    }
}

fn to_command_result(
    submission: ResultSubmission,
    cap_bytes: usize,
) -> Result<(String, CommandResult), FabricError> {
    let result = match submission.status.as_str() {
        "success" => {
            let mut output = submission.output.unwrap_or_default();
            let truncated = output.len() > cap_bytes;
            if truncated {
                output.truncate(cap_bytes);
            }
            CommandResult::Success {
                output,
                truncated,
                execution_time_ms: submission.execution_time_ms,
                executed_at: submission.executed_at,
            }
        }
        "failure" => CommandResult::Failure {
            error: submission.error.unwrap_or_else(|| "unknown error".into()),
            execution_time_ms: submission.execution_time_ms,
            executed_at: submission.executed_at,
        },
        other => {
            return Err(FabricError::InvalidArgument(format!(
                "unknown result status {other:?}"
            )));
        }
    };
    Ok((submission.command_id, result))
}

/// `POST /executor/capabilities` (spec.md §4.6).
pub async fn put_capabilities(
    State(state): State<FabricState>,
    ExecutorPrincipal(cluster_id): ExecutorPrincipal,
    Json(record): Json<CapabilityRecord>,
) -> impl IntoResponse {
    match state.capabilities.put(&cluster_id, record).await {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /executor/heartbeat` — refreshes the capability TTL.
pub async fn heartbeat(
    State(state): State<FabricState>,
    ExecutorPrincipal(cluster_id): ExecutorPrincipal,
) -> impl IntoResponse {
    match state.capabilities.heartbeat(&cluster_id).await {
        Ok(true) => Json(serde_json::json!({ "ok": true })).into_response(),
        Ok(false) => {
            FabricError::NotFound("no capability record to refresh".into()).into_response()
        }
        Err(e) => e.into_response(),
    }
}
