//! Command Dispatcher (C4) — spec.md §4.4.
//!
//! `execute()` implements the eight-step algorithm verbatim: validate,
//! generate a command id, mark the cluster active (advisory), publish,
//! await, and fold a timeout into the uniform envelope rather than an HTTP
//! error.

use std::time::Duration;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use kubently_common::RequestContextExtractor;
use kubently_common::auth::ApiKeyPrincipal;
use kubently_common::error::FabricError;
use kubently_common::types::{ClusterId, CommandPayload, CommandResult, DispatchEnvelope};
use rand::Rng;
use redis::AsyncCommands;

use crate::app::FabricState;
use crate::command::{self, ExecuteRequest};

const MIN_TIMEOUT_SECONDS: u64 = 1;
const MAX_TIMEOUT_SECONDS: u64 = 60;
const ACTIVE_HINT_TTL_SECONDS: i64 = 60;

pub async fn execute(
    State(state): State<FabricState>,
    ApiKeyPrincipal(identity): ApiKeyPrincipal,
    ctx: RequestContextExtractor,
    Json(req): Json<ExecuteRequest>,
) -> impl IntoResponse {
    tracing::info!(
        request_id = %ctx.request_id,
        identity = %identity,
        cluster_id = %req.cluster_id,
        correlation_id = ?req.correlation_id,
        "dispatching command"
    );
    match execute_inner(&state, req).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn execute_inner(
    state: &FabricState,
    req: ExecuteRequest,
) -> Result<DispatchEnvelope, FabricError> {
    let cluster_id =
        ClusterId::parse(&req.cluster_id).map_err(FabricError::InvalidArgument)?;

    // Step 2: cluster must be registered.
    let registered = state
        .credstore
        .verify_executor_registered(&cluster_id)
        .await?;
    if !registered {
        return Err(FabricError::NotFound(format!(
            "cluster {cluster_id} is not registered"
        )));
    }

    let allowed_verbs = state.capabilities.allowed_verbs(&cluster_id).await?;
    let args = command::build_and_validate(&req, &allowed_verbs)?;

    let timeout_seconds = req
        .timeout_seconds
        .unwrap_or(state.args.command_timeout_default_seconds)
        .clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS);
    let timeout = Duration::from_secs(timeout_seconds);

    // Step 3: generate command_id (128-bit random, URL-safe).
    let command_id = generate_command_id();

    // Step 4: advisory activity hint, best-effort.
    if let Err(e) = mark_active(state, &cluster_id).await {
        tracing::warn!(%e, %cluster_id, "failed to refresh cluster:active hint");
    }

    // Step 5: publish.
    let deadline_unix_ms = Utc::now().timestamp_millis() + (timeout.as_millis() as i64);
    let payload = CommandPayload {
        id: command_id.clone(),
        args,
        deadline_unix_ms,
        correlation_id: req.correlation_id.clone(),
    };
    state
        .bus
        .publish(&cluster_id, &payload)
        .await
        .map_err(|e| FabricError::Unavailable(e.to_string()))?;

    // Step 6-8: await the result, folding a timeout into the envelope.
    let result = state
        .bus
        .await_result(&command_id, timeout)
        .await
        .map_err(|e| FabricError::Unavailable(e.to_string()))?
        .unwrap_or(CommandResult::Timeout);

    Ok(DispatchEnvelope::from_result(
        command_id,
        cluster_id.to_string(),
        result,
    ))
}

async fn mark_active(state: &FabricState, cluster_id: &ClusterId) -> anyhow::Result<()> {
    let mut conn = state.credstore.pool().get().await?;
    let _: () = conn
        .set_ex(
            kubently_common::channels::cluster_active(cluster_id),
            "1",
            ACTIVE_HINT_TTL_SECONDS as u64,
        )
        .await?;
    Ok(())
}

fn generate_command_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    let mut out = String::with_capacity(22);
    base62_encode(&bytes, &mut out);
    out
}

fn base62_encode(bytes: &[u8; 16], out: &mut String) {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut value = u128::from_be_bytes(*bytes);
    if value == 0 {
        out.push('a');
        return;
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 62) as usize]);
        value /= 62;
    }
    digits.reverse();
    out.push_str(&String::from_utf8(digits).expect("base62 alphabet is ascii"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_are_unique_and_nonempty() {
        let a = generate_command_id();
        let b = generate_command_id();
        assert_ne!(a, b);
        assert!(!a.is_empty());
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn timeout_clamps_to_bounds() {
        assert_eq!(0u64.clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS), 1);
        assert_eq!(600u64.clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS), 60);
        assert_eq!(5u64.clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS), 5);
    }
}
