//! Agent-facing capability read (spec.md §4.6, §6).

use axum::{Json, extract::{Path, State}, response::IntoResponse};
use kubently_common::auth::ApiKeyPrincipal;
use kubently_common::error::FabricError;
use kubently_common::types::ClusterId;

use crate::app::FabricState;

/// `GET /clusters/{cluster_id}/capabilities`.
pub async fn get_capabilities(
    State(state): State<FabricState>,
    ApiKeyPrincipal(_identity): ApiKeyPrincipal,
    Path(cluster_id): Path<String>,
) -> impl IntoResponse {
    let cluster_id = match ClusterId::parse(&cluster_id) {
        Ok(c) => c,
        Err(e) => return FabricError::InvalidArgument(e).into_response(),
    };
    match state.capabilities.get(&cluster_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => FabricError::NotFound(format!("no capability record for {cluster_id}"))
            .into_response(),
        Err(e) => e.into_response(),
    }
}
