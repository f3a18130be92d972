//! Admin token mint/revoke endpoints (spec.md §4.1, §6). Admin scope is a
//! convention on the `API_KEYS` mapping (`ServiceIdentity::is_admin`), not a
//! richer RBAC model — out of scope for the core fabric.

use axum::{Json, extract::{Path, State}, response::IntoResponse};
use kubently_common::auth::ApiKeyPrincipal;
use kubently_common::error::FabricError;
use kubently_common::types::ClusterId;
use serde::Deserialize;

use crate::app::FabricState;

#[derive(Deserialize, Default)]
pub struct MintTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /admin/executors/{cluster_id}/token`.
pub async fn mint_token(
    State(state): State<FabricState>,
    ApiKeyPrincipal(identity): ApiKeyPrincipal,
    Path(cluster_id): Path<String>,
    body: Option<Json<MintTokenRequest>>,
) -> impl IntoResponse {
    if !identity.is_admin() {
        return FabricError::Unauthorized("admin scope required".into()).into_response();
    }
    let cluster_id = match ClusterId::parse(&cluster_id) {
        Ok(c) => c,
        Err(e) => return FabricError::InvalidArgument(e).into_response(),
    };
    let requested_token = body.and_then(|Json(b)| b.token);
    match state
        .credstore
        .mint_executor_token(&identity, &cluster_id, requested_token)
        .await
    {
        Ok(token) => Json(serde_json::json!({ "cluster_id": cluster_id.as_str(), "token": token }))
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// `DELETE /admin/executors/{cluster_id}/token`.
pub async fn revoke_token(
    State(state): State<FabricState>,
    ApiKeyPrincipal(identity): ApiKeyPrincipal,
    Path(cluster_id): Path<String>,
) -> impl IntoResponse {
    if !identity.is_admin() {
        return FabricError::Unauthorized("admin scope required".into()).into_response();
    }
    let cluster_id = match ClusterId::parse(&cluster_id) {
        Ok(c) => c,
        Err(e) => return FabricError::InvalidArgument(e).into_response(),
    };
    match state.credstore.revoke_executor(&identity, &cluster_id).await {
        Ok(true) => Json(serde_json::json!({ "ok": true })).into_response(),
        Ok(false) => FabricError::NotFound(format!("cluster {cluster_id} has no token"))
            .into_response(),
        Err(e) => e.into_response(),
    }
}
