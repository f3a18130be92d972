//! Auth middleware: validates the credential against the credential store
//! and inserts the principal as a request `Extension`, mirroring the shape
//! `eosin_common::rbac`'s Keycloak layer uses, but backed by this fabric's
//! own `CredentialStore` instead of an external IdP.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kubently_common::error::FabricError;
use kubently_common::types::ClusterId;

use crate::app::FabricState;

/// Validates `X-API-Key` against the configured key set (spec.md §4.1),
/// applied to the agent/admin-facing sub-router.
pub async fn api_key_auth(
    State(state): State<FabricState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(key) = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return FabricError::Unauthenticated.into_response();
    };
    match state.credstore.verify_api_key(&key).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Validates `Authorization: Bearer {token}` + `X-Cluster-ID` (spec.md
/// §4.3 step 1), applied to the executor-facing sub-router.
pub async fn executor_auth(
    State(state): State<FabricState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(cluster_id) = req
        .headers()
        .get("x-cluster-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| ClusterId::parse(s).ok())
    else {
        return FabricError::Unauthenticated.into_response();
    };
    let Some(token) = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
    else {
        return FabricError::Unauthenticated.into_response();
    };

    match state.credstore.verify_executor(&cluster_id, &token).await {
        Ok(()) => {
            req.extensions_mut().insert(cluster_id);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
