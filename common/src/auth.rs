//! Request-scoped authentication principals.
//!
//! Mirrors `eosin_common::rbac`'s `UserId` extractor, which pulls a
//! `KeycloakToken` out of `request.extensions()` after an external auth
//! layer validated it. Here there is no external layer — `fabric`'s own
//! auth middleware validates the credential against the credential store
//! and inserts the principal as an `Extension` before calling `next`; these
//! extractors just pull it back out for handlers.

use axum::{
    Extension, RequestPartsExt,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

use crate::types::{ClusterId, ServiceIdentity};

/// The authenticated caller of an agent/admin-facing endpoint
/// (`X-API-Key`).
#[derive(Clone, Debug)]
pub struct ApiKeyPrincipal(pub ServiceIdentity);

impl<S> FromRequestParts<S> for ApiKeyPrincipal
where
    S: Send + Sync,
{
    type Rejection = MissingPrincipal;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(identity) = parts
            .extract::<Extension<ServiceIdentity>>()
            .await
            .map_err(|_| MissingPrincipal)?;
        Ok(ApiKeyPrincipal(identity))
    }
}

/// The authenticated executor of an `/executor/*` endpoint (`Authorization:
/// Bearer {token}` + `X-Cluster-ID`).
#[derive(Clone, Debug)]
pub struct ExecutorPrincipal(pub ClusterId);

impl<S> FromRequestParts<S> for ExecutorPrincipal
where
    S: Send + Sync,
{
    type Rejection = MissingPrincipal;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(cluster_id) = parts
            .extract::<Extension<ClusterId>>()
            .await
            .map_err(|_| MissingPrincipal)?;
        Ok(ExecutorPrincipal(cluster_id))
    }
}

/// Extracting a principal before the corresponding auth middleware ran is a
/// programming error, not a caller-facing auth failure — treat it as 500.
pub struct MissingPrincipal;

impl IntoResponse for MissingPrincipal {
    fn into_response(self) -> Response {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "auth principal missing (auth middleware not applied)",
        )
            .into_response()
    }
}
