//! Stable error kinds for the fabric HTTP boundary (spec.md §7).

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// One variant per error kind in spec.md §7. `Timeout` is deliberately
/// absent — a timed-out dispatch is folded into a normal `200 OK` envelope
/// with `status: "timeout"`, never surfaced through this type.
#[derive(Debug, Clone)]
pub enum FabricError {
    Unauthenticated,
    Unauthorized(String),
    InvalidArgument(String),
    NotFound(String),
    Unavailable(String),
    ResourceExhausted(String),
}

impl FabricError {
    pub fn code(&self) -> &'static str {
        match self {
            FabricError::Unauthenticated => "UNAUTHENTICATED",
            FabricError::Unauthorized(_) => "UNAUTHORIZED",
            FabricError::InvalidArgument(_) => "INVALID_ARGUMENT",
            FabricError::NotFound(_) => "NOT_FOUND",
            FabricError::Unavailable(_) => "UNAVAILABLE",
            FabricError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            FabricError::Unauthenticated => StatusCode::UNAUTHORIZED,
            FabricError::Unauthorized(_) => StatusCode::FORBIDDEN,
            FabricError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            FabricError::NotFound(_) => StatusCode::NOT_FOUND,
            FabricError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FabricError::ResourceExhausted(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn message(&self) -> String {
        match self {
            // Never disclose which of cluster-id/token was wrong (§8 invariant 4).
            FabricError::Unauthenticated => "authentication failed".to_string(),
            FabricError::Unauthorized(m)
            | FabricError::InvalidArgument(m)
            | FabricError::NotFound(m)
            | FabricError::Unavailable(m)
            | FabricError::ResourceExhausted(m) => m.clone(),
        }
    }
}

impl std::fmt::Display for FabricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for FabricError {}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl IntoResponse for FabricError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}
