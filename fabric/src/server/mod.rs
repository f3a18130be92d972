//! Router assembly. Both sub-routers share one listening port (spec.md §6
//! defines a single `PORT`), so the public/internal split `iam::server`
//! and `meta::server` express as separate listeners happens here at the
//! `Router` composition level instead: an executor-facing sub-router and an
//! agent/admin-facing sub-router, each with its own auth middleware,
//! merged into one `axum::serve`.

mod admin;
mod agent;
mod auth_mw;
mod dispatch;
mod executor_endpoints;
mod executor_stream;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use kubently_common::{access_log, cors, request_context};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::app::FabricState;

pub async fn run(cancel: CancellationToken, port: u16, state: FabricState) -> anyhow::Result<()> {
    let executor_router = Router::new()
        .route("/executor/stream", get(executor_stream::stream))
        .route("/executor/results", post(executor_endpoints::results))
        .route(
            "/executor/capabilities",
            post(executor_endpoints::put_capabilities),
        )
        .route("/executor/heartbeat", post(executor_endpoints::heartbeat))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_mw::executor_auth,
        ))
        .with_state(state.clone());

    let agent_router = Router::new()
        .route("/debug/execute", post(dispatch::execute))
        .route(
            "/clusters/{cluster_id}/capabilities",
            get(agent::get_capabilities),
        )
        .route("/admin/executors/{cluster_id}/token", post(admin::mint_token))
        .route(
            "/admin/executors/{cluster_id}/token",
            delete(admin::revoke_token),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_mw::api_key_auth,
        ))
        .with_state(state);

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .merge(executor_router)
        .merge(agent_router)
        .layer(middleware::from_fn(access_log::request))
        .layer(middleware::from_fn(request_context::middleware::create_context))
        .layer(cors::dev());

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "fabric listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    tracing::info!("fabric stopped gracefully");
    Ok(())
}
