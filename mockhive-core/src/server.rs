//! HTTP server assembly and graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};

use crate::error::{Error, Result};
use crate::state::AppState;
use crate::{admin, gateway, health};

/// Builds the full router: health endpoints mounted ahead of tenant
/// routing, the authenticated admin surface under `/__internal`, and the
/// public mock surface / inspector websocket as the catch-all fallback.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_mb * 1024 * 1024;
    let timeout_secs = state.config.server.timeout_secs;

    Router::new()
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .nest("/__internal", admin::router(state.clone()))
        .fallback(gateway::dispatch)
        .layer(
            tower::ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::with_status_code(
                    http::StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(timeout_secs),
                ))
                .layer(RequestBodyLimitLayer::new(body_limit))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().include_headers(true))
                        .on_response(DefaultOnResponse::new().include_headers(true)),
                )
                .layer(SetSensitiveHeadersLayer::new([http::header::AUTHORIZATION, http::header::COOKIE]))
                .set_x_request_id(tower_http::request_id::MakeRequestUuid)
                .propagate_x_request_id()
                .layer(CatchPanicLayer::new()),
        )
        .with_state(state)
}

/// Serves `app` on `addr`, running until a shutdown signal arrives.
pub async fn serve(app: Router, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| Error::Internal(e.to_string()))?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    #[test]
    fn build_router_does_not_panic_with_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root_dir = dir.path().to_path_buf();
        let state = AppState::new(Arc::new(config));
        let _router = build_router(state);
    }
}
