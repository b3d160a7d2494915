//! Health check handlers (C13 ambient stack, §6): `/healthz` liveness and
//! `/readyz` readiness, mounted ahead of tenant routing so neither is
//! reachable under `/m/{tenant}/...` or `/__internal/`.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    tenants: usize,
}

/// Always 200 once the HTTP listener is bound; carries no tenant context.
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse { status: "ok" }))
}

/// 200 once the tenant registry's backing storage root exists (or can be
/// created); 503 otherwise. No tenant engine is provisioned by this check.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let ready = std::fs::create_dir_all(&state.config.storage.root_dir).is_ok();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadinessResponse { ready, tenants: state.tenants.tenant_count() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tenant::TenantRegistry;
    use std::sync::Arc;

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let response = liveness().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_reports_ok_when_storage_root_is_creatable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root_dir = dir.path().join("tenants");
        let config = Arc::new(config);
        let state = AppState { config: config.clone(), tenants: Arc::new(TenantRegistry::new(config)) };
        let response = readiness(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
